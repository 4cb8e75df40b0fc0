//! Classifier errors.

use std::io;

use thiserror::Error;

/// Errors returned by the classifier and its listeners.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The classified listener was closed, or its dispatch loop ended.
    #[error("classified listener closed")]
    ListenerClosed,

    /// The raw listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
