//! Connection classification for a shared TCP port.
//!
//! A [`Classifier`] owns one raw listener and hands out one
//! [`ClassifiedListener`] per registered class. Each accepted connection is
//! sniffed on its own task; the first class (in registration order) whose
//! predicate accepts the leading bytes receives the connection, with those
//! bytes replayed to the reader.
//!
//! ```ignore
//! let mut classifier = Classifier::new(TcpListener::bind("0.0.0.0:8000").await?);
//! let mut http = classifier.matching([Matcher::Http1, Matcher::Http2]);
//! let mut rest = classifier.matching([Matcher::Any]);
//! tokio::spawn(classifier.serve(shutdown.clone()));
//!
//! let (stream, peer) = http.accept().await?;
//! ```

mod classifier;
mod error;
mod matcher;
mod stream;

pub use classifier::{
    ClassifiedListener, Classifier, ClassifierConfig, CloseHandle, ACCEPT_ERROR_BACKOFF,
    DEFAULT_BACKLOG, DEFAULT_MAX_SNIFF_BYTES,
};
pub use error::ClassifyError;
pub use matcher::{Matcher, Verdict, HTTP2_PREFACE, MAX_HTTP1_LINE};
pub use stream::{MuxReadHalf, MuxStream};
