//! Classified TCP forwarding.
//!
//! This module provides:
//! - Forwarding classes and their predicates
//! - Per-class forwarders (accept, dial, copy)
//! - PROXY protocol v2 header encoding
//! - The mux lifecycle with graceful drain
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Classifier -+-> HTTP listener -> Forwarder -> HTTP backend
//!                                   +-> TLS listener  -> Forwarder -> TLS backend
//!                                   +-> Rest listener -> Forwarder -> Rest backend
//!                                                            |
//!                                               PROXY v2 header (if enabled)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let listener = TcpListener::bind("0.0.0.0:8000").await?;
//! let target = Target {
//!     http: ClassTarget::new("127.0.0.1:8080", false),
//!     tls: ClassTarget::new("127.0.0.1:8443", true),
//!     rest: ClassTarget::disabled(),
//! };
//! Mux::new(MuxOptions::default()).serve(cancel, listener, &target).await;
//! ```

mod class;
mod forwarder;
mod mux;
mod proxy_protocol;

pub use class::Class;
pub use forwarder::{ForwardError, Forwarder};
pub use mux::{Mux, MuxOptions};
pub use proxy_protocol::{encode_proxy_header_v2, ProxyHeader, SIGNATURE as PROXY_V2_SIGNATURE};
