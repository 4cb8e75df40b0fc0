//! Per-class accept, dial and copy pipeline.
//!
//! A [`Forwarder`] drains one classified listener. Every accepted connection
//! gets a fresh backend connection (no pooling, no retry), an optional
//! PROXY v2 header, and two copy tasks, one per direction. All of those run
//! on the shared [`TaskTracker`] so shutdown can wait for them.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tcpmux_classify::{ClassifiedListener, MuxStream};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn, Instrument, Span};

use super::class::Class;
use super::proxy_protocol::ProxyHeader;

/// Failures that end a single forward session.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("dial {backend}: {source}")]
    Dial {
        backend: String,
        #[source]
        source: io::Error,
    },

    #[error("dial {backend}: timed out after {timeout:?}")]
    DialTimeout { backend: String, timeout: Duration },

    #[error("inbound address unavailable: {0}")]
    InboundAddress(#[source] io::Error),

    #[error("write proxy header: {0}")]
    ProxyHeader(#[source] io::Error),
}

/// Forwards one class of connections to one backend.
#[derive(Debug)]
pub struct Forwarder {
    class: Class,
    backend: String,
    proxy_protocol: bool,
    connect_timeout: Option<Duration>,
    tracker: TaskTracker,
}

impl Forwarder {
    pub fn new(
        class: Class,
        backend: impl Into<String>,
        proxy_protocol: bool,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            class,
            backend: backend.into(),
            proxy_protocol,
            connect_timeout: None,
            tracker,
        }
    }

    /// Bound backend dials; `None` leaves it to the OS.
    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Accept until the listener fails, spawning a session per connection.
    ///
    /// Any accept error ends the loop for good. Closing the listener during
    /// shutdown is the expected way out.
    pub async fn run(self: Arc<Self>, mut listener: ClassifiedListener) {
        info!(
            class = %self.class,
            backend = %self.backend,
            proxy_protocol = self.proxy_protocol,
            "Forwarding started"
        );

        loop {
            match listener.accept().await {
                Ok((inbound, peer_addr)) => {
                    debug!(
                        class = %self.class,
                        backend = %self.backend,
                        peer = %peer_addr,
                        "Accepted connection"
                    );
                    let span = tracing::info_span!(
                        "session",
                        class = %self.class,
                        backend = %self.backend,
                        peer = %peer_addr
                    );
                    self.tracker
                        .spawn(Arc::clone(&self).handle(inbound, peer_addr).instrument(span));
                }
                Err(e) => {
                    warn!(
                        class = %self.class,
                        backend = %self.backend,
                        error = %e,
                        "Accept returned error, forwarding stopped"
                    );
                    return;
                }
            }
        }
    }

    /// Forward one accepted connection. Failures are logged, never returned.
    pub async fn handle(self: Arc<Self>, inbound: MuxStream, peer_addr: SocketAddr) {
        if let Err(e) = self.forward(inbound, peer_addr).await {
            warn!(
                class = %self.class,
                backend = %self.backend,
                peer = %peer_addr,
                error = %e,
                "Forwarding failed"
            );
        }
    }

    /// Sockets still owned here are closed on every early return.
    async fn forward(&self, inbound: MuxStream, peer_addr: SocketAddr) -> Result<(), ForwardError> {
        let mut outbound = self.dial().await?;
        debug!(class = %self.class, backend = %self.backend, "Connected to backend");

        if let Err(e) = inbound.set_nodelay(true).and(outbound.set_nodelay(true)) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        if self.proxy_protocol {
            let local_addr = inbound.local_addr().map_err(ForwardError::InboundAddress)?;
            let header = ProxyHeader::new(peer_addr, local_addr).encode();
            outbound
                .write_all(&header)
                .await
                .map_err(ForwardError::ProxyHeader)?;
            debug!("PROXY v2 header sent");
        }

        self.splice(inbound, outbound);
        Ok(())
    }

    async fn dial(&self) -> Result<TcpStream, ForwardError> {
        let connect = TcpStream::connect(self.backend.as_str());
        let result = match self.connect_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, connect).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ForwardError::DialTimeout {
                        backend: self.backend.clone(),
                        timeout,
                    })
                }
            },
            None => connect.await,
        };
        result.map_err(|source| ForwardError::Dial {
            backend: self.backend.clone(),
            source,
        })
    }

    /// Start both copy directions on the tracker.
    fn splice(&self, inbound: MuxStream, outbound: TcpStream) {
        let (inbound_read, inbound_write) = inbound.into_split();
        let (outbound_read, outbound_write) = outbound.into_split();
        let session_closed = CancellationToken::new();

        self.tracker.spawn(
            pipe(
                "client_to_backend",
                inbound_read,
                outbound_write,
                session_closed.clone(),
            )
            .instrument(Span::current()),
        );
        self.tracker.spawn(
            pipe(
                "backend_to_client",
                outbound_read,
                inbound_write,
                session_closed,
            )
            .instrument(Span::current()),
        );
    }
}

/// Copy one direction until EOF, error, or the sibling direction ending.
///
/// Whichever direction finishes first cancels `session_closed`, which stops
/// the other one. Both sockets close once both halves of each are dropped.
async fn pipe<R, W>(
    direction: &'static str,
    mut reader: R,
    mut writer: W,
    session_closed: CancellationToken,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::select! {
        copied = tokio::io::copy(&mut reader, &mut writer) => Some(copied),
        _ = session_closed.cancelled() => None,
    };

    session_closed.cancel();
    let _ = writer.shutdown().await;

    match copied {
        Some(Ok(bytes)) => debug!(direction, bytes, "Copy finished"),
        Some(Err(e)) => debug!(direction, error = %e, "Copy ended"),
        None => debug!(direction, "Copy stopped, session closed"),
    }
}
