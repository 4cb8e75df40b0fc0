//! Classifier dispatch loop and classified listeners.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};

use crate::error::ClassifyError;
use crate::matcher::{Matcher, Verdict};
use crate::stream::MuxStream;

/// Default upper bound on bytes read while classifying a connection.
pub const DEFAULT_MAX_SNIFF_BYTES: usize = 4096;

/// Default number of classified connections queued per listener.
pub const DEFAULT_BACKLOG: usize = 1024;

/// Pause after a transient accept error before accepting again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Classifier tuning.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Give up on a connection that does not classify in time.
    pub sniff_timeout: Option<Duration>,
    /// Bytes after which undecided matchers count as no match.
    pub max_sniff_bytes: usize,
    /// Queue depth between the dispatch loop and each classified listener.
    pub backlog: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sniff_timeout: None,
            max_sniff_bytes: DEFAULT_MAX_SNIFF_BYTES,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

/// One registered class.
struct Route {
    matchers: Vec<Matcher>,
    tx: mpsc::Sender<(MuxStream, SocketAddr)>,
    closed: CancellationToken,
}

impl AsRef<[Matcher]> for Route {
    fn as_ref(&self) -> &[Matcher] {
        &self.matchers
    }
}

/// Splits one raw listener into classified listeners.
///
/// Classes are tried in registration order and the first class with a
/// matching predicate receives the connection.
pub struct Classifier {
    listener: TcpListener,
    routes: Vec<Route>,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(listener: TcpListener) -> Self {
        Self::with_config(listener, ClassifierConfig::default())
    }

    pub fn with_config(listener: TcpListener, config: ClassifierConfig) -> Self {
        Self {
            listener,
            routes: Vec::new(),
            config,
        }
    }

    /// Register a class and return the listener that yields its connections.
    ///
    /// A connection belongs to this class if any of `matchers` accepts it and
    /// no previously registered class did.
    pub fn matching(&mut self, matchers: impl IntoIterator<Item = Matcher>) -> ClassifiedListener {
        let (tx, rx) = mpsc::channel(self.config.backlog.max(1));
        let closed = CancellationToken::new();

        self.routes.push(Route {
            matchers: matchers.into_iter().collect(),
            tx,
            closed: closed.clone(),
        });

        ClassifiedListener {
            rx,
            close: CloseHandle {
                closed,
                fired: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    /// Run the dispatch loop.
    ///
    /// Transient accept errors (descriptor exhaustion, aborted handshakes) are
    /// logged and retried after [`ACCEPT_ERROR_BACKOFF`]. Returns `Ok` once
    /// `shutdown` fires, or the fatal accept error that ended the loop. Either
    /// way every classified listener observes closure once the in-flight
    /// classifications finish.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ClassifyError> {
        let Classifier {
            listener,
            routes,
            config,
        } = self;
        let routes: Arc<[Route]> = routes.into();

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Classifier stopped");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) if is_fatal_accept_error(&e) => {
                        error!(error = %e, "Accept error, classifier stopped");
                        return Err(e.into());
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept error");
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                debug!("Classifier stopped");
                                return Ok(());
                            }
                            _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => continue,
                        }
                    }
                },
            };

            let routes = Arc::clone(&routes);
            let config = config.clone();
            let shutdown = shutdown.clone();

            tokio::spawn(
                async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = dispatch(stream, peer_addr, &routes, &config) => {}
                    }
                }
                .instrument(tracing::debug_span!("classify", peer = %peer_addr)),
            );
        }
    }
}

/// Accept errors that mean the listening socket itself is unusable.
///
/// Everything else (EMFILE, ENFILE, ENOBUFS, ECONNABORTED and friends) is
/// about a single connection or a passing resource shortage.
fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported
    )
}

/// Classify one connection and hand it to its listener.
async fn dispatch(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    routes: &[Route],
    config: &ClassifierConfig,
) {
    let sniffed = match config.sniff_timeout {
        Some(limit) => match tokio::time::timeout(limit, sniff(&mut stream, routes, config)).await
        {
            Ok(result) => result,
            Err(_) => {
                debug!("Classification timed out");
                return;
            }
        },
        None => sniff(&mut stream, routes, config).await,
    };

    let (selection, prefix) = match sniffed {
        Ok(sniffed) => sniffed,
        Err(e) => {
            debug!(error = %e, "Read error during classification");
            return;
        }
    };

    let Some(index) = selection else {
        debug!(sniffed_bytes = prefix.len(), "No class matched, closing");
        return;
    };

    let route = &routes[index];
    if route.closed.is_cancelled() {
        debug!(class = index, "Classified listener closed, dropping connection");
        return;
    }

    let conn = MuxStream::new(stream, prefix);
    tokio::select! {
        _ = route.closed.cancelled() => {
            debug!(class = index, "Classified listener closed, dropping connection");
        }
        sent = route.tx.send((conn, peer_addr)) => {
            if sent.is_err() {
                debug!(class = index, "Classified listener dropped, closing connection");
            }
        }
    }
}

/// Read until some class is chosen or none can be.
async fn sniff(
    stream: &mut TcpStream,
    routes: &[Route],
    config: &ClassifierConfig,
) -> io::Result<(Option<usize>, Vec<u8>)> {
    let mut prefix = Vec::new();
    let mut chunk = [0u8; 1024];
    let mut exhausted = false;

    loop {
        match select(routes, &prefix, exhausted) {
            Selection::Class(index) => return Ok((Some(index), prefix)),
            Selection::Unmatched => return Ok((None, prefix)),
            Selection::NeedMore => {}
        }

        let want = chunk.len().min(config.max_sniff_bytes.saturating_sub(prefix.len()));
        if want == 0 {
            exhausted = true;
            continue;
        }

        let n = stream.read(&mut chunk[..want]).await?;
        if n == 0 {
            exhausted = true;
        } else {
            prefix.extend_from_slice(&chunk[..n]);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Selection {
    Class(usize),
    Unmatched,
    NeedMore,
}

/// First-registered-wins selection over the bytes read so far.
///
/// A later class is only considered once every earlier class has been ruled
/// out. With `exhausted` set no more bytes will arrive, so undecided matchers
/// count as no match.
fn select<R: AsRef<[Matcher]>>(routes: &[R], prefix: &[u8], exhausted: bool) -> Selection {
    for (index, route) in routes.iter().enumerate() {
        let mut undecided = false;
        for matcher in route.as_ref() {
            match matcher.check(prefix) {
                Verdict::Match => return Selection::Class(index),
                Verdict::NeedMore if !exhausted => undecided = true,
                Verdict::NeedMore | Verdict::NoMatch => {}
            }
        }
        if undecided {
            return Selection::NeedMore;
        }
    }
    Selection::Unmatched
}

/// A listener yielding only connections of one class.
pub struct ClassifiedListener {
    rx: mpsc::Receiver<(MuxStream, SocketAddr)>,
    close: CloseHandle,
}

impl ClassifiedListener {
    /// Wait for the next connection of this class.
    ///
    /// Fails with [`ClassifyError::ListenerClosed`] once the listener was
    /// closed or the dispatch loop ended.
    pub async fn accept(&mut self) -> Result<(MuxStream, SocketAddr), ClassifyError> {
        if self.close.is_closed() {
            return Err(ClassifyError::ListenerClosed);
        }
        tokio::select! {
            biased;
            _ = self.close.closed.cancelled() => Err(ClassifyError::ListenerClosed),
            conn = self.rx.recv() => conn.ok_or(ClassifyError::ListenerClosed),
        }
    }

    /// Handle that closes this listener from another task.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    pub fn close(&self) -> bool {
        self.close.close()
    }
}

/// Closes a [`ClassifiedListener`].
#[derive(Debug, Clone)]
pub struct CloseHandle {
    closed: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl CloseHandle {
    /// Close the listener, unblocking a pending accept.
    ///
    /// Returns true only for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closed.cancel();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
