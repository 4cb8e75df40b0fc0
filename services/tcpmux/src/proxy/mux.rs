//! Mux lifecycle: wiring, serving and graceful shutdown.
//!
//! State of each classified listener and its forwarder:
//!
//! ```text
//! Idle -> Accepting -> (listener closed on cancellation) Draining -> Stopped
//!            |  ^
//!            +--+  accepted: session spawned, loop continues
//!            |
//!            +---> Stopped  on any other accept error
//! ```

use std::sync::Arc;
use std::time::Duration;

use tcpmux_classify::{Classifier, ClassifierConfig, CloseHandle};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::class::Class;
use super::forwarder::Forwarder;
use crate::config::Target;

/// Runtime knobs for [`Mux`].
#[derive(Debug, Clone, Default)]
pub struct MuxOptions {
    /// Bound on each backend dial. `None` leaves it to the OS.
    pub connect_timeout: Option<Duration>,
    /// Bound on the shutdown drain. `None` waits for every session.
    pub drain_timeout: Option<Duration>,
    /// Classification settings.
    pub classifier: ClassifierConfig,
}

/// Shares one listener between the configured classes.
#[derive(Debug, Clone, Default)]
pub struct Mux {
    options: MuxOptions,
}

impl Mux {
    pub fn new(options: MuxOptions) -> Self {
        Self { options }
    }

    /// Serve `listener` until `cancel` fires, then drain.
    ///
    /// Classes without a backend are not registered, so their traffic falls
    /// through to a later class or is refused. After cancellation every
    /// classified listener is closed once and this returns when every accept
    /// loop and every session started before the close has finished (or the
    /// drain timeout, if any, expired).
    pub async fn serve(&self, cancel: CancellationToken, listener: TcpListener, target: &Target) {
        let mut classifier = Classifier::with_config(listener, self.options.classifier.clone());
        let tracker = TaskTracker::new();
        let mut listeners: Vec<(Class, CloseHandle)> = Vec::new();

        for class in Class::ALL {
            let class_target = target.get(class);
            let Some(backend) = class_target.backend() else {
                debug!(class = %class, "No backend configured, class disabled");
                continue;
            };

            let classified = classifier.matching(class.matchers().iter().copied());
            listeners.push((class, classified.close_handle()));

            let forwarder = Arc::new(
                Forwarder::new(class, backend, class_target.proxy_protocol, tracker.clone())
                    .with_connect_timeout(self.options.connect_timeout),
            );
            tracker.spawn(forwarder.run(classified));
        }

        if listeners.is_empty() {
            warn!("No backend configured, every connection will be closed");
        }

        let classifier_shutdown = CancellationToken::new();
        let classifier_task = tokio::spawn(classifier.serve(classifier_shutdown.clone()));

        cancel.cancelled().await;
        info!("Stopping");

        for (class, handle) in &listeners {
            if handle.close() {
                debug!(class = %class, "Classified listener closed");
            }
        }

        classifier_shutdown.cancel();
        match classifier_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Classifier had already stopped"),
            Err(e) => error!(error = %e, "Classifier task failed"),
        }

        tracker.close();
        self.drain(&tracker).await;
    }

    async fn drain(&self, tracker: &TaskTracker) {
        info!(outstanding = tracker.len(), "Waiting for sessions to finish");

        match self.options.drain_timeout {
            None => tracker.wait().await,
            Some(limit) => {
                if tokio::time::timeout(limit, tracker.wait()).await.is_err() {
                    warn!(
                        outstanding = tracker.len(),
                        timeout_ms = limit.as_millis() as u64,
                        "Drain timeout expired, abandoning outstanding sessions"
                    );
                    return;
                }
            }
        }

        info!("Drained");
    }
}
