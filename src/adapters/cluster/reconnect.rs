//! Resubscribe loop for long-lived cluster subscriptions.
//!
//! A session is one connect-subscribe-listen attempt. Failed attempts are
//! retried after an exponentially growing delay; a session that was live and
//! then dropped starts over from the initial delay.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::ports::ClusterError;

/// Doubling delay between attempts, capped at `max`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
    }
}

/// How an established session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Shutdown was signalled; do not reconnect.
    Shutdown,
    /// The subscription was live and then dropped.
    Lost(ClusterError),
}

/// Runs `session` until it ends with [`SessionEnd::Shutdown`] or shutdown is
/// signalled.
///
/// `Err` from `session` means the attempt never got as far as subscribing.
pub async fn run_with_reconnect<F, Fut>(
    mut session: F,
    mut backoff: ReconnectBackoff,
    mut shutdown: watch::Receiver<bool>,
) where
    F: FnMut(watch::Receiver<bool>) -> Fut,
    Fut: Future<Output = Result<SessionEnd, ClusterError>>,
{
    loop {
        if *shutdown.borrow() {
            return;
        }

        match session(shutdown.clone()).await {
            Ok(SessionEnd::Shutdown) => return,
            Ok(SessionEnd::Lost(e)) => {
                backoff.reset();
                tracing::warn!(error = %e, "Cluster subscription lost; resubscribing");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cluster subscription attempt failed");
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Waiting before resubscribe");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
