//! Staleness reaper for connections that went quiet.
//!
//! A disconnect only marks a connection inactive so a quick reconnect with
//! the same ID keeps its subscriptions. The reaper purges what never comes
//! back:
//!
//! - on connect of a *new* ID, the same user's siblings inactive for at
//!   least the threshold ([`StaleConnectionReaper::on_user_connected`])
//! - periodically, every connection inactive for at least the threshold
//!   ([`StaleConnectionReaper::run`])
//!
//! A zero threshold purges inactive connections on the next opportunity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::domain::foundation::{ConnectionId, UserId};

use super::hub::ListenerHub;

pub struct StaleConnectionReaper {
    hub: Arc<ListenerHub>,
    threshold: Duration,
    interval: Duration,
}

impl StaleConnectionReaper {
    pub fn new(hub: Arc<ListenerHub>, threshold: Duration, interval: Duration) -> Self {
        Self {
            hub,
            threshold,
            interval,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Purge `user_id`'s expired siblings of `connection_id`.
    pub async fn on_user_connected(
        &self,
        user_id: &UserId,
        connection_id: &ConnectionId,
    ) -> Vec<ConnectionId> {
        let reaped = self
            .hub
            .reap_stale_for_user(user_id, self.threshold, connection_id)
            .await;
        if !reaped.is_empty() {
            tracing::debug!(
                user_id = %user_id,
                reaped = reaped.len(),
                "Purged stale connections for reconnecting user"
            );
        }
        reaped
    }

    /// One full sweep.
    pub async fn sweep_once(&self) -> Vec<ConnectionId> {
        let reaped = self.hub.reap_stale(self.threshold).await;
        if !reaped.is_empty() {
            let stats = self.hub.stats().await;
            tracing::info!(
                reaped = reaped.len(),
                connections = stats.connections,
                teams = stats.teams,
                blocks = stats.blocks,
                "Stale connection sweep"
            );
        }
        reaped
    }

    /// Sweep every `interval` until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Stale connection reaper stopping");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::realtime::RecordingSink;
    use crate::domain::foundation::TeamId;

    fn conn(s: &str) -> ConnectionId {
        ConnectionId::new(s).unwrap()
    }

    #[tokio::test]
    async fn sweep_purges_expired_only() {
        let hub = Arc::new(ListenerHub::new());
        hub.register(conn("gone"), None, RecordingSink::new()).await;
        hub.register(conn("here"), None, RecordingSink::new()).await;
        hub.subscribe_team(&conn("gone"), &TeamId::new("t").unwrap()).await;
        hub.mark_inactive(&conn("gone")).await;

        let reaper = StaleConnectionReaper::new(hub.clone(), Duration::ZERO, Duration::from_secs(60));
        let reaped = reaper.sweep_once().await;

        assert_eq!(reaped, vec![conn("gone")]);
        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.stats().await.teams, 0);
    }

    #[tokio::test]
    async fn long_threshold_keeps_inactive() {
        let hub = Arc::new(ListenerHub::new());
        hub.register(conn("c1"), None, RecordingSink::new()).await;
        hub.mark_inactive(&conn("c1")).await;

        let reaper = StaleConnectionReaper::new(
            hub.clone(),
            Duration::from_secs(300),
            Duration::from_secs(60),
        );

        assert!(reaper.sweep_once().await.is_empty());
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn run_sweeps_then_stops_on_shutdown() {
        let hub = Arc::new(ListenerHub::new());
        hub.register(conn("c1"), None, RecordingSink::new()).await;
        hub.mark_inactive(&conn("c1")).await;

        let reaper = Arc::new(StaleConnectionReaper::new(
            hub.clone(),
            Duration::ZERO,
            Duration::from_millis(10),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = {
            let reaper = reaper.clone();
            tokio::spawn(async move { reaper.run(shutdown_rx).await })
        };

        for _ in 0..100 {
            if hub.connection_count().await == 0 {
                break;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(hub.connection_count().await, 0);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
