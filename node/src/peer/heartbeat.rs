use super::{NodeState, PeerNode, RoleState};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Which side of the primary/backup pair is being watched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watched {
    Primary,
    Backup,
}

impl PeerNode {
    /// Start the heartbeat task unless it already runs; at most one per node
    pub(crate) fn ensure_heartbeat(&self, s: &mut NodeState) {
        if s.heartbeat.is_some() || self.is_stopped() {
            return;
        }
        let Some(node) = self.this.upgrade() else {
            return;
        };
        s.heartbeat = Some(tokio::spawn(node.heartbeat_loop()));
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticker = interval(self.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        info!(
            player = %self.me.id,
            interval_ms = self.config.heartbeat_interval.as_millis() as u64,
            "Heartbeat started"
        );

        loop {
            ticker.tick().await;
            if self.is_stopped() {
                break;
            }
            self.heartbeat_once().await;
        }
    }

    /// One round: the primary pings its backup, the backup pings its primary.
    /// Clients do nothing.
    pub(crate) async fn heartbeat_once(&self) {
        let watch = {
            let s = self.inner.lock().await;
            let (watched, id) = match s.role {
                RoleState::Primary => (Watched::Backup, s.game.backup().cloned()),
                RoleState::Backup => (Watched::Primary, s.game.primary().cloned()),
                _ => return,
            };
            id.map(|id| {
                let peer = match watched {
                    Watched::Primary => s.primary_peer(),
                    Watched::Backup => s.backup_peer(),
                };
                (watched, id, peer)
            })
        };
        let Some((watched, id, peer)) = watch else {
            return;
        };

        // A peer we cannot even address counts as down
        let alive = match peer {
            Some(peer) => {
                let handle = self.directory.resolve(&peer).await;
                matches!(handle.ping().await, Ok(true))
            }
            None => false,
        };
        if alive {
            debug!(peer = %id, "Heartbeat ok");
            return;
        }

        match watched {
            Watched::Backup => self.handle_backup_down(&id).await,
            Watched::Primary => self.handle_primary_down(&id).await,
        }
    }
}
