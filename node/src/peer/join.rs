use super::{PeerNode, RoleState};
use crate::game::{GameState, PeerInfo};
use crate::rpc::RpcError;
use crate::tracker::TrackerSnapshot;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Join failures that retrying will not fix
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("tracker unavailable: {0}")]
    Tracker(RpcError),

    #[error("join refused: {0}")]
    Rejected(String),
}

impl PeerNode {
    /// Enter the game.
    ///
    /// Registers with the tracker, then either bootstraps the game (when the
    /// tracker names this node as primary) or asks the named primary to admit
    /// it. Unreachable primaries are retried through a fresh tracker lookup,
    /// so the call only returns once the node holds a role.
    pub async fn join(&self) -> Result<RoleState, JoinError> {
        info!(player = %self.me.id, endpoint = %self.me.endpoint(), "Registering with tracker");
        let mut snapshot = self
            .tracker
            .register(&self.me)
            .await
            .map_err(JoinError::Tracker)?;

        loop {
            match snapshot.primary.clone() {
                Some(primary) if primary.id == self.me.id => return self.bootstrap(&snapshot).await,
                Some(primary) => match self.join_through(&primary).await {
                    Ok(state) => return Ok(self.finish_join(state).await),
                    Err(RpcError::Rejected(reason)) => return Err(JoinError::Rejected(reason)),
                    Err(e) => {
                        warn!(primary = %primary.id, error = %e, "Primary unreachable, asking tracker again")
                    }
                },
                None => warn!("Tracker knows no primary"),
            }

            sleep(self.config.reconnect_retry).await;
            match self.refresh_snapshot().await {
                Ok(fresh) => snapshot = fresh,
                Err(e) => warn!(error = %e, "Tracker lookup failed"),
            }
        }
    }

    async fn refresh_snapshot(&self) -> Result<TrackerSnapshot, RpcError> {
        let snapshot = self.tracker.get_tracker_state().await?;
        if snapshot.primary.is_none() {
            return self.tracker.register(&self.me).await;
        }
        Ok(snapshot)
    }

    /// First player: create the board and serve as primary
    async fn bootstrap(&self, snapshot: &TrackerSnapshot) -> Result<RoleState, JoinError> {
        let mut s = self.inner.lock().await;
        let mut game = GameState::new(snapshot.n, snapshot.k);
        game.init_board(&mut s.rng);
        game.add_player(&self.me, &mut s.rng)
            .map_err(|e| JoinError::Rejected(e.to_string()))?;
        game.assign_primary(Some(self.me.id.clone()));

        s.install(game, &self.me.id);
        s.transition(RoleState::Primary, &self.me.id);
        self.ensure_heartbeat(&mut s);
        info!(n = snapshot.n, k = snapshot.k, "Bootstrapped game as primary");
        Ok(RoleState::Primary)
    }

    /// Call init_player until the returned state lists this node
    async fn join_through(&self, primary: &PeerInfo) -> Result<GameState, RpcError> {
        let handle = self.directory.resolve(primary).await;
        let mut attempt = 1u32;
        loop {
            let state = handle.init_player(self.me.clone()).await?;
            if state.contains(&self.me.id) {
                debug!(primary = %primary.id, attempt, "Admitted by primary");
                return Ok(state);
            }
            debug!(primary = %primary.id, attempt, "Not in returned state yet, retrying");
            attempt += 1;
            sleep(self.config.join_retry).await;
        }
    }

    /// Install the admitted state and take the role it implies
    async fn finish_join(&self, state: GameState) -> RoleState {
        let mut s = self.inner.lock().await;
        // A promotion may have arrived while the reply was in flight
        if s.role == RoleState::Joining || state.version() >= s.game.version() {
            s.install(state, &self.me.id);
        }

        if s.role == RoleState::Joining {
            let next = if s.game.backup() == Some(&self.me.id) {
                RoleState::Backup
            } else {
                RoleState::Client
            };
            s.transition(next, &self.me.id);
        }
        if s.role.is_server() {
            self.ensure_heartbeat(&mut s);
        }
        info!(
            player = %self.me.id,
            role = %s.role,
            players = s.game.players().len(),
            "Joined game"
        );
        s.role
    }
}
