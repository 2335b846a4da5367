use super::{NodeState, PeerNode, RoleState};
use crate::game::{Command, GameState, PeerInfo, PlayerId};
use crate::rpc::{PeerApi, RpcError};
use async_trait::async_trait;
use tracing::{debug, info, warn};

impl PeerNode {
    fn not_serving(&self, what: &str) -> RpcError {
        // Reported as unreachable so callers fall back or re-ask the tracker
        RpcError::Unreachable(format!("{} is not {}", self.me.id, what))
    }

    /// [Primary] Run one command against the authoritative state
    ///
    /// A player that is not in the game is refused, except for Exit, which
    /// is already satisfied.
    async fn execute_as_primary(
        &self,
        s: &mut NodeState,
        player: &PlayerId,
        command: Command,
    ) -> Result<GameState, RpcError> {
        if !s.game.contains(player) {
            warn!(player = %player, ?command, "Command from a player not in the game");
            if command == Command::Exit {
                return Ok(s.game.clone());
            }
            return Err(RpcError::Rejected(format!("player {} is not in the game", player)));
        }

        let was_backup = s.game.backup() == Some(player);
        if !s.apply(player, command) {
            debug!(player = %player, ?command, "Command left the state unchanged");
            return Ok(s.game.clone());
        }
        let me = self.me.id.clone();
        s.record = s.game.player(&me).cloned();

        if command == Command::Exit {
            info!(player = %player, "Player left the game");
            if *player == self.me.id {
                // Last word to the backup before this process goes away
                self.replicate_now(s).await;
                return Ok(s.game.clone());
            }
            if was_backup {
                self.run_promotion(s).await;
            }
        } else {
            debug!(player = %player, ?command, version = s.game.version(), "Command applied");
        }

        self.replicate(s);
        Ok(s.game.clone())
    }
}

#[async_trait]
impl PeerApi for PeerNode {
    async fn init_player(&self, player: PeerInfo) -> Result<GameState, RpcError> {
        let mut s = self.inner.lock().await;
        if s.role != RoleState::Primary {
            return Err(self.not_serving("the primary"));
        }
        if player.id == self.me.id {
            return Err(RpcError::Rejected(format!("player id {} is taken", player.id)));
        }

        s.add_player(&player)
            .map_err(|e| RpcError::Rejected(e.to_string()))?;
        info!(player = %player.id, players = s.game.players().len(), "Player joined");

        match s.game.backup().cloned() {
            None => {
                // Existing players get the first chance, the joiner is the fallback
                let candidates = s.peers_except(&[&self.me.id, &player.id]);
                let mut promoted = false;
                for candidate in candidates {
                    match self.try_promote(&mut s, &candidate).await {
                        Ok(()) => {
                            info!(backup = %candidate.id, "Promoted new backup");
                            promoted = true;
                            break;
                        }
                        Err(e) => warn!(candidate = %candidate.id, error = %e, "Backup candidate failed"),
                    }
                }
                if !promoted {
                    info!(backup = %player.id, "Joining player becomes backup");
                    s.game.assign_backup(Some(player.id.clone()));
                }
                self.notify_tracker(&s).await;
            }
            Some(backup) if backup != player.id => self.replicate(&s),
            Some(_) => {}
        }

        self.ensure_heartbeat(&mut s);
        Ok(s.game.clone())
    }

    async fn execute_command(&self, player: PlayerId, command: Command) -> Result<GameState, RpcError> {
        let role = self.inner.lock().await.role;
        match role {
            RoleState::Primary => {}
            RoleState::Backup => {
                let (primary, primary_id) = {
                    let s = self.inner.lock().await;
                    (s.primary_peer(), s.game.primary().cloned())
                };
                match primary {
                    Some(primary) if primary.id != self.me.id => {
                        let handle = self.directory.resolve(&primary).await;
                        match handle.execute_command(player.clone(), command).await {
                            Ok(state) => return Ok(state),
                            Err(e) if e.is_unreachable() => {
                                warn!(primary = %primary.id, error = %e, "Primary unreachable, taking over");
                                self.handle_primary_down(&primary.id).await;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    _ => {
                        if let Some(dead) = primary_id {
                            self.handle_primary_down(&dead).await;
                        }
                    }
                }
            }
            _ => return Err(self.not_serving("serving commands")),
        }

        let mut s = self.inner.lock().await;
        if s.role != RoleState::Primary {
            return Err(self.not_serving("the primary"));
        }
        self.execute_as_primary(&mut s, &player, command).await
    }

    async fn ping(&self) -> Result<bool, RpcError> {
        Ok(!self.is_stopped())
    }

    async fn sync_game_state(&self, state: GameState) -> Result<bool, RpcError> {
        let mut s = self.inner.lock().await;
        if s.role != RoleState::Backup {
            debug!(role = %s.role, "Ignoring sync, not the backup");
            return Ok(false);
        }
        if state.version() < s.game.version() {
            debug!(
                incoming = state.version(),
                local = s.game.version(),
                "Ignoring stale sync"
            );
            return Ok(false);
        }
        s.install(state, &self.me.id);
        Ok(true)
    }

    async fn promote_to_backup(&self, state: GameState) -> Result<(), RpcError> {
        let mut s = self.inner.lock().await;
        if !s.role.can_become(RoleState::Backup) {
            return Err(RpcError::Rejected(format!(
                "{} is {} and cannot become backup",
                self.me.id, s.role
            )));
        }

        s.install(state, &self.me.id);
        s.transition(RoleState::Backup, &self.me.id);
        self.ensure_heartbeat(&mut s);
        info!(player = %self.me.id, version = s.game.version(), "Now serving as backup");
        Ok(())
    }

    async fn set_primary(&self, primary: PeerInfo) -> Result<(), RpcError> {
        if primary.id == self.me.id {
            return Ok(());
        }
        let mut s = self.inner.lock().await;
        if s.role == RoleState::Primary {
            warn!(claimant = %primary.id, "Another peer claims to be primary, ignoring");
            return Ok(());
        }

        info!(primary = %primary.id, "Primary changed");
        s.game.assign_primary(Some(primary.id.clone()));
        s.primary_hint = Some(primary);
        Ok(())
    }
}
