use super::{PeerNode, RoleState};
use crate::game::{Command, GameState, PeerInfo};
use crate::rpc::{PeerApi, RpcError};
use tracing::{debug, warn};

/// Why a local command produced no new state
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Neither primary nor backup could be reached; the user may retry
    #[error("command not delivered, try again ({0})")]
    NotDelivered(RpcError),

    #[error("command rejected: {0}")]
    Rejected(String),
}

impl From<RpcError> for CommandError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Rejected(reason) => CommandError::Rejected(reason),
            unreachable => CommandError::NotDelivered(unreachable),
        }
    }
}

impl PeerNode {
    /// Run a command typed by this node's player.
    ///
    /// The primary executes directly. Everyone else sends the command to the
    /// primary and falls back to the backup once if the primary is
    /// unreachable. A command that reaches neither is dropped.
    pub async fn submit(&self, command: Command) -> Result<GameState, CommandError> {
        let (role, primary, backup) = {
            let s = self.inner.lock().await;
            (s.role, s.primary_peer(), s.backup_peer())
        };

        match role {
            RoleState::Joining => {
                return Err(CommandError::NotDelivered(RpcError::Unreachable(
                    "not in the game yet".to_string(),
                )))
            }
            RoleState::Primary => return self.run_locally(command).await,
            _ => {}
        }

        let first = match primary {
            Some(primary) if primary.id != self.me.id => self.forward(&primary, command).await,
            _ => Err(RpcError::Unreachable("no primary known".to_string())),
        };
        let error = match first {
            Ok(state) => return Ok(state),
            Err(RpcError::Rejected(reason)) => return Err(CommandError::Rejected(reason)),
            Err(e) => e,
        };
        warn!(error = %error, ?command, "Primary unreachable, rerouting command");

        // Promoted while the call was failing: handle it here
        if self.role().await.is_server() {
            return self.run_locally(command).await;
        }
        match backup {
            Some(backup) if backup.id != self.me.id => Ok(self.forward(&backup, command).await?),
            _ => Err(CommandError::NotDelivered(error)),
        }
    }

    async fn run_locally(&self, command: Command) -> Result<GameState, CommandError> {
        Ok(self.execute_command(self.me.id.clone(), command).await?)
    }

    /// Send a command to a server peer and adopt the state it returns
    async fn forward(&self, server: &PeerInfo, command: Command) -> Result<GameState, RpcError> {
        let handle = self.directory.resolve(server).await;
        let state = handle.execute_command(self.me.id.clone(), command).await?;
        debug!(server = %server.id, version = state.version(), "Command acknowledged");
        self.adopt(state.clone()).await;
        Ok(state)
    }

    /// Take a server's reply as the local copy where this node has no better one
    async fn adopt(&self, state: GameState) {
        let mut s = self.inner.lock().await;
        match s.role {
            RoleState::Client | RoleState::Joining => s.install(state, &self.me.id),
            RoleState::Backup if state.version() >= s.game.version() => s.install(state, &self.me.id),
            _ => {}
        }
    }
}
