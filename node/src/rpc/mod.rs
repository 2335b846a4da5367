pub mod http;
pub mod local;
pub mod server;

use crate::game::{Command, GameState, PeerInfo, PlayerId};
use async_trait::async_trait;
use std::sync::Arc;

/// Failure of a peer-to-peer or tracker call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Target down, timed out, or the network failed
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// Target answered but refused the request
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl RpcError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RpcError::Unreachable(_))
    }
}

/// Remote handle to a peer's RPC surface
#[async_trait]
pub trait PeerApi: Send + Sync {
    /// [Primary] Admit a player and return the authoritative state
    async fn init_player(&self, player: PeerInfo) -> Result<GameState, RpcError>;

    /// [Primary, fallback Backup] Run a player command
    async fn execute_command(&self, player: PlayerId, command: Command) -> Result<GameState, RpcError>;

    /// [Primary <-> Backup] Liveness check
    async fn ping(&self) -> Result<bool, RpcError>;

    /// [Primary -> Backup] Replicate the authoritative state
    async fn sync_game_state(&self, state: GameState) -> Result<bool, RpcError>;

    /// [Primary -> chosen peer] Install the backup role with a state snapshot
    async fn promote_to_backup(&self, state: GameState) -> Result<(), RpcError>;

    /// [Primary -> other peers] Point the peer at a new primary
    async fn set_primary(&self, primary: PeerInfo) -> Result<(), RpcError>;
}

/// Resolves a peer identity to a callable handle
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn resolve(&self, peer: &PeerInfo) -> Arc<dyn PeerApi>;
}
