use super::{PeerApi, PeerDirectory, RpcError};
use crate::game::{Command, GameState, PeerInfo, PlayerId};
use crate::peer::PeerNode;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Default)]
struct LocalNetwork {
    nodes: RwLock<HashMap<PlayerId, Arc<PeerNode>>>,
    down: RwLock<HashSet<PlayerId>>,
}

/// In-process network of nodes, with crash injection
///
/// Calls are delivered straight to the target node. A crashed node answers
/// nothing; every call to it fails as unreachable.
#[derive(Clone, Default)]
pub struct LocalDirectory {
    network: Arc<LocalNetwork>,
}

impl LocalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, node: Arc<PeerNode>) {
        let id = node.id().clone();
        self.network.down.write().await.remove(&id);
        self.network.nodes.write().await.insert(id, node);
    }

    /// Stop a node and make it unreachable
    pub async fn crash(&self, id: &PlayerId) {
        self.network.down.write().await.insert(id.clone());
        let node = self.network.nodes.read().await.get(id).cloned();
        if let Some(node) = node {
            node.shutdown().await;
        }
        info!(player = %id, "Node crashed");
    }
}

/// Handle to one node of a [`LocalDirectory`]
struct LocalPeer {
    id: PlayerId,
    network: Arc<LocalNetwork>,
}

impl LocalPeer {
    async fn target(&self) -> Result<Arc<PeerNode>, RpcError> {
        if self.network.down.read().await.contains(&self.id) {
            return Err(RpcError::Unreachable(format!("{} is down", self.id)));
        }
        self.network
            .nodes
            .read()
            .await
            .get(&self.id)
            .cloned()
            .ok_or_else(|| RpcError::Unreachable(format!("{} is not on the network", self.id)))
    }
}

#[async_trait]
impl PeerApi for LocalPeer {
    async fn init_player(&self, player: PeerInfo) -> Result<GameState, RpcError> {
        self.target().await?.init_player(player).await
    }

    async fn execute_command(&self, player: PlayerId, command: Command) -> Result<GameState, RpcError> {
        self.target().await?.execute_command(player, command).await
    }

    async fn ping(&self) -> Result<bool, RpcError> {
        self.target().await?.ping().await
    }

    async fn sync_game_state(&self, state: GameState) -> Result<bool, RpcError> {
        self.target().await?.sync_game_state(state).await
    }

    async fn promote_to_backup(&self, state: GameState) -> Result<(), RpcError> {
        self.target().await?.promote_to_backup(state).await
    }

    async fn set_primary(&self, primary: PeerInfo) -> Result<(), RpcError> {
        self.target().await?.set_primary(primary).await
    }
}

#[async_trait]
impl PeerDirectory for LocalDirectory {
    async fn resolve(&self, peer: &PeerInfo) -> Arc<dyn PeerApi> {
        Arc::new(LocalPeer {
            id: peer.id.clone(),
            network: self.network.clone(),
        })
    }
}
