pub mod handlers;
pub mod heartbeat;
pub mod join;
pub mod promotion;
pub mod role;
pub mod routing;


use crate::config::NodeConfig;
use crate::game::{Command, GameError, GameState, PeerInfo, PlayerId, PlayerRecord};
use crate::rpc::PeerDirectory;
use crate::tracker::TrackerApi;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use join::JoinError;
pub use role::RoleState;
pub use routing::CommandError;

/// One player's process in the game
///
/// Every node is a client of the game; at most one node at a time is the
/// primary and holds the authoritative state, and at most one other node is
/// the backup holding a replica. All mutable protocol state sits behind a
/// single async mutex, so RPC handlers, the heartbeat and local commands
/// never observe each other halfway.
pub struct PeerNode {
    this: Weak<PeerNode>,
    me: PeerInfo,
    config: NodeConfig,
    directory: Arc<dyn PeerDirectory>,
    tracker: Arc<dyn TrackerApi>,
    stopped: AtomicBool,
    inner: Mutex<NodeState>,
}

/// State guarded by the node mutex
pub(crate) struct NodeState {
    role: RoleState,
    game: GameState,
    /// Own entry of the player table, refreshed on every install
    record: Option<PlayerRecord>,
    /// Primary announced through set_primary, used when it is missing from
    /// our copy of the player table
    primary_hint: Option<PeerInfo>,
    rng: StdRng,
    heartbeat: Option<JoinHandle<()>>,
}

impl NodeState {
    fn new() -> Self {
        Self {
            role: RoleState::Joining,
            game: GameState::new(0, 0),
            record: None,
            primary_hint: None,
            rng: StdRng::from_entropy(),
            heartbeat: None,
        }
    }

    /// Move to `next` if the role machine allows it
    pub(crate) fn transition(&mut self, next: RoleState, me: &PlayerId) -> bool {
        if !self.role.can_become(next) {
            warn!(player = %me, from = %self.role, to = %next, "Refusing role change");
            return false;
        }
        if self.role != next {
            info!(player = %me, from = %self.role, to = %next, "Role changed");
            self.role = next;
        }
        true
    }

    /// Replace the local copy of the game
    pub(crate) fn install(&mut self, game: GameState, me: &PlayerId) {
        self.record = game.player(me).cloned();
        self.game = game;
    }

    pub(crate) fn add_player(&mut self, peer: &PeerInfo) -> Result<(), GameError> {
        self.game.add_player(peer, &mut self.rng).map(|_| ())
    }

    pub(crate) fn apply(&mut self, player: &PlayerId, command: Command) -> bool {
        self.game.apply(player, command, &mut self.rng)
    }

    pub(crate) fn exit_player(&mut self, player: &PlayerId) -> bool {
        self.game.exit_player(player, &mut self.rng)
    }

    pub(crate) fn primary_peer(&self) -> Option<PeerInfo> {
        let id = self.game.primary()?;
        self.game.peer(id).or_else(|| {
            self.primary_hint
                .as_ref()
                .filter(|hint| hint.id == *id)
                .cloned()
        })
    }

    pub(crate) fn backup_peer(&self) -> Option<PeerInfo> {
        self.game.backup().and_then(|id| self.game.peer(id))
    }

    /// Every player except `skip`, in ascending id order
    pub(crate) fn peers_except(&self, skip: &[&PlayerId]) -> Vec<PeerInfo> {
        self.game
            .players()
            .values()
            .filter(|record| !skip.contains(&&record.id))
            .map(PlayerRecord::peer)
            .collect()
    }
}

/// Point-in-time summary of a node, served on /status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: PlayerId,
    pub role: RoleState,
    pub primary: Option<PlayerId>,
    pub backup: Option<PlayerId>,
    pub version: u64,
    pub players: usize,
    pub score: Option<u32>,
}

impl PeerNode {
    /// Create a node in the `Joining` role; call [`PeerNode::join`] next
    pub fn new(
        me: PeerInfo,
        config: NodeConfig,
        directory: Arc<dyn PeerDirectory>,
        tracker: Arc<dyn TrackerApi>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| PeerNode {
            this: this.clone(),
            me,
            config,
            directory,
            tracker,
            stopped: AtomicBool::new(false),
            inner: Mutex::new(NodeState::new()),
        })
    }

    pub fn id(&self) -> &PlayerId {
        &self.me.id
    }

    pub fn me(&self) -> &PeerInfo {
        &self.me
    }

    pub async fn role(&self) -> RoleState {
        self.inner.lock().await.role
    }

    /// Local copy of the game
    pub async fn game_state(&self) -> GameState {
        self.inner.lock().await.game.clone()
    }

    /// Own player record as of the last installed state
    pub async fn my_record(&self) -> Option<PlayerRecord> {
        self.inner.lock().await.record.clone()
    }

    pub async fn status(&self) -> NodeStatus {
        let s = self.inner.lock().await;
        NodeStatus {
            id: self.me.id.clone(),
            role: s.role,
            primary: s.game.primary().cloned(),
            backup: s.game.backup().cloned(),
            version: s.game.version(),
            players: s.game.players().len(),
            score: s.record.as_ref().map(|r| r.score),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the heartbeat and answer pings with "not alive" from now on
    pub async fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut s = self.inner.lock().await;
        if let Some(handle) = s.heartbeat.take() {
            handle.abort();
        }
        info!(player = %self.me.id, "Node stopped");
    }
}
