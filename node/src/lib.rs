// Library interface for the maze peer: game engine, replication protocol
// and transports shared by the tracker and player binaries

pub mod config;
pub mod game;
pub mod peer;
pub mod rpc;
pub mod tracker;

// Re-export commonly used types for convenience
pub use config::NodeConfig;
pub use game::{Command, GameState, PeerInfo, PlayerId};
pub use peer::{CommandError, JoinError, NodeStatus, PeerNode, RoleState};
pub use rpc::http::HttpDirectory;
pub use rpc::{PeerApi, PeerDirectory, RpcError};
pub use tracker::{HttpTracker, TrackerApi, TrackerBook, TrackerSnapshot};
