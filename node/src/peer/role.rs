use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a node in the replication protocol
///
/// A node starts in `Joining` and never returns to it. Clients can be promoted
/// to backup and a backup can take over as primary; a primary keeps its role
/// for the rest of its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleState {
    Joining,
    Primary,
    Backup,
    Client,
}

impl RoleState {
    /// Primary or backup: the node runs the heartbeat
    pub fn is_server(self) -> bool {
        matches!(self, RoleState::Primary | RoleState::Backup)
    }

    /// Whether `self -> next` is a legal transition (staying put is legal)
    pub fn can_become(self, next: RoleState) -> bool {
        use RoleState::*;
        match (self, next) {
            (current, next) if current == next => true,
            (Joining, Primary | Backup | Client) => true,
            (Client, Backup) => true,
            (Backup, Primary) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RoleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleState::Joining => "joining",
            RoleState::Primary => "primary",
            RoleState::Backup => "backup",
            RoleState::Client => "client",
        };
        f.write_str(name)
    }
}
