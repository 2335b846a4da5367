pub mod board;
pub mod command;
pub mod state;

pub use board::{Board, Cell, Position};
pub use command::{Command, UnknownCommand};
pub use state::{GameError, GameState, InvalidPlayerId, PeerInfo, PlayerId, PlayerRecord};
