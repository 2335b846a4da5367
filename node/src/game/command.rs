use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Player commands routed to the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Refresh local state without moving
    Query,
    MoveWest,
    MoveSouth,
    MoveEast,
    MoveNorth,
    /// Leave the game
    Exit,
}

/// Input that does not name a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command {0:?} (expected 0, 1, 2, 3, 4 or 9)")]
pub struct UnknownCommand(pub String);

impl Command {
    /// Board delta for movement commands (x grows east, y grows south)
    pub fn delta(&self) -> Option<(i32, i32)> {
        match self {
            Command::MoveWest => Some((-1, 0)),
            Command::MoveSouth => Some((0, 1)),
            Command::MoveEast => Some((1, 0)),
            Command::MoveNorth => Some((0, -1)),
            Command::Query | Command::Exit => None,
        }
    }

    /// Numeric input code typed by the player
    #[cfg(test)]
    pub(crate) fn code(&self) -> u8 {
        match self {
            Command::Query => 0,
            Command::MoveWest => 1,
            Command::MoveSouth => 2,
            Command::MoveEast => 3,
            Command::MoveNorth => 4,
            Command::Exit => 9,
        }
    }
}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Command::Query),
            "1" => Ok(Command::MoveWest),
            "2" => Ok(Command::MoveSouth),
            "3" => Ok(Command::MoveEast),
            "4" => Ok(Command::MoveNorth),
            "9" => Ok(Command::Exit),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codes() {
        for command in [
            Command::Query,
            Command::MoveWest,
            Command::MoveSouth,
            Command::MoveEast,
            Command::MoveNorth,
            Command::Exit,
        ] {
            let parsed: Command = command.code().to_string().parse().unwrap();
            assert_eq!(parsed, command);
        }
        assert_eq!(" 3\n".parse::<Command>(), Ok(Command::MoveEast));
        assert!("5".parse::<Command>().is_err());
        assert!("w".parse::<Command>().is_err());
    }

    #[test]
    fn test_deltas() {
        assert_eq!(Command::MoveNorth.delta(), Some((0, -1)));
        assert_eq!(Command::MoveWest.delta(), Some((-1, 0)));
        assert_eq!(Command::Query.delta(), None);
        assert_eq!(Command::Exit.delta(), None);
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&Command::MoveSouth).unwrap();
        assert_eq!(json, "\"move_south\"");
    }
}
