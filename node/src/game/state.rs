use super::board::{Board, Cell, Position};
use super::command::Command;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Two-character player identifier, unique per game
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

/// Player identifier that is not exactly two ASCII alphanumerics
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid player id {0:?}: expected exactly two alphanumeric characters")]
pub struct InvalidPlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PlayerId {
    type Err = InvalidPlayerId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 2 && s.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(PlayerId(s.to_string()))
        } else {
            Err(InvalidPlayerId(s.to_string()))
        }
    }
}

impl TryFrom<String> for PlayerId {
    type Error = InvalidPlayerId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network identity of a peer: who it is and where its RPC server listens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PlayerId,
    pub address: String,
    pub port: u16,
}

impl PeerInfo {
    pub fn new(id: PlayerId, address: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            address: address.into(),
            port,
        }
    }

    /// "IP:PORT" of the peer's RPC server
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Player state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub address: String,
    pub port: u16,
    pub position: Position,
    pub score: u32,
}

impl PlayerRecord {
    pub fn peer(&self) -> PeerInfo {
        PeerInfo::new(self.id.clone(), self.address.clone(), self.port)
    }
}

/// Mutation refused by the game engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("board is full")]
    BoardFull,

    #[error("player {0} is not in the game")]
    UnknownPlayer(PlayerId),
}

/// Authoritative match state, replicated by value between peers
///
/// Players live in a single id-keyed table; `primary` and `backup` refer to
/// entries of that table by id. `version` grows with every change made by the
/// primary so replicas can order the snapshots they receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    n: usize,
    k: usize,
    board: Board,
    players: BTreeMap<PlayerId, PlayerRecord>,
    primary: Option<PlayerId>,
    backup: Option<PlayerId>,
    version: u64,
}

impl GameState {
    /// Empty game on an n x n board with k treasures
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            k,
            board: Board::new(n),
            players: BTreeMap::new(),
            primary: None,
            backup: None,
            version: 0,
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// All players, ordered by id
    pub fn players(&self) -> &BTreeMap<PlayerId, PlayerRecord> {
        &self.players
    }

    pub fn player(&self, id: &PlayerId) -> Option<&PlayerRecord> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn primary(&self) -> Option<&PlayerId> {
        self.primary.as_ref()
    }

    pub fn backup(&self) -> Option<&PlayerId> {
        self.backup.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Address of a player, resolved through the player table
    pub fn peer(&self, id: &PlayerId) -> Option<PeerInfo> {
        self.players.get(id).map(PlayerRecord::peer)
    }

    /// Number of treasures the board should hold for the current player count
    pub fn treasure_target(&self) -> usize {
        self.k
            .min((self.n * self.n).saturating_sub(self.players.len()))
    }

    /// Record the primary; a backup with the same id is cleared
    pub fn assign_primary(&mut self, id: Option<PlayerId>) {
        if id.is_some() && self.backup == id {
            self.backup = None;
        }
        self.primary = id;
        self.version += 1;
    }

    /// Record the backup; refuses to make the primary its own backup
    pub fn assign_backup(&mut self, id: Option<PlayerId>) {
        if id.is_some() && id == self.primary {
            return;
        }
        self.backup = id;
        self.version += 1;
    }

    /// Place the initial treasures on a fresh board
    pub fn init_board<R: Rng>(&mut self, rng: &mut R) {
        self.replenish_treasures(rng);
        self.version += 1;
    }

    /// Add a player at a uniformly random free cell.
    ///
    /// A stale record under the same id is evicted first. Empty cells are
    /// preferred; when only treasure cells remain the player displaces one.
    pub fn add_player<R: Rng>(
        &mut self,
        peer: &PeerInfo,
        rng: &mut R,
    ) -> Result<&PlayerRecord, GameError> {
        if self.players.contains_key(&peer.id) {
            self.remove_record(&peer.id);
        }
        if self.players.len() >= self.n * self.n {
            return Err(GameError::BoardFull);
        }

        let position = match self.board.random_cell_where(rng, |c| *c == Cell::Empty) {
            Some(pos) => pos,
            None => self
                .board
                .random_cell_where(rng, |c| *c == Cell::Treasure)
                .ok_or(GameError::BoardFull)?,
        };

        self.board.set(position, Cell::Player(peer.id.clone()));
        self.players.insert(
            peer.id.clone(),
            PlayerRecord {
                id: peer.id.clone(),
                address: peer.address.clone(),
                port: peer.port,
                position,
                score: 0,
            },
        );
        self.replenish_treasures(rng);
        self.version += 1;

        self.players
            .get(&peer.id)
            .ok_or_else(|| GameError::UnknownPlayer(peer.id.clone()))
    }

    /// Move a player by (dx, dy). Returns whether the state changed.
    ///
    /// Out-of-bounds targets and cells held by another player are rejected
    /// without any change. Landing on a treasure scores it and restores the
    /// treasure count.
    pub fn move_player<R: Rng>(
        &mut self,
        id: &PlayerId,
        dx: i32,
        dy: i32,
        rng: &mut R,
    ) -> bool {
        let Some(origin) = self.players.get(id).map(|p| p.position) else {
            return false;
        };
        let target = origin.offset(dx, dy);

        let picked_up = match self.board.get(target) {
            None | Some(Cell::Player(_)) => return false,
            Some(Cell::Treasure) => true,
            Some(Cell::Empty) => false,
        };

        self.board.clear(origin);
        self.board.set(target, Cell::Player(id.clone()));
        if let Some(record) = self.players.get_mut(id) {
            record.position = target;
            if picked_up {
                record.score += 1;
            }
        }
        if picked_up {
            self.replenish_treasures(rng);
        }
        self.version += 1;
        true
    }

    /// Remove a player, freeing its cell. Returns whether it was present.
    pub fn exit_player<R: Rng>(&mut self, id: &PlayerId, rng: &mut R) -> bool {
        if !self.remove_record(id) {
            return false;
        }
        if self.backup.as_ref() == Some(id) {
            self.backup = None;
        }
        self.replenish_treasures(rng);
        self.version += 1;
        true
    }

    /// Apply a player command. Returns whether the state changed.
    pub fn apply<R: Rng>(&mut self, id: &PlayerId, command: Command, rng: &mut R) -> bool {
        match command {
            Command::Query => false,
            Command::Exit => self.exit_player(id, rng),
            movement => match movement.delta() {
                Some((dx, dy)) => self.move_player(id, dx, dy, rng),
                None => false,
            },
        }
    }

    fn remove_record(&mut self, id: &PlayerId) -> bool {
        match self.players.remove(id) {
            Some(record) => {
                self.board.clear(record.position);
                true
            }
            None => false,
        }
    }

    fn replenish_treasures<R: Rng>(&mut self, rng: &mut R) {
        let target = self.treasure_target();
        while self.board.treasure_count() < target {
            match self.board.random_cell_where(rng, |c| *c == Cell::Empty) {
                Some(pos) => self.board.set(pos, Cell::Treasure),
                None => break,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn place_player_at(&mut self, id: &PlayerId, pos: Position) {
        let Some(origin) = self.players.get(id).map(|p| p.position) else {
            return;
        };
        self.board.clear(origin);
        self.board.set(pos, Cell::Player(id.clone()));
        if let Some(record) = self.players.get_mut(id) {
            record.position = pos;
        }
    }

    #[cfg(test)]
    pub(crate) fn move_treasure(&mut self, from: Position, to: Position) {
        self.board.clear(from);
        self.board.set(to, Cell::Treasure);
    }

    /// Lay out the listed players and exactly the given treasures
    #[cfg(test)]
    pub(crate) fn stage(&mut self, players: &[(PlayerId, Position)], treasures: &[Position]) {
        for pos in self.board.treasures() {
            self.board.clear(pos);
        }
        for (id, _) in players {
            if let Some(origin) = self.players.get(id).map(|p| p.position) {
                self.board.clear(origin);
            }
        }
        for (id, pos) in players {
            self.board.set(*pos, Cell::Player(id.clone()));
            if let Some(record) = self.players.get_mut(id) {
                record.position = *pos;
            }
        }
        for pos in treasures {
            self.board.set(*pos, Cell::Treasure);
        }
        self.version += 1;
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |id: Option<&PlayerId>| id.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        writeln!(
            f,
            "N={} K={} primary={} backup={} version={}",
            self.n,
            self.k,
            show(self.primary()),
            show(self.backup()),
            self.version
        )?;
        for y in 0..self.n {
            let row: Vec<String> = (0..self.n)
                .map(|x| match self.board.get(Position::new(x as i32, y as i32)) {
                    Some(Cell::Player(id)) => id.to_string(),
                    Some(Cell::Treasure) => "**".to_string(),
                    _ => "..".to_string(),
                })
                .collect();
            writeln!(f, "{}", row.join(" "))?;
        }
        for record in self.players.values() {
            writeln!(
                f,
                "{} score={} at ({}, {})",
                record.id, record.score, record.position.x, record.position.y
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pid(s: &str) -> PlayerId {
        s.parse().unwrap()
    }

    fn peer(s: &str) -> PeerInfo {
        PeerInfo::new(pid(s), "127.0.0.1", 7000)
    }

    fn assert_invariants(state: &GameState) {
        assert_eq!(state.board().treasure_count(), state.treasure_target());
        let mut seen = std::collections::HashSet::new();
        for record in state.players().values() {
            assert!(record.position.in_bounds(state.n()));
            assert!(seen.insert(record.position), "two players share a cell");
            assert_eq!(
                state.board().get(record.position),
                Some(&Cell::Player(record.id.clone()))
            );
        }
    }

    #[test]
    fn test_player_id_validation() {
        assert!("a1".parse::<PlayerId>().is_ok());
        assert!("abc".parse::<PlayerId>().is_err());
        assert!("a".parse::<PlayerId>().is_err());
        assert!("a-".parse::<PlayerId>().is_err());
        assert!(serde_json::from_str::<PlayerId>("\"zz9\"").is_err());
    }

    #[test]
    fn test_init_board_and_join() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = GameState::new(3, 1);
        state.init_board(&mut rng);
        assert_eq!(state.board().treasure_count(), 1);

        state.add_player(&peer("p1"), &mut rng).unwrap();
        state.add_player(&peer("p2"), &mut rng).unwrap();
        assert_eq!(state.players().len(), 2);
        assert_invariants(&state);
    }

    #[test]
    fn test_board_full() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut state = GameState::new(2, 1);
        state.init_board(&mut rng);
        for id in ["a1", "a2", "a3", "a4"] {
            state.add_player(&peer(id), &mut rng).unwrap();
            assert_invariants(&state);
        }
        let before = state.clone();
        assert_eq!(state.add_player(&peer("a5"), &mut rng).err(), Some(GameError::BoardFull));
        assert_eq!(state, before);
    }

    #[test]
    fn test_rejoin_evicts_stale_record() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = GameState::new(3, 2);
        state.init_board(&mut rng);
        state.add_player(&peer("p1"), &mut rng).unwrap();
        state.add_player(&PeerInfo::new(pid("p1"), "10.0.0.9", 7100), &mut rng).unwrap();

        assert_eq!(state.players().len(), 1);
        assert_eq!(state.player(&pid("p1")).unwrap().address, "10.0.0.9");
        assert_invariants(&state);
    }

    #[test]
    fn test_move_into_empty_cell() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut state = GameState::new(3, 0);
        state.add_player(&peer("p1"), &mut rng).unwrap();
        state.place_player_at(&pid("p1"), Position::new(1, 1));

        assert!(state.move_player(&pid("p1"), 1, 0, &mut rng));
        assert_eq!(state.player(&pid("p1")).unwrap().position, Position::new(2, 1));
        assert_eq!(state.board().get(Position::new(1, 1)), Some(&Cell::Empty));
    }

    #[test]
    fn test_move_rejected_out_of_bounds_or_occupied() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = GameState::new(3, 0);
        state.add_player(&peer("p1"), &mut rng).unwrap();
        state.add_player(&peer("p2"), &mut rng).unwrap();
        state.place_player_at(&pid("p1"), Position::new(0, 0));
        state.place_player_at(&pid("p2"), Position::new(1, 0));

        let before = state.clone();
        assert!(!state.move_player(&pid("p1"), -1, 0, &mut rng));
        assert!(!state.move_player(&pid("p1"), 0, -1, &mut rng));
        assert!(!state.move_player(&pid("p1"), 1, 0, &mut rng));
        assert_eq!(state, before);
    }

    #[test]
    fn test_treasure_pickup_respawns() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut state = GameState::new(3, 1);
        state.init_board(&mut rng);
        state.add_player(&peer("p1"), &mut rng).unwrap();
        state.place_player_at(&pid("p1"), Position::new(0, 0));
        let treasure = state.board().treasures()[0];
        state.move_treasure(treasure, Position::new(1, 0));

        assert!(state.move_player(&pid("p1"), 1, 0, &mut rng));
        assert_eq!(state.player(&pid("p1")).unwrap().score, 1);
        let treasures = state.board().treasures();
        assert_eq!(treasures.len(), 1);
        assert_ne!(treasures[0], Position::new(1, 0));
        assert_invariants(&state);
    }

    #[test]
    fn test_exit_clears_backup_and_cell() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut state = GameState::new(3, 1);
        state.init_board(&mut rng);
        state.add_player(&peer("p1"), &mut rng).unwrap();
        state.add_player(&peer("p2"), &mut rng).unwrap();
        state.assign_primary(Some(pid("p1")));
        state.assign_backup(Some(pid("p2")));
        let cell = state.player(&pid("p2")).unwrap().position;

        assert!(state.apply(&pid("p2"), Command::Exit, &mut rng));
        assert!(state.backup().is_none());
        assert!(!state.contains(&pid("p2")));
        assert_ne!(state.board().get(cell), Some(&Cell::Player(pid("p2"))));
        assert!(!state.apply(&pid("p2"), Command::Exit, &mut rng));
    }

    #[test]
    fn test_role_assignment_keeps_primary_and_backup_distinct() {
        let mut state = GameState::new(3, 1);
        state.assign_primary(Some(pid("p1")));
        state.assign_backup(Some(pid("p1")));
        assert!(state.backup().is_none());

        state.assign_backup(Some(pid("p2")));
        state.assign_primary(Some(pid("p2")));
        assert_eq!(state.primary(), Some(&pid("p2")));
        assert!(state.backup().is_none());
    }

    #[test]
    fn test_display_renders_grid() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut state = GameState::new(2, 1);
        state.init_board(&mut rng);
        state.add_player(&peer("p1"), &mut rng).unwrap();
        state.assign_primary(Some(pid("p1")));

        let text = state.to_string();
        assert!(text.contains("primary=p1 backup=-"));
        assert!(text.contains("**"));
        assert!(text.contains("p1 score=0"));
    }

    #[test]
    fn test_wire_round_trip_preserves_state() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut state = GameState::new(4, 3);
        state.init_board(&mut rng);
        state.add_player(&peer("p1"), &mut rng).unwrap();
        state.assign_primary(Some(pid("p1")));

        let json = serde_json::to_string(&state).unwrap();
        let decoded: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, state);
    }

    proptest! {
        #[test]
        fn prop_invariants_hold_under_random_play(
            seed in any::<u64>(),
            n in 1usize..5,
            k in 0usize..6,
            ops in proptest::collection::vec((0u8..4, 0u8..6, 0u8..6), 0..60),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut state = GameState::new(n, k);
            state.init_board(&mut rng);
            let ids = ["a0", "a1", "a2", "a3", "a4", "a5"];

            for (op, who, dir) in ops {
                let id = pid(ids[who as usize]);
                match op {
                    0 => {
                        let full = state.players().len() >= n * n && !state.contains(&id);
                        let result = state.add_player(&peer(ids[who as usize]), &mut rng);
                        prop_assert_eq!(result.is_err(), full);
                    }
                    1 => {
                        state.exit_player(&id, &mut rng);
                    }
                    _ => {
                        let command = [
                            Command::MoveWest,
                            Command::MoveSouth,
                            Command::MoveEast,
                            Command::MoveNorth,
                            Command::Query,
                            Command::Query,
                        ][dir as usize];
                        let before = state.player(&id).map(|p| p.position);
                        let moved = state.apply(&id, command, &mut rng);
                        let after = state.player(&id).map(|p| p.position);
                        prop_assert_eq!(moved, before != after);
                    }
                }
                prop_assert_eq!(state.board().treasure_count(), state.treasure_target());
                let mut cells = std::collections::HashSet::new();
                for record in state.players().values() {
                    prop_assert!(record.position.in_bounds(n));
                    prop_assert!(cells.insert(record.position));
                }
            }
        }
    }
}
