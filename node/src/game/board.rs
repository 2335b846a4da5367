use super::state::PlayerId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Grid coordinate on the maze board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    /// Create a new position
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position shifted by (dx, dy); may fall outside the board
    pub fn offset(&self, dx: i32, dy: i32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    /// Check if the position lies on an n x n board
    pub fn in_bounds(&self, n: usize) -> bool {
        let n = n as i64;
        (0..n).contains(&(self.x as i64)) && (0..n).contains(&(self.y as i64))
    }
}

/// Content of a single board cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "player", rename_all = "snake_case")]
pub enum Cell {
    Empty,
    Player(PlayerId),
    Treasure,
}

/// n x n maze grid, row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    n: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Create an empty board of side `n`
    pub fn new(n: usize) -> Self {
        Self {
            n,
            cells: vec![Cell::Empty; n * n],
        }
    }

    /// Side length
    pub fn size(&self) -> usize {
        self.n
    }

    /// Cell at `pos`, or None when out of bounds
    pub fn get(&self, pos: Position) -> Option<&Cell> {
        self.index(pos).map(|i| &self.cells[i])
    }

    /// Overwrite the cell at `pos`. Out-of-bounds writes are ignored.
    pub(crate) fn set(&mut self, pos: Position, cell: Cell) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = cell;
        }
    }

    pub(crate) fn clear(&mut self, pos: Position) {
        self.set(pos, Cell::Empty);
    }

    /// Number of live treasures
    pub fn treasure_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == Cell::Treasure).count()
    }

    /// Positions holding a treasure
    pub fn treasures(&self) -> Vec<Position> {
        self.positions_where(|c| *c == Cell::Treasure)
    }

    /// Number of cells holding neither a player nor a treasure
    #[cfg(test)]
    pub(crate) fn empty_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == Cell::Empty).count()
    }

    /// Pick a uniformly random cell matching `pred`.
    ///
    /// Draws random coordinates until one matches; returns None up front when
    /// no cell matches so the retry loop always terminates.
    pub(crate) fn random_cell_where<R, F>(&self, rng: &mut R, pred: F) -> Option<Position>
    where
        R: Rng,
        F: Fn(&Cell) -> bool,
    {
        if self.n == 0 || !self.cells.iter().any(&pred) {
            return None;
        }
        loop {
            let pos = Position::new(
                rng.gen_range(0..self.n) as i32,
                rng.gen_range(0..self.n) as i32,
            );
            if self.get(pos).map(&pred).unwrap_or(false) {
                return Some(pos);
            }
        }
    }

    fn positions_where<F: Fn(&Cell) -> bool>(&self, pred: F) -> Vec<Position> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| pred(c))
            .map(|(i, _)| Position::new((i % self.n) as i32, (i / self.n) as i32))
            .collect()
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if pos.in_bounds(self.n) {
            Some(pos.y as usize * self.n + pos.x as usize)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bounds() {
        assert!(Position::new(0, 0).in_bounds(3));
        assert!(Position::new(2, 2).in_bounds(3));
        assert!(!Position::new(3, 0).in_bounds(3));
        assert!(!Position::new(0, -1).in_bounds(3));
        assert_eq!(Position::new(1, 1).offset(-1, 1), Position::new(0, 2));
    }

    #[test]
    fn test_set_and_get() {
        let mut board = Board::new(3);
        board.set(Position::new(1, 2), Cell::Treasure);
        assert_eq!(board.get(Position::new(1, 2)), Some(&Cell::Treasure));
        assert_eq!(board.treasures(), vec![Position::new(1, 2)]);
        assert_eq!(board.get(Position::new(5, 5)), None);

        board.clear(Position::new(1, 2));
        assert_eq!(board.treasure_count(), 0);
        assert_eq!(board.empty_count(), 9);
    }

    #[test]
    fn test_random_cell_finds_only_match() {
        let mut board = Board::new(4);
        for x in 0..4 {
            for y in 0..4 {
                board.set(Position::new(x, y), Cell::Treasure);
            }
        }
        board.clear(Position::new(3, 1));

        let mut rng = StdRng::seed_from_u64(7);
        let pos = board.random_cell_where(&mut rng, |c| *c == Cell::Empty);
        assert_eq!(pos, Some(Position::new(3, 1)));

        board.set(Position::new(3, 1), Cell::Treasure);
        assert_eq!(board.random_cell_where(&mut rng, |c| *c == Cell::Empty), None);
    }
}
