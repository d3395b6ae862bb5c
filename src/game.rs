//! Game state and the player-facing board operations.
//!
//! The solver and the perturbator only need a small slice of this:
//! the hidden mine grid, the knowledge grid, the starting square from
//! the parameters, and [`GameState::mine_lookup`]. The rest (opening,
//! chording, flags, win/loss bookkeeping) is the plumbing a frontend
//! drives after generation.

use crate::types::{GameParams, Grid, Knowledge};

/// Outcome of opening a single square.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenResult {
    Opened,
    /// The square was a mine. The game is lost.
    Exploded,
}

/// A board in play: the hidden mine layout plus everything the player
/// knows about it.
#[derive(Clone, Debug)]
pub struct GameState {
    pub params: GameParams,
    /// Ground truth. Mutated only by the generator and the perturbator.
    pub mines: Grid<bool>,
    /// Player knowledge, one tag per square.
    pub grid: Grid<Knowledge>,
    pub dead: bool,
    pub won: bool,
}

impl GameState {
    /// Wrap an existing mine layout with an all-covered knowledge grid.
    pub fn with_mines(params: GameParams, mines: Grid<bool>) -> GameState {
        debug_assert_eq!((mines.width, mines.height), (params.width, params.height));
        let grid = Grid::new(mines.width, mines.height, Knowledge::UNKNOWN);
        GameState {
            params,
            mines,
            grid,
            dead: false,
            won: false,
        }
    }

    pub fn finished(&self) -> bool {
        self.dead || self.won
    }

    /// Number of mines adjacent to `(x, y)`, or -1 if the square itself
    /// is a mine.
    pub fn mine_lookup(&self, x: i32, y: i32) -> i32 {
        if self.mines.get(x, y) {
            return -1;
        }

        let mut n = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx != 0 || dy != 0)
                    && self.mines.contains(x + dx, y + dy)
                    && self.mines.get(x + dx, y + dy)
                {
                    n += 1;
                }
            }
        }
        n
    }

    /// Open a square.
    ///
    /// Opening a mine loses the game. Opening a zero-count square opens
    /// its whole zero region plus the numbered fringe around it. When
    /// every non-mined square is open, the remaining covered squares are
    /// flagged and the game is won.
    pub fn open_square(&mut self, x: i32, y: i32) -> OpenResult {
        assert!(!self.mines.is_empty());

        if self.mines.get(x, y) {
            self.dead = true;
            self.grid.set(x, y, Knowledge::MINE_HIT);
            return OpenResult::Exploded;
        }

        let count = self.mine_lookup(x, y);
        self.grid.set(x, y, Knowledge::opened(count));

        // Iterative flood fill through zero-count squares.
        let mut todo: Vec<usize> = Vec::new();
        if count == 0 {
            todo.push(self.grid.idx(x, y));
        }

        while let Some(i) = todo.pop() {
            let (cx, cy) = self.grid.point(i);

            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (cx + dx, cy + dy);
                    if !self.grid.contains(nx, ny) || !self.grid.get(nx, ny).is_unknown() {
                        continue;
                    }

                    let n = self.mine_lookup(nx, ny);
                    debug_assert!(n >= 0); // zero regions never border a mine
                    self.grid.set(nx, ny, Knowledge::opened(n));

                    if n == 0 {
                        todo.push(self.grid.idx(nx, ny));
                    }
                }
            }
        }

        self.check_win();
        OpenResult::Opened
    }

    /// Chord-open: if the flags around an opened square account for its
    /// count, open all its unflagged covered neighbors.
    ///
    /// A wrong flag makes this fatal: the mine hiding under an unflagged
    /// neighbor is opened and the game is lost.
    pub fn open_adjacent_squares(&mut self, x: i32, y: i32) {
        if !self.grid.contains(x, y) {
            return;
        }

        let Some(count) = self.grid.get(x, y).opened_count() else {
            return;
        };

        let mut flags = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if self.grid.contains(x + dx, y + dy)
                    && self.grid.get(x + dx, y + dy) == Knowledge::MARKED_AS_MINE
                {
                    flags += 1;
                }
            }
        }

        if flags != count {
            return;
        }

        // A mis-flagged neighborhood loses on the offending square only.
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if self.mines.contains(nx, ny)
                    && self.mines.get(nx, ny)
                    && self.grid.get(nx, ny) != Knowledge::MARKED_AS_MINE
                {
                    self.open_square(nx, ny);
                    return;
                }
            }
        }

        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if self.grid.contains(nx, ny) && self.grid.get(nx, ny).is_unknown() {
                    self.open_square(nx, ny);
                }
            }
        }
    }

    /// Toggle the mine flag on a covered square. Returns whether the
    /// square ended up flagged.
    pub fn toggle_mark(&mut self, x: i32, y: i32) -> bool {
        if !self.grid.contains(x, y) {
            return false;
        }

        match self.grid.get(x, y) {
            Knowledge::MARKED_AS_MINE => self.grid.set(x, y, Knowledge::UNKNOWN),
            Knowledge::UNKNOWN => self.grid.set(x, y, Knowledge::MARKED_AS_MINE),
            _ => {}
        }

        self.grid.get(x, y) == Knowledge::MARKED_AS_MINE
    }

    pub fn count_uncovered(&self) -> i32 {
        self.grid.cells.iter().filter(|k| k.is_opened()).count() as i32
    }

    pub fn count_flags(&self) -> i32 {
        self.grid
            .cells
            .iter()
            .filter(|&&k| k == Knowledge::MARKED_AS_MINE)
            .count() as i32
    }

    /// Rewrite the board with the terminal display states after a loss:
    /// unflagged mines are revealed, wrong flags are crossed out.
    pub fn reveal_mines(&mut self) {
        assert!(self.dead);

        for i in 0..self.grid.len() {
            let (x, y) = self.grid.point(i);
            let k = self.grid.at(i);

            if self.mines.get(x, y) {
                if k != Knowledge::MARKED_AS_MINE && k != Knowledge::MINE_HIT {
                    self.grid.set(x, y, Knowledge::MINE_REVEALED);
                }
            } else if k == Knowledge::MARKED_AS_MINE {
                self.grid.set(x, y, Knowledge::MINE_INCORRECT);
            }
        }
    }

    fn check_win(&mut self) {
        if self.dead {
            return;
        }

        let covered = self.grid.cells.iter().filter(|k| k.is_covered()).count() as i32;
        let nmines = self.mines.count_mines();
        debug_assert!(covered >= nmines);

        // All mine-free squares open: flag what is left and declare the win.
        if covered == nmines {
            for i in 0..self.grid.len() {
                if self.grid.at(i).is_covered() {
                    let (x, y) = self.grid.point(i);
                    self.grid.set(x, y, Knowledge::MARKED_AS_MINE);
                }
            }
            self.won = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x3 board with a single mine in the top-left corner.
    fn corner_mine_game() -> GameState {
        let params = GameParams::new(3, 3, 1, 2, 2);
        let mut mines = Grid::new(3, 3, false);
        mines.set(0, 0, true);
        GameState::with_mines(params, mines)
    }

    #[test]
    fn test_mine_lookup() {
        let game = corner_mine_game();
        assert_eq!(game.mine_lookup(0, 0), -1);
        assert_eq!(game.mine_lookup(1, 1), 1);
        assert_eq!(game.mine_lookup(2, 2), 0);
        assert_eq!(game.mine_lookup(2, 0), 0);
    }

    #[test]
    fn test_open_zero_floods_and_wins() {
        let mut game = corner_mine_game();
        assert_eq!(game.open_square(2, 2), OpenResult::Opened);

        // the zero at (2,2) opens everything except the mine
        for y in 0..3 {
            for x in 0..3 {
                if (x, y) == (0, 0) {
                    continue;
                }
                assert!(game.grid.get(x, y).is_opened(), "({}, {}) not open", x, y);
            }
        }

        // all safe squares open: the mine got auto-flagged and the game won
        assert_eq!(game.grid.get(0, 0), Knowledge::MARKED_AS_MINE);
        assert!(game.won);
        assert!(!game.dead);
    }

    #[test]
    fn test_open_mine_loses() {
        let mut game = corner_mine_game();
        assert_eq!(game.open_square(0, 0), OpenResult::Exploded);
        assert!(game.dead);
        assert!(game.finished());
        assert_eq!(game.grid.get(0, 0), Knowledge::MINE_HIT);
    }

    #[test]
    fn test_toggle_mark_only_on_covered() {
        let mut game = corner_mine_game();
        assert!(game.toggle_mark(0, 0));
        assert!(!game.toggle_mark(0, 0));

        game.open_square(1, 1);
        assert!(!game.toggle_mark(1, 1));
        assert!(game.grid.get(1, 1).is_opened());
    }

    #[test]
    fn test_chord_opens_neighbors() {
        // 4x1 board: mine at (0,0); (1,0) reads 1
        let params = GameParams::new(4, 1, 1, 3, 0);
        let mut mines = Grid::new(4, 1, false);
        mines.set(0, 0, true);
        let mut game = GameState::with_mines(params, mines);

        game.open_square(1, 0);
        assert_eq!(game.grid.get(1, 0), Knowledge::opened(1));

        // without the flag, chording does nothing
        game.open_adjacent_squares(1, 0);
        assert!(game.grid.get(2, 0).is_unknown());

        game.toggle_mark(0, 0);
        game.open_adjacent_squares(1, 0);
        assert!(game.grid.get(2, 0).is_opened());
        assert!(!game.dead);
    }

    #[test]
    fn test_chord_with_wrong_flag_loses() {
        // 4x1 board: mine at (1,0); flag placed on (3,0) instead
        let params = GameParams::new(4, 1, 1, 3, 0);
        let mut mines = Grid::new(4, 1, false);
        mines.set(1, 0, true);
        let mut game = GameState::with_mines(params, mines);

        game.open_square(2, 0);
        game.toggle_mark(3, 0);
        game.open_adjacent_squares(2, 0);

        assert!(game.dead);
        assert_eq!(game.grid.get(1, 0), Knowledge::MINE_HIT);
    }

    #[test]
    fn test_reveal_mines_display_states() {
        // 4x1 board: mines at (0,0) and (1,0); wrong flag at (3,0)
        let params = GameParams::new(4, 1, 2, 3, 0);
        let mut mines = Grid::new(4, 1, false);
        mines.set(0, 0, true);
        mines.set(1, 0, true);
        let mut game = GameState::with_mines(params, mines);

        game.toggle_mark(3, 0);
        game.open_square(0, 0);
        assert!(game.dead);

        game.reveal_mines();
        assert_eq!(game.grid.get(0, 0), Knowledge::MINE_HIT);
        assert_eq!(game.grid.get(1, 0), Knowledge::MINE_REVEALED);
        assert_eq!(game.grid.get(3, 0), Knowledge::MINE_INCORRECT);
    }

    #[test]
    fn test_counters() {
        let mut game = corner_mine_game();
        game.open_square(1, 1);
        game.toggle_mark(0, 0);
        assert_eq!(game.count_uncovered(), 1);
        assert_eq!(game.count_flags(), 1);
    }
}
