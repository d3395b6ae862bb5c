//! The deductive solver.
//!
//! Reasons over localized constraints of the form "among these squares,
//! exactly this many mines", held in a [`SetStore`]. The main loop
//! alternates between two queues: newly-known squares (which spawn new
//! constraints and shrink existing ones) and unprocessed constraints
//! (which are compared pairwise against overlapping constraints). When
//! both run dry it falls back to a global deduction over the total mine
//! budget, and as a last resort asks the perturbator to rearrange the
//! hidden mines so progress becomes possible.

use std::collections::VecDeque;

use crate::game::GameState;
use crate::perturb::Perturbator;
use crate::rng::EngineRng;
use crate::setstore::SetStore;
use crate::squareset::{Mask, SquareSet};
use crate::types::{Grid, Knowledge, MineChange};

/// Queue of flat indices of squares whose knowledge was just set.
type SquareTodo = VecDeque<usize>;

/// Runs the deduction loop over a game's knowledge grid.
pub struct Solver<'a> {
    perturb: Option<(&'a mut dyn Perturbator, &'a mut EngineRng)>,
}

impl<'a> Solver<'a> {
    /// A solver that gives up when deduction stalls.
    pub fn new() -> Solver<'a> {
        Solver { perturb: None }
    }

    /// A solver that may rearrange the mine grid to get unstuck. Used
    /// during generation.
    pub fn with_perturbator(
        perturbator: &'a mut dyn Perturbator,
        rng: &'a mut EngineRng,
    ) -> Solver<'a> {
        Solver {
            perturb: Some((perturbator, rng)),
        }
    }

    /// Deduce as much as possible. Returns true iff every square ended
    /// up known (opened or marked as a mine).
    pub fn solve(&mut self, game: &mut GameState) -> bool {
        let n = game.mines.count_mines();
        let mut stodo = build_square_todo(&game.grid);
        let mut ss = SetStore::new();

        loop {
            process_newly_known_squares(&mut stodo, &game.grid, &mut ss);

            // attempt deductions from the next unprocessed constraint
            if let Some(h) = ss.next_todo() {
                let (set, mines) = {
                    let e = ss.element(h);
                    (e.set, e.mines)
                };
                process_set_constraint(set, mines, game, &mut stodo, &mut ss);
                continue;
            }

            // both queues are empty: take stock of the grid
            let squaresleft = game
                .grid
                .cells
                .iter()
                .filter(|k| k.is_unknown())
                .count() as i32;
            let minesleft = n - game
                .grid
                .cells
                .iter()
                .filter(|&&k| k == Knowledge::MARKED_AS_MINE)
                .count() as i32;

            if squaresleft == 0 {
                debug_assert_eq!(minesleft, 0);
                break;
            }

            // a negative total disables reasoning over the mine budget
            if n >= 0
                && attempt_global_deduction(squaresleft, minesleft, game, &mut stodo, &mut ss)
            {
                continue;
            }

            // the solver is stuck; modifying the grid is the last resort
            if let Some((perturbator, rng)) = &mut self.perturb {
                if perturb_grid(&mut **perturbator, &mut **rng, game, &mut stodo, &mut ss) {
                    continue;
                }
            }

            break;
        }

        game.grid.cells.iter().all(|k| !k.is_unknown())
    }
}

impl<'a> Default for Solver<'a> {
    fn default() -> Self {
        Solver::new()
    }
}

fn build_square_todo(grid: &Grid<Knowledge>) -> SquareTodo {
    (0..grid.len()).filter(|&i| !grid.at(i).is_unknown()).collect()
}

/// Record the squares of `(x, y, mask)` as mines or as safe, skipping
/// squares already known, and queue the newly-known ones.
fn mark_known_squares(
    game: &mut GameState,
    stodo: &mut SquareTodo,
    x: i32,
    y: i32,
    mask: Mask,
    mine: bool,
) {
    for (xx, yy) in SquareSet::new(x, y, mask).cells() {
        // a square may already be known from an earlier deduction in
        // the same pass
        if !game.grid.get(xx, yy).is_unknown() {
            continue;
        }

        if mine {
            game.grid.set(xx, yy, Knowledge::MARKED_AS_MINE);
        } else {
            let count = game.mine_lookup(xx, yy);
            debug_assert!(count >= 0); // sound deductions never open a mine
            game.grid.set(xx, yy, Knowledge::opened(count));
        }

        stodo.push_back(game.grid.idx(xx, yy));
    }
}

fn mark_known_square(game: &mut GameState, stodo: &mut SquareTodo, x: i32, y: i32, mine: bool) {
    mark_known_squares(game, stodo, x, y, Mask::TOP_LEFT, mine);
}

/// Drain the newly-known-square queue: each square spawns the constraint
/// over its still-unknown neighbors and is removed from every stored
/// constraint that contains it.
fn process_newly_known_squares(stodo: &mut SquareTodo, grid: &Grid<Knowledge>, ss: &mut SetStore) {
    while let Some(i) = stodo.pop_front() {
        let (x, y) = grid.point(i);
        let k = grid.at(i);

        if let Some(count) = k.opened_count() {
            let mut mines = count;
            let mut mask = Mask::EMPTY;

            for dy in -1..=1 {
                for dx in -1..=1 {
                    if (dx == 0 && dy == 0) || !grid.contains(x + dx, y + dy) {
                        continue;
                    }
                    let nk = grid.get(x + dx, y + dy);
                    if nk == Knowledge::MARKED_AS_MINE {
                        mines -= 1;
                    } else if nk.is_unknown() {
                        mask |= Mask::bit(dx + 1, dy + 1);
                    }
                }
            }

            if !mask.is_empty() {
                ss.add(x - 1, y - 1, mask, mines);
            }
        }

        // remove this known square from every constraint containing it,
        // replacing each with its remainder
        for h in ss.overlap(x, y, Mask::TOP_LEFT) {
            let (set, set_mines) = {
                let e = ss.element(h);
                (e.set, e.mines)
            };

            let newmask = (set - SquareSet::single(x, y)).mask;
            let newmines = set_mines - (k == Knowledge::MARKED_AS_MINE) as i32;

            if !newmask.is_empty() {
                ss.add(set.x, set.y, newmask, newmines);
            }

            ss.erase(h);
        }
    }
}

/// Deduce from one constraint: trivial all-clear/all-mine cases, then
/// pairwise comparison against every overlapping constraint.
fn process_set_constraint(
    s: SquareSet,
    s_mines: i32,
    game: &mut GameState,
    stodo: &mut SquareTodo,
    ss: &mut SetStore,
) {
    // trivial cases: no mines, or as many mines as squares
    if s_mines == 0 || s_mines == s.count() {
        // all squares become known, so the set itself will be consumed
        // when the square queue drains
        mark_known_squares(game, stodo, s.x, s.y, s.mask, s_mines != 0);
        return;
    }

    for h in ss.overlap(s.x, s.y, s.mask) {
        let (s2, s2_mines) = {
            let e = ss.element(h);
            (e.set, e.mines)
        };

        // the non-overlapping parts of either constraint, its "wings"
        let swing = (s - s2).mask;
        let s2wing = (s2 - s).mask;
        let swc = swing.count();
        let s2wc = s2wing.count();

        // If one set carries more mines than the other and the surplus
        // equals the size of its wing, the wing is all mines and the
        // other wing is all clear.
        if swc == s_mines - s2_mines || s2wc == s2_mines - s_mines {
            mark_known_squares(game, stodo, s.x, s.y, swing, swc == s_mines - s2_mines);
            mark_known_squares(game, stodo, s2.x, s2.y, s2wing, s2wc == s2_mines - s_mines);
            continue;
        }

        // Failing that, a subset relation splits the larger set's mine
        // count between the subset and its complement.
        if swc == 0 && s2wc != 0 {
            debug_assert!(s2_mines > s_mines);
            ss.add(s2.x, s2.y, s2wing, s2_mines - s_mines);
        } else if s2wc == 0 && swc != 0 {
            debug_assert!(s_mines > s2_mines);
            ss.add(s.x, s.y, swing, s_mines - s2_mines);
        }
    }
}

/// Upper bound on the number of stored constraints the disjoint-union
/// enumeration will consider. Beyond this the search is skipped to keep
/// the worst case bounded.
const GLOBAL_DEDUCTION_MAX_SETS: usize = 10;

/// Reason over the total mine budget.
///
/// Looks for a disjoint union of stored constraints whose combined mine
/// count forces every unknown square outside the union to be all clear
/// or all mines. The enumeration over unions is an explicit
/// cursor-and-bitmap backtracking search rather than actual recursion:
/// the state is just a `used` flag per set, backtracking restores the
/// running counters, and the first useful union exits early.
fn attempt_global_deduction(
    mut squaresleft: i32,
    mut minesleft: i32,
    game: &mut GameState,
    stodo: &mut SquareTodo,
    ss: &mut SetStore,
) -> bool {
    // simple case: no mines left, or as many mines as squares
    if minesleft == 0 || minesleft == squaresleft {
        for i in 0..game.grid.len() {
            if game.grid.at(i).is_unknown() {
                let (x, y) = game.grid.point(i);
                mark_known_square(game, stodo, x, y, minesleft != 0);
            }
        }
        return true;
    }

    let sets: Vec<(SquareSet, i32)> = ss.sets().map(|e| (e.set, e.mines)).collect();
    let nsets = sets.len();
    if nsets > GLOBAL_DEDUCTION_MAX_SETS {
        return false;
    }

    let mut setused = [false; GLOBAL_DEDUCTION_MAX_SETS];
    let mut cursor: i32 = 0;

    loop {
        if (cursor as usize) < nsets {
            // include this set iff it is disjoint from the union so far
            let c = cursor as usize;
            let ok = !(0..c).any(|i| setused[i] && !(sets[c].0 & sets[i].0).is_empty());
            setused[c] = ok;

            if ok {
                minesleft -= sets[c].1;
                squaresleft -= sets[c].0.count();
            }

            cursor += 1;
        } else {
            // a maximal disjoint union: check whether the squares
            // outside it are forced
            if squaresleft > 0 && (minesleft == 0 || minesleft == squaresleft) {
                for i in 0..game.grid.len() {
                    if !game.grid.at(i).is_unknown() {
                        continue;
                    }
                    let (x, y) = game.grid.point(i);

                    let outside = !(0..nsets).any(|j| {
                        setused[j] && !(sets[j].0 & SquareSet::single(x, y)).is_empty()
                    });

                    if outside {
                        mark_known_square(game, stodo, x, y, minesleft != 0);
                    }
                }

                return true;
            }

            // backtrack to the nearest included set, drop it, and
            // resume just past it
            while cursor > 0 && !setused[(cursor - 1) as usize] {
                cursor -= 1;
            }

            if cursor > 0 {
                let c = (cursor - 1) as usize;
                minesleft += sets[c].1;
                squaresleft += sets[c].0.count();
                setused[c] = false;
            } else {
                // every disjoint union has been tried
                break;
            }
        }
    }

    false
}

/// Let the perturbator rearrange the hidden mines, then fold the
/// resulting deltas back into the solver's state.
fn perturb_grid(
    perturbator: &mut dyn Perturbator,
    rng: &mut EngineRng,
    game: &mut GameState,
    stodo: &mut SquareTodo,
    ss: &mut SetStore,
) -> bool {
    let perturbations = perturbator.perturb(game, ss, rng);
    if perturbations.is_empty() {
        return false;
    }

    for p in &perturbations {
        // a square the solver knew as a mine may now be clear; it goes
        // back on the queue as a newly-known square
        if p.change == MineChange::Cleared && !game.grid.get(p.x, p.y).is_unknown() {
            stodo.push_back(game.grid.idx(p.x, p.y));
        }

        // constraints touching the changed square get their mine count
        // shifted and are reprocessed
        for h in ss.overlap(p.x, p.y, Mask::TOP_LEFT) {
            ss.adjust_mines(h, p.change.delta());
            ss.add_todo(h);
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameParams, Perturbation};

    /// Perturbator test double that never changes anything.
    struct NullPerturbator {
        uses: u32,
    }

    impl Perturbator for NullPerturbator {
        fn reset(&mut self, _ntries: u32) {
            self.uses = 0;
        }

        fn use_count(&self) -> u32 {
            self.uses
        }

        fn perturb_region(
            &mut self,
            _game: &mut GameState,
            _region: SquareSet,
            _rng: &mut EngineRng,
        ) -> Vec<Perturbation> {
            self.uses += 1;
            Vec::new()
        }
    }

    fn game_with_mines(w: i32, h: i32, mines_at: &[(i32, i32)], sx: i32, sy: i32) -> GameState {
        let params = GameParams::new(w, h, mines_at.len() as i32, sx, sy);
        let mut mines = Grid::new(w, h, false);
        for &(x, y) in mines_at {
            mines.set(x, y, true);
        }
        let mut game = GameState::with_mines(params, mines);
        let count = game.mine_lookup(sx, sy);
        assert!(count >= 0);
        game.grid.set(sx, sy, Knowledge::opened(count));
        game
    }

    fn fully_known(game: &GameState) -> bool {
        game.grid.cells.iter().all(|k| !k.is_unknown())
    }

    #[test]
    fn test_solves_empty_board() {
        let mut game = game_with_mines(3, 3, &[], 1, 1);
        assert!(Solver::new().solve(&mut game));
        for i in 0..game.grid.len() {
            assert_eq!(game.grid.at(i), Knowledge::opened(0));
        }
    }

    #[test]
    fn test_solves_corner_mine() {
        let mut game = game_with_mines(3, 3, &[(0, 0)], 2, 2);
        assert!(Solver::new().solve(&mut game));
        assert_eq!(game.grid.get(0, 0), Knowledge::MARKED_AS_MINE);
        assert_eq!(game.grid.get(1, 1), Knowledge::opened(1));
        assert_eq!(game.grid.get(2, 2), Knowledge::opened(0));
    }

    #[test]
    fn test_solves_single_file_board() {
        // 5x1 strip with a mine at the far end
        let mut game = game_with_mines(5, 1, &[(0, 0)], 4, 0);
        assert!(Solver::new().solve(&mut game));
        assert_eq!(game.grid.get(0, 0), Knowledge::MARKED_AS_MINE);
        assert_eq!(game.grid.get(1, 0), Knowledge::opened(1));
    }

    #[test]
    fn test_stalls_on_ambiguous_corner() {
        // 2x2 with one mine: opening the far corner reads 1 and the
        // three covered squares stay interchangeable
        let mut game = game_with_mines(2, 2, &[(0, 0)], 1, 1);
        assert!(!Solver::new().solve(&mut game));
        assert!(game.grid.get(0, 0).is_unknown());
    }

    #[test]
    fn test_null_perturbator_does_not_help() {
        let mut game = game_with_mines(2, 2, &[(0, 0)], 1, 1);
        let mut perturbator = NullPerturbator { uses: 0 };
        let mut rng = EngineRng::from_seed(1);
        let mut solver = Solver::with_perturbator(&mut perturbator, &mut rng);
        assert!(!solver.solve(&mut game));
        assert_eq!(perturbator.use_count(), 1);
    }

    #[test]
    fn test_global_deduction_all_mines_left() {
        // 5x1 strip, mines on the two far squares; local deduction pins
        // one, the total mine count pins the other
        let mut game = game_with_mines(5, 1, &[(0, 0), (1, 0)], 4, 0);
        assert!(Solver::new().solve(&mut game));
        assert_eq!(game.grid.get(0, 0), Knowledge::MARKED_AS_MINE);
        assert_eq!(game.grid.get(1, 0), Knowledge::MARKED_AS_MINE);
        assert_eq!(game.grid.get(2, 0), Knowledge::opened(1));
    }

    #[test]
    fn test_global_deduction_union_clears_outside() {
        // one constraint accounts for the whole mine budget, so the
        // unknown squares outside it must be clear
        let mut game = game_with_mines(4, 1, &[(1, 0)], 3, 0);
        game.grid.fill(Knowledge::UNKNOWN);

        let mut ss = SetStore::new();
        ss.add(0, 0, Mask::TOP_LEFT | Mask::TOP, 1); // 1 mine in {(0,0), (1,0)}
        let mut stodo = SquareTodo::new();

        assert!(attempt_global_deduction(4, 1, &mut game, &mut stodo, &mut ss));
        assert!(game.grid.get(0, 0).is_unknown());
        assert!(game.grid.get(1, 0).is_unknown());
        assert_eq!(game.grid.get(2, 0), Knowledge::opened(1));
        assert_eq!(game.grid.get(3, 0), Knowledge::opened(0));
        assert_eq!(stodo.len(), 2);
    }

    #[test]
    fn test_global_deduction_union_marks_outside() {
        // two disjoint constraints leave exactly as many mines as there
        // are squares outside their union
        let mut game = game_with_mines(7, 1, &[(0, 0), (3, 0), (6, 0)], 5, 0);
        game.grid.fill(Knowledge::UNKNOWN);

        let mut ss = SetStore::new();
        ss.add(0, 0, Mask::TOP_LEFT | Mask::TOP, 1); // 1 mine in {(0,0), (1,0)}
        ss.add(3, 0, Mask::TOP_LEFT | Mask::TOP, 1); // 1 mine in {(3,0), (4,0)}
        let mut stodo = SquareTodo::new();

        // 7 unknown squares, 3 mines: the union leaves 1 mine for the
        // single square outside everything that is not covered
        game.grid.set(2, 0, Knowledge::opened(2));
        game.grid.set(5, 0, Knowledge::opened(1));

        assert!(attempt_global_deduction(5, 3, &mut game, &mut stodo, &mut ss));
        assert_eq!(game.grid.get(6, 0), Knowledge::MARKED_AS_MINE);
        assert!(game.grid.get(0, 0).is_unknown());
        assert!(game.grid.get(4, 0).is_unknown());
    }

    #[test]
    fn test_presolved_knowledge_is_respected() {
        // marking the mine up front leaves nothing interesting to do
        let mut game = game_with_mines(3, 3, &[(0, 0)], 2, 2);
        game.grid.set(0, 0, Knowledge::MARKED_AS_MINE);
        assert!(Solver::new().solve(&mut game));
        assert!(fully_known(&game));
    }

    #[test]
    fn test_extra_seed_knowledge_converges_to_same_grid() {
        // seeding the solver with an extra already-deduced square must
        // not change what it concludes
        let mut a = game_with_mines(4, 4, &[(0, 0)], 3, 3);
        assert!(Solver::new().solve(&mut a));

        let mut b = game_with_mines(4, 4, &[(0, 0)], 3, 3);
        let count = b.mine_lookup(1, 2);
        b.grid.set(1, 2, Knowledge::opened(count));
        assert!(Solver::new().solve(&mut b));

        assert_eq!(a.grid, b.grid);
    }

    #[test]
    fn test_unknown_count_never_increases() {
        // each solved game ends with zero unknowns; a stalled one keeps
        // whatever knowledge it had when it gave up
        let mut game = game_with_mines(2, 2, &[(0, 0)], 1, 1);
        let before: usize = game.grid.cells.iter().filter(|k| k.is_unknown()).count();
        Solver::new().solve(&mut game);
        let after: usize = game.grid.cells.iter().filter(|k| k.is_unknown()).count();
        assert!(after <= before);
        assert!(game.grid.get(1, 1).is_opened());
    }
}
