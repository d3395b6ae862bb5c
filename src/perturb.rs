//! Mine-grid perturbation.
//!
//! When the solver stalls during generation it does not give up on the
//! layout right away: a perturbator may move mines around, as long as
//! every square the ideal player has already uncovered keeps a
//! consistent story. The usual move is to take one of the constraints
//! the solver is stuck on and either empty it of mines or fill it
//! completely, swapping with squares elsewhere on the board.

use log::trace;

use crate::game::GameState;
use crate::rng::EngineRng;
use crate::setstore::SetStore;
use crate::squareset::{Mask, SquareSet};
use crate::types::{Grid, Knowledge, MineChange, Perturbation};

/// A capability to rearrange the hidden mines of a stuck game.
pub trait Perturbator {
    /// Called by the generator before each solve attempt. `ntries` is
    /// the number of layouts tried so far.
    fn reset(&mut self, ntries: u32);

    /// How many times `perturb` ran since the last reset.
    fn use_count(&self) -> u32;

    /// Perturb around a region chosen from the solver's constraint
    /// store: a uniformly random stored set, or the all-unknown-squares
    /// region when the store is empty.
    ///
    /// Returns the applied changes; an empty list means nothing was
    /// done and the caller should give up on the layout.
    fn perturb(
        &mut self,
        game: &mut GameState,
        store: &SetStore,
        rng: &mut EngineRng,
    ) -> Vec<Perturbation> {
        let region = if store.is_empty() {
            SquareSet::new(-1, -1, Mask::EMPTY)
        } else {
            let i = rng.gen_range(store.len());
            store.nth_set(i).expect("index within store bounds")
        };

        self.perturb_region(game, region, rng)
    }

    /// Perturb a specific region. An empty region stands for "all
    /// unknown squares".
    fn perturb_region(
        &mut self,
        game: &mut GameState,
        region: SquareSet,
        rng: &mut EngineRng,
    ) -> Vec<Perturbation>;
}

/// The builtin perturbator used by the generator.
///
/// Big perturbations (rewriting the whole unknown part of the board at
/// once) make generation succeed for any feasible density but produce
/// dull boards, so they unlock only after many failed layouts.
#[derive(Debug, Default)]
pub struct GridPerturbator {
    use_count: u32,
    allow_big_perturbs: bool,
}

impl GridPerturbator {
    pub fn new() -> GridPerturbator {
        GridPerturbator::default()
    }
}

impl Perturbator for GridPerturbator {
    fn reset(&mut self, ntries: u32) {
        self.use_count = 0;
        let allow = ntries > 100;
        if allow && !self.allow_big_perturbs {
            trace!("enabling big perturbations after {} layout attempts", ntries);
        }
        self.allow_big_perturbs = allow;
    }

    fn use_count(&self) -> u32 {
        self.use_count
    }

    fn perturb_region(
        &mut self,
        game: &mut GameState,
        region: SquareSet,
        rng: &mut EngineRng,
    ) -> Vec<Perturbation> {
        self.use_count += 1;
        mine_perturb(game, region, rng, self.allow_big_perturbs)
    }
}

/// How much we want to use a square for swapping mines. Lower is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SquareClass {
    /// Unknown square on the boundary of known squares.
    NearKnownSquare,
    /// Unknown square beyond the boundary.
    InUnknownRegion,
    /// Already-known square. Changing one is visible to the player, so
    /// this is the last resort.
    KnownSquare,
}

#[derive(Clone, Copy, Debug)]
struct PerturbSquare {
    class: SquareClass,
    x: i32,
    y: i32,
}

/// Squares usable for swapping: everything outside the region and away
/// from the starting neighborhood, best candidates first. Candidates of
/// the same class come in random order.
fn build_square_list(game: &GameState, region: SquareSet, rng: &mut EngineRng) -> Vec<PerturbSquare> {
    let grid = &game.grid;
    let (sx, sy) = (game.params.sx, game.params.sy);
    let mut sqlist = Vec::with_capacity(grid.len());

    for i in 0..grid.len() {
        let (x, y) = grid.point(i);

        // generated grids keep the starting neighborhood mine-free, so
        // those squares are never candidates
        if (x - sx).abs() <= 1 && (y - sy).abs() <= 1 {
            continue;
        }

        // squares belonging to the region being flipped are not
        // candidates either
        if region.mask.is_empty() {
            if grid.at(i).is_unknown() {
                continue;
            }
        } else if region.contains_cell(x, y) {
            continue;
        }

        let class = if !grid.at(i).is_unknown() {
            SquareClass::KnownSquare
        } else if has_known_neighbor(grid, x, y) {
            SquareClass::NearKnownSquare
        } else {
            SquareClass::InUnknownRegion
        };

        sqlist.push(PerturbSquare { class, x, y });
    }

    sqlist.sort_by_key(|sq| (sq.class, sq.y, sq.x));
    for chunk in sqlist.chunk_by_mut(|a, b| a.class == b.class) {
        rng.shuffle(chunk);
    }

    sqlist
}

fn has_known_neighbor(grid: &Grid<Knowledge>, x: i32, y: i32) -> bool {
    for dy in -1..=1 {
        for dx in -1..=1 {
            if grid.contains(x + dx, y + dy) && !grid.get(x + dx, y + dy).is_unknown() {
                return true;
            }
        }
    }
    false
}

/// Mined and empty square counts inside the region (or among all
/// unknown squares for the empty region).
fn count_full_and_empty(game: &GameState, region: SquareSet) -> (usize, usize) {
    let (mut nfull, mut nempty) = (0, 0);

    if region.mask.is_empty() {
        for i in 0..game.grid.len() {
            if game.grid.at(i).is_unknown() {
                if game.mines.at(i) {
                    nfull += 1;
                } else {
                    nempty += 1;
                }
            }
        }
    } else {
        for (x, y) in region.cells() {
            debug_assert!(game.mines.contains(x, y));
            if game.mines.get(x, y) {
                nfull += 1;
            } else {
                nempty += 1;
            }
        }
    }

    (nfull, nempty)
}

/// Pick `size` random empty squares inside the region to receive mines
/// during a partial perturbation.
fn build_fill_list(
    game: &GameState,
    region: SquareSet,
    size: usize,
    rng: &mut EngineRng,
) -> Vec<usize> {
    debug_assert!(size != 0);

    let mut filllist: Vec<usize> = Vec::new();

    if !region.mask.is_empty() {
        for (x, y) in region.cells() {
            if !game.mines.get(x, y) {
                filllist.push(game.grid.idx(x, y));
            }
        }
    } else {
        for i in 0..game.grid.len() {
            if game.grid.at(i).is_unknown() && !game.mines.at(i) {
                filllist.push(i);
            }
        }
    }

    // reached only when the region could not be fully filled, so it
    // must hold strictly more empty squares than we take
    debug_assert!(filllist.len() > size);

    rng.shuffle(&mut filllist);
    filllist.truncate(size);
    filllist
}

/// Swap mines between a region and the rest of the board.
///
/// Counts mined and empty squares inside the region, then walks the
/// candidate list looking for enough empty squares outside to absorb
/// every region mine, or enough mined squares outside to fill every
/// region hole. Whichever target is met decides the swap direction; if
/// neither is met, a partial fill still changes the region enough to
/// alter the stuck constraint. Returns the applied changes, empty on
/// failure.
pub fn mine_perturb(
    game: &mut GameState,
    region: SquareSet,
    rng: &mut EngineRng,
    allow_big_perturbs: bool,
) -> Vec<Perturbation> {
    if region.mask.is_empty() && !allow_big_perturbs {
        return Vec::new();
    }

    let (nfull, nempty) = count_full_and_empty(game, region);
    let sqlist = build_square_list(game, region, rng);

    // collect swap partners outside the region, stopping as soon as
    // either direction becomes possible
    let mut tofill: Vec<(i32, i32)> = Vec::new();
    let mut toempty: Vec<(i32, i32)> = Vec::new();
    for sq in &sqlist {
        if game.mines.get(sq.x, sq.y) {
            toempty.push((sq.x, sq.y));
        } else {
            tofill.push((sq.x, sq.y));
        }

        if tofill.len() == nfull || toempty.len() == nempty {
            break;
        }
    }

    // neither direction is fully possible: settle for partially filling
    // the region with the mines we did find outside
    let mut filllist: Vec<usize> = Vec::new();
    if tofill.len() != nfull && toempty.len() != nempty && !toempty.is_empty() {
        filllist = build_fill_list(game, region, toempty.len(), rng);
    }

    let (todo, change) = if tofill.len() == nfull {
        (tofill, MineChange::ChangedToMine)
    } else {
        (toempty, MineChange::Cleared)
    };

    let mut ret: Vec<Perturbation> = Vec::with_capacity(2 * todo.len());
    for &(x, y) in &todo {
        ret.push(Perturbation { x, y, change });
    }

    // the counterpart changes inside the region
    let change = change.opposite();

    if !filllist.is_empty() {
        debug_assert_eq!(change, MineChange::ChangedToMine);
        for i in filllist {
            let (x, y) = game.grid.point(i);
            ret.push(Perturbation { x, y, change });
        }
    } else if !region.mask.is_empty() {
        for (x, y) in region.cells() {
            let c = if game.mines.get(x, y) {
                MineChange::Cleared
            } else {
                MineChange::ChangedToMine
            };
            if c == change {
                ret.push(Perturbation { x, y, change });
            }
        }
    } else {
        for i in 0..game.grid.len() {
            if !game.grid.at(i).is_unknown() {
                continue;
            }
            let c = if game.mines.at(i) {
                MineChange::Cleared
            } else {
                MineChange::ChangedToMine
            };
            if c == change {
                let (x, y) = game.grid.point(i);
                ret.push(Perturbation { x, y, change });
            }
        }
    }

    debug_assert_eq!(ret.len(), 2 * todo.len());

    // the starting neighborhood must stay untouched
    let (sx, sy) = (game.params.sx, game.params.sy);
    assert!(ret
        .iter()
        .all(|p| (p.x - sx).abs() > 1 || (p.y - sy).abs() > 1));

    apply_changes(game, &ret);
    ret
}

/// Apply a perturbation list to the mine grid and patch the knowledge
/// grid to stay consistent with it.
pub fn apply_changes(game: &mut GameState, perturbations: &[Perturbation]) {
    for p in perturbations {
        let (x, y) = (p.x, p.y);

        // clearing a square requires a mine, filling one requires none
        assert!((p.change == MineChange::Cleared) == game.mines.get(x, y));

        game.mines.set(x, y, p.change == MineChange::ChangedToMine);

        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if !game.grid.contains(nx, ny) || game.grid.get(nx, ny).is_unknown() {
                    continue;
                }

                if dx == 0 && dy == 0 {
                    // the changed square itself was already known: keep
                    // its story consistent with the new mine grid
                    if p.change == MineChange::ChangedToMine {
                        game.grid.set(x, y, Knowledge::MARKED_AS_MINE);
                    } else {
                        let mut count = 0;
                        for dy2 in -1..=1 {
                            for dx2 in -1..=1 {
                                if (dx2 != 0 || dy2 != 0)
                                    && game.mines.contains(x + dx2, y + dy2)
                                    && game.mines.get(x + dx2, y + dy2)
                                {
                                    count += 1;
                                }
                            }
                        }
                        game.grid.set(x, y, Knowledge::opened(count));
                    }
                } else if let Some(c) = game.grid.get(nx, ny).opened_count() {
                    // shift the displayed count of an opened neighbor
                    game.grid.set(nx, ny, Knowledge::opened(c + p.change.delta()));
                }
            }
        }
    }
}
