//! Board generation: random placement driving the solve/perturb loop.
//!
//! A layout starts as `minecount` mines thrown down uniformly outside
//! the starting neighborhood. When a no-guess board is requested, the
//! solver then replays an ideal player over the layout, perturbing the
//! mines whenever it gets stuck. A layout is accepted once a replay
//! finishes without any perturbation; a replay that fails, or that
//! needs more perturbations than the previous one, abandons the layout
//! and placement starts over.

use log::debug;

use crate::game::GameState;
use crate::perturb::{GridPerturbator, Perturbator};
use crate::rng::{self, EngineRng};
use crate::solver::Solver;
use crate::types::{GameParams, Grid, Knowledge, ParamsError};

/// Generates mine layouts, solvable without guessing on request.
pub struct Generator {
    seed: u64,
    perturbator: Box<dyn Perturbator>,
}

impl Generator {
    pub fn new() -> Generator {
        Generator {
            seed: 0,
            perturbator: Box::new(GridPerturbator::new()),
        }
    }

    /// Use a custom perturbation strategy during generation.
    pub fn with_perturbator(perturbator: Box<dyn Perturbator>) -> Generator {
        Generator {
            seed: 0,
            perturbator,
        }
    }

    /// The effective seed used when the parameters do not carry one.
    /// Chosen from system entropy on first use, then kept, so repeated
    /// calls on the same generator are reproducible.
    pub fn seed(&mut self) -> u64 {
        if self.seed == 0 {
            self.seed = rng::auto_seed();
        }
        self.seed
    }

    /// Produce a mine layout for the given parameters.
    ///
    /// The starting square and its neighbors never hold a mine. With
    /// `unique` set, the layout is guaranteed openable to the last
    /// square by deduction alone.
    pub fn generate(&mut self, params: &GameParams) -> Result<Grid<bool>, ParamsError> {
        params.validate()?;

        let seed = if params.seed != 0 {
            params.seed
        } else {
            self.seed()
        };

        let mut rng = EngineRng::from_seed(seed);
        Ok(mine_gen(params, &mut rng, self.perturbator.as_mut()))
    }
}

impl Default for Generator {
    fn default() -> Self {
        Generator::new()
    }
}

fn mine_gen(params: &GameParams, rng: &mut EngineRng, perturbator: &mut dyn Perturbator) -> Grid<bool> {
    let (sx, sy) = (params.sx, params.sy);
    let mut ret = Grid::new(params.width, params.height, false);
    let mut ntries: u32 = 0;

    loop {
        ntries += 1;
        ret.fill(false);

        // throw down the mines anywhere but the starting neighborhood
        let mut candidates: Vec<usize> = (0..ret.len())
            .filter(|&i| {
                let (x, y) = ret.point(i);
                (x - sx).abs() > 1 || (y - sy).abs() > 1
            })
            .collect();
        rng.shuffle(&mut candidates);
        for &i in candidates.iter().take(params.minecount as usize) {
            ret.cells[i] = true;
        }

        if !params.unique {
            return ret;
        }

        // Replay an ideal player over the layout, with the perturbator
        // on hand. Each replay must use strictly fewer perturbations
        // than the previous one, so the retries converge; a replay with
        // none at all means the layout (as possibly perturbed) is good.
        let mut game = GameState::with_mines(*params, ret.clone());
        let mut nbperturbs: i32 = -1;

        let accepted = loop {
            game.grid.fill(Knowledge::UNKNOWN);
            let count = game.mine_lookup(sx, sy);
            debug_assert_eq!(count, 0); // placement keeps the neighborhood clear
            game.grid.set(sx, sy, Knowledge::opened(count));

            perturbator.reset(ntries);
            let solved = Solver::with_perturbator(&mut *perturbator, &mut *rng).solve(&mut game);
            let used = perturbator.use_count() as i32;

            if !solved || (nbperturbs >= 0 && used >= nbperturbs) {
                debug!(
                    "layout {} rejected (solved: {}, perturbations: {})",
                    ntries, solved, used
                );
                break false;
            }

            nbperturbs = used;

            if nbperturbs == 0 {
                break true;
            }

            debug!(
                "layout {} solved with {} perturbations, replaying",
                ntries, nbperturbs
            );
        };

        if accepted {
            debug!("layout accepted after {} tries", ntries);
            return game.mines;
        }
    }
}
