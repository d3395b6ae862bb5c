//! Minesweeper grid generation with a no-guess guarantee.
//!
//! The engine produces mine layouts that an ideal logical player can
//! clear completely without ever guessing. Generation works by replay:
//! mines are placed at random, a deductive solver plays the board from
//! the starting square, and whenever it gets stuck a perturbator moves
//! mines around (without contradicting anything already uncovered)
//! until a replay succeeds with no help at all.
//!
//! The entry point is [`Generator`]; the solver and the board plumbing
//! in [`game`] are public for frontends that want hints or replays.

pub mod game;
pub mod generator;
pub mod perturb;
pub mod rng;
pub mod setstore;
pub mod solver;
pub mod squareset;
pub mod types;

pub use game::{GameState, OpenResult};
pub use generator::Generator;
pub use perturb::{mine_perturb, GridPerturbator, Perturbator};
pub use rng::EngineRng;
pub use setstore::{SetHandle, SetStore, SetStoreElement};
pub use solver::Solver;
pub use squareset::{Mask, SquareSet};
pub use types::{GameParams, Grid, Knowledge, MineChange, ParamsError, Perturbation};
