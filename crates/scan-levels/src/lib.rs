pub mod levels;

pub use levels::{compute_levels, LevelsInput};
