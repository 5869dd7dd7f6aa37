pub mod events;
pub mod score;

pub use events::detect_events;
pub use score::{score, ScoreBreakdown};
