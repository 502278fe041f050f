pub mod evaluator;
pub mod tracker;
pub mod types;

pub use evaluator::{evaluate_hit, evaluate_hit_with};
pub use tracker::HitTracker;
pub use types::{HitGrade, HitResult, SessionStats};
