//! Offline analyses over a song or a finished result log.

pub mod difficulty;
pub mod planner;
pub mod technique;

pub use difficulty::{estimate, DifficultyFactors, DifficultyReport};
pub use planner::{generate_plan, PracticePlan, PracticeStep};
pub use technique::{analyze, InsightCategory, TechniqueInsight};
