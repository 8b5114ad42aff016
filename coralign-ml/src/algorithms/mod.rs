//! Algorithms: the CORAL penalty and the Deep CORAL objective built on it.

pub mod coral;
pub mod deep_coral;

pub use coral::{coral_penalty, mean_pairwise_penalty};
pub use deep_coral::{DeepCoral, Mode, StepOutcome};
