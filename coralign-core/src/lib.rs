//! # Coralign Core
//!
//! Experiment settings for domain-generalization training runs.
//! Provides the settings namespace, the preset registry, template population
//! with first-writer-wins semantics, the dataset → split → algorithm → loader →
//! model → scheduler resolution cascade, and layered settings loading.

pub mod config;
pub mod error;
pub mod populate;
pub mod presets;
pub mod resolver;
pub mod settings;

// Re-export commonly used types at the crate root.
pub use config::{load_settings, load_template};
pub use error::{ConfigError, ConflictError, CoralignError, Result};
pub use populate::{check_compatibility, populate};
pub use presets::PresetRegistry;
pub use resolver::{REQUIRED_FIELDS, Resolver};
pub use settings::{Settings, Template, values_match};
