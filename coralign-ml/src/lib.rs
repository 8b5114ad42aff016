//! # coralign-ml — Deep CORAL for group-balanced training
//!
//! The CORAL penalty aligns the feature means and covariances of the groups
//! in a batch. [`DeepCoral`] adds it, weighted by `coral_penalty_weight`, to a
//! supervised loss computed over a featurizer/classifier pair.
//!
//! Settings come from [`coralign_core`]'s resolver; the model, grouper and loss
//! are supplied through the traits in [`model`], [`grouper`] and [`losses`].

pub mod algorithms;
pub mod batch;
pub mod error;
pub mod grouper;
pub mod losses;
pub mod model;
pub mod training;

pub use algorithms::{DeepCoral, Mode, StepOutcome, coral_penalty, mean_pairwise_penalty};
pub use batch::{LabeledBatch, StepResults, UnlabeledBatch};
pub use error::MlError;
pub use grouper::{GroupSplit, Grouper, MetadataGrouper, split_into_groups};
pub use losses::{CrossEntropyLoss, Loss, MseLoss, loss_from_name};
pub use model::{Classifier, Featurizer, Identity, Linear, ModelFactory};
pub use training::{MetricSummary, StepMetrics};
