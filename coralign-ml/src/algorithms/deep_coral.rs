//! Deep CORAL.
//!
//! Trains a featurizer/classifier pair on group-balanced batches and adds a
//! CORAL alignment penalty between the features of every pair of groups in
//! the batch, unlabeled groups included, to the supervised loss.
//!
//! Reference: Sun & Saenko, "Deep CORAL: Correlation Alignment for Deep Domain
//! Adaptation", ECCV 2016. The fine-grained pairwise penalty follows DomainBed.

use coralign_core::{ConfigError, Settings};
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};

use crate::algorithms::coral::mean_pairwise_penalty;
use crate::batch::{LabeledBatch, StepResults, UnlabeledBatch};
use crate::error::MlError;
use crate::grouper::{Grouper, split_into_groups};
use crate::losses::Loss;
use crate::model::{Classifier, Featurizer, ModelFactory};
use crate::training::StepMetrics;

/// Whether the objective includes the alignment penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Train,
    Eval,
}

/// Objective value and results of one [`DeepCoral::step`].
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub objective: f64,
    pub results: StepResults,
}

/// The Deep CORAL algorithm.
pub struct DeepCoral {
    featurizer: Box<dyn Featurizer>,
    classifier: Box<dyn Classifier>,
    grouper: Box<dyn Grouper>,
    loss: Box<dyn Loss>,
    penalty_weight: f64,
    mode: Mode,
    logged_fields: Vec<String>,
    metrics: StepMetrics,
}

impl DeepCoral {
    /// Build the algorithm from resolved settings.
    ///
    /// Requires group-balanced loading (`train_loader = "group"`,
    /// `uniform_over_groups`, `distinct_groups`) and reads
    /// `coral_penalty_weight`.
    pub fn new(
        settings: &Settings,
        factory: &dyn ModelFactory,
        d_out: usize,
        grouper: Box<dyn Grouper>,
        loss: Box<dyn Loss>,
    ) -> Result<Self, MlError> {
        check_settings(settings)?;
        let penalty_weight = settings.require_f64("coral_penalty_weight")?;
        let (featurizer, classifier) = factory.build(settings, d_out)?;

        tracing::debug!(
            penalty_weight,
            d_out,
            n_groups = grouper.n_groups(),
            loss = loss.name(),
            "initialized deep CORAL"
        );
        Ok(Self::from_parts(
            featurizer,
            classifier,
            grouper,
            loss,
            penalty_weight,
        ))
    }

    /// Assemble the algorithm directly from its collaborators.
    pub fn from_parts(
        featurizer: Box<dyn Featurizer>,
        classifier: Box<dyn Classifier>,
        grouper: Box<dyn Grouper>,
        loss: Box<dyn Loss>,
        penalty_weight: f64,
    ) -> Self {
        Self {
            featurizer,
            classifier,
            grouper,
            loss,
            penalty_weight,
            mode: Mode::Train,
            logged_fields: vec!["objective".to_string(), "penalty".to_string()],
            metrics: StepMetrics::default(),
        }
    }

    pub fn penalty_weight(&self) -> f64 {
        self.penalty_weight
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn train(&mut self) {
        self.set_mode(Mode::Train);
    }

    pub fn eval(&mut self) {
        self.set_mode(Mode::Eval);
    }

    pub fn is_training(&self) -> bool {
        self.mode == Mode::Train
    }

    pub fn logged_fields(&self) -> &[String] {
        &self.logged_fields
    }

    pub fn metrics(&self) -> &StepMetrics {
        &self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }

    /// Forward pass over a labeled batch and, optionally, an unlabeled batch.
    pub fn process_batch(
        &self,
        batch: &LabeledBatch,
        unlabeled: Option<&UnlabeledBatch>,
    ) -> Result<StepResults, MlError> {
        batch.batch_size()?;
        let g = self.grouper.metadata_to_group(&batch.metadata)?;
        let features = self.featurizer.forward(&batch.x)?;
        let y_pred = self.classifier.forward(&features)?;

        let mut results = StepResults {
            g,
            y_true: batch.y_true.clone(),
            y_pred,
            metadata: batch.metadata.clone(),
            features: Some(features),
            unlabeled_features: None,
            unlabeled_g: None,
            penalty: None,
        };

        if let Some(unlabeled) = unlabeled {
            unlabeled.batch_size()?;
            results.unlabeled_features = Some(self.featurizer.forward(&unlabeled.x)?);
            results.unlabeled_g = Some(self.grouper.metadata_to_group(&unlabeled.metadata)?);
        }
        Ok(results)
    }

    /// Supervised loss plus the weighted alignment penalty.
    ///
    /// Takes the features out of `results` and records the penalty there. Every
    /// group in a training batch needs at least two examples.
    pub fn objective(&self, results: &mut StepResults) -> Result<f64, MlError> {
        let features = results.features.take().ok_or_else(|| {
            MlError::invalid_input("results carry no features; objective was already computed")
        })?;

        let penalty = if self.is_training() {
            let mut groups = group_features(&features, &results.g)?;
            if let Some(unlabeled_features) = results.unlabeled_features.take() {
                let unlabeled_g = results.unlabeled_g.as_ref().ok_or_else(|| {
                    MlError::invalid_input("unlabeled features without unlabeled group ids")
                })?;
                groups.extend(group_features(&unlabeled_features, unlabeled_g)?);
            }
            let views: Vec<_> = groups.iter().map(|group| group.view()).collect();
            mean_pairwise_penalty(&views)?
        } else {
            0.0
        };
        results.penalty = Some(penalty);

        let avg_loss = self.loss.compute(&results.y_pred, &results.y_true)?;
        Ok(avg_loss + penalty * self.penalty_weight)
    }

    /// Run [`process_batch`](Self::process_batch) and [`objective`](Self::objective),
    /// and log the logged fields.
    pub fn step(
        &mut self,
        batch: &LabeledBatch,
        unlabeled: Option<&UnlabeledBatch>,
    ) -> Result<StepOutcome, MlError> {
        let mut results = self.process_batch(batch, unlabeled)?;
        let objective = self.objective(&mut results)?;
        let penalty = results.penalty.unwrap_or(0.0);

        for field in &self.logged_fields {
            match field.as_str() {
                "objective" => self.metrics.record(field, objective),
                "penalty" => self.metrics.record(field, penalty),
                _ => {}
            }
        }
        tracing::trace!(objective, penalty, mode = ?self.mode, "deep CORAL step");

        Ok(StepOutcome { objective, results })
    }
}

fn check_settings(settings: &Settings) -> Result<(), ConfigError> {
    let train_loader = settings.require_str("train_loader")?;
    if train_loader != "group" {
        return Err(ConfigError::incompatible(format!(
            "deepCORAL requires train_loader = \"group\", found \"{train_loader}\""
        )));
    }
    if !settings.require_bool("uniform_over_groups")? {
        return Err(ConfigError::incompatible(
            "deepCORAL requires uniform_over_groups",
        ));
    }
    if !settings.require_bool("distinct_groups")? {
        return Err(ConfigError::incompatible("deepCORAL requires distinct_groups"));
    }
    Ok(())
}

fn group_features(
    features: &ArrayD<f64>,
    g: &ndarray::Array1<usize>,
) -> Result<Vec<ArrayD<f64>>, MlError> {
    let rows = features.shape().first().copied().unwrap_or(0);
    if rows != g.len() {
        return Err(MlError::shape(format!(
            "{rows} feature rows but {} group ids",
            g.len()
        )));
    }
    Ok(split_into_groups(g)
        .group_indices
        .iter()
        .map(|indices| features.select(Axis(0), indices))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::losses::MseLoss;
    use crate::model::{Identity, Linear};
    use ndarray::{Array1, Array2, arr1, arr2};
    use serde_json::json;

    /// Every metadata row's first column is its group id.
    struct ColumnGrouper(usize);

    impl Grouper for ColumnGrouper {
        fn n_groups(&self) -> usize {
            self.0
        }

        fn metadata_to_group(&self, metadata: &Array2<i64>) -> Result<Array1<usize>, MlError> {
            Ok(metadata.column(0).mapv(|v| v as usize))
        }
    }

    struct ProbeFactory;

    impl ModelFactory for ProbeFactory {
        fn build(
            &self,
            _settings: &Settings,
            d_out: usize,
        ) -> Result<(Box<dyn Featurizer>, Box<dyn Classifier>), MlError> {
            let classifier = Linear::new(Array2::ones((2, d_out)), Array1::zeros(d_out))?;
            Ok((Box::new(Identity), Box::new(classifier)))
        }
    }

    fn coral_settings() -> Settings {
        Settings::new()
            .with("train_loader", "group")
            .with("uniform_over_groups", true)
            .with("distinct_groups", true)
            .with("coral_penalty_weight", 0.5)
    }

    fn algorithm() -> DeepCoral {
        DeepCoral::new(
            &coral_settings(),
            &ProbeFactory,
            1,
            Box::new(ColumnGrouper(3)),
            Box::new(MseLoss),
        )
        .unwrap()
    }

    fn batch() -> LabeledBatch {
        // group 0 centred at the origin, group 1 shifted by (1, 1)
        LabeledBatch::new(
            arr2(&[[0.0, 0.0], [1.0, 0.0], [2.0, 2.0], [1.0, 1.0]]).into_dyn(),
            arr1(&[0.0, 1.0, 4.0, 2.0]).into_dyn(),
            arr2(&[[0], [1], [0], [1]]),
        )
    }

    #[test]
    fn test_new_validates_loader_settings() {
        let build = |settings: Settings| {
            DeepCoral::new(
                &settings,
                &ProbeFactory,
                1,
                Box::new(ColumnGrouper(2)),
                Box::new(MseLoss),
            )
        };

        assert!(matches!(
            build(coral_settings().with("train_loader", "standard")),
            Err(MlError::Config(ConfigError::Incompatible { .. }))
        ));
        assert!(matches!(
            build(coral_settings().with("uniform_over_groups", false)),
            Err(MlError::Config(ConfigError::Incompatible { .. }))
        ));
        assert!(matches!(
            build(coral_settings().with("distinct_groups", json!(null))),
            Err(MlError::Config(ConfigError::MissingField { .. }))
        ));
        assert!(matches!(
            build(coral_settings().with("coral_penalty_weight", json!(null))),
            Err(MlError::Config(ConfigError::MissingField { ref field })) if field == "coral_penalty_weight"
        ));
    }

    #[test]
    fn test_defaults() {
        let algo = algorithm();
        assert!(algo.is_training());
        assert_eq!(algo.penalty_weight(), 0.5);
        assert_eq!(algo.logged_fields(), &["objective", "penalty"]);
    }

    #[test]
    fn test_process_batch_packages_results() {
        let algo = algorithm();
        let results = algo.process_batch(&batch(), None).unwrap();
        assert_eq!(results.g, arr1(&[0, 1, 0, 1]));
        assert_eq!(results.y_pred, arr2(&[[0.0], [1.0], [4.0], [2.0]]).into_dyn());
        assert!(results.features.is_some());
        assert!(results.unlabeled_features.is_none());
        assert!(results.penalty.is_none());
    }

    #[test]
    fn test_process_batch_with_unlabeled() {
        let algo = algorithm();
        let unlabeled =
            UnlabeledBatch::new(arr2(&[[5.0, 5.0], [6.0, 6.0]]).into_dyn(), arr2(&[[2], [2]]));
        let results = algo.process_batch(&batch(), Some(&unlabeled)).unwrap();
        assert_eq!(results.unlabeled_g, Some(arr1(&[2, 2])));
        assert_eq!(
            results.unlabeled_features,
            Some(arr2(&[[5.0, 5.0], [6.0, 6.0]]).into_dyn())
        );
    }

    #[test]
    fn test_objective_in_training_adds_weighted_penalty() {
        let algo = algorithm();
        let mut results = algo.process_batch(&batch(), None).unwrap();
        let objective = algo.objective(&mut results).unwrap();

        // group 0: rows (0,0),(2,2); group 1: rows (1,0),(1,1)
        let g0 = arr2(&[[0.0, 0.0], [2.0, 2.0]]).into_dyn();
        let g1 = arr2(&[[1.0, 0.0], [1.0, 1.0]]).into_dyn();
        let expected_penalty =
            crate::algorithms::coral::coral_penalty(g0.view(), g1.view()).unwrap();
        assert_eq!(results.penalty, Some(expected_penalty));
        assert!(expected_penalty > 0.0);
        assert!((objective - expected_penalty * 0.5).abs() < 1e-12);
        assert!(results.features.is_none());
    }

    #[test]
    fn test_objective_in_eval_is_base_loss() {
        let mut algo = algorithm();
        algo.eval();
        let mut results = algo.process_batch(&batch(), None).unwrap();
        let objective = algo.objective(&mut results).unwrap();
        assert_eq!(objective, 0.0);
        assert_eq!(results.penalty, Some(0.0));
    }

    #[test]
    fn test_objective_twice_is_rejected() {
        let algo = algorithm();
        let mut results = algo.process_batch(&batch(), None).unwrap();
        algo.objective(&mut results).unwrap();
        assert!(matches!(
            algo.objective(&mut results),
            Err(MlError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_step_records_logged_fields() {
        let mut algo = algorithm();
        let outcome = algo.step(&batch(), None).unwrap();
        algo.eval();
        algo.step(&batch(), None).unwrap();

        let metrics = algo.metrics();
        assert_eq!(metrics.steps("objective"), 2);
        assert_eq!(metrics.last("penalty"), Some(0.0));
        let expected_mean = outcome.results.penalty.unwrap() / 2.0;
        assert!((metrics.mean("penalty").unwrap() - expected_mean).abs() < 1e-12);

        algo.reset_metrics();
        assert_eq!(algo.metrics().steps("objective"), 0);
    }
}
