//! Per-step batch records and the results an algorithm produces for them.

use ndarray::{Array1, Array2, ArrayD};

use crate::error::MlError;

/// A labeled training or evaluation batch.
#[derive(Debug, Clone)]
pub struct LabeledBatch {
    pub x: ArrayD<f64>,
    pub y_true: ArrayD<f64>,
    /// One metadata row per example.
    pub metadata: Array2<i64>,
}

impl LabeledBatch {
    pub fn new(x: ArrayD<f64>, y_true: ArrayD<f64>, metadata: Array2<i64>) -> Self {
        Self {
            x,
            y_true,
            metadata,
        }
    }

    /// Number of examples, after checking every field agrees on it.
    pub fn batch_size(&self) -> Result<usize, MlError> {
        let n = leading_dim(&self.x)?;
        let labels = self.y_true.shape().first().copied().unwrap_or(0);
        if labels != n || self.metadata.nrows() != n {
            return Err(MlError::shape(format!(
                "batch has {n} inputs, {labels} labels and {} metadata rows",
                self.metadata.nrows()
            )));
        }
        Ok(n)
    }
}

/// An unlabeled batch, used only for feature alignment.
#[derive(Debug, Clone)]
pub struct UnlabeledBatch {
    pub x: ArrayD<f64>,
    pub metadata: Array2<i64>,
}

impl UnlabeledBatch {
    pub fn new(x: ArrayD<f64>, metadata: Array2<i64>) -> Self {
        Self { x, metadata }
    }

    pub fn batch_size(&self) -> Result<usize, MlError> {
        let n = leading_dim(&self.x)?;
        if self.metadata.nrows() != n {
            return Err(MlError::shape(format!(
                "unlabeled batch has {n} inputs and {} metadata rows",
                self.metadata.nrows()
            )));
        }
        Ok(n)
    }
}

fn leading_dim(x: &ArrayD<f64>) -> Result<usize, MlError> {
    x.shape()
        .first()
        .copied()
        .ok_or_else(|| MlError::shape("batch inputs must have a leading batch axis"))
}

/// Outputs of one forward pass, consumed by the objective.
#[derive(Debug, Clone)]
pub struct StepResults {
    pub g: Array1<usize>,
    pub y_true: ArrayD<f64>,
    pub y_pred: ArrayD<f64>,
    pub metadata: Array2<i64>,
    /// Taken by the objective.
    pub features: Option<ArrayD<f64>>,
    pub unlabeled_features: Option<ArrayD<f64>>,
    pub unlabeled_g: Option<Array1<usize>>,
    /// Set by the objective; zero outside training.
    pub penalty: Option<f64>,
}
