//! Model collaborators: the featurizer/classifier pair an algorithm trains.
//!
//! Architectures live outside this crate; they plug in through these traits.
//! [`Linear`] and [`Identity`] are the small building blocks needed for linear
//! probes and tests.

use coralign_core::Settings;
use ndarray::{Array1, Array2, ArrayD};

use crate::error::MlError;

/// Maps raw inputs to feature vectors of shape `(batch, ..., d_features)`.
pub trait Featurizer {
    fn forward(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>, MlError>;
}

/// Maps feature vectors to outputs of shape `(batch, ..., d_out)`.
pub trait Classifier {
    fn forward(&self, features: &ArrayD<f64>) -> Result<ArrayD<f64>, MlError>;
}

/// Builds the featurizer/classifier pair for a resolved settings object.
pub trait ModelFactory {
    fn build(
        &self,
        settings: &Settings,
        d_out: usize,
    ) -> Result<(Box<dyn Featurizer>, Box<dyn Classifier>), MlError>;
}

/// Pass-through featurizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Featurizer for Identity {
    fn forward(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>, MlError> {
        Ok(x.clone())
    }
}

/// Affine map over the last axis: `x @ weight + bias`.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f64>,
    bias: Array1<f64>,
}

impl Linear {
    /// `weight` is `(d_in, d_out)`, `bias` is `(d_out,)`.
    pub fn new(weight: Array2<f64>, bias: Array1<f64>) -> Result<Self, MlError> {
        if weight.nrows() == 0 {
            return Err(MlError::shape("linear layer needs at least one input dimension"));
        }
        if weight.ncols() != bias.len() {
            return Err(MlError::shape(format!(
                "bias has {} entries but weight has {} output columns",
                bias.len(),
                weight.ncols()
            )));
        }
        Ok(Self { weight, bias })
    }

    pub fn d_in(&self) -> usize {
        self.weight.nrows()
    }

    pub fn d_out(&self) -> usize {
        self.weight.ncols()
    }

    fn apply(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>, MlError> {
        let d_in = self.d_in();
        let last = x
            .shape()
            .last()
            .copied()
            .ok_or_else(|| MlError::shape("linear input must have at least one axis"))?;
        if last != d_in {
            return Err(MlError::shape(format!(
                "linear layer expects {d_in} input features, got {last}"
            )));
        }

        let rows = x.len() / d_in;
        let flat = x.to_shape((rows, d_in))?;
        let out = flat.dot(&self.weight) + &self.bias;

        let mut shape = x.shape().to_vec();
        if let Some(last) = shape.last_mut() {
            *last = self.d_out();
        }
        Ok(out.into_shape_with_order(shape)?)
    }
}

impl Featurizer for Linear {
    fn forward(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>, MlError> {
        self.apply(x)
    }
}

impl Classifier for Linear {
    fn forward(&self, features: &ArrayD<f64>) -> Result<ArrayD<f64>, MlError> {
        self.apply(features)
    }
}
