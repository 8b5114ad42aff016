//! Base supervised losses.

use coralign_core::ConfigError;
use ndarray::{ArrayD, Axis, Ix2};

use crate::error::MlError;

/// Averaged loss over a batch of predictions.
pub trait Loss {
    fn name(&self) -> &str;

    fn compute(&self, y_pred: &ArrayD<f64>, y_true: &ArrayD<f64>) -> Result<f64, MlError>;
}

/// Softmax cross-entropy over `(batch, classes)` logits and integer class labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl Loss for CrossEntropyLoss {
    fn name(&self) -> &str {
        "cross_entropy"
    }

    fn compute(&self, y_pred: &ArrayD<f64>, y_true: &ArrayD<f64>) -> Result<f64, MlError> {
        let logits = y_pred
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| MlError::shape("cross entropy expects (batch, classes) logits"))?;
        let (n, classes) = logits.dim();
        if y_true.len() != n {
            return Err(MlError::shape(format!(
                "{n} predictions but {} labels",
                y_true.len()
            )));
        }
        if n == 0 {
            return Err(MlError::invalid_input("cross entropy over an empty batch"));
        }

        let mut total = 0.0;
        for (row, label) in logits.axis_iter(Axis(0)).zip(y_true.iter()) {
            let class = *label as usize;
            if label.fract() != 0.0 || *label < 0.0 || class >= classes {
                return Err(MlError::invalid_input(format!(
                    "label {label} is not a class index below {classes}"
                )));
            }
            let max = row.fold(f64::NEG_INFINITY, |m, v| m.max(*v));
            let log_sum_exp = max + row.mapv(|v| (v - max).exp()).sum().ln();
            total += log_sum_exp - row[class];
        }
        Ok(total / n as f64)
    }
}

/// Mean squared error over element-wise matching predictions and targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss;

impl Loss for MseLoss {
    fn name(&self) -> &str {
        "mse"
    }

    fn compute(&self, y_pred: &ArrayD<f64>, y_true: &ArrayD<f64>) -> Result<f64, MlError> {
        if y_pred.len() != y_true.len() {
            return Err(MlError::shape(format!(
                "{} predictions but {} targets",
                y_pred.len(),
                y_true.len()
            )));
        }
        if y_pred.is_empty() {
            return Err(MlError::invalid_input("mse over an empty batch"));
        }
        let sum: f64 = y_pred
            .iter()
            .zip(y_true.iter())
            .map(|(p, t)| (p - t).powi(2))
            .sum();
        Ok(sum / y_pred.len() as f64)
    }
}

/// Look up the loss named by the `loss_function` setting.
pub fn loss_from_name(name: &str) -> Result<Box<dyn Loss>, MlError> {
    match name {
        "cross_entropy" => Ok(Box::new(CrossEntropyLoss)),
        "mse" => Ok(Box::new(MseLoss)),
        other => Err(ConfigError::unknown_preset("loss function", other).into()),
    }
}
