//! CORAL feature-alignment penalty.
//!
//! Distance between first- and second-order statistics of two feature sets:
//! mean squared difference of the feature means plus mean squared difference
//! of the sample covariances.

use ndarray::{Array1, Array2, ArrayViewD, Axis};

use crate::error::MlError;

/// CORAL penalty between two feature sets of shape `(n, ..., d)`.
///
/// Extra axes are flattened into rows, so a `(n, t, d)` tensor counts `n * t`
/// rows. A 1-D input is a single feature column.
///
/// Each input needs at least two rows; the sample covariance divides by
/// `n - 1`, and a single-row input yields NaN.
pub fn coral_penalty(x: ArrayViewD<'_, f64>, y: ArrayViewD<'_, f64>) -> Result<f64, MlError> {
    let x = flatten_features(x)?;
    let y = flatten_features(y)?;
    if x.ncols() != y.ncols() {
        return Err(MlError::shape(format!(
            "cannot align {} features with {} features",
            x.ncols(),
            y.ncols()
        )));
    }

    let (mean_x, cova_x) = moments(&x);
    let (mean_y, cova_y) = moments(&y);

    let mean_diff = squared_mean((&mean_x - &mean_y).iter());
    let cova_diff = squared_mean((&cova_x - &cova_y).iter());
    Ok(mean_diff + cova_diff)
}

/// Mean CORAL penalty over every unordered pair of groups.
///
/// Zero when there are fewer than two groups.
pub fn mean_pairwise_penalty(groups: &[ArrayViewD<'_, f64>]) -> Result<f64, MlError> {
    let n = groups.len();
    let mut penalty = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            penalty += coral_penalty(groups[i].view(), groups[j].view())?;
        }
    }
    if n > 1 {
        penalty /= (n * (n - 1)) as f64 / 2.0;
    }
    Ok(penalty)
}

fn flatten_features(x: ArrayViewD<'_, f64>) -> Result<Array2<f64>, MlError> {
    let d = match x.ndim() {
        0 => return Err(MlError::shape("features must have at least one axis")),
        1 => 1,
        _ => x.shape()[x.ndim() - 1],
    };
    if d == 0 {
        return Err(MlError::shape("features have zero width"));
    }
    let rows = x.len() / d;
    Ok(x.to_shape((rows, d))?.into_owned())
}

fn moments(x: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = x.nrows() as f64;
    let mean = x.sum_axis(Axis(0)) / n;
    let centered = x - &mean;
    let cova = centered.t().dot(&centered) / (n - 1.0);
    (mean, cova)
}

fn squared_mean<'a>(values: impl ExactSizeIterator<Item = &'a f64>) -> f64 {
    let len = values.len() as f64;
    values.map(|v| v * v).sum::<f64>() / len
}
