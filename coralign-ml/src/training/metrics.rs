//! Per-step metric tracking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values recorded for each logged field, one per step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepMetrics {
    history: BTreeMap<String, Vec<f64>>,
}

/// Aggregate of one field's history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub steps: usize,
    pub mean: f64,
    pub last: f64,
    pub min: f64,
    pub max: f64,
}

impl StepMetrics {
    pub fn record(&mut self, name: &str, value: f64) {
        self.history
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    pub fn history(&self, name: &str) -> &[f64] {
        self.history.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn steps(&self, name: &str) -> usize {
        self.history(name).len()
    }

    pub fn last(&self, name: &str) -> Option<f64> {
        self.history(name).last().copied()
    }

    pub fn mean(&self, name: &str) -> Option<f64> {
        let values = self.history(name);
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Summaries of every recorded field, keyed by name.
    pub fn summary(&self) -> BTreeMap<String, MetricSummary> {
        self.history
            .iter()
            .filter_map(|(name, values)| {
                let last = *values.last()?;
                Some((
                    name.clone(),
                    MetricSummary {
                        steps: values.len(),
                        mean: values.iter().sum::<f64>() / values.len() as f64,
                        last,
                        min: values.iter().copied().fold(f64::INFINITY, f64::min),
                        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    },
                ))
            })
            .collect()
    }

    /// Forget everything, e.g. at an epoch boundary.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}
