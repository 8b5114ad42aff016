//! Grouping of batch examples by metadata, and the stable per-group split.

use coralign_core::Settings;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

use crate::error::MlError;

/// Maps per-example metadata rows to integer group ids.
pub trait Grouper {
    /// Number of distinct group ids this grouper can produce.
    fn n_groups(&self) -> usize;

    fn metadata_to_group(&self, metadata: &Array2<i64>) -> Result<Array1<usize>, MlError>;
}

/// Groups examples by the combination of selected metadata columns.
///
/// The id is the mixed-radix encoding of the selected values: the first
/// groupby field varies fastest.
#[derive(Debug, Clone)]
pub struct MetadataGrouper {
    groupby_fields: Vec<String>,
    columns: Vec<usize>,
    cardinalities: Vec<usize>,
    factors: Vec<usize>,
}

impl MetadataGrouper {
    /// `metadata_fields` names every metadata column, `cardinalities[i]` is the
    /// number of values column `i` takes. An empty `groupby_fields` puts every
    /// example in group 0.
    pub fn new(
        metadata_fields: &[&str],
        cardinalities: &[usize],
        groupby_fields: &[&str],
    ) -> Result<Self, MlError> {
        if metadata_fields.len() != cardinalities.len() {
            return Err(MlError::invalid_input(format!(
                "{} metadata fields but {} cardinalities",
                metadata_fields.len(),
                cardinalities.len()
            )));
        }

        let mut columns = Vec::with_capacity(groupby_fields.len());
        let mut group_cardinalities = Vec::with_capacity(groupby_fields.len());
        for field in groupby_fields {
            let column = metadata_fields
                .iter()
                .position(|f| f == field)
                .ok_or_else(|| {
                    MlError::invalid_input(format!("unknown metadata field '{field}'"))
                })?;
            if cardinalities[column] == 0 {
                return Err(MlError::invalid_input(format!(
                    "metadata field '{field}' has no values"
                )));
            }
            columns.push(column);
            group_cardinalities.push(cardinalities[column]);
        }

        let mut factors = Vec::with_capacity(group_cardinalities.len());
        let mut stride = 1usize;
        for card in &group_cardinalities {
            factors.push(stride);
            stride = stride.checked_mul(*card).ok_or_else(|| {
                MlError::invalid_input("group id space overflows usize")
            })?;
        }

        Ok(Self {
            groupby_fields: groupby_fields.iter().map(|f| f.to_string()).collect(),
            columns,
            cardinalities: group_cardinalities,
            factors,
        })
    }

    /// Build a grouper from the `groupby_fields` setting.
    pub fn from_settings(
        settings: &Settings,
        metadata_fields: &[&str],
        cardinalities: &[usize],
    ) -> Result<Self, MlError> {
        let groupby = settings.get_str_list("groupby_fields").unwrap_or_default();
        Self::new(metadata_fields, cardinalities, &groupby)
    }

    pub fn groupby_fields(&self) -> &[String] {
        &self.groupby_fields
    }

    /// Human-readable description of a group id, e.g. `hospital = 2, slide = 7`.
    pub fn group_str(&self, group: usize) -> String {
        if self.groupby_fields.is_empty() {
            return "all".to_string();
        }
        self.groupby_fields
            .iter()
            .zip(self.factors.iter().zip(&self.cardinalities))
            .map(|(field, (factor, card))| format!("{field} = {}", (group / factor) % card))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Grouper for MetadataGrouper {
    fn n_groups(&self) -> usize {
        self.cardinalities.iter().product()
    }

    fn metadata_to_group(&self, metadata: &Array2<i64>) -> Result<Array1<usize>, MlError> {
        if let Some(max) = self.columns.iter().max() {
            if *max >= metadata.ncols() {
                return Err(MlError::shape(format!(
                    "metadata has {} columns, grouping needs column {max}",
                    metadata.ncols()
                )));
            }
        }

        let mut groups = Array1::zeros(metadata.nrows());
        for (row, group) in metadata.rows().into_iter().zip(groups.iter_mut()) {
            let mut id = 0usize;
            for ((column, factor), card) in self
                .columns
                .iter()
                .zip(&self.factors)
                .zip(&self.cardinalities)
            {
                let value = row[*column];
                let value = usize::try_from(value)
                    .ok()
                    .filter(|v| v < card)
                    .ok_or_else(|| {
                        MlError::invalid_input(format!(
                            "metadata value {value} out of range for column {column} (cardinality {card})"
                        ))
                    })?;
                id += value * factor;
            }
            *group = id;
        }
        Ok(groups)
    }
}

/// Result of [`split_into_groups`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSplit {
    /// Distinct group ids in ascending order.
    pub unique_groups: Vec<usize>,
    /// Row indices of each group, in original order.
    pub group_indices: Vec<Vec<usize>>,
    pub unique_counts: Vec<usize>,
}

impl GroupSplit {
    pub fn len(&self) -> usize {
        self.unique_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unique_groups.is_empty()
    }
}

/// Partition row indices by group id. The split is stable: indices inside each
/// group keep their batch order.
pub fn split_into_groups(g: &Array1<usize>) -> GroupSplit {
    let mut by_group: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, group) in g.iter().enumerate() {
        by_group.entry(*group).or_default().push(index);
    }

    let mut split = GroupSplit {
        unique_groups: Vec::with_capacity(by_group.len()),
        group_indices: Vec::with_capacity(by_group.len()),
        unique_counts: Vec::with_capacity(by_group.len()),
    };
    for (group, indices) in by_group {
        split.unique_groups.push(group);
        split.unique_counts.push(indices.len());
        split.group_indices.push(indices);
    }
    split
}
