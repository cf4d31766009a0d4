//! Caller-supplied feature sets and their canonical ordering

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

/// Number of columns the model expects.
pub const FEATURE_COUNT: usize = 8;

/// Column order of the California Housing feature set.
pub const FEATURE_ORDER: [&str; FEATURE_COUNT] = [
    "MedInc",
    "HouseAge",
    "AveRooms",
    "AveBedrms",
    "Population",
    "AveOccup",
    "Latitude",
    "Longitude",
];

/// Input accepted by `Adapter::predict`
///
/// Deserializes from either a JSON array or a JSON object, so the HTTP
/// layer can forward request bodies untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureInput {
    /// Values already in `FEATURE_ORDER`
    Sequence(Vec<f64>),
    /// Values keyed by feature name
    Named(HashMap<String, f64>),
}

impl FeatureInput {
    /// Canonical row: named inputs are reordered, absent names become 0 and
    /// unknown names are dropped. Sequences must have exactly
    /// `FEATURE_COUNT` values.
    pub fn to_row(&self) -> Result<[f32; FEATURE_COUNT]> {
        let mut row = [0f32; FEATURE_COUNT];
        match self {
            FeatureInput::Sequence(values) => {
                if values.len() != FEATURE_COUNT {
                    return Err(AdapterError::prediction(format!(
                        "expected {} feature values, got {}",
                        FEATURE_COUNT,
                        values.len()
                    )));
                }
                for (slot, value) in row.iter_mut().zip(values) {
                    *slot = *value as f32;
                }
            }
            FeatureInput::Named(map) => {
                for (slot, name) in row.iter_mut().zip(FEATURE_ORDER) {
                    *slot = map.get(name).copied().unwrap_or(0.0) as f32;
                }
            }
        }
        Ok(row)
    }

    /// Single-row, `FEATURE_COUNT`-column matrix.
    pub fn to_matrix(&self) -> Result<Array2<f32>> {
        let row = self.to_row()?;
        Array2::from_shape_vec((1, FEATURE_COUNT), row.to_vec())
            .map_err(AdapterError::prediction)
    }
}

impl From<Vec<f64>> for FeatureInput {
    fn from(values: Vec<f64>) -> Self {
        FeatureInput::Sequence(values)
    }
}

impl From<&[f64]> for FeatureInput {
    fn from(values: &[f64]) -> Self {
        FeatureInput::Sequence(values.to_vec())
    }
}

impl From<[f64; FEATURE_COUNT]> for FeatureInput {
    fn from(values: [f64; FEATURE_COUNT]) -> Self {
        FeatureInput::Sequence(values.to_vec())
    }
}

impl From<Array1<f64>> for FeatureInput {
    fn from(values: Array1<f64>) -> Self {
        FeatureInput::Sequence(values.to_vec())
    }
}

impl From<HashMap<String, f64>> for FeatureInput {
    fn from(map: HashMap<String, f64>) -> Self {
        FeatureInput::Named(map)
    }
}

impl From<BTreeMap<String, f64>> for FeatureInput {
    fn from(map: BTreeMap<String, f64>) -> Self {
        FeatureInput::Named(map.into_iter().collect())
    }
}

impl<'a> FromIterator<(&'a str, f64)> for FeatureInput {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        FeatureInput::Named(
            iter.into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}
