//! Embedding comparison: Euclidean distance against a fixed match threshold.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

/// A single face's identity vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceEmbedding(Vec<f64>);

impl FaceEmbedding {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for FaceEmbedding {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl From<Vec<f32>> for FaceEmbedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values.into_iter().map(f64::from).collect())
    }
}

/// Outcome of comparing two embeddings. `distance` is never rounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    #[serde(rename = "match")]
    pub is_match: bool,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompareError {
    #[error("embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("embedding has {actual} dimensions, expected {expected}")]
    UnexpectedDimension { expected: usize, actual: usize },

    #[error("embedding is empty")]
    Empty,

    #[error("embedding value at index {index} is not a finite number")]
    NonFinite { index: usize },

    #[error("distance between embeddings exceeds the representable range")]
    DistanceOverflow,

    #[error("match threshold must be finite and positive, got {0}")]
    InvalidThreshold(f64),
}

fn check_finite(v: &[f64]) -> Result<(), CompareError> {
    match v.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(CompareError::NonFinite { index }),
        None => Ok(()),
    }
}

/// L2 distance, summed in ascending index order.
///
/// Fails on unequal lengths instead of truncating. When squaring overflows or
/// underflows, the sum is recomputed scaled by the largest component
/// difference; a distance that is itself beyond `f64::MAX` is an error.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> Result<f64, CompareError> {
    if a.len() != b.len() {
        return Err(CompareError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum();
    let distance = if sum.is_finite() && sum >= f64::MIN_POSITIVE {
        sum.sqrt()
    } else {
        scaled_distance(a, b)
    };
    if distance.is_finite() {
        Ok(distance)
    } else {
        Err(CompareError::DistanceOverflow)
    }
}

/// Halved differences stay finite for any finite inputs.
fn scaled_distance(a: &[f64], b: &[f64]) -> f64 {
    let half_diffs = || a.iter().zip(b).map(|(x, y)| x / 2.0 - y / 2.0);
    let scale = half_diffs().fold(0.0f64, |m, d| m.max(d.abs()));
    if scale == 0.0 {
        return 0.0;
    }
    let sum: f64 = half_diffs()
        .map(|d| {
            let r = d / scale;
            r * r
        })
        .sum();
    2.0 * scale * sum.sqrt()
}

#[derive(Debug, Clone)]
pub struct Comparator {
    threshold: f64,
    expected_dimension: Option<usize>,
}

impl Comparator {
    pub fn new(threshold: f64) -> Result<Self, CompareError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(CompareError::InvalidThreshold(threshold));
        }
        Ok(Self {
            threshold,
            expected_dimension: None,
        })
    }

    /// Require every embedding to have exactly `dim` components.
    pub fn with_expected_dimension(mut self, dim: Option<usize>) -> Self {
        self.expected_dimension = dim;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn expected_dimension(&self) -> Option<usize> {
        self.expected_dimension
    }

    fn validate(&self, v: &[f64]) -> Result<(), CompareError> {
        if v.is_empty() {
            return Err(CompareError::Empty);
        }
        if let Some(expected) = self.expected_dimension {
            if v.len() != expected {
                return Err(CompareError::UnexpectedDimension {
                    expected,
                    actual: v.len(),
                });
            }
        }
        check_finite(v)
    }

    /// Match iff the distance is strictly below the threshold.
    pub fn compare(&self, a: &[f64], b: &[f64]) -> Result<Comparison, CompareError> {
        if a.len() != b.len() {
            return Err(CompareError::DimensionMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        self.validate(a)?;
        self.validate(b)?;

        let distance = euclidean_distance(a, b)?;
        Ok(Comparison {
            is_match: distance < self.threshold,
            distance,
        })
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            expected_dimension: None,
        }
    }
}
