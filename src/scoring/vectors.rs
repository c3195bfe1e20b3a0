// Vector arithmetic shared by scoring and document validation

use thiserror::Error;

use crate::documents::{Field, SummaryEmbedding};

/// Added to the norm product so all-zero vectors score 0 instead of NaN
pub const COSINE_EPSILON: f32 = 1e-8;

/// Vector rank or dimensionality problems, and other values a vector
/// document cannot hold.
///
/// These are data-integrity failures and never a low-similarity signal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("{field} contains an empty vector")]
    EmptyVector { field: Field },
    #[error("{field} holds a {found}-dimensional vector, expected {expected}")]
    InconsistentDimension {
        field: Field,
        expected: usize,
        found: usize,
    },
    #[error("cannot pool an empty sequence of vectors")]
    NothingToPool,
    #[error("experience_years must be a finite non-negative number, got {0}")]
    InvalidExperience(String),
}

/// Raw cosine similarity in `[-1, 1]`
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, ShapeError> {
    if a.len() != b.len() {
        return Err(ShapeError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    Ok(dot / norm_a.sqrt().mul_add(norm_b.sqrt(), COSINE_EPSILON))
}

/// Elementwise mean of a non-empty sequence of equal-length vectors
#[inline]
pub fn mean_pool<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Vec<f32>, ShapeError> {
    let Some(first) = vectors.first() else {
        return Err(ShapeError::NothingToPool);
    };

    let mut pooled = first.as_ref().to_vec();
    for vector in vectors.iter().skip(1) {
        let vector = vector.as_ref();
        if vector.len() != pooled.len() {
            return Err(ShapeError::DimensionMismatch {
                left: pooled.len(),
                right: vector.len(),
            });
        }
        for (acc, value) in pooled.iter_mut().zip(vector) {
            *acc += value;
        }
    }

    let count = vectors.len() as f32;
    for value in &mut pooled {
        *value /= count;
    }
    Ok(pooled)
}

impl SummaryEmbedding {
    /// Reduce the summary to the single vector that scoring compares.
    ///
    /// `None` means the summary carries no signal.
    #[inline]
    pub fn pooled(&self) -> Result<Option<Vec<f32>>, ShapeError> {
        match self {
            Self::Absent => Ok(None),
            Self::Single(vector) => Ok(Some(vector.clone())),
            Self::Pooled(chunks) => mean_pool(chunks).map(Some),
        }
    }
}
