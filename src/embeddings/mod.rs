// Embedding capability
// The conversion engine only sees the `Embedder` trait; Ollama is one implementation of it

#[cfg(test)]
mod tests;

pub mod ollama;

pub use ollama::OllamaClient;

use thiserror::Error;

/// Turns a batch of texts into one vector per text.
///
/// Implementations must return exactly `texts.len()` vectors in input order.
/// The identifier returned by [`Embedder::model_id`] is stamped on every
/// vector document and takes part in its source hash, so two embedders that
/// produce incompatible vectors must never share an identifier.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Ways an embedder's output can be unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedOutput {
    #[error("expected {expected} vectors, got {found}")]
    CountMismatch { expected: usize, found: usize },
    #[error("vector {index} is empty")]
    EmptyVector { index: usize },
    #[error("vector {index} contains a non-finite value")]
    NonFinite { index: usize },
    #[error("vector {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
}

/// Check a batch of embedder output and return its dimensionality.
///
/// `Ok(None)` means the batch was empty (and so was the input).
#[inline]
pub fn validate_batch(
    expected: usize,
    vectors: &[Vec<f32>],
) -> Result<Option<usize>, MalformedOutput> {
    if vectors.len() != expected {
        return Err(MalformedOutput::CountMismatch {
            expected,
            found: vectors.len(),
        });
    }

    let mut dimension = None;
    for (index, vector) in vectors.iter().enumerate() {
        if vector.is_empty() {
            return Err(MalformedOutput::EmptyVector { index });
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(MalformedOutput::NonFinite { index });
        }
        match dimension {
            None => dimension = Some(vector.len()),
            Some(expected) if expected != vector.len() => {
                return Err(MalformedOutput::DimensionMismatch {
                    index,
                    expected,
                    found: vector.len(),
                });
            }
            Some(_) => {}
        }
    }

    Ok(dimension)
}
