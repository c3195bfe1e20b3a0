use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid record {source_name}: {reason}")]
    InvalidRecord {
        source_name: String,
        reason: documents::RecordError,
    },

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Scoring error: {0}")]
    Scoring(#[from] scoring::ScoringError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod conversion;
pub mod documents;
pub mod embeddings;
pub mod scoring;
pub mod store;

pub use conversion::{Conversion, ConversionOutcome, EmbeddingConverter};
pub use documents::{DocumentType, StructuredRecord, SummaryEmbedding, VectorDocument};
pub use embeddings::Embedder;
pub use scoring::{Scorer, ScoringPolicy, SimilarityReport, compute_similarity};
pub use store::VectorStore;
