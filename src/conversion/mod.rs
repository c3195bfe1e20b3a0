// Embedding conversion
// Turns structured records into vector documents, reusing cached artifacts when the source is unchanged

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::documents::{
    DocumentType, Field, RecordError, StructuredRecord, SummaryEmbedding, VectorDocument,
    record_identity, record_name,
};
use crate::embeddings::{Embedder, validate_batch};
use crate::store::VectorStore;
use crate::{MatchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// A cached artifact with the same source hash and model was returned as-is
    Reused,
    /// The embedder was invoked and a new artifact written
    Generated,
}

/// A field that could not be embedded and was stored as absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub field: Field,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Conversion {
    /// Readable record name used in reports
    pub name: String,
    /// Store slot the vector document lives in
    pub identity: String,
    pub path: PathBuf,
    pub document: VectorDocument,
    pub outcome: ConversionOutcome,
    pub failed_fields: Vec<FieldFailure>,
}

#[derive(Debug)]
pub struct RecordFailure {
    pub path: PathBuf,
    pub error: MatchError,
}

/// Result of converting many records; one bad record never stops the rest
#[derive(Debug, Default)]
pub struct BatchConversion {
    pub converted: Vec<Conversion>,
    pub failed: Vec<RecordFailure>,
}

pub struct EmbeddingConverter {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    slot_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EmbeddingConverter {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: VectorStore) -> Self {
        Self {
            embedder,
            store,
            slot_locks: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Convert one record into the store slot `identity`, or reuse the
    /// vector document cached there.
    ///
    /// The cached document is reused only when its source hash and model match
    /// the record. Conversions into the same slot are serialized so the check
    /// and the write never interleave, and the embedder runs at most once for
    /// concurrent requests of the same record; different slots proceed in
    /// parallel. Fields the embedder fails on are stored as absent and
    /// reported in [`Conversion::failed_fields`].
    #[inline]
    pub fn convert(&self, identity: &str, record: &StructuredRecord) -> Result<Conversion> {
        let model = self.embedder.model_id().to_string();
        let source_hash = record.source_hash(&model);

        let slot_lock = self.acquire_slot(identity);
        let result = {
            let _guard = slot_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.convert_locked(identity, record, &source_hash, &model)
        };
        drop(slot_lock);
        self.release_slot(identity);

        result
    }

    /// Read, parse and convert a record file.
    ///
    /// `fallback_type` is used only when the record has no `document_type`.
    #[inline]
    pub fn convert_file(
        &self,
        path: &Path,
        fallback_type: Option<DocumentType>,
    ) -> Result<Conversion> {
        let invalid = |reason: RecordError| MatchError::InvalidRecord {
            source_name: path.display().to_string(),
            reason,
        };

        let text = fs::read_to_string(path)
            .map_err(|e| invalid(RecordError::Unreadable(e.to_string())))?;
        let record = StructuredRecord::from_json(&text, fallback_type).map_err(invalid)?;

        let mut conversion = self.convert(&record_identity(path), &record)?;
        conversion.name = record_name(path);
        Ok(conversion)
    }

    /// Convert every file in order, collecting failures instead of stopping
    #[inline]
    pub fn convert_files(
        &self,
        paths: &[PathBuf],
        fallback_type: Option<DocumentType>,
    ) -> BatchConversion {
        let mut batch = BatchConversion::default();

        for path in paths {
            match self.convert_file(path, fallback_type) {
                Ok(conversion) => batch.converted.push(conversion),
                Err(error) => {
                    warn!("Skipping record {}: {}", path.display(), error);
                    batch.failed.push(RecordFailure {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            "Converted {} records ({} failed)",
            batch.converted.len(),
            batch.failed.len()
        );
        batch
    }

    fn acquire_slot(&self, identity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.slot_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(identity.to_string()).or_default())
    }

    fn release_slot(&self, identity: &str) {
        let mut locks = self.slot_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map still holds the lock once every waiter is done
        if locks
            .get(identity)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(identity);
        }
    }

    fn convert_locked(
        &self,
        identity: &str,
        record: &StructuredRecord,
        source_hash: &str,
        model: &str,
    ) -> Result<Conversion> {
        if let Some(cached) = self.store.load(identity) {
            if !cached.matches_source(source_hash, model) {
                debug!("Cached vectors for {} are stale, regenerating", identity);
            } else if !cached.is_complete() {
                debug!(
                    "Cached vectors for {} are missing {:?}, regenerating",
                    identity, cached.degraded_fields
                );
            } else {
                debug!("Reusing cached vectors for {}", identity);
                return Ok(Conversion {
                    name: identity.to_string(),
                    identity: identity.to_string(),
                    path: self.store.artifact_path(identity),
                    document: cached,
                    outcome: ConversionOutcome::Reused,
                    failed_fields: Vec::new(),
                });
            }
        }

        let (document, failed_fields) = self.embed_record(identity, record, source_hash, model);
        let path = self.store.save(identity, &document)?;

        info!(
            "Generated vectors for {} ({} degraded fields)",
            identity,
            failed_fields.len()
        );

        Ok(Conversion {
            name: identity.to_string(),
            identity: identity.to_string(),
            path,
            document,
            outcome: ConversionOutcome::Generated,
            failed_fields,
        })
    }

    fn embed_record(
        &self,
        identity: &str,
        record: &StructuredRecord,
        source_hash: &str,
        model: &str,
    ) -> (VectorDocument, Vec<FieldFailure>) {
        let mut failures = Vec::new();
        let mut dimension = None;

        let mut degrade = |field: Field, reason: String| {
            warn!(
                "Embedding failed for {} field of {}, storing as absent: {}",
                field, identity, reason
            );
            failures.push(FieldFailure { field, reason });
        };

        let summary = if record.summary.is_empty() {
            SummaryEmbedding::Absent
        } else {
            match self.embed_field(std::slice::from_ref(&record.summary), &mut dimension) {
                Ok(vectors) => SummaryEmbedding::from_chunks(vectors),
                Err(reason) => {
                    degrade(Field::Summary, reason);
                    SummaryEmbedding::Absent
                }
            }
        };

        let mut lists: [Vec<Vec<f32>>; 3] = Default::default();
        for (slot, field) in lists.iter_mut().zip(Field::LISTS) {
            let items = record.items(field);
            if items.is_empty() {
                continue;
            }
            match self.embed_field(items, &mut dimension) {
                Ok(vectors) => *slot = vectors,
                Err(reason) => degrade(field, reason),
            }
        }
        let [skills, certifications, responsibilities] = lists;

        let document = VectorDocument {
            embedding_model: model.to_string(),
            source_hash: source_hash.to_string(),
            document_type: record.document_type,
            experience_years: record.experience_years,
            summary,
            skills,
            certifications,
            responsibilities,
            degraded_fields: failures.iter().map(|failure| failure.field).collect(),
            created_at: chrono::Utc::now(),
        };

        (document, failures)
    }

    /// Embed one field's texts and check them against the record's dimension so far
    fn embed_field(
        &self,
        texts: &[String],
        dimension: &mut Option<usize>,
    ) -> std::result::Result<Vec<Vec<f32>>, String> {
        let vectors = self
            .embedder
            .embed_batch(texts)
            .map_err(|e| format!("{e:#}"))?;

        let field_dimension = validate_batch(texts.len(), &vectors)
            .map_err(|e| format!("malformed embedding output: {e}"))?;

        match (*dimension, field_dimension) {
            (Some(expected), Some(found)) if expected != found => {
                return Err(format!(
                    "malformed embedding output: dimension {found} disagrees with {expected} from earlier fields"
                ));
            }
            (None, Some(found)) => *dimension = Some(found),
            _ => {}
        }

        Ok(vectors)
    }
}
