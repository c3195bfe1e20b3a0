use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Deterministic embedder that counts how many texts it has embedded
struct CountingEmbedder {
    model: String,
    texts_embedded: AtomicUsize,
    calls: AtomicUsize,
    fail_marker: Option<&'static str>,
    delay: Duration,
}

impl CountingEmbedder {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            texts_embedded: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            fail_marker: None,
            delay: Duration::ZERO,
        }
    }

    fn failing_on(model: &str, marker: &'static str) -> Self {
        Self {
            fail_marker: Some(marker),
            ..Self::new(model)
        }
    }

    fn slow(model: &str) -> Self {
        Self {
            delay: Duration::from_millis(20),
            ..Self::new(model)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fake_vector(text: &str) -> Vec<f32> {
    let bytes = text.as_bytes();
    vec![
        bytes.len() as f32,
        f32::from(bytes.first().copied().unwrap_or_default()),
        f32::from(bytes.last().copied().unwrap_or_default()),
        1.0,
    ]
}

impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if let Some(marker) = self.fail_marker {
            if texts.iter().any(|text| text.contains(marker)) {
                anyhow::bail!("embedding service unavailable");
            }
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| fake_vector(text)).collect())
    }
}

/// Returns vectors whose dimension depends on the batch size
struct RaggedEmbedder;

impl Embedder for RaggedEmbedder {
    fn model_id(&self) -> &str {
        "ragged"
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5; texts.len() + 1]).collect())
    }
}

/// Always answers with one vector too few
struct ShortEmbedder;

impl Embedder for ShortEmbedder {
    fn model_id(&self) -> &str {
        "short"
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
    }
}

fn record() -> StructuredRecord {
    StructuredRecord {
        document_type: DocumentType::Resume,
        summary: "Platform engineer running Kubernetes at scale".to_string(),
        experience_years: Some(7.0),
        skills: vec!["Kubernetes".to_string(), "Docker".to_string()],
        certifications: vec!["CKA".to_string()],
        responsibilities: vec!["Operated production clusters".to_string()],
    }
}

fn converter(embedder: Arc<dyn Embedder>, dir: &TempDir) -> EmbeddingConverter {
    let store = VectorStore::open(dir.path()).expect("should open store");
    EmbeddingConverter::new(embedder, store)
}

#[test]
fn generates_all_fields() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let embedder = Arc::new(CountingEmbedder::new("test-model"));
    let converter = converter(embedder.clone(), &temp_dir);

    let conversion = converter
        .convert("resume_alice", &record())
        .expect("should convert");
    let document = &conversion.document;

    assert_eq!(conversion.outcome, ConversionOutcome::Generated);
    assert!(conversion.failed_fields.is_empty());
    assert_eq!(conversion.path, temp_dir.path().join("resume_alice.vector.json"));
    assert!(conversion.path.exists());

    assert_eq!(document.embedding_model, "test-model");
    assert_eq!(document.source_hash, record().source_hash("test-model"));
    assert_eq!(document.document_type, DocumentType::Resume);
    assert_eq!(document.experience_years, Some(7.0));
    assert!(matches!(document.summary, SummaryEmbedding::Single(_)));
    assert_eq!(document.skills.len(), 2);
    assert_eq!(document.skills[0], fake_vector("Kubernetes"));
    assert_eq!(document.skills[1], fake_vector("Docker"));
    assert_eq!(document.certifications.len(), 1);
    assert_eq!(document.responsibilities.len(), 1);
    assert_eq!(document.dimension(), Ok(Some(4)));

    // One call per non-empty field
    assert_eq!(embedder.calls(), 4);
    assert_eq!(embedder.texts_embedded.load(Ordering::SeqCst), 5);
}

#[test]
fn second_conversion_reuses_cache() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let embedder = Arc::new(CountingEmbedder::new("test-model"));
    let converter = converter(embedder.clone(), &temp_dir);

    let first = converter
        .convert("resume_alice", &record())
        .expect("should convert");
    let calls_after_first = embedder.calls();

    let second = converter
        .convert("resume_alice", &record())
        .expect("should convert again");

    assert_eq!(second.outcome, ConversionOutcome::Reused);
    assert_eq!(second.document.source_hash, first.document.source_hash);
    assert_eq!(second.document, first.document);
    assert_eq!(embedder.calls(), calls_after_first);
}

#[test]
fn changed_content_forces_regeneration() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let embedder = Arc::new(CountingEmbedder::new("test-model"));
    let converter = converter(embedder.clone(), &temp_dir);

    let first = converter
        .convert("resume_alice", &record())
        .expect("should convert");
    let calls_after_first = embedder.calls();

    let mut changed = record();
    changed.skills.push("Terraform".to_string());
    let second = converter
        .convert("resume_alice", &changed)
        .expect("should convert changed record");

    assert_eq!(second.outcome, ConversionOutcome::Generated);
    assert_ne!(second.document.source_hash, first.document.source_hash);
    assert_eq!(second.document.skills.len(), 3);
    assert!(embedder.calls() > calls_after_first);
}

#[test]
fn changed_model_forces_regeneration() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");

    let first = converter(Arc::new(CountingEmbedder::new("model-a")), &temp_dir)
        .convert("resume_alice", &record())
        .expect("should convert with first model");

    let embedder = Arc::new(CountingEmbedder::new("model-b"));
    let second = converter(embedder.clone(), &temp_dir)
        .convert("resume_alice", &record())
        .expect("should convert with second model");

    assert_eq!(second.outcome, ConversionOutcome::Generated);
    assert_eq!(second.document.embedding_model, "model-b");
    assert_ne!(second.document.source_hash, first.document.source_hash);
    assert_eq!(embedder.calls(), 4);
}

#[test]
fn empty_fields_are_not_embedded() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let embedder = Arc::new(CountingEmbedder::new("test-model"));
    let converter = converter(embedder.clone(), &temp_dir);

    let sparse = StructuredRecord {
        document_type: DocumentType::Jd,
        summary: String::new(),
        experience_years: None,
        skills: vec!["Go".to_string()],
        certifications: Vec::new(),
        responsibilities: Vec::new(),
    };
    let conversion = converter.convert("jd_sparse", &sparse).expect("should convert");

    assert_eq!(conversion.document.summary, SummaryEmbedding::Absent);
    assert!(conversion.document.certifications.is_empty());
    assert!(conversion.document.responsibilities.is_empty());
    assert!(conversion.failed_fields.is_empty());
    assert_eq!(embedder.calls(), 1);
}

#[test]
fn failed_field_degrades_without_aborting_record() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut broken = record();
    broken.certifications = vec!["FAIL-CERT".to_string()];

    let conversion = converter(
        Arc::new(CountingEmbedder::failing_on("test-model", "FAIL")),
        &temp_dir,
    )
    .convert("resume_alice", &broken)
    .expect("should convert despite field failure");

    assert_eq!(conversion.failed_fields.len(), 1);
    assert_eq!(conversion.failed_fields[0].field, Field::Certifications);
    assert!(conversion.failed_fields[0].reason.contains("unavailable"));
    assert!(conversion.document.certifications.is_empty());
    assert_eq!(conversion.document.skills.len(), 2);
    assert_eq!(conversion.document.responsibilities.len(), 1);
    assert_eq!(conversion.document.degraded_fields, vec![Field::Certifications]);
}

#[test]
fn degraded_artifact_is_regenerated() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut broken = record();
    broken.certifications = vec!["FAIL-CERT".to_string()];

    converter(
        Arc::new(CountingEmbedder::failing_on("test-model", "FAIL")),
        &temp_dir,
    )
    .convert("resume_alice", &broken)
    .expect("should convert with degraded field");

    let embedder = Arc::new(CountingEmbedder::new("test-model"));
    let retry = converter(embedder.clone(), &temp_dir)
        .convert("resume_alice", &broken)
        .expect("should regenerate");

    assert_eq!(retry.outcome, ConversionOutcome::Generated);
    assert!(retry.document.is_complete());
    assert_eq!(retry.document.certifications.len(), 1);
    assert_eq!(embedder.calls(), 4);
}

#[test]
fn inconsistent_dimensions_degrade_later_fields() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let conversion = converter(Arc::new(RaggedEmbedder), &temp_dir)
        .convert("resume_alice", &record())
        .expect("should convert");

    // Summary fixes the dimension at 2; the two-item skills batch comes back at 3
    let failed: Vec<Field> = conversion
        .failed_fields
        .iter()
        .map(|failure| failure.field)
        .collect();
    assert_eq!(failed, vec![Field::Skills]);
    assert!(conversion.document.skills.is_empty());
    assert_eq!(conversion.document.dimension(), Ok(Some(2)));
}

#[test]
fn wrong_vector_count_is_malformed() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let conversion = converter(Arc::new(ShortEmbedder), &temp_dir)
        .convert("resume_alice", &record())
        .expect("should convert");

    assert_eq!(conversion.failed_fields.len(), 4);
    assert!(
        conversion
            .failed_fields
            .iter()
            .all(|failure| failure.reason.contains("malformed"))
    );
    assert_eq!(conversion.document.dimension(), Ok(None));
}

#[test]
fn corrupt_cache_is_regenerated() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let embedder = Arc::new(CountingEmbedder::new("test-model"));
    let converter = converter(embedder.clone(), &temp_dir);

    fs::write(converter.store().artifact_path("resume_alice"), "{oops")
        .expect("should write corrupt artifact");

    let conversion = converter
        .convert("resume_alice", &record())
        .expect("should convert");
    assert_eq!(conversion.outcome, ConversionOutcome::Generated);
    assert_eq!(embedder.calls(), 4);
}

#[test]
fn concurrent_conversions_of_same_record_embed_once() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let embedder = Arc::new(CountingEmbedder::slow("test-model"));
    let converter = converter(embedder.clone(), &temp_dir);
    let record = record();

    let outcomes: Vec<ConversionOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| converter.convert("resume_alice", &record)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .expect("should join thread")
                    .expect("should convert")
                    .outcome
            })
            .collect()
    });

    let generated = outcomes
        .iter()
        .filter(|outcome| **outcome == ConversionOutcome::Generated)
        .count();
    assert_eq!(generated, 1);
    assert_eq!(embedder.calls(), 4);

    let locks = converter
        .slot_locks
        .lock()
        .expect("should lock slot map");
    assert!(locks.is_empty());
}

#[test]
fn different_records_convert_in_parallel() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let embedder = Arc::new(CountingEmbedder::new("test-model"));
    let converter = converter(embedder.clone(), &temp_dir);

    thread::scope(|scope| {
        for index in 0..4 {
            let converter = &converter;
            scope.spawn(move || {
                let mut record = record();
                record.summary = format!("Candidate number {index}");
                converter
                    .convert(&format!("resume_{index}"), &record)
                    .expect("should convert");
            });
        }
    });

    assert_eq!(converter.store().list().expect("should list").len(), 4);
    assert_eq!(embedder.calls(), 16);
}

#[test]
fn convert_file_uses_fallback_type_and_identity() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let records_dir = TempDir::new().expect("should create TempDir successfully");
    let converter = converter(Arc::new(CountingEmbedder::new("test-model")), &temp_dir);

    let path = records_dir.path().join("Backend Engineer.json");
    fs::write(&path, r#"{"summary": "Build APIs", "skills": ["Rust"]}"#)
        .expect("should write record");

    let conversion = converter
        .convert_file(&path, Some(DocumentType::Jd))
        .expect("should convert file");
    assert_eq!(conversion.name, "Backend_Engineer");
    assert_eq!(conversion.identity, record_identity(&path));
    assert!(conversion.identity.starts_with("Backend_Engineer-"));
    assert_eq!(conversion.document.document_type, DocumentType::Jd);

    let error = converter
        .convert_file(&path, None)
        .expect_err("should require a document type");
    assert!(matches!(
        error,
        MatchError::InvalidRecord {
            reason: RecordError::MissingDocumentType,
            ..
        }
    ));
}

#[test]
fn convert_files_isolates_bad_records() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let records_dir = TempDir::new().expect("should create TempDir successfully");
    let converter = converter(Arc::new(CountingEmbedder::new("test-model")), &temp_dir);

    let good = records_dir.path().join("resume_good.json");
    let bad = records_dir.path().join("resume_bad.json");
    let missing = records_dir.path().join("resume_missing.json");
    fs::write(&good, r#"{"document_type": "resume", "skills": ["SQL"]}"#)
        .expect("should write record");
    fs::write(&bad, "{ not json").expect("should write record");

    let batch = converter.convert_files(&[bad.clone(), good, missing.clone()], None);

    assert_eq!(batch.converted.len(), 1);
    assert_eq!(batch.converted[0].name, "resume_good");
    assert_eq!(batch.failed.len(), 2);
    assert_eq!(batch.failed[0].path, bad);
    assert!(matches!(
        batch.failed[0].error,
        MatchError::InvalidRecord {
            reason: RecordError::Json(_),
            ..
        }
    ));
    assert_eq!(batch.failed[1].path, missing);
    assert!(matches!(
        batch.failed[1].error,
        MatchError::InvalidRecord {
            reason: RecordError::Unreadable(_),
            ..
        }
    ));
}

#[test]
fn same_file_stem_in_different_directories_is_cached_separately() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let records_dir = TempDir::new().expect("should create TempDir successfully");
    let embedder = Arc::new(CountingEmbedder::new("test-model"));
    let converter = converter(embedder.clone(), &temp_dir);

    let jd_dir = records_dir.path().join("jds");
    let resume_dir = records_dir.path().join("resumes");
    fs::create_dir_all(&jd_dir).expect("should create jd dir");
    fs::create_dir_all(&resume_dir).expect("should create resume dir");
    let jd = jd_dir.join("backend.json");
    let resume = resume_dir.join("backend.json");
    fs::write(&jd, r#"{"document_type": "jd", "skills": ["Rust", "Kafka"]}"#)
        .expect("should write record");
    fs::write(&resume, r#"{"document_type": "resume", "skills": ["Go"]}"#)
        .expect("should write record");
    let paths = [jd, resume];

    let first = converter.convert_files(&paths, None);
    assert!(first.failed.is_empty());
    assert_ne!(first.converted[0].identity, first.converted[1].identity);
    assert_eq!(first.converted[0].name, "backend");
    assert_eq!(first.converted[1].name, "backend");
    let calls_after_first = embedder.calls();
    assert_eq!(calls_after_first, 2);

    let second = converter.convert_files(&paths, None);
    assert!(
        second
            .converted
            .iter()
            .all(|c| c.outcome == ConversionOutcome::Reused)
    );
    assert_eq!(embedder.calls(), calls_after_first);
    assert_eq!(converter.store().list().expect("should list").len(), 2);
}

#[test]
fn conversions_into_one_slot_are_serialized() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let embedder = Arc::new(CountingEmbedder::slow("test-model"));
    let converter = converter(embedder.clone(), &temp_dir);

    let mut other = record();
    other.summary = "A different candidate".to_string();
    let records = [record(), other];

    thread::scope(|scope| {
        for record in &records {
            let converter = &converter;
            scope.spawn(move || {
                converter
                    .convert("resume_shared", record)
                    .expect("should convert");
            });
        }
    });

    let hashes: Vec<String> = records
        .iter()
        .map(|record| record.source_hash("test-model"))
        .collect();
    let stored = converter
        .store()
        .load("resume_shared")
        .expect("should load the surviving artifact");
    assert!(hashes.contains(&stored.source_hash));
    assert!(stored.is_complete());
    assert_eq!(embedder.calls(), 8);
    assert!(
        converter
            .slot_locks
            .lock()
            .expect("should lock slot map")
            .is_empty()
    );
}
