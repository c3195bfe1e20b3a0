use super::*;
use crate::documents::{DocumentType, SummaryEmbedding};
use chrono::Utc;
use tempfile::TempDir;

fn sample_document() -> VectorDocument {
    VectorDocument {
        embedding_model: "test-model".to_string(),
        source_hash: "hash-1".to_string(),
        document_type: DocumentType::Resume,
        experience_years: Some(6.0),
        summary: SummaryEmbedding::Single(vec![0.1, 0.2]),
        skills: vec![vec![0.3, 0.4], vec![0.5, 0.6]],
        certifications: Vec::new(),
        responsibilities: vec![vec![0.7, 0.8]],
        degraded_fields: Vec::new(),
        created_at: Utc::now(),
    }
}

#[test]
fn open_creates_directory() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let root = temp_dir.path().join("nested").join("vectors");
    let store = VectorStore::open(&root).expect("should open store");
    assert!(root.is_dir());
    assert_eq!(store.root(), root);
}

#[test]
fn artifact_path_uses_identity() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let store = VectorStore::open(temp_dir.path()).expect("should open store");
    assert_eq!(
        store.artifact_path("resume_alice"),
        temp_dir.path().join("resume_alice.vector.json")
    );
}

#[test]
fn save_then_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let store = VectorStore::open(temp_dir.path()).expect("should open store");
    let document = sample_document();

    let path = store
        .save("resume_alice", &document)
        .expect("should save document");
    assert_eq!(path, store.artifact_path("resume_alice"));

    let loaded = store.load("resume_alice").expect("should load saved document");
    assert_eq!(loaded, document);

    let read = VectorStore::read_document(&path).expect("should read document");
    assert_eq!(read, document);
}

#[test]
fn save_overwrites_and_leaves_no_temp_files() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let store = VectorStore::open(temp_dir.path()).expect("should open store");

    let mut document = sample_document();
    store.save("jd_backend", &document).expect("should save");
    document.source_hash = "hash-2".to_string();
    store.save("jd_backend", &document).expect("should overwrite");

    let loaded = store.load("jd_backend").expect("should load");
    assert_eq!(loaded.source_hash, "hash-2");

    let entries: Vec<_> = fs::read_dir(temp_dir.path())
        .expect("should read dir")
        .map(|entry| entry.expect("should read entry").file_name())
        .collect();
    assert_eq!(entries.len(), 1, "unexpected files: {entries:?}");
}

#[test]
fn missing_artifact_is_cache_miss() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let store = VectorStore::open(temp_dir.path()).expect("should open store");
    assert!(store.load("nobody").is_none());
}

#[test]
fn corrupt_artifact_is_cache_miss_and_backed_up() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let store = VectorStore::open(temp_dir.path()).expect("should open store");
    let path = store.artifact_path("broken");
    fs::write(&path, "{\"embedding_model\": ").expect("should write corrupt artifact");

    assert!(store.load("broken").is_none());
    assert!(!path.exists());
    assert!(path.with_extension("corrupted_backup").exists());
}

#[test]
fn read_document_reports_corruption() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let path = temp_dir.path().join("bad.vector.json");
    fs::write(&path, "not json").expect("should write file");

    let result = VectorStore::read_document(&path);
    assert!(matches!(result, Err(MatchError::Store(_))));

    let missing = VectorStore::read_document(&temp_dir.path().join("missing.vector.json"));
    assert!(matches!(missing, Err(MatchError::Store(_))));
}

#[test]
fn wrong_rank_summary_is_corrupt() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let store = VectorStore::open(temp_dir.path()).expect("should open store");
    let mut value = serde_json::to_value(sample_document()).expect("should serialize");
    value["summary"] = serde_json::json!([[[0.1, 0.2]]]);
    fs::write(
        store.artifact_path("deep"),
        serde_json::to_string(&value).expect("should serialize value"),
    )
    .expect("should write artifact");

    assert!(store.load("deep").is_none());
}

#[test]
fn list_returns_sorted_artifacts_only() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let store = VectorStore::open(temp_dir.path()).expect("should open store");
    let document = sample_document();

    store.save("b_resume", &document).expect("should save");
    store.save("a_jd", &document).expect("should save");
    fs::write(temp_dir.path().join("notes.txt"), "ignored").expect("should write file");

    let listed = store.list().expect("should list");
    assert_eq!(
        listed,
        vec![store.artifact_path("a_jd"), store.artifact_path("b_resume")]
    );
}
