// Structured document records and their embedded counterparts
// Records come from the upstream extraction stage; vector documents are what we cache and score


use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::scoring::vectors::ShapeError;

/// Bumped whenever the hashed representation of a record changes
const SOURCE_HASH_VERSION: &[u8] = b"resume-match/record/v1";

/// Hex characters of the directory digest appended to record identities
const IDENTITY_DIGEST_LEN: usize = 8;

/// Which side of a match a document belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Jd,
    Resume,
}

impl DocumentType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jd => "jd",
            Self::Resume => "resume",
        }
    }

    /// Guess the document type from a file name.
    ///
    /// Callers use this when a record was extracted without a `document_type`;
    /// the conversion engine itself never guesses.
    #[inline]
    pub fn infer_from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_string_lossy().to_lowercase();
        let tokens: Vec<&str> = stem
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| !token.is_empty())
            .collect();

        if tokens.iter().any(|t| matches!(*t, "jd" | "job")) {
            Some(Self::Jd)
        } else if tokens.iter().any(|t| matches!(*t, "resume" | "cv")) {
            Some(Self::Resume)
        } else {
            None
        }
    }

    fn parse(raw: &str) -> Result<Self, RecordError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "jd" => Ok(Self::Jd),
            "resume" => Ok(Self::Resume),
            _ => Err(RecordError::UnknownDocumentType(raw.to_string())),
        }
    }
}

impl fmt::Display for DocumentType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedded fields of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Summary,
    Skills,
    Certifications,
    Responsibilities,
}

impl Field {
    pub const LISTS: [Self; 3] = [Self::Skills, Self::Certifications, Self::Responsibilities];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Skills => "skills",
            Self::Certifications => "certifications",
            Self::Responsibilities => "responsibilities",
        }
    }
}

impl fmt::Display for Field {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a structured record is rejected as input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("could not read record: {0}")]
    Unreadable(String),
    #[error("malformed JSON: {0}")]
    Json(String),
    #[error("record must be a JSON object")]
    NotAnObject,
    #[error("document_type is missing and could not be inferred")]
    MissingDocumentType,
    #[error("unknown document_type '{0}' (expected 'jd' or 'resume')")]
    UnknownDocumentType(String),
    #[error("experience_years must be a finite non-negative number, got {0}")]
    InvalidExperience(String),
    #[error("summary must be a string")]
    InvalidSummary,
    #[error("{0} must be a list of text items")]
    InvalidList(Field),
}

/// Normalized output of the extraction stage for one resume or JD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub document_type: DocumentType,
    pub summary: String,
    pub experience_years: Option<f64>,
    pub skills: Vec<String>,
    pub certifications: Vec<String>,
    pub responsibilities: Vec<String>,
}

impl StructuredRecord {
    /// Parse and normalize an extracted record.
    ///
    /// Missing or null optional fields become empty, list items are trimmed and
    /// empty ones dropped. `fallback_type` is only consulted when the record has
    /// no `document_type` of its own.
    #[inline]
    pub fn from_json(text: &str, fallback_type: Option<DocumentType>) -> Result<Self, RecordError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| RecordError::Json(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(RecordError::NotAnObject);
        };

        let document_type = match map.get("document_type") {
            None | Some(Value::Null) => fallback_type.ok_or(RecordError::MissingDocumentType)?,
            Some(Value::String(raw)) => DocumentType::parse(raw)?,
            Some(other) => return Err(RecordError::UnknownDocumentType(other.to_string())),
        };

        let summary = match map.get("summary") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.trim().to_string(),
            Some(_) => return Err(RecordError::InvalidSummary),
        };

        Ok(Self {
            document_type,
            summary,
            experience_years: parse_experience(map.get("experience_years"))?,
            skills: text_items(&map, Field::Skills)?,
            certifications: text_items(&map, Field::Certifications)?,
            responsibilities: text_items(&map, Field::Responsibilities)?,
        })
    }

    #[inline]
    pub fn items(&self, field: Field) -> &[String] {
        match field {
            Field::Summary => &[],
            Field::Skills => &self.skills,
            Field::Certifications => &self.certifications,
            Field::Responsibilities => &self.responsibilities,
        }
    }

    /// Content fingerprint of this record under a given embedding model.
    ///
    /// Any change to a field or to the model identifier yields a different hash.
    #[inline]
    pub fn source_hash(&self, embedding_model: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(SOURCE_HASH_VERSION);
        hash_text(&mut hasher, self.document_type.as_str());
        hash_text(&mut hasher, &self.summary);
        match self.experience_years {
            Some(years) => {
                hasher.update(&[1]);
                hasher.update(&years.to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        for field in Field::LISTS {
            let items = self.items(field);
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                hash_text(&mut hasher, item);
            }
        }
        hash_text(&mut hasher, embedding_model);
        hasher.finalize().to_hex().to_string()
    }
}

fn hash_text(hasher: &mut blake3::Hasher, text: &str) {
    hasher.update(&(text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

fn parse_experience(value: Option<&Value>) -> Result<Option<f64>, RecordError> {
    let years = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) if text.trim().is_empty() => return Ok(None),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match years {
        Some(years) if years.is_finite() && years >= 0.0 => Ok(Some(years)),
        _ => Err(RecordError::InvalidExperience(
            value.map_or_else(String::new, Value::to_string),
        )),
    }
}

fn text_items(map: &Map<String, Value>, field: Field) -> Result<Vec<String>, RecordError> {
    let push = |items: &mut Vec<String>, value: &Value| -> Result<(), RecordError> {
        match value {
            Value::Null => {}
            Value::String(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    items.push(text.to_string());
                }
            }
            Value::Number(number) => items.push(number.to_string()),
            _ => return Err(RecordError::InvalidList(field)),
        }
        Ok(())
    };

    let mut items = Vec::new();
    match map.get(field.as_str()) {
        None | Some(Value::Null) => {}
        Some(Value::Array(values)) => {
            for value in values {
                push(&mut items, value)?;
            }
        }
        // A lone string is a one-item list
        Some(value @ Value::String(_)) => push(&mut items, value)?,
        Some(_) => return Err(RecordError::InvalidList(field)),
    }
    Ok(items)
}

/// Readable name for a record loaded from `path`, derived from its file stem
#[inline]
pub fn record_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned());
    let name: String = stem
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || matches!(c, '/' | '\\') {
                '_'
            } else {
                c
            }
        })
        .collect();

    if name.is_empty() {
        "record".to_string()
    } else {
        name
    }
}

/// Stable artifact identity for a record loaded from `path`.
///
/// Records with the same file stem in different directories get different
/// identities, so they never share a store slot.
#[inline]
pub fn record_identity(path: &Path) -> String {
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let parent = resolved.parent().unwrap_or_else(|| Path::new(""));
    let digest: String = blake3::hash(parent.as_os_str().as_encoded_bytes())
        .to_hex()
        .chars()
        .take(IDENTITY_DIGEST_LEN)
        .collect();

    format!("{}-{digest}", record_name(path))
}

/// Embedding of a document summary.
///
/// Long summaries may be embedded as several chunks; scoring pools those into a
/// single vector. An absent summary carries no signal at all and is never
/// represented as a zero vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SummaryEmbedding {
    #[default]
    Absent,
    Single(Vec<f32>),
    Pooled(Vec<Vec<f32>>),
}

impl SummaryEmbedding {
    #[inline]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Build from however many chunk vectors the embedder produced
    #[inline]
    pub fn from_chunks(mut chunks: Vec<Vec<f32>>) -> Self {
        match chunks.len() {
            0 => Self::Absent,
            1 => chunks.pop().map_or(Self::Absent, Self::Single),
            _ => Self::Pooled(chunks),
        }
    }

    #[inline]
    pub fn vectors(&self) -> Vec<&[f32]> {
        match self {
            Self::Absent => Vec::new(),
            Self::Single(vector) => vec![vector.as_slice()],
            Self::Pooled(chunks) => chunks.iter().map(Vec::as_slice).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum SummaryReprRef<'a> {
    Flat(&'a [f32]),
    Nested(&'a [Vec<f32>]),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SummaryRepr {
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
}

impl Serialize for SummaryEmbedding {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent => SummaryReprRef::Flat(&[]).serialize(serializer),
            Self::Single(vector) => SummaryReprRef::Flat(vector).serialize(serializer),
            Self::Pooled(chunks) => SummaryReprRef::Nested(chunks).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SummaryEmbedding {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let summary = match Option::<SummaryRepr>::deserialize(deserializer)? {
            None => Self::Absent,
            Some(SummaryRepr::Flat(vector)) if vector.is_empty() => Self::Absent,
            Some(SummaryRepr::Flat(vector)) => Self::Single(vector),
            Some(SummaryRepr::Nested(chunks)) => Self::from_chunks(chunks),
        };
        Ok(summary)
    }
}

/// Embedded, hashed and cacheable form of a [`StructuredRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub embedding_model: String,
    pub source_hash: String,
    pub document_type: DocumentType,
    pub experience_years: Option<f64>,
    #[serde(default)]
    pub summary: SummaryEmbedding,
    #[serde(default)]
    pub skills: Vec<Vec<f32>>,
    #[serde(default)]
    pub certifications: Vec<Vec<f32>>,
    #[serde(default)]
    pub responsibilities: Vec<Vec<f32>>,
    /// Fields whose embedding failed and were stored as absent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_fields: Vec<Field>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl VectorDocument {
    #[inline]
    pub fn items(&self, field: Field) -> &[Vec<f32>] {
        match field {
            Field::Summary => &[],
            Field::Skills => &self.skills,
            Field::Certifications => &self.certifications,
            Field::Responsibilities => &self.responsibilities,
        }
    }

    /// Whether this document was produced from `source_hash` under `embedding_model`
    #[inline]
    pub fn matches_source(&self, source_hash: &str, embedding_model: &str) -> bool {
        self.source_hash == source_hash && self.embedding_model == embedding_model
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.degraded_fields.is_empty()
    }

    /// Check everything scoring relies on and return the vector dimensionality.
    ///
    /// Artifacts can be edited by hand, so values validated when the record
    /// was parsed are checked again here.
    #[inline]
    pub fn validate(&self) -> Result<Option<usize>, ShapeError> {
        match self.experience_years {
            Some(years) if !years.is_finite() || years < 0.0 => {
                Err(ShapeError::InvalidExperience(years.to_string()))
            }
            _ => self.dimension(),
        }
    }

    /// Dimensionality shared by every vector in the document.
    ///
    /// Returns `Ok(None)` when the document holds no vectors at all.
    #[inline]
    pub fn dimension(&self) -> Result<Option<usize>, ShapeError> {
        let mut expected: Option<usize> = None;
        let summary = self.summary.vectors();
        let fields = std::iter::once((Field::Summary, summary)).chain(
            Field::LISTS
                .into_iter()
                .map(|field| (field, self.items(field).iter().map(Vec::as_slice).collect())),
        );

        for (field, vectors) in fields {
            for vector in vectors {
                if vector.is_empty() {
                    return Err(ShapeError::EmptyVector { field });
                }
                match expected {
                    None => expected = Some(vector.len()),
                    Some(dim) if dim != vector.len() => {
                        return Err(ShapeError::InconsistentDimension {
                            field,
                            expected: dim,
                            found: vector.len(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(expected)
    }
}
