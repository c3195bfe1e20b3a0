// Similarity scoring
// JD-centric and asymmetric: every coverage question asks how well the resume covers the JD


pub mod policy;
pub mod vectors;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::documents::{DocumentType, Field, VectorDocument};
pub use policy::{CoverageFloors, GuardThresholds, PolicyError, ScoringPolicy, ScoringWeights};
pub use vectors::{ShapeError, cosine_similarity, mean_pool};

/// Per-component scores, each in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub summary: f64,
    pub skills: f64,
    pub responsibilities: f64,
    pub certifications: f64,
    pub experience: f64,
}

/// Non-fatal observations attached to a report for human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// The two documents were embedded by different models
    ModelMismatch {
        jd_model: String,
        resume_model: String,
    },
    /// A document was passed on the wrong side of the comparison
    UnexpectedDocumentType {
        expected: DocumentType,
        found: DocumentType,
    },
    /// Fields of an input that failed to embed and score as absent
    DegradedInput {
        document_type: DocumentType,
        fields: Vec<Field>,
    },
    ExperienceMetLowScore {
        final_score: f64,
        threshold: f64,
    },
    LowSummarySimilarity {
        summary_score: f64,
        skills_score: f64,
        threshold: f64,
    },
}

impl fmt::Display for Advisory {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelMismatch {
                jd_model,
                resume_model,
            } => write!(
                f,
                "embedding models differ (JD: {jd_model}, resume: {resume_model}); scores may not be meaningful"
            ),
            Self::UnexpectedDocumentType { expected, found } => write!(
                f,
                "expected a {expected} document on this side of the comparison, got {found}"
            ),
            Self::DegradedInput {
                document_type,
                fields,
            } => {
                let fields: Vec<&str> = fields.iter().map(|field| field.as_str()).collect();
                write!(
                    f,
                    "{document_type} fields failed to embed and score as absent: {}",
                    fields.join(", ")
                )
            }
            Self::ExperienceMetLowScore {
                final_score,
                threshold,
            } => write!(
                f,
                "experience requirement is met but final score {final_score:.1} is below {threshold:.1}"
            ),
            Self::LowSummarySimilarity {
                summary_score,
                skills_score,
                threshold,
            } => write!(
                f,
                "summary similarity {summary_score:.1} is below {threshold:.1} despite skills score {skills_score:.1}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub component_scores: ComponentScores,
    pub final_score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<Advisory>,
}

impl SimilarityReport {
    #[inline]
    pub fn has_model_mismatch(&self) -> bool {
        self.advisories
            .iter()
            .any(|advisory| matches!(advisory, Advisory::ModelMismatch { .. }))
    }
}

/// A comparison that could not be scored because its inputs are inconsistent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot compare JD {jd_hash} with resume {resume_hash}: {source}")]
pub struct ScoringError {
    pub jd_hash: String,
    pub resume_hash: String,
    pub source: ShapeError,
}

#[derive(Debug, Clone, Default)]
pub struct Scorer {
    policy: ScoringPolicy,
}

impl Scorer {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Score with a custom policy.
    ///
    /// The policy must validate: weights in `[0, 1]` summing to 1 keep every
    /// `final_score` within `[0, 100]`.
    #[inline]
    pub fn with_policy(policy: ScoringPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    #[inline]
    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score a resume against a JD.
    ///
    /// The first argument is always treated as the JD side. Documents passed
    /// the other way round are still scored but flagged.
    #[inline]
    pub fn score(
        &self,
        jd: &VectorDocument,
        resume: &VectorDocument,
    ) -> Result<SimilarityReport, ScoringError> {
        let report = self
            .score_components(jd, resume)
            .map_err(|source| ScoringError {
                jd_hash: jd.source_hash.clone(),
                resume_hash: resume.source_hash.clone(),
                source,
            })?;

        for advisory in &report.advisories {
            warn!(
                jd = %jd.source_hash,
                resume = %resume.source_hash,
                "{advisory}"
            );
        }

        Ok(report)
    }

    fn score_components(
        &self,
        jd: &VectorDocument,
        resume: &VectorDocument,
    ) -> Result<SimilarityReport, ShapeError> {
        let jd_dimension = jd.validate()?;
        let resume_dimension = resume.validate()?;
        match (jd_dimension, resume_dimension) {
            (Some(left), Some(right)) if left != right => {
                return Err(ShapeError::DimensionMismatch { left, right });
            }
            _ => {}
        }

        let floors = self.policy.floors;
        let component_scores = ComponentScores {
            summary: summary_score(jd, resume)?,
            skills: coverage_score(&jd.skills, &resume.skills, floors.skills)?,
            responsibilities: coverage_score(
                &jd.responsibilities,
                &resume.responsibilities,
                floors.responsibilities,
            )?,
            certifications: certification_score(
                &jd.certifications,
                &resume.certifications,
                self.policy.certification_match_threshold,
                self.policy.certification_neutral_score,
            )?,
            experience: experience_score(jd.experience_years, resume.experience_years),
        };
        let final_score = self.policy.weights.apply(&component_scores);

        debug!(
            summary = component_scores.summary,
            skills = component_scores.skills,
            responsibilities = component_scores.responsibilities,
            certifications = component_scores.certifications,
            experience = component_scores.experience,
            final_score,
            "Scored pair"
        );

        Ok(SimilarityReport {
            advisories: self.advisories(jd, resume, &component_scores, final_score),
            component_scores,
            final_score,
        })
    }

    fn advisories(
        &self,
        jd: &VectorDocument,
        resume: &VectorDocument,
        scores: &ComponentScores,
        final_score: f64,
    ) -> Vec<Advisory> {
        let mut advisories = Vec::new();

        if jd.embedding_model != resume.embedding_model {
            advisories.push(Advisory::ModelMismatch {
                jd_model: jd.embedding_model.clone(),
                resume_model: resume.embedding_model.clone(),
            });
        }

        for (expected, document) in [(DocumentType::Jd, jd), (DocumentType::Resume, resume)] {
            if document.document_type != expected {
                advisories.push(Advisory::UnexpectedDocumentType {
                    expected,
                    found: document.document_type,
                });
            }
            if !document.is_complete() {
                advisories.push(Advisory::DegradedInput {
                    document_type: document.document_type,
                    fields: document.degraded_fields.clone(),
                });
            }
        }

        let guards = self.policy.guards;
        if scores.experience >= 100.0 && final_score < guards.acceptable_final_score {
            advisories.push(Advisory::ExperienceMetLowScore {
                final_score,
                threshold: guards.acceptable_final_score,
            });
        }

        if scores.skills >= guards.aligned_skills_score
            && scores.summary < guards.low_summary_similarity
        {
            advisories.push(Advisory::LowSummarySimilarity {
                summary_score: scores.summary,
                skills_score: scores.skills,
                threshold: guards.low_summary_similarity,
            });
        }

        advisories
    }
}

/// Score a JD/resume pair under the default policy
#[inline]
pub fn compute_similarity(
    jd: &VectorDocument,
    resume: &VectorDocument,
) -> Result<SimilarityReport, ScoringError> {
    Scorer::new().score(jd, resume)
}

fn to_percentage(similarity: f64) -> f64 {
    (similarity * 100.0).clamp(0.0, 100.0)
}

/// Cosine of the pooled summaries, or 0 when either side has none
fn summary_score(jd: &VectorDocument, resume: &VectorDocument) -> Result<f64, ShapeError> {
    match (jd.summary.pooled()?, resume.summary.pooled()?) {
        (Some(jd_summary), Some(resume_summary)) => Ok(to_percentage(f64::from(
            cosine_similarity(&jd_summary, &resume_summary)?,
        ))),
        _ => Ok(0.0),
    }
}

fn best_match(item: &[f32], candidates: &[Vec<f32>]) -> Result<f64, ShapeError> {
    let mut best = f64::NEG_INFINITY;
    for candidate in candidates {
        best = best.max(f64::from(cosine_similarity(item, candidate)?));
    }
    Ok(best)
}

/// Mean over JD items of the floored best match against resume items.
///
/// A resume item may serve several JD items, and unmatched resume items cost
/// nothing.
#[inline]
pub fn coverage_score(
    jd_items: &[Vec<f32>],
    resume_items: &[Vec<f32>],
    floor: f64,
) -> Result<f64, ShapeError> {
    if jd_items.is_empty() || resume_items.is_empty() {
        return Ok(0.0);
    }

    let mut total = 0.0;
    for item in jd_items {
        total += best_match(item, resume_items)?.max(floor);
    }
    Ok(to_percentage(total / jd_items.len() as f64))
}

/// Percentage of JD certifications matched by any resume certification
#[inline]
pub fn certification_score(
    jd_items: &[Vec<f32>],
    resume_items: &[Vec<f32>],
    threshold: f64,
    neutral_score: f64,
) -> Result<f64, ShapeError> {
    if jd_items.is_empty() || resume_items.is_empty() {
        return Ok(neutral_score);
    }

    let mut matched = 0_usize;
    for item in jd_items {
        if best_match(item, resume_items)? > threshold {
            matched += 1;
        }
    }
    Ok(to_percentage(matched as f64 / jd_items.len() as f64))
}

/// Rule-based experience check; an unstated value on either side scores 0
#[inline]
pub fn experience_score(required_years: Option<f64>, resume_years: Option<f64>) -> f64 {
    match (required_years, resume_years) {
        (Some(required), Some(actual)) if actual >= required => 100.0,
        (Some(required), Some(actual)) => (100.0 * actual / required).clamp(0.0, 100.0),
        _ => 0.0,
    }
}
