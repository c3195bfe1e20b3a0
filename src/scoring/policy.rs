// Tunable scoring constants
// Loaded from the `[scoring]` table of config.toml; every value has a documented default

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ComponentScores;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Contribution of each component to the final score.
///
/// Certifications are reported but carry no weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub summary: f64,
    pub skills: f64,
    pub responsibilities: f64,
    pub experience: f64,
}

impl ScoringWeights {
    pub const DEFAULT: Self = Self {
        summary: 0.20,
        skills: 0.35,
        responsibilities: 0.25,
        experience: 0.20,
    };

    #[inline]
    pub fn total(&self) -> f64 {
        self.summary + self.skills + self.responsibilities + self.experience
    }

    /// Weighted sum of the component scores
    #[inline]
    pub fn apply(&self, scores: &ComponentScores) -> f64 {
        self.summary.mul_add(
            scores.summary,
            self.skills.mul_add(
                scores.skills,
                self.responsibilities
                    .mul_add(scores.responsibilities, self.experience * scores.experience),
            ),
        )
    }

    fn validate(&self) -> Result<(), PolicyError> {
        for (name, weight) in [
            ("summary", self.summary),
            ("skills", self.skills),
            ("responsibilities", self.responsibilities),
            ("experience", self.experience),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(PolicyError::InvalidWeight(name, weight));
            }
        }

        let total = self.total();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PolicyError::WeightsDoNotSumToOne(total));
        }
        Ok(())
    }
}

impl Default for ScoringWeights {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Minimum per-item best match, as a raw cosine, applied before averaging
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageFloors {
    pub skills: f64,
    pub responsibilities: f64,
}

impl Default for CoverageFloors {
    #[inline]
    fn default() -> Self {
        Self {
            skills: 0.55,
            responsibilities: 0.60,
        }
    }
}

/// Thresholds for the diagnostics attached to a report; they never change a score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardThresholds {
    /// Final score below which a fully met experience requirement is suspicious
    pub acceptable_final_score: f64,
    /// Summary score below which a skill-aligned pair is suspicious
    pub low_summary_similarity: f64,
    /// Skills score at which a pair counts as aligned
    pub aligned_skills_score: f64,
}

impl Default for GuardThresholds {
    #[inline]
    fn default() -> Self {
        Self {
            acceptable_final_score: 50.0,
            low_summary_similarity: 40.0,
            aligned_skills_score: 75.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub weights: ScoringWeights,
    pub floors: CoverageFloors,
    /// Raw cosine a resume certification must exceed to match a JD certification
    pub certification_match_threshold: f64,
    /// Score used when either side lists no certifications
    pub certification_neutral_score: f64,
    pub guards: GuardThresholds,
}

impl Default for ScoringPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            weights: ScoringWeights::DEFAULT,
            floors: CoverageFloors::default(),
            certification_match_threshold: 0.75,
            certification_neutral_score: 50.0,
            guards: GuardThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("Invalid {0} weight: {1} (must be between 0 and 1)")]
    InvalidWeight(&'static str, f64),
    #[error("Scoring weights must sum to 1.0, got {0}")]
    WeightsDoNotSumToOne(f64),
    #[error("Invalid {0} floor: {1} (must be between 0 and 1)")]
    InvalidFloor(&'static str, f64),
    #[error("Invalid certification threshold: {0} (must be between 0 and 1)")]
    InvalidCertificationThreshold(f64),
    #[error("Invalid {0}: {1} (must be between 0 and 100)")]
    InvalidScore(&'static str, f64),
}

impl ScoringPolicy {
    #[inline]
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.weights.validate()?;

        for (name, floor) in [
            ("skills", self.floors.skills),
            ("responsibilities", self.floors.responsibilities),
        ] {
            if !(0.0..=1.0).contains(&floor) {
                return Err(PolicyError::InvalidFloor(name, floor));
            }
        }

        if !(0.0..=1.0).contains(&self.certification_match_threshold) {
            return Err(PolicyError::InvalidCertificationThreshold(
                self.certification_match_threshold,
            ));
        }

        for (name, score) in [
            (
                "certification neutral score",
                self.certification_neutral_score,
            ),
            (
                "acceptable final score",
                self.guards.acceptable_final_score,
            ),
            (
                "low summary similarity",
                self.guards.low_summary_similarity,
            ),
            ("aligned skills score", self.guards.aligned_skills_score),
        ] {
            if !(0.0..=100.0).contains(&score) {
                return Err(PolicyError::InvalidScore(name, score));
            }
        }

        Ok(())
    }
}
