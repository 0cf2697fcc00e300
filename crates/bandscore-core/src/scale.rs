//! Native score scales and reporting scales.
//!
//! Every backend score is normalized into `[0, 1]` before aggregation, so
//! tasks scored on different native scales can be averaged together. The
//! session total is then re-expressed on the blueprint's reporting scale.

use serde::{Deserialize, Serialize};

use crate::error::BlueprintError;

/// A backend's native score range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    /// Integer scores 0–5 (TOEFL-style rubric).
    ZeroToFive,
    /// Half-point scores 0–9 (IELTS-style band).
    #[default]
    ZeroToNine,
}

impl ScoreScale {
    pub fn min(self) -> f64 {
        0.0
    }

    pub fn max(self) -> f64 {
        match self {
            ScoreScale::ZeroToFive => 5.0,
            ScoreScale::ZeroToNine => 9.0,
        }
    }

    /// Whether `score` lies inside the closed range of this scale.
    pub fn contains(self, score: f64) -> bool {
        score.is_finite() && score >= self.min() && score <= self.max()
    }

    /// Snap a score to the scale's granularity.
    pub fn quantize(self, score: f64) -> f64 {
        match self {
            ScoreScale::ZeroToFive => score.round(),
            ScoreScale::ZeroToNine => round_half(score),
        }
    }

    /// Rescale into `[0, 1]`, clamping out-of-range input first.
    pub fn normalize(self, native: f64) -> f64 {
        let (min, max) = (self.min(), self.max());
        (native.clamp(min, max) - min) / (max - min)
    }

    /// Re-derive a score from another scale onto this one.
    ///
    /// A raw regressor output of 3.2 on 0–5 becomes 5.76 and then 6.0 on 0–9.
    pub fn convert_from(self, from: ScoreScale, score: f64) -> f64 {
        let normalized = from.normalize(score);
        self.quantize(self.min() + normalized * (self.max() - self.min()))
    }
}

impl std::fmt::Display for ScoreScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreScale::ZeroToFive => write!(f, "0-5"),
            ScoreScale::ZeroToNine => write!(f, "0-9"),
        }
    }
}

/// Round to the nearest half point.
pub fn round_half(score: f64) -> f64 {
    (score * 2.0).round() / 2.0
}

/// Rounding applied to the reported session total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Integer,
    HalfPoint,
    Tenth,
}

/// The scale a blueprint variant reports its overall score on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportingScale {
    #[serde(default)]
    pub min: f64,
    pub max: f64,
    pub granularity: Granularity,
}

impl ReportingScale {
    pub fn new(max: f64, granularity: Granularity) -> Result<Self, BlueprintError> {
        Self::with_range(0.0, max, granularity)
    }

    pub fn with_range(
        min: f64,
        max: f64,
        granularity: Granularity,
    ) -> Result<Self, BlueprintError> {
        if !(min.is_finite() && max.is_finite() && max > min) {
            return Err(BlueprintError::InvalidReportingScale { min, max });
        }
        Ok(Self {
            min,
            max,
            granularity,
        })
    }

    /// Map a normalized `[0, 1]` value onto this scale and round it.
    pub fn rescale(&self, normalized: f64) -> f64 {
        self.round(self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min))
    }

    pub fn round(&self, score: f64) -> f64 {
        match self.granularity {
            Granularity::Integer => score.round(),
            Granularity::HalfPoint => round_half(score),
            Granularity::Tenth => (score * 10.0).round() / 10.0,
        }
    }

    /// Render a score with the precision of this scale ("7.5", "4").
    pub fn format(&self, score: f64) -> String {
        match self.granularity {
            Granularity::Integer => format!("{score:.0}"),
            Granularity::HalfPoint | Granularity::Tenth => format!("{score:.1}"),
        }
    }
}
