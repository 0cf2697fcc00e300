//! Session score aggregation and performance labels.

use serde::{Deserialize, Serialize};

use crate::error::{BlueprintError, DegradationKind};
use crate::model::{Section, TaskResult, TaskType};
use crate::scale::{ReportingScale, ScoreScale};

/// One step of a performance label table: scores `>= min` earn `label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub label: String,
}

/// A monotonic step function from overall score to performance label.
///
/// Thresholds are evaluated from highest down with `>=`, so a score sitting
/// exactly on a boundary belongs to the higher band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandTable {
    bands: Vec<Band>,
    floor_label: String,
}

impl BandTable {
    pub fn new(
        mut bands: Vec<Band>,
        floor_label: impl Into<String>,
    ) -> Result<Self, BlueprintError> {
        if let Some(bad) = bands.iter().find(|b| !b.min.is_finite()) {
            return Err(BlueprintError::InvalidBand(bad.min));
        }
        bands.sort_by(|a, b| b.min.total_cmp(&a.min));
        if let Some(dup) = bands.windows(2).find(|w| w[0].min == w[1].min) {
            return Err(BlueprintError::InvalidBand(dup[0].min));
        }
        Ok(Self {
            bands,
            floor_label: floor_label.into(),
        })
    }

    fn from_static(bands: &[(f64, &str)], floor_label: &str) -> Self {
        Self {
            bands: bands
                .iter()
                .map(|(min, label)| Band {
                    min: *min,
                    label: (*label).to_string(),
                })
                .collect(),
            floor_label: floor_label.to_string(),
        }
    }

    /// Ten IELTS-style bands for a 0–9 half-point total.
    pub fn ielts() -> Self {
        Self::from_static(
            &[
                (8.5, "Expert User (Band 9)"),
                (7.5, "Very Good User (Band 8)"),
                (6.5, "Good User (Band 7)"),
                (5.5, "Competent User (Band 6)"),
                (4.5, "Modest User (Band 5)"),
                (3.5, "Limited User (Band 4)"),
                (2.5, "Extremely Limited User (Band 3)"),
                (1.5, "Intermittent User (Band 2)"),
                (0.5, "Non User (Band 1)"),
            ],
            "Did not attempt (Band 0)",
        )
    }

    /// Six TOEFL-style rubric levels for a 0–5 integer total.
    pub fn toefl() -> Self {
        Self::from_static(
            &[
                (5.0, "Excellent"),
                (4.0, "Good"),
                (3.0, "Fair"),
                (2.0, "Limited"),
                (1.0, "Weak"),
            ],
            "Off-topic",
        )
    }

    /// Labels for the 0–10 practice total.
    pub fn practice() -> Self {
        Self::from_static(
            &[
                (9.0, "Excellent"),
                (7.0, "Good"),
                (5.0, "Fair"),
                (3.0, "Limited"),
                (1.0, "Weak"),
            ],
            "Not attempted",
        )
    }

    pub fn label(&self, score: f64) -> &str {
        self.bands
            .iter()
            .find(|b| score >= b.min)
            .map(|b| b.label.as_str())
            .unwrap_or(&self.floor_label)
    }

    /// Label of the highest band.
    pub fn top_label(&self) -> &str {
        self.bands
            .first()
            .map(|b| b.label.as_str())
            .unwrap_or(&self.floor_label)
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn floor_label(&self) -> &str {
        &self.floor_label
    }
}

/// Per-task entry of the session feedback payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFeedback {
    pub ordinal: u32,
    pub section: Section,
    pub task_type: TaskType,
    pub native_score: f64,
    pub scale: ScoreScale,
    pub normalized_score: f64,
    pub question_count: usize,
    pub feedback: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<DegradationKind>,
}

impl From<&TaskResult> for TaskFeedback {
    fn from(result: &TaskResult) -> Self {
        Self {
            ordinal: result.ordinal,
            section: result.section,
            task_type: result.task_type,
            native_score: result.native_score,
            scale: result.scale_used,
            normalized_score: result.normalized_score,
            question_count: result.question_ids.len(),
            feedback: result.feedback.clone(),
            degradation: result.degradation,
        }
    }
}

/// Folded session outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub overall_score: f64,
    pub performance_label: String,
    pub per_task_feedback: Vec<TaskFeedback>,
}

/// Fold task results into an overall score and label.
///
/// The overall score is the mean normalized score re-expressed on the
/// reporting scale; the label is looked up on that rounded value. Task
/// feedback passes through unchanged and in input order. Pure: identical
/// input yields bit-identical output.
pub fn aggregate(
    results: &[TaskResult],
    reporting: &ReportingScale,
    bands: &BandTable,
) -> Aggregate {
    let mean = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.normalized_score).sum::<f64>() / results.len() as f64
    };
    let overall_score = reporting.rescale(mean);

    Aggregate {
        overall_score,
        performance_label: bands.label(overall_score).to_string(),
        per_task_feedback: results.iter().map(TaskFeedback::from).collect(),
    }
}
