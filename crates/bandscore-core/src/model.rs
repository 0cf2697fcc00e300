//! Core data model types for bandscore.
//!
//! These are the types shared by the validator, the scorer adapter, the
//! aggregator and the session state machine: task kinds, submissions and
//! the immutable per-task results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DegradationKind;
use crate::scale::ScoreScale;

/// Identifier of a question in the external content store.
pub type QuestionId = u64;

/// Test section a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Speaking,
    Writing,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Speaking => write!(f, "speaking"),
            Section::Writing => write!(f, "writing"),
        }
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "speaking" => Ok(Section::Speaking),
            "writing" => Ok(Section::Writing),
            other => Err(format!("unknown section: {other}")),
        }
    }
}

/// Task type within a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Independent,
    Integrated,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Independent => write!(f, "independent"),
            TaskType::Integrated => write!(f, "integrated"),
        }
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "independent" => Ok(TaskType::Independent),
            "integrated" => Ok(TaskType::Integrated),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// The `(section, task_type)` pair of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKind {
    pub section: Section,
    pub task_type: TaskType,
}

impl TaskKind {
    pub const fn new(section: Section, task_type: TaskType) -> Self {
        Self { section, task_type }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.section, self.task_type)
    }
}

/// What a blueprint slot accepts: a section, and optionally a pinned task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKind {
    pub section: Section,
    pub task_type: Option<TaskType>,
}

impl SlotKind {
    pub const fn new(section: Section, task_type: Option<TaskType>) -> Self {
        Self { section, task_type }
    }

    pub fn accepts(&self, kind: TaskKind) -> bool {
        self.section == kind.section && self.task_type.is_none_or(|t| t == kind.task_type)
    }

    /// The concrete kind, using `fallback` when no task type is pinned.
    pub fn or_task_type(self, fallback: TaskType) -> TaskKind {
        TaskKind::new(self.section, self.task_type.unwrap_or(fallback))
    }
}

impl From<TaskKind> for SlotKind {
    fn from(kind: TaskKind) -> Self {
        Self::new(kind.section, Some(kind.task_type))
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.task_type {
            Some(task_type) => write!(f, "{} {task_type}", self.section),
            None => write!(f, "{} (any task type)", self.section),
        }
    }
}

/// One answered question inside a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerItem {
    pub question_id: QuestionId,
    /// Free-form answer text.
    #[serde(rename = "answer", default)]
    pub answer_text: String,
}

impl AnswerItem {
    pub fn new(question_id: QuestionId, answer_text: impl Into<String>) -> Self {
        Self {
            question_id,
            answer_text: answer_text.into(),
        }
    }
}

/// One task's worth of user input, as submitted by the client.
///
/// Transient: only the derived [`TaskResult`] is ever persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    #[serde(alias = "task_id")]
    pub ordinal: u32,
    pub section: Section,
    pub task_type: TaskType,
    #[serde(default)]
    pub answers: Vec<AnswerItem>,
}

impl TaskSubmission {
    pub fn new(ordinal: u32, kind: TaskKind, answers: Vec<AnswerItem>) -> Self {
        Self {
            ordinal,
            section: kind.section,
            task_type: kind.task_type,
            answers,
        }
    }

    pub fn kind(&self) -> TaskKind {
        TaskKind::new(self.section, self.task_type)
    }

    /// Answers whose trimmed text is non-empty.
    pub fn answered(&self) -> impl Iterator<Item = &AnswerItem> {
        self.answers
            .iter()
            .filter(|a| !a.answer_text.trim().is_empty())
    }

    /// Whether at least one answer carries text.
    pub fn has_answers(&self) -> bool {
        self.answered().next().is_some()
    }

    /// All answer texts, trimmed and joined with a single space.
    ///
    /// A task is scored as one unit, never per question.
    pub fn combined_text(&self) -> String {
        self.answered()
            .map(|a| a.answer_text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The immutable outcome of scoring one submitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub ordinal: u32,
    pub section: Section,
    pub task_type: TaskType,
    #[serde(default)]
    pub question_ids: Vec<QuestionId>,
    #[serde(default)]
    pub raw_answers: Vec<AnswerItem>,
    /// Score rescaled into `[0, 1]`.
    pub normalized_score: f64,
    /// Score on the backend's own scale.
    pub native_score: f64,
    pub scale_used: ScoreScale,
    #[serde(default)]
    pub feedback: Vec<String>,
    /// Set when the backend failed and the worst score was substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<DegradationKind>,
}

impl TaskResult {
    pub fn kind(&self) -> TaskKind {
        TaskKind::new(self.section, self.task_type)
    }

    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }
}
