//! Test blueprints and submission validation.
//!
//! A blueprint is the ordered set of task slots a session must be answered
//! against, together with the reporting scale and label table its total is
//! expressed in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::BandTable;
use crate::error::{BlueprintError, ValidationError};
use crate::model::{Section, SlotKind, TaskKind, TaskSubmission, TaskType};
use crate::scale::{Granularity, ReportingScale};

/// How strictly submissions must follow the slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlueprintMode {
    /// Ordinal, section and task type must match slot by slot.
    Strict,
    /// Any ordering that covers the slot multiset; ordinals follow submission order.
    Flexible,
}

/// One required task slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintSlot {
    pub ordinal: u32,
    pub section: Section,
    /// `None` accepts either task type within the section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    /// Prompt shown to the candidate, if the content store provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl BlueprintSlot {
    pub fn new(ordinal: u32, section: Section, task_type: TaskType) -> Self {
        Self {
            ordinal,
            section,
            task_type: Some(task_type),
            prompt: None,
        }
    }

    /// A slot that only constrains the section.
    pub fn any_type(ordinal: u32, section: Section) -> Self {
        Self {
            ordinal,
            section,
            task_type: None,
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn kind(&self) -> SlotKind {
        SlotKind::new(self.section, self.task_type)
    }
}

/// An immutable test blueprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskBlueprint {
    id: String,
    name: String,
    mode: BlueprintMode,
    slots: Vec<BlueprintSlot>,
    reporting: ReportingScale,
    bands: BandTable,
}

impl TaskBlueprint {
    /// Build a blueprint, checking that ordinals run 1, 2, 3, ... in order.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mode: BlueprintMode,
        slots: Vec<BlueprintSlot>,
        reporting: ReportingScale,
        bands: BandTable,
    ) -> Result<Self, BlueprintError> {
        let id = id.into();
        if slots.is_empty() {
            return Err(BlueprintError::Empty(id));
        }
        for (position, slot) in slots.iter().enumerate() {
            let expected = position as u32 + 1;
            if slot.ordinal != expected {
                return Err(BlueprintError::NonContiguousOrdinal {
                    id,
                    position,
                    ordinal: slot.ordinal,
                    expected,
                });
            }
        }
        Ok(Self {
            id,
            name: name.into(),
            mode,
            slots,
            reporting,
            bands,
        })
    }

    /// The formal 6-task test, reported as an IELTS-style band.
    pub fn full() -> Self {
        Self {
            id: "full".into(),
            name: "Speaking & Writing Full Test".into(),
            mode: BlueprintMode::Strict,
            slots: full_test_slots(),
            reporting: ReportingScale {
                min: 0.0,
                max: 9.0,
                granularity: Granularity::HalfPoint,
            },
            bands: BandTable::ielts(),
        }
    }

    /// The same 6 tasks reported on the 0–5 TOEFL rubric.
    pub fn classic() -> Self {
        Self {
            id: "classic".into(),
            name: "Speaking & Writing Full Test (0-5 rubric)".into(),
            mode: BlueprintMode::Strict,
            slots: full_test_slots(),
            reporting: ReportingScale {
                min: 0.0,
                max: 5.0,
                granularity: Granularity::Integer,
            },
            bands: BandTable::toefl(),
        }
    }

    /// Ten mixed practice tasks, five per section and of either task type,
    /// reported on 0–10.
    pub fn practice() -> Self {
        let slots = (1..=10)
            .map(|ordinal| {
                let section = if ordinal <= 5 {
                    Section::Speaking
                } else {
                    Section::Writing
                };
                BlueprintSlot::any_type(ordinal, section)
            })
            .collect();
        Self {
            id: "practice".into(),
            name: "Practice Test".into(),
            mode: BlueprintMode::Flexible,
            slots,
            reporting: ReportingScale {
                min: 0.0,
                max: 10.0,
                granularity: Granularity::Tenth,
            },
            bands: BandTable::practice(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> BlueprintMode {
        self.mode
    }

    pub fn slots(&self) -> &[BlueprintSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn reporting(&self) -> &ReportingScale {
        &self.reporting
    }

    pub fn bands(&self) -> &BandTable {
        &self.bands
    }

    /// Validate a submission list against this blueprint.
    pub fn validate<'a>(
        &'a self,
        submissions: &'a [TaskSubmission],
    ) -> Result<Vec<ResolvedTask<'a>>, ValidationError> {
        validate(self, submissions)
    }
}

fn full_test_slots() -> Vec<BlueprintSlot> {
    use Section::{Speaking, Writing};
    use TaskType::{Independent, Integrated};
    [
        (Speaking, Independent),
        (Speaking, Integrated),
        (Speaking, Integrated),
        (Speaking, Integrated),
        (Writing, Integrated),
        (Writing, Independent),
    ]
    .iter()
    .enumerate()
    .map(|(i, (section, task_type))| BlueprintSlot::new(i as u32 + 1, *section, *task_type))
    .collect()
}

/// A submission paired with the blueprint slot it was matched to.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTask<'a> {
    /// Ordinal the resulting task result carries.
    pub ordinal: u32,
    pub slot: &'a BlueprintSlot,
    pub submission: &'a TaskSubmission,
}

impl ResolvedTask<'_> {
    /// The submitted kind, which the slot has already accepted.
    pub fn kind(&self) -> TaskKind {
        self.submission.kind()
    }
}

/// Validate submissions against a blueprint.
///
/// Pure and fail-fast: the first offending task is reported and nothing
/// after it is inspected. On success the submissions come back paired with
/// their slots, in submission order.
pub fn validate<'a>(
    blueprint: &'a TaskBlueprint,
    submissions: &'a [TaskSubmission],
) -> Result<Vec<ResolvedTask<'a>>, ValidationError> {
    if submissions.len() != blueprint.len() {
        return Err(ValidationError::TaskCountMismatch {
            expected: blueprint.len(),
            actual: submissions.len(),
        });
    }

    match blueprint.mode {
        BlueprintMode::Strict => validate_strict(blueprint, submissions),
        BlueprintMode::Flexible => validate_flexible(blueprint, submissions),
    }
}

fn validate_strict<'a>(
    blueprint: &'a TaskBlueprint,
    submissions: &'a [TaskSubmission],
) -> Result<Vec<ResolvedTask<'a>>, ValidationError> {
    let mut resolved = Vec::with_capacity(submissions.len());
    for (slot, submission) in blueprint.slots.iter().zip(submissions) {
        if submission.ordinal != slot.ordinal || !slot.kind().accepts(submission.kind()) {
            return Err(ValidationError::TaskStructureMismatch {
                ordinal: slot.ordinal,
                expected: slot.kind(),
                actual: submission.kind(),
                submitted_ordinal: submission.ordinal,
            });
        }
        if !submission.has_answers() {
            return Err(ValidationError::EmptyTaskAnswers {
                ordinal: slot.ordinal,
            });
        }
        resolved.push(ResolvedTask {
            ordinal: slot.ordinal,
            slot,
            submission,
        });
    }
    Ok(resolved)
}

fn validate_flexible<'a>(
    blueprint: &'a TaskBlueprint,
    submissions: &'a [TaskSubmission],
) -> Result<Vec<ResolvedTask<'a>>, ValidationError> {
    // Unclaimed slots per kind, earliest ordinal first.
    let mut open: BTreeMap<SlotKey, Vec<&BlueprintSlot>> = BTreeMap::new();
    for slot in blueprint.slots.iter().rev() {
        open.entry(slot_key(slot.kind())).or_default().push(slot);
    }

    let mut resolved = Vec::with_capacity(submissions.len());
    for (position, submission) in submissions.iter().enumerate() {
        let ordinal = position as u32 + 1;
        // A slot pinned to this task type is taken before a section-only one.
        let kind = submission.kind();
        let Some(slot) = claim(&mut open, slot_key(kind.into()))
            .or_else(|| claim(&mut open, slot_key(SlotKind::new(kind.section, None))))
        else {
            let expected = first_open_slot(&open)
                .map(|s| s.kind())
                .unwrap_or_else(|| kind.into());
            return Err(ValidationError::TaskStructureMismatch {
                ordinal,
                expected,
                actual: submission.kind(),
                submitted_ordinal: submission.ordinal,
            });
        };
        if !submission.has_answers() {
            return Err(ValidationError::EmptyTaskAnswers { ordinal });
        }
        resolved.push(ResolvedTask {
            ordinal,
            slot,
            submission,
        });
    }
    Ok(resolved)
}

type SlotKey = (u8, Option<u8>);

fn slot_key(kind: SlotKind) -> SlotKey {
    (kind.section as u8, kind.task_type.map(|t| t as u8))
}

fn claim<'a>(
    open: &mut BTreeMap<SlotKey, Vec<&'a BlueprintSlot>>,
    key: SlotKey,
) -> Option<&'a BlueprintSlot> {
    open.get_mut(&key).and_then(|slots| slots.pop())
}

fn first_open_slot<'a>(
    open: &BTreeMap<SlotKey, Vec<&'a BlueprintSlot>>,
) -> Option<&'a BlueprintSlot> {
    open.values()
        .filter_map(|slots| slots.last().copied())
        .min_by_key(|slot| slot.ordinal)
}

/// Blueprint variants available to `start-session`, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct BlueprintCatalog {
    variants: BTreeMap<String, TaskBlueprint>,
}

impl BlueprintCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the `full`, `classic` and `practice` variants.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(TaskBlueprint::full());
        catalog.insert(TaskBlueprint::classic());
        catalog.insert(TaskBlueprint::practice());
        catalog
    }

    /// Add or replace a variant.
    pub fn insert(&mut self, blueprint: TaskBlueprint) {
        self.variants.insert(blueprint.id.clone(), blueprint);
    }

    pub fn get(&self, id: &str) -> Option<&TaskBlueprint> {
        self.variants.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskBlueprint> {
        self.variants.values()
    }
}
