//! TOML blueprint parser.
//!
//! Loads custom blueprint variants from TOML files and directories, and
//! checks them for likely mistakes.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::aggregate::{Band, BandTable};
use crate::blueprint::{BlueprintCatalog, BlueprintMode, BlueprintSlot, TaskBlueprint};
use crate::model::{Section, TaskType};
use crate::scale::{Granularity, ReportingScale};

/// Intermediate TOML structure for blueprint files.
#[derive(Debug, Deserialize)]
struct TomlBlueprintFile {
    id: String,
    name: String,
    #[serde(default = "default_mode")]
    mode: BlueprintMode,
    reporting: TomlReporting,
    #[serde(default)]
    band_preset: Option<String>,
    #[serde(default)]
    bands: Vec<Band>,
    #[serde(default)]
    floor_label: Option<String>,
    #[serde(default)]
    slots: Vec<TomlSlot>,
}

fn default_mode() -> BlueprintMode {
    BlueprintMode::Strict
}

#[derive(Debug, Deserialize)]
struct TomlReporting {
    #[serde(default)]
    min: f64,
    max: f64,
    #[serde(default = "default_granularity")]
    granularity: Granularity,
}

fn default_granularity() -> Granularity {
    Granularity::HalfPoint
}

#[derive(Debug, Deserialize)]
struct TomlSlot {
    #[serde(default)]
    ordinal: Option<u32>,
    section: String,
    #[serde(default)]
    task_type: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

/// Parse a single TOML file into a `TaskBlueprint`.
pub fn parse_blueprint(path: &Path) -> Result<TaskBlueprint> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read blueprint file: {}", path.display()))?;

    parse_blueprint_str(&content, path)
}

/// Parse a TOML string into a `TaskBlueprint`.
pub fn parse_blueprint_str(content: &str, source_path: &Path) -> Result<TaskBlueprint> {
    let parsed: TomlBlueprintFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let slots = parsed
        .slots
        .into_iter()
        .enumerate()
        .map(|(position, s)| {
            let section: Section = s.section.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let ordinal = s.ordinal.unwrap_or(position as u32 + 1);
            let slot = match s.task_type {
                Some(t) => {
                    let task_type: TaskType = t.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                    BlueprintSlot::new(ordinal, section, task_type)
                }
                None => BlueprintSlot::any_type(ordinal, section),
            };
            Ok(match s.prompt {
                Some(prompt) => slot.with_prompt(prompt),
                None => slot,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let reporting = ReportingScale::with_range(
        parsed.reporting.min,
        parsed.reporting.max,
        parsed.reporting.granularity,
    )?;

    let bands = match (parsed.band_preset.as_deref(), parsed.bands.is_empty()) {
        (Some(preset), true) => band_preset(preset)?,
        (Some(_), false) => anyhow::bail!(
            "{}: set either band_preset or [[bands]], not both",
            source_path.display()
        ),
        (None, true) => anyhow::bail!(
            "{}: no [[bands]] defined and no band_preset given",
            source_path.display()
        ),
        (None, false) => BandTable::new(
            parsed.bands,
            parsed.floor_label.unwrap_or_else(|| "Not attempted".to_string()),
        )?,
    };

    let blueprint = TaskBlueprint::new(parsed.id, parsed.name, parsed.mode, slots, reporting, bands)
        .with_context(|| format!("invalid blueprint in {}", source_path.display()))?;
    Ok(blueprint)
}

fn band_preset(name: &str) -> Result<BandTable> {
    match name.trim().to_lowercase().as_str() {
        "ielts" => Ok(BandTable::ielts()),
        "toefl" => Ok(BandTable::toefl()),
        "practice" => Ok(BandTable::practice()),
        other => anyhow::bail!("unknown band preset: {other} (expected ielts, toefl or practice)"),
    }
}

/// Recursively load all `.toml` blueprint files from a directory.
pub fn load_blueprint_directory(dir: &Path) -> Result<Vec<TaskBlueprint>> {
    let mut blueprints = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            blueprints.extend(load_blueprint_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_blueprint(&path) {
                Ok(bp) => blueprints.push(bp),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(blueprints)
}

/// Built-in variants plus any blueprints found under `dir`.
///
/// A file whose `id` matches a built-in variant replaces it.
pub fn load_catalog(dir: Option<&Path>) -> Result<BlueprintCatalog> {
    let mut catalog = BlueprintCatalog::builtin();
    if let Some(dir) = dir {
        for blueprint in load_blueprint_directory(dir)? {
            tracing::debug!(id = blueprint.id(), "loaded custom blueprint");
            catalog.insert(blueprint);
        }
    }
    Ok(catalog)
}

/// A warning from blueprint validation.
#[derive(Debug, Clone)]
pub struct BlueprintWarning {
    /// The slot ordinal (if applicable).
    pub ordinal: Option<u32>,
    pub message: String,
}

/// Check a blueprint for likely mistakes that still load.
pub fn check_blueprint(blueprint: &TaskBlueprint) -> Vec<BlueprintWarning> {
    let mut warnings = Vec::new();
    let reporting = blueprint.reporting();

    for band in blueprint.bands().bands() {
        if band.min > reporting.max {
            warnings.push(BlueprintWarning {
                ordinal: None,
                message: format!(
                    "band '{}' starts at {} and can never be reached (max {})",
                    band.label, band.min, reporting.max
                ),
            });
        } else if band.min <= reporting.min {
            warnings.push(BlueprintWarning {
                ordinal: None,
                message: format!(
                    "band '{}' starts at {} so the floor label '{}' is never used",
                    band.label,
                    band.min,
                    blueprint.bands().floor_label()
                ),
            });
        }
    }

    for slot in blueprint.slots() {
        if slot.prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            warnings.push(BlueprintWarning {
                ordinal: Some(slot.ordinal),
                message: "prompt is empty".into(),
            });
        }
    }

    warnings
}
