pub mod blueprint;
pub mod coach;
pub mod evaluate;
pub mod init;
pub mod show;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use bandscore_core::aggregate::TaskFeedback;
use bandscore_core::blueprint::{BlueprintCatalog, TaskBlueprint};
use bandscore_core::model::TaskSubmission;
use bandscore_core::parser;
use bandscore_scorers::config::BandscoreConfig;

/// On-disk submission format.
#[derive(Debug, Deserialize)]
struct SubmissionFile {
    task_answers: Vec<TaskSubmission>,
}

/// Read the `task_answers` list from a submission JSON file.
pub fn read_submission(path: &Path) -> Result<Vec<TaskSubmission>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read submission: {}", path.display()))?;
    let file: SubmissionFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse submission: {}", path.display()))?;
    Ok(file.task_answers)
}

/// Built-in variants plus the config's blueprint directory, if any.
pub fn load_catalog(config: &BandscoreConfig) -> Result<BlueprintCatalog> {
    parser::load_catalog(config.blueprints_dir.as_deref())
}

pub fn find_blueprint<'a>(
    catalog: &'a BlueprintCatalog,
    variant: &str,
) -> Result<&'a TaskBlueprint> {
    catalog.get(variant).with_context(|| {
        format!(
            "unknown blueprint variant '{variant}'. Available: {:?}",
            catalog.ids().collect::<Vec<_>>()
        )
    })
}

/// Per-task score table shared by `evaluate` and `show`.
pub fn print_task_table(tasks: &[TaskFeedback]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["#", "Task", "Score", "Normalized", "Questions", "Notes"]);

    for task in tasks {
        let notes = match task.degradation {
            Some(kind) => kind.marker().to_string(),
            None => task.feedback.first().cloned().unwrap_or_default(),
        };
        table.add_row(vec![
            Cell::new(task.ordinal),
            Cell::new(format!("{} {}", task.section, task.task_type)),
            Cell::new(format!("{} / {}", task.native_score, task.scale.max())),
            Cell::new(format!("{:.2}", task.normalized_score)),
            Cell::new(task.question_count),
            Cell::new(notes),
        ]);
    }

    println!("{table}");
}
