//! The `bandscore show` command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use uuid::Uuid;

use bandscore_core::aggregate::TaskFeedback;
use bandscore_core::store::JsonDirStore;
use bandscore_core::traits::SessionStore;
use bandscore_scorers::config::load_config_from;

use super::print_task_table;

pub async fn execute(
    session_id: Uuid,
    owner: &str,
    store: Option<PathBuf>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = load_config_from(config_path)?;
    let dir = store.unwrap_or_else(|| config.store_dir.clone());
    let store = JsonDirStore::open(dir)?;

    let session = store.get_session(session_id, owner).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!("Session:   {}", session.id);
    println!("Blueprint: {}", session.blueprint_id);
    println!("State:     {}", session.state);
    println!(
        "Started:   {}",
        session.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(finished) = session.finished_at {
        println!("Finished:  {}", finished.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    if session.task_results.is_empty() {
        println!("\nNo task results recorded.");
        return Ok(());
    }

    let tasks: Vec<TaskFeedback> = session.task_results.iter().map(TaskFeedback::from).collect();
    print_task_table(&tasks);

    let overall = session
        .feedback
        .as_ref()
        .and_then(|blob| blob.get("overall_feedback"))
        .and_then(|v| v.as_str());
    match (overall, &session.performance_label) {
        (Some(line), _) => println!("{line}"),
        (None, Some(label)) => println!("Overall Score: {} - {label}", session.overall_score),
        (None, None) => {}
    }

    Ok(())
}
