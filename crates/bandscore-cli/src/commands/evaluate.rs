//! The `bandscore evaluate` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use bandscore_core::adapter::ScorerBackend;
use bandscore_core::engine::{SessionEngine, SessionSummary};
use bandscore_core::store::{JsonDirStore, MemoryStore};
use bandscore_core::traits::SessionStore;
use bandscore_scorers::config::{build_adapter, load_config_from};

use super::{find_blueprint, load_catalog, print_task_table, read_submission};

pub struct EvaluateArgs {
    pub variant: String,
    pub answers: PathBuf,
    pub owner: String,
    pub backend: Option<ScorerBackend>,
    pub store: Option<PathBuf>,
    pub no_store: bool,
    pub json: bool,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: EvaluateArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    anyhow::ensure!(config.parallelism >= 1, "parallelism must be at least 1");

    let catalog = load_catalog(&config)?;
    let submissions = read_submission(&args.answers)?;

    // Reject a bad file before a session record is written.
    find_blueprint(&catalog, &args.variant)?
        .validate(&submissions)
        .with_context(|| format!("submission does not match blueprint '{}'", args.variant))?;

    let adapter = build_adapter(&config);
    let backend = args.backend.unwrap_or(config.default_backend);
    if adapter.backend(backend).is_none() {
        eprintln!(
            "Warning: no {backend} backend is configured; every task will be scored as backend_unavailable."
        );
    }

    let store: Arc<dyn SessionStore> = if args.no_store {
        Arc::new(MemoryStore::new())
    } else {
        let dir = args.store.unwrap_or_else(|| config.store_dir.clone());
        tracing::debug!(dir = %dir.display(), "using session directory");
        Arc::new(JsonDirStore::open(dir)?)
    };

    let engine = SessionEngine::new(catalog, Arc::new(adapter), store, config.engine_config());

    let started = engine.start_session(&args.variant, &args.owner).await?;
    eprintln!(
        "Session {} started: {} ({} tasks, {backend} backend)",
        started.session_id,
        started.blueprint.name(),
        started.blueprint.len()
    );

    let summary = engine
        .submit_session(started.session_id, &args.owner, &submissions, Some(backend))
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    print_task_table(&summary.per_task_feedback);
    println!("{}", summary.overall_feedback);

    let degraded = summary.degraded_tasks().count();
    if degraded > 0 {
        println!("{degraded} task(s) could not be scored and count as the scale minimum.");
    }
    println!("Session: {}", summary.session_id);
}
