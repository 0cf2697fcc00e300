//! The `bandscore coach` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use bandscore_scorers::config::{load_config_from, BackendConfig};
use bandscore_scorers::gemini::GeminiScorer;

pub async fn execute(
    text: Option<String>,
    file: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read answer: {}", path.display()))?,
        (None, None) => anyhow::bail!("give the answer text or --file <path>"),
    };
    anyhow::ensure!(!text.trim().is_empty(), "answer text is empty");

    let config = load_config_from(config_path)?;
    let scorer = match &config.backends.remote {
        Some(BackendConfig::Gemini {
            api_key,
            base_url,
            model,
            framing,
        }) => {
            anyhow::ensure!(
                !api_key.trim().is_empty(),
                "remote backend has an empty api_key (set BANDSCORE_GEMINI_KEY)"
            );
            GeminiScorer::new(api_key, base_url.clone(), model.clone(), *framing)
        }
        Some(other) => anyhow::bail!("coaching needs a gemini remote backend, found {other:?}"),
        None => anyhow::bail!(
            "no remote backend configured. Add [backends.remote] to bandscore.toml or set BANDSCORE_GEMINI_KEY"
        ),
    };

    let feedback = scorer.coach(text.trim()).await?;

    println!("[{}] {}", feedback.status, feedback.title);
    println!("{}", feedback.feedback);
    if feedback.corrected_text.trim() != text.trim() {
        println!("\nSuggested: {}", feedback.corrected_text);
    }

    Ok(())
}
