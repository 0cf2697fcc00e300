//! The `bandscore validate` command.

use std::path::Path;

use anyhow::{Context, Result};

use bandscore_scorers::config::load_config_from;

use super::{find_blueprint, load_catalog, read_submission};

pub fn execute(variant: &str, answers: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config_from(config_path)?;
    let catalog = load_catalog(&config)?;
    let blueprint = find_blueprint(&catalog, variant)?;
    let submissions = read_submission(answers)?;

    let resolved = blueprint
        .validate(&submissions)
        .with_context(|| format!("submission does not match blueprint '{variant}'"))?;

    println!("Blueprint: {} ({} tasks)", blueprint.name(), blueprint.len());
    for task in &resolved {
        let answered = task.submission.answered().count();
        let moved = if task.submission.ordinal != task.ordinal {
            format!(" (submitted as task {})", task.submission.ordinal)
        } else {
            String::new()
        };
        println!(
            "  [{}] {}: {answered} answer(s){moved}",
            task.ordinal,
            task.kind()
        );
    }
    println!("Submission valid.");

    Ok(())
}
