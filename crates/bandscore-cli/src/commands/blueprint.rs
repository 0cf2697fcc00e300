//! The `bandscore blueprint` command.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};

use bandscore_core::blueprint::{BlueprintMode, TaskBlueprint};
use bandscore_core::parser::check_blueprint;
use bandscore_scorers::config::load_config_from;

use super::{find_blueprint, load_catalog};

pub fn execute(variant: Option<String>, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = load_config_from(config_path)?;
    let catalog = load_catalog(&config)?;

    let Some(variant) = variant else {
        if json {
            let all: Vec<&TaskBlueprint> = catalog.iter().collect();
            println!("{}", serde_json::to_string_pretty(&all)?);
            return Ok(());
        }

        let mut table = Table::new();
        table.set_header(vec!["Variant", "Name", "Mode", "Tasks", "Reported on"]);
        for bp in catalog.iter() {
            table.add_row(vec![
                Cell::new(bp.id()),
                Cell::new(bp.name()),
                Cell::new(mode_name(bp.mode())),
                Cell::new(bp.len()),
                Cell::new(format!(
                    "{}-{}",
                    bp.reporting().format(bp.reporting().min),
                    bp.reporting().format(bp.reporting().max)
                )),
            ]);
        }
        println!("{table}");
        return Ok(());
    };

    let bp = find_blueprint(&catalog, &variant)?;
    if json {
        println!("{}", serde_json::to_string_pretty(bp)?);
        return Ok(());
    }

    println!("{} ({}, {} tasks)", bp.name(), mode_name(bp.mode()), bp.len());

    let mut slots = Table::new();
    slots.set_header(vec!["#", "Section", "Task type", "Prompt"]);
    for slot in bp.slots() {
        slots.add_row(vec![
            Cell::new(slot.ordinal),
            Cell::new(slot.section),
            Cell::new(slot.task_type.map_or_else(|| "any".to_string(), |t| t.to_string())),
            Cell::new(slot.prompt.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{slots}");

    let reporting = bp.reporting();
    let mut bands = Table::new();
    bands.set_header(vec!["From", "Label"]);
    for band in bp.bands().bands() {
        bands.add_row(vec![Cell::new(reporting.format(band.min)), Cell::new(&band.label)]);
    }
    bands.add_row(vec![
        Cell::new(reporting.format(reporting.min)),
        Cell::new(bp.bands().floor_label()),
    ]);
    println!("{bands}");

    for w in check_blueprint(bp) {
        let prefix = w
            .ordinal
            .map(|o| format!("  [task {o}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    Ok(())
}

fn mode_name(mode: BlueprintMode) -> &'static str {
    match mode {
        BlueprintMode::Strict => "strict",
        BlueprintMode::Flexible => "flexible",
    }
}
