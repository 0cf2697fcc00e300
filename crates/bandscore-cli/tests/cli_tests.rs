//! CLI integration tests using assert_cmd.
//!
//! Every command runs inside a scratch directory with `HOME` pointed at it,
//! so no user config is picked up and only the local backend is available.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bandscore(dir: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("bandscore").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("BANDSCORE_GEMINI_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(relative)
}

#[test]
fn blueprint_lists_builtin_variants() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .arg("blueprint")
        .assert()
        .success()
        .stdout(predicate::str::contains("full"))
        .stdout(predicate::str::contains("classic"))
        .stdout(predicate::str::contains("practice"));
}

#[test]
fn blueprint_shows_slots_and_bands() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .args(["blueprint", "full"])
        .assert()
        .success()
        .stdout(predicate::str::contains("6 tasks"))
        .stdout(predicate::str::contains("Expert User (Band 9)"))
        .stdout(predicate::str::contains("Did not attempt (Band 0)"));
}

#[test]
fn blueprint_loads_custom_directory() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(
        &config,
        format!("blueprints_dir = {:?}\n", fixture("blueprints").display().to_string()),
    )
    .unwrap();

    bandscore(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["blueprint", "writing-mini"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Writing Mini Test"))
        .stdout(predicate::str::contains("challenge the reading passage"));
}

#[test]
fn blueprint_unknown_variant() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .args(["blueprint", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown blueprint variant 'nope'"));
}

#[test]
fn validate_full_submission() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .arg("validate")
        .arg("--answers")
        .arg(fixture("submissions/full.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Submission valid."));
}

#[test]
fn validate_flexible_order() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .args(["validate", "--variant", "practice", "--answers"])
        .arg(fixture("submissions/practice.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("submitted as task 10"))
        .stdout(predicate::str::contains("Submission valid."));
}

#[test]
fn validate_wrong_count() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .arg("validate")
        .arg("--answers")
        .arg(fixture("submissions/wrong-count.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("exactly 6 tasks, received 3"));
}

#[test]
fn validate_wrong_structure_names_ordinal() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .arg("validate")
        .arg("--answers")
        .arg(fixture("submissions/wrong-structure.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("task 2: expected speaking integrated"));
}

#[test]
fn validate_nonexistent_file() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .args(["validate", "--answers", "nonexistent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn evaluate_in_memory() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .args(["evaluate", "--no-store", "--answers"])
        .arg(fixture("submissions/full.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Overall Score:"))
        .stdout(predicate::str::contains("/9.0 - Performance Level:"));

    assert!(!dir.path().join("bandscore-sessions").exists());
}

#[test]
fn evaluate_then_show() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("sessions");

    let output = bandscore(dir.path())
        .args(["evaluate", "--json", "--owner", "alice", "--answers"])
        .arg(fixture("submissions/full.json"))
        .arg("--store")
        .arg(&store)
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["per_task_feedback"].as_array().unwrap().len(), 6);
    let session_id = summary["session_id"].as_str().unwrap().to_string();
    assert!(store.join(format!("{session_id}.json")).exists());

    bandscore(dir.path())
        .args(["show", session_id.as_str(), "--owner", "alice", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("finalized"))
        .stdout(predicate::str::contains("Overall Score:"));

    bandscore(dir.path())
        .args(["show", session_id.as_str(), "--owner", "mallory", "--store"])
        .arg(&store)
        .assert()
        .failure()
        .stderr(predicate::str::contains("different owner"));
}

#[test]
fn evaluate_invalid_submission_writes_no_session() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("sessions");
    bandscore(dir.path())
        .args(["evaluate", "--answers"])
        .arg(fixture("submissions/wrong-count.json"))
        .arg("--store")
        .arg(&store)
        .assert()
        .failure()
        .stderr(predicate::str::contains("exactly 6 tasks, received 3"));

    let written = std::fs::read_dir(&store)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(written, 0);
}

#[test]
fn show_unknown_session() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .args(["show", "00000000-0000-0000-0000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn evaluate_remote_without_key_degrades() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .args(["evaluate", "--no-store", "--backend", "remote", "--answers"])
        .arg(fixture("submissions/full.json"))
        .assert()
        .success()
        .stderr(predicate::str::contains("no remote backend is configured"))
        .stdout(predicate::str::contains("backend_unavailable"))
        .stdout(predicate::str::contains("Did not attempt (Band 0)"));
}

#[test]
fn coach_requires_remote_backend() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .args(["coach", "I has an apple."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no remote backend configured"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    bandscore(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created bandscore.toml"))
        .stdout(predicate::str::contains("Created blueprints/example.toml"))
        .stdout(predicate::str::contains("Created submissions/example.json"));

    assert!(dir.path().join("bandscore.toml").exists());
    assert!(dir.path().join("blueprints/example.toml").exists());

    // The generated config points at the generated blueprint directory.
    bandscore(dir.path())
        .arg("blueprint")
        .assert()
        .success()
        .stdout(predicate::str::contains("writing-mini"));

    bandscore(dir.path())
        .args(["evaluate", "--answers", "submissions/example.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Performance Level:"));
    assert!(dir.path().join("bandscore-sessions").is_dir());
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    bandscore(dir.path()).arg("init").assert().success();

    bandscore(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn help_output() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Score speaking/writing test sessions"));
}

#[test]
fn version_output() {
    let dir = TempDir::new().unwrap();
    bandscore(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bandscore"));
}
