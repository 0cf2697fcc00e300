//! The `bandscore init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("bandscore.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("blueprints")?;
    write_if_missing(Path::new("blueprints/example.toml"), EXAMPLE_BLUEPRINT)?;

    std::fs::create_dir_all("submissions")?;
    write_if_missing(Path::new("submissions/example.json"), EXAMPLE_SUBMISSION)?;

    println!("\nNext steps:");
    println!("  1. Set BANDSCORE_GEMINI_KEY (or edit bandscore.toml) to use the remote evaluator");
    println!("  2. Run: bandscore validate --answers submissions/example.json");
    println!("  3. Run: bandscore evaluate --answers submissions/example.json");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# bandscore configuration

default_backend = "local"
scoring_timeout_secs = 30
parallelism = 4
store_dir = "bandscore-sessions"
blueprints_dir = "blueprints"

[backends.local]
type = "heuristic"
scale = "zero_to_nine"

# Remote evaluator. BANDSCORE_GEMINI_KEY also enables it without this section.
# [backends.remote]
# type = "gemini"
# api_key = "${BANDSCORE_GEMINI_KEY}"
# model = "gemini-2.5-flash"
# framing = "strict"
"#;

const EXAMPLE_BLUEPRINT: &str = r#"id = "writing-mini"
name = "Writing Mini Test"
mode = "strict"
band_preset = "toefl"

[reporting]
max = 5
granularity = "integer"

[[slots]]
section = "writing"
task_type = "integrated"
prompt = "Summarize the points made in the lecture and explain how they challenge the reading passage."

[[slots]]
section = "writing"
task_type = "independent"
prompt = "Do you agree that technology has made our daily lives better? Use specific reasons and examples."
"#;

const EXAMPLE_SUBMISSION: &str = r#"{
  "task_answers": [
    {
      "task_id": 1,
      "section": "speaking",
      "task_type": "independent",
      "answers": [
        { "question_id": 101, "answer": "I prefer studying in the morning because my mind is fresh and there are fewer distractions at home." }
      ]
    },
    {
      "task_id": 2,
      "section": "speaking",
      "task_type": "integrated",
      "answers": [
        { "question_id": 201, "answer": "The university plans to close the library on weekends, and the student disagrees because many people work during the week." }
      ]
    },
    {
      "task_id": 3,
      "section": "speaking",
      "task_type": "integrated",
      "answers": [
        { "question_id": 301, "answer": "The reading defines social loafing, and the professor gives the example of a group project where one member did most of the work." }
      ]
    },
    {
      "task_id": 4,
      "section": "speaking",
      "task_type": "integrated",
      "answers": [
        { "question_id": 401, "answer": "The lecture explains two ways plants defend themselves: producing chemicals that taste bad and growing thorns." }
      ]
    },
    {
      "task_id": 5,
      "section": "writing",
      "task_type": "integrated",
      "answers": [
        { "question_id": 501, "answer": "The lecturer argues that the reading overstates the benefits of the four-day work week. First, productivity gains were temporary. Second, customer service suffered." }
      ]
    },
    {
      "task_id": 6,
      "section": "writing",
      "task_type": "independent",
      "answers": [
        { "question_id": 601, "answer": "In my opinion, technology has significantly improved our daily lives. Smartphones allow us to communicate instantly, and the internet gives access to vast amounts of information." }
      ]
    }
  ]
}
"#;
