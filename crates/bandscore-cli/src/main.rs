//! bandscore CLI: evaluate speaking/writing test sessions.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use bandscore_core::adapter::ScorerBackend;

mod commands;

#[derive(Parser)]
#[command(name = "bandscore", version, about = "Score speaking/writing test sessions")]
struct Cli {
    /// Path to a config file (defaults to bandscore.toml, then ~/.config/bandscore/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List blueprint variants, or show the slots of one.
    Blueprint {
        /// Variant id to show in detail.
        variant: Option<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Check a submission file against a blueprint without scoring it.
    Validate {
        /// Blueprint variant id.
        #[arg(long, default_value = "full")]
        variant: String,

        /// Submission JSON file.
        #[arg(long)]
        answers: PathBuf,
    },

    /// Start a session, score a submission and finalize it.
    Evaluate {
        /// Blueprint variant id.
        #[arg(long, default_value = "full")]
        variant: String,

        /// Submission JSON file.
        #[arg(long)]
        answers: PathBuf,

        /// Owner recorded on the session.
        #[arg(long, default_value = "local")]
        owner: String,

        /// Scoring backend: local or remote (defaults to the configured one).
        #[arg(long)]
        backend: Option<ScorerBackend>,

        /// Session directory (overrides store_dir from the config).
        #[arg(long)]
        store: Option<PathBuf>,

        /// Keep the session in memory only.
        #[arg(long, conflicts_with = "store")]
        no_store: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show a stored session.
    Show {
        /// Session id.
        session: uuid::Uuid,

        /// Owner the session belongs to.
        #[arg(long, default_value = "local")]
        owner: String,

        /// Session directory (overrides store_dir from the config).
        #[arg(long)]
        store: Option<PathBuf>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Get formative feedback on a single answer from the remote evaluator.
    Coach {
        /// Answer text; read from --file when omitted.
        text: Option<String>,

        /// Read the answer text from a file.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// Create a sample config, blueprint and submission in the current directory.
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                "bandscore=info"
                    .parse()
                    .unwrap_or_else(|_| LevelFilter::INFO.into()),
            ),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Blueprint { variant, json } => {
            commands::blueprint::execute(variant, json, config.as_deref())
        }
        Commands::Validate { variant, answers } => {
            commands::validate::execute(&variant, &answers, config.as_deref())
        }
        Commands::Evaluate {
            variant,
            answers,
            owner,
            backend,
            store,
            no_store,
            json,
        } => {
            commands::evaluate::execute(commands::evaluate::EvaluateArgs {
                variant,
                answers,
                owner,
                backend,
                store,
                no_store,
                json,
                config,
            })
            .await
        }
        Commands::Show {
            session,
            owner,
            store,
            json,
        } => commands::show::execute(session, &owner, store, json, config.as_deref()).await,
        Commands::Coach { text, file } => {
            commands::coach::execute(text, file, config.as_deref()).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
