//! Configuration loading and backend factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use bandscore_core::adapter::{ScorerAdapter, ScorerBackend};
use bandscore_core::engine::EngineConfig;
use bandscore_core::scale::ScoreScale;
use bandscore_core::traits::ScoringBackend;

use crate::gemini::{GeminiScorer, RubricFraming};
use crate::heuristic::HeuristicScorer;

/// Configuration for a single scoring backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        framing: RubricFraming,
    },
    Heuristic {
        #[serde(default)]
        scale: ScoreScale,
    },
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Gemini {
                api_key: _,
                base_url,
                model,
                framing,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .field("framing", framing)
                .finish(),
            BackendConfig::Heuristic { scale } => {
                f.debug_struct("Heuristic").field("scale", scale).finish()
            }
        }
    }
}

/// The two backend slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub remote: Option<BackendConfig>,
    #[serde(default = "default_local")]
    pub local: Option<BackendConfig>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            remote: None,
            local: default_local(),
        }
    }
}

fn default_local() -> Option<BackendConfig> {
    Some(BackendConfig::Heuristic {
        scale: ScoreScale::ZeroToNine,
    })
}

/// Top-level bandscore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandscoreConfig {
    #[serde(default)]
    pub backends: BackendsConfig,
    /// Backend used when a command does not pick one.
    #[serde(default = "default_backend")]
    pub default_backend: ScorerBackend,
    /// Upper bound on a single scorer call.
    #[serde(default = "default_timeout")]
    pub scoring_timeout_secs: u64,
    /// Max concurrent scorer calls per submission.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Where session records are kept.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Extra blueprint TOML files.
    #[serde(default)]
    pub blueprints_dir: Option<PathBuf>,
}

fn default_backend() -> ScorerBackend {
    ScorerBackend::Local
}
fn default_timeout() -> u64 {
    30
}
fn default_parallelism() -> usize {
    4
}
fn default_store_dir() -> PathBuf {
    PathBuf::from("./bandscore-sessions")
}

impl Default for BandscoreConfig {
    fn default() -> Self {
        Self {
            backends: BackendsConfig::default(),
            default_backend: default_backend(),
            scoring_timeout_secs: default_timeout(),
            parallelism: default_parallelism(),
            store_dir: default_store_dir(),
            blueprints_dir: None,
        }
    }
}

impl BandscoreConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            parallelism: self.parallelism,
            default_backend: self.default_backend,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are inserted verbatim and never rescanned.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_backend_config(config: &BackendConfig) -> BackendConfig {
    match config {
        BackendConfig::Gemini {
            api_key,
            base_url,
            model,
            framing,
        } => BackendConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            model: model.as_deref().map(resolve_env_vars),
            framing: *framing,
        },
        BackendConfig::Heuristic { scale } => BackendConfig::Heuristic { scale: *scale },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `bandscore.toml` in the current directory
/// 2. `~/.config/bandscore/config.toml`
///
/// Environment variable override: `BANDSCORE_GEMINI_KEY`.
pub fn load_config() -> Result<BandscoreConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<BandscoreConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("bandscore.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => BandscoreConfig::default(),
    };

    if let Ok(key) = std::env::var("BANDSCORE_GEMINI_KEY") {
        match config.backends.remote.as_mut() {
            Some(BackendConfig::Gemini { api_key, .. }) => *api_key = key,
            Some(other) => {
                tracing::warn!("BANDSCORE_GEMINI_KEY ignored: remote backend is {other:?}");
            }
            None => {
                config.backends.remote = Some(BackendConfig::Gemini {
                    api_key: key,
                    base_url: None,
                    model: None,
                    framing: RubricFraming::default(),
                });
            }
        }
    }

    Ok(config)
}

/// Parse a config document and resolve `${VAR}` references.
pub fn parse_config_str(content: &str) -> Result<BandscoreConfig> {
    let mut config: BandscoreConfig = toml::from_str(content)?;
    config.backends.remote = config.backends.remote.as_ref().map(resolve_backend_config);
    config.backends.local = config.backends.local.as_ref().map(resolve_backend_config);
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("bandscore"))
}

/// Create a backend instance from its configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn ScoringBackend>> {
    match config {
        BackendConfig::Gemini {
            api_key,
            base_url,
            model,
            framing,
        } => {
            if api_key.trim().is_empty() {
                anyhow::bail!("gemini backend has an empty api_key (set BANDSCORE_GEMINI_KEY)");
            }
            Ok(Arc::new(GeminiScorer::new(
                api_key,
                base_url.clone(),
                model.clone(),
                *framing,
            )))
        }
        BackendConfig::Heuristic { scale } => Ok(Arc::new(HeuristicScorer::new(*scale))),
    }
}

/// Build the scorer adapter for a configuration.
///
/// A backend that cannot be constructed is left out with a warning; tasks
/// routed to it then degrade as `backend_unavailable`.
pub fn build_adapter(config: &BandscoreConfig) -> ScorerAdapter {
    let mut adapter =
        ScorerAdapter::new().with_timeout(Duration::from_secs(config.scoring_timeout_secs));

    for (choice, backend) in [
        (ScorerBackend::Local, &config.backends.local),
        (ScorerBackend::Remote, &config.backends.remote),
    ] {
        let Some(backend) = backend else { continue };
        match create_backend(backend) {
            Ok(instance) => {
                adapter = match choice {
                    ScorerBackend::Local => adapter.with_local(instance),
                    ScorerBackend::Remote => adapter.with_remote(instance),
                };
            }
            Err(e) => tracing::warn!("{choice} backend disabled: {e:#}"),
        }
    }
    adapter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_BANDSCORE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_BANDSCORE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_BANDSCORE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        std::env::remove_var("_BANDSCORE_TEST_VAR");
    }

    #[test]
    fn resolve_env_vars_does_not_rescan_values() {
        std::env::set_var("_BANDSCORE_SELF_REF", "${_BANDSCORE_SELF_REF}");
        assert_eq!(
            resolve_env_vars("key=${_BANDSCORE_SELF_REF}, ${_BANDSCORE_UNSET_VAR}end"),
            "key=${_BANDSCORE_SELF_REF}, end"
        );
        assert_eq!(resolve_env_vars("open ${never closed"), "open ${never closed");
        std::env::remove_var("_BANDSCORE_SELF_REF");
    }

    #[test]
    fn default_config() {
        let config = BandscoreConfig::default();
        assert_eq!(config.default_backend, ScorerBackend::Local);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.scoring_timeout_secs, 30);
        assert!(config.backends.remote.is_none());
        assert!(matches!(
            config.backends.local,
            Some(BackendConfig::Heuristic {
                scale: ScoreScale::ZeroToNine
            })
        ));
    }

    #[test]
    fn parse_backend_config() {
        std::env::set_var("_BANDSCORE_TEST_KEY", "from-env");
        let toml_str = r#"
default_backend = "remote"
scoring_timeout_secs = 10

[backends.remote]
type = "gemini"
api_key = "${_BANDSCORE_TEST_KEY}"
framing = "band"

[backends.local]
type = "heuristic"
scale = "zero_to_five"
"#;
        let config = parse_config_str(toml_str).unwrap();
        std::env::remove_var("_BANDSCORE_TEST_KEY");

        assert_eq!(config.default_backend, ScorerBackend::Remote);
        assert_eq!(config.scoring_timeout_secs, 10);
        match &config.backends.remote {
            Some(BackendConfig::Gemini {
                api_key, framing, ..
            }) => {
                assert_eq!(api_key, "from-env");
                assert_eq!(*framing, RubricFraming::Band);
            }
            other => panic!("unexpected remote config: {other:?}"),
        }

        let adapter = build_adapter(&config);
        assert_eq!(adapter.backend(ScorerBackend::Remote).unwrap().scale(), ScoreScale::ZeroToNine);
        assert_eq!(adapter.backend(ScorerBackend::Local).unwrap().scale(), ScoreScale::ZeroToFive);
        assert_eq!(adapter.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn debug_masks_api_key() {
        let config = BackendConfig::Gemini {
            api_key: "secret-key".into(),
            base_url: None,
            model: None,
            framing: RubricFraming::Strict,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn empty_key_disables_remote() {
        let mut config = BandscoreConfig::default();
        config.backends.remote = Some(BackendConfig::Gemini {
            api_key: String::new(),
            base_url: None,
            model: None,
            framing: RubricFraming::Strict,
        });
        assert!(create_backend(config.backends.remote.as_ref().unwrap()).is_err());
        let adapter = build_adapter(&config);
        assert!(adapter.backend(ScorerBackend::Remote).is_none());
        assert!(adapter.backend(ScorerBackend::Local).is_some());
    }

    #[test]
    fn load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bandscore.toml");
        std::fs::write(
            &path,
            "parallelism = 2\nstore_dir = \"/tmp/sessions\"\nblueprints_dir = \"custom\"\n",
        )
        .unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.parallelism, 2);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.blueprints_dir, Some(PathBuf::from("custom")));
        assert_eq!(config.engine_config().parallelism, 2);
    }

    #[test]
    fn explicit_missing_path_fails() {
        let err = load_config_from(Some(Path::new("/nonexistent/bandscore.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
