//! Application-level configuration loading: match rules, watcher cadence,
//! enrichment limits and the track catalog location.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::match_state::DEFAULT_TARGET_SCORE;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "HITSTER_BACK_CONFIG_PATH";

const DEFAULT_MAX_NAME_LEN: usize = 20;
const DEFAULT_WATCH_INTERVAL_MS: u64 = 1_000;
const DEFAULT_ENRICHMENT_TIMEOUT_MS: u64 = 4_000;
const DEFAULT_ENRICHMENT_ATTEMPTS: u32 = 2;
const DEFAULT_CATALOG_DIR: &str = "catalog";
const DEFAULT_SOURCE: &str = "builtin";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";

/// Limits applied around every call to the text-generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentConfig {
    /// Upper bound for a single call.
    pub timeout: Duration,
    /// Attempts before falling back.
    pub max_attempts: u32,
    /// Prompt endpoint of the text-generation service, if any.
    pub oracle_url: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_ENRICHMENT_TIMEOUT_MS),
            max_attempts: DEFAULT_ENRICHMENT_ATTEMPTS,
            oracle_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Timeline length that wins unless a start request overrides it.
    pub default_target_score: usize,
    /// Longest accepted player name, in characters.
    pub max_name_len: usize,
    /// Cadence of the reveal watcher.
    pub watch_interval: Duration,
    /// Whether the reveal watcher runs in this process.
    pub watcher_enabled: bool,
    /// Enrichment limits.
    pub enrichment: EnrichmentConfig,
    /// Directory holding JSON track catalogs.
    pub catalog_dir: PathBuf,
    /// Track source used when a start request names none.
    pub default_source: String,
    /// Public URL of the controller front-end, rendered as a QR code by the TV.
    pub public_base_url: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        target_score = app_config.default_target_score,
                        source = %app_config.default_source,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// URL the TV shows for players to join.
    pub fn join_url(&self) -> String {
        format!("{}/join", self.public_base_url.trim_end_matches('/'))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    target_score: Option<usize>,
    max_name_len: Option<usize>,
    watch_interval_ms: Option<u64>,
    watcher_enabled: Option<bool>,
    enrichment: RawEnrichment,
    catalog_dir: Option<PathBuf>,
    default_source: Option<String>,
    public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEnrichment {
    timeout_ms: Option<u64>,
    max_attempts: Option<u32>,
    oracle_url: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            default_target_score: value
                .target_score
                .filter(|score| *score > 0)
                .unwrap_or(DEFAULT_TARGET_SCORE),
            max_name_len: value
                .max_name_len
                .filter(|len| *len > 0)
                .unwrap_or(DEFAULT_MAX_NAME_LEN),
            watch_interval: Duration::from_millis(
                value
                    .watch_interval_ms
                    .filter(|ms| *ms > 0)
                    .unwrap_or(DEFAULT_WATCH_INTERVAL_MS),
            ),
            watcher_enabled: value.watcher_enabled.unwrap_or(true),
            enrichment: EnrichmentConfig {
                timeout: Duration::from_millis(
                    value
                        .enrichment
                        .timeout_ms
                        .unwrap_or(DEFAULT_ENRICHMENT_TIMEOUT_MS),
                ),
                max_attempts: value
                    .enrichment
                    .max_attempts
                    .unwrap_or(DEFAULT_ENRICHMENT_ATTEMPTS)
                    .max(1),
                oracle_url: value.enrichment.oracle_url.filter(|url| !url.is_empty()),
            },
            catalog_dir: value
                .catalog_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_DIR)),
            default_source: value
                .default_source
                .unwrap_or_else(|| DEFAULT_SOURCE.to_owned()),
            public_base_url: value
                .public_base_url
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_owned()),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.default_target_score, 10);
        assert_eq!(config.watch_interval, Duration::from_millis(1_000));
        assert_eq!(config.enrichment.timeout, Duration::from_millis(4_000));
        assert_eq!(config.enrichment.max_attempts, 2);
    }

    #[test]
    fn partial_file_overrides_only_given_values() {
        let raw: RawConfig = serde_json::from_str(
            r#"{ "target_score": 5, "enrichment": { "timeout_ms": 250, "max_attempts": 0 } }"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.default_target_score, 5);
        assert_eq!(config.enrichment.timeout, Duration::from_millis(250));
        assert_eq!(config.enrichment.max_attempts, 1);
        assert_eq!(config.max_name_len, 20);
    }

    #[test]
    fn join_url_appends_path_once() {
        let config = AppConfig {
            public_base_url: "https://party.example/".into(),
            ..AppConfig::default()
        };
        assert_eq!(config.join_url(), "https://party.example/join");
    }
}
