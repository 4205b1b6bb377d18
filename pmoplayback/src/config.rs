//! Configuration for the playback layer.
//!
//! The configuration is built the same way as the rest of PMOMusic:
//! - an embedded default YAML document,
//! - merged with `config.yaml` from the configuration directory when present,
//! - keys lowercased,
//! - then overridden by `PMOPLAYBACK_CONFIG__SECTION__KEY` environment variables.
//!
//! There is no global instance: the loaded [`PlaybackConfig`] is handed to the
//! orchestrator, the engine bridge and the resolver at construction time.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::info;

const DEFAULT_CONFIG: &str = include_str!("pmoplayback.yaml");

const ENV_CONFIG_DIR: &str = "PMOPLAYBACK_CONFIG";
const ENV_PREFIX: &str = "PMOPLAYBACK_CONFIG__";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Delay after a restore before checking that playback actually resumed.
    pub verification_timeout_ms: u64,
    /// How long a recovery record stays usable after an unclean disconnect.
    pub recovery_window_ms: u64,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            verification_timeout_ms: 7000,
            recovery_window_ms: 7000,
        }
    }
}

impl RestoreConfig {
    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::from_millis(self.recovery_window_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pending_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pending_capacity: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub poll_interval_ms: u64,
    pub item_timeout_ms: u64,
    pub orphan_max_age_secs: u64,
    /// Directory holding cached descriptor files, relative to the config dir.
    pub cache_dir: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            item_timeout_ms: 10_000,
            orphan_max_age_secs: 3600,
            cache_dir: "descriptors".to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }

    pub fn orphan_max_age(&self) -> Duration {
        Duration::from_secs(self.orphan_max_age_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSessionConfig {
    pub keep_alive_secs: u64,
}

impl Default for MediaSessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: 900,
        }
    }
}

impl MediaSessionConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepTimerConfig {
    pub max_secs: u32,
}

impl Default for SleepTimerConfig {
    fn default() -> Self {
        Self { max_secs: 7200 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub restore: RestoreConfig,
    pub engine: EngineConfig,
    pub resolver: ResolverConfig,
    pub media_session: MediaSessionConfig,
    pub sleep_timer: SleepTimerConfig,
    pub logging: LoggingConfig,
    #[serde(skip)]
    config_dir: Option<PathBuf>,
}

impl PlaybackConfig {
    /// Loads the configuration from `directory` (or the default location when
    /// empty), applying environment overrides.
    pub fn load(directory: &str) -> Result<Self> {
        let config_dir = find_config_dir(directory);
        info!(config_dir = %config_dir.display(), "Using playback config directory");

        let config_file = config_dir.join("config.yaml");
        let external = match fs::read_to_string(&config_file) {
            Ok(data) => {
                info!(config_file = %config_file.display(), "Loaded config file");
                Some(data)
            }
            Err(_) => {
                info!(
                    config_file = %config_file.display(),
                    "Config file not found, using default embedded config"
                );
                None
            }
        };

        let mut config = Self::build(external.as_deref(), env::vars())?;
        config.config_dir = Some(config_dir);
        Ok(config)
    }

    /// Builds a configuration from an optional YAML document merged over the
    /// embedded defaults, without touching the environment.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::build(Some(yaml), std::iter::empty())
    }

    fn build(
        external: Option<&str>,
        vars: impl Iterator<Item = (String, String)>,
    ) -> Result<Self> {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if let Some(external) = external {
            let external: Value = serde_yaml::from_str(external)?;
            if !external.is_null() {
                merge_over(&mut value, &external);
            }
        }
        let mut value = lowercase_keys(value);
        apply_overrides(&mut value, vars);

        serde_yaml::from_value(value).map_err(|e| anyhow!("Invalid playback configuration: {}", e))
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// Resolves the descriptor cache directory against the config directory.
    pub fn resolver_cache_dir(&self) -> PathBuf {
        let path = Path::new(&self.resolver.cache_dir);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.config_dir {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }
}

fn find_config_dir(directory: &str) -> PathBuf {
    if !directory.is_empty() {
        return PathBuf::from(directory);
    }

    if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
        info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
        return PathBuf::from(env_path);
    }

    if Path::new(".pmomusic").exists() {
        return PathBuf::from(".pmomusic");
    }

    if let Some(home) = home_dir() {
        let home_config = home.join(".pmomusic");
        if home_config.exists() {
            return home_config;
        }
    }

    PathBuf::from(".pmomusic")
}

fn apply_overrides(config: &mut Value, vars: impl Iterator<Item = (String, String)>) {
    for (key, value) in vars {
        let Some(path) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let key_path = path
            .split("__")
            .map(|k| k.to_lowercase())
            .collect::<Vec<_>>();
        let _ = set_value(config, &key_path, parse_env_value(&value));
    }
}

fn set_value(data: &mut Value, path: &[String], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    let Value::Mapping(map) = data else {
        return Err(anyhow!("Current node is not a map"));
    };
    let key = Value::String(path[0].clone());
    if path.len() == 1 {
        map.insert(key, value);
        Ok(())
    } else {
        let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
        set_value(entry, &path[1..], value)
    }
}

fn parse_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(key, lowercase_keys(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lowercase_keys).collect()),
        _ => value,
    }
}

fn merge_over(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_over(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = PlaybackConfig::build(None, std::iter::empty()).unwrap();
        assert_eq!(config.restore.verification_timeout(), Duration::from_millis(7000));
        assert_eq!(config.resolver.item_timeout(), Duration::from_secs(10));
        assert_eq!(config.resolver.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.resolver.orphan_max_age(), Duration::from_secs(3600));
        assert_eq!(config.media_session.keep_alive(), Duration::from_secs(900));
        assert_eq!(config.engine.pending_capacity, 64);
        assert_eq!(config.sleep_timer.max_secs, 7200);
    }

    #[test]
    fn test_external_yaml_merges_over_defaults() {
        let config = PlaybackConfig::from_yaml_str("Restore:\n  Verification_Timeout_Ms: 1500\n")
            .unwrap();
        assert_eq!(config.restore.verification_timeout_ms, 1500);
        // Untouched keys keep their defaults
        assert_eq!(config.restore.recovery_window_ms, 7000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let vars = vec![
            (
                "PMOPLAYBACK_CONFIG__ENGINE__PENDING_CAPACITY".to_string(),
                "8".to_string(),
            ),
            (
                "PMOPLAYBACK_CONFIG__LOGGING__LEVEL".to_string(),
                "debug".to_string(),
            ),
            ("UNRELATED".to_string(), "1".to_string()),
        ];
        let config = PlaybackConfig::build(None, vars.into_iter()).unwrap();
        assert_eq!(config.engine.pending_capacity, 8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "resolver:\n  item_timeout_ms: 250\n  cache_dir: cache\n",
        )
        .unwrap();

        let config = PlaybackConfig::load(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.resolver.item_timeout_ms, 250);
        assert_eq!(config.config_dir(), Some(dir.path()));
        assert_eq!(config.resolver_cache_dir(), dir.path().join("cache"));
    }
}
