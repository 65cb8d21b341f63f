//! Configuration loading and typed config structures for the engine.
//!
//! The configuration lives in `trailhead.yaml`. Every section and field
//! has a default, so an empty file (or no file at all) yields a runnable
//! configuration. A few values can be overridden from the environment so
//! deployments need not edit the file:
//!
//! - `TRAILHEAD_API_URL` overrides `remote.base_url`
//! - `TRAILHEAD_STORAGE_DIR` overrides `storage.dir`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Config file used when neither a CLI argument nor `TRAILHEAD_CONFIG`
/// names one.
pub const DEFAULT_CONFIG_PATH: &str = "trailhead.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration, mirroring `trailhead.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Which game to run and where its content lives.
    #[serde(default)]
    pub game: GameConfig,

    /// Remote backpack API.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Backpack sync timing.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Client-side persistence.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Initial player settings.
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not a mapping.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("TRAILHEAD_API_URL") {
            self.remote.base_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(dir) = lookup("TRAILHEAD_STORAGE_DIR") {
            self.storage.dir = PathBuf::from(dir);
        }
    }

    /// Resolve the config file path: the first CLI argument, then
    /// `TRAILHEAD_CONFIG`, then [`DEFAULT_CONFIG_PATH`].
    pub fn resolve_path(cli_arg: Option<String>, env_path: Option<String>) -> PathBuf {
        cli_arg
            .or(env_path)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }
}

/// Game selection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GameConfig {
    /// Game slug scoping backpack and drop-log state.
    #[serde(default = "default_slug")]
    pub slug: String,

    /// Content bundle (JSON) holding the geofence features.
    #[serde(default = "default_features_path")]
    pub features_path: PathBuf,

    /// Recorded position track to replay (JSON array or JSON lines).
    #[serde(default)]
    pub track_path: Option<PathBuf>,

    /// Replay speed multiplier; 2.0 replays twice as fast.
    #[serde(default = "default_replay_speed")]
    pub replay_speed: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            slug: default_slug(),
            features_path: default_features_path(),
            track_path: None,
            replay_speed: default_replay_speed(),
        }
    }
}

/// Remote backpack API settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the API. Absent means play against an in-memory remote.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Backpack sync settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before a backpack snapshot is pushed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl SyncConfig {
    /// The debounce window as a [`Duration`].
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Client-side persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per storage key.
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

/// Player settings at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SettingsConfig {
    /// Audio playback enabled.
    #[serde(default = "default_true")]
    pub audio: bool,

    /// Diagnostic overlays (radius polygons).
    #[serde(default)]
    pub debug: bool,

    /// Drive position from the simulated pointer instead of the replay
    /// watch.
    #[serde(default)]
    pub simulate: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            audio: true,
            debug: false,
            simulate: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_slug() -> String {
    "demo".to_owned()
}

fn default_features_path() -> PathBuf {
    PathBuf::from("features.json")
}

const fn default_replay_speed() -> f64 {
    1.0
}

const fn default_debounce_ms() -> u64 {
    600
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".trailhead")
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse_without_env(yaml: &str) -> EngineConfig {
        if yaml.trim().is_empty() {
            return EngineConfig::default();
        }
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.game.slug, "demo");
        assert_eq!(config.sync.debounce(), Duration::from_millis(600));
        assert_eq!(config.storage.dir, PathBuf::from(".trailhead"));
        assert!(config.settings.audio);
        assert!(!config.settings.simulate);
        assert!(config.remote.base_url.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
game:
  slug: river-walk
  features_path: content/river.json
  track_path: tracks/loop.jsonl
  replay_speed: 4.0
remote:
  base_url: "https://hunt.example/api"
sync:
  debounce_ms: 250
storage:
  dir: /var/lib/trailhead
settings:
  audio: false
  debug: true
  simulate: true
logging:
  level: debug
"#;
        let config = parse_without_env(yaml);
        assert_eq!(config.game.slug, "river-walk");
        assert_eq!(config.game.track_path, Some(PathBuf::from("tracks/loop.jsonl")));
        assert_eq!(config.remote.base_url.as_deref(), Some("https://hunt.example/api"));
        assert_eq!(config.sync.debounce_ms, 250);
        assert!(config.settings.debug);
        assert!(!config.settings.audio);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = parse_without_env("game:\n  slug: short\n");
        assert_eq!(config.game.slug, "short");
        assert_eq!(config.game.features_path, PathBuf::from("features.json"));
        assert_eq!(config.sync.debounce_ms, 600);
        assert_eq!(parse_without_env(""), EngineConfig::default());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = EngineConfig::default();
        config.apply_overrides(|key| match key {
            "TRAILHEAD_API_URL" => Some("http://localhost:9000".to_owned()),
            "TRAILHEAD_STORAGE_DIR" => Some("/tmp/th".to_owned()),
            _ => None,
        });
        assert_eq!(config.remote.base_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.storage.dir, PathBuf::from("/tmp/th"));

        // An empty URL switches back to the in-memory remote.
        config.apply_overrides(|key| (key == "TRAILHEAD_API_URL").then(String::new));
        assert!(config.remote.base_url.is_none());
    }

    #[test]
    fn config_path_resolution_order() {
        assert_eq!(
            EngineConfig::resolve_path(Some("a.yaml".to_owned()), Some("b.yaml".to_owned())),
            PathBuf::from("a.yaml")
        );
        assert_eq!(
            EngineConfig::resolve_path(None, Some("b.yaml".to_owned())),
            PathBuf::from("b.yaml")
        );
        assert_eq!(
            EngineConfig::resolve_path(None, None),
            PathBuf::from(DEFAULT_CONFIG_PATH)
        );
    }

    #[test]
    fn from_file_reads_yaml_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trailhead.yaml");
        std::fs::write(&path, "game:\n  slug: from-disk\nsync:\n  debounce_ms: 50\n").unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.game.slug, "from-disk");
        assert_eq!(config.sync.debounce_ms, 50);

        let missing = EngineConfig::from_file(&dir.path().join("absent.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            EngineConfig::parse("game: [unterminated"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
