// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scheduler configuration and its loaders.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A specialized `Result` type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// An error raised while loading or saving a [`SchedulerConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read or written.
    Io(std::io::Error),
    /// The JSON document was malformed.
    Json(serde_json::Error),
    /// The RON document was malformed.
    Ron(ron::error::SpannedError),
    /// The RON serializer failed.
    RonWrite(ron::Error),
    /// The file extension is neither `json` nor `ron`.
    UnsupportedFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config I/O error: {e}"),
            ConfigError::Json(e) => write!(f, "Invalid JSON config: {e}"),
            ConfigError::Ron(e) => write!(f, "Invalid RON config: {e}"),
            ConfigError::RonWrite(e) => write!(f, "Failed to write RON config: {e}"),
            ConfigError::UnsupportedFormat(ext) => {
                write!(f, "Unsupported config format '{ext}', expected 'json' or 'ron'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            ConfigError::Ron(e) => Some(e),
            ConfigError::RonWrite(e) => Some(e),
            ConfigError::UnsupportedFormat(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

impl From<ron::error::SpannedError> for ConfigError {
    fn from(e: ron::error::SpannedError) -> Self {
        ConfigError::Ron(e)
    }
}

impl From<ron::Error> for ConfigError {
    fn from(e: ron::Error) -> Self {
        ConfigError::RonWrite(e)
    }
}

/// Tunables for a scheduler. Every field has a default, so partial documents load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Task slots reserved up front in the pool.
    pub pool_capacity: usize,
    /// Subscriber capacity reserved the first time a task waits on an event.
    pub event_min_capacity: usize,
    /// Whether to maintain [`TaskStats`](crate::TaskStats) counters.
    pub collect_stats: bool,
    /// Whether teardown cancels the events tasks are blocked on before killing
    /// the tasks, so that waiters can observe the failure and clean up.
    pub cancel_waits_on_finish: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 64,
            event_min_capacity: 4,
            collect_stats: true,
            cancel_waits_on_finish: true,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a RON string.
    pub fn from_ron(text: &str) -> ConfigResult<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Load configuration from a `.json` or `.ron` file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match extension_of(path).as_str() {
            "json" => Self::from_json(&content),
            "ron" => Self::from_ron(&content),
            other => Err(ConfigError::UnsupportedFormat(other.to_owned())),
        }
    }

    /// Save configuration to a `.json` or `.ron` file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let text = match extension_of(path).as_str() {
            "json" => serde_json::to_string_pretty(self)?,
            "ron" => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_owned())),
        };
        std::fs::write(path, text)?;
        log::debug!("Scheduler config written to {}", path.display());
        Ok(())
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SchedulerConfig::from_json(r#"{ "pool_capacity": 8 }"#).unwrap();
        assert_eq!(config.pool_capacity, 8);
        assert_eq!(config.event_min_capacity, 4);
        assert!(config.collect_stats);
        assert!(config.cancel_waits_on_finish);
    }

    #[test]
    fn ron_document_loads() {
        let config =
            SchedulerConfig::from_ron("(event_min_capacity: 16, collect_stats: false)").unwrap();
        assert_eq!(config.event_min_capacity, 16);
        assert!(!config.collect_stats);
        assert_eq!(config.pool_capacity, 64);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = SchedulerConfig::from_json("{ pool_capacity: }").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
        assert!(err.to_string().starts_with("Invalid JSON config"));
    }

    #[test]
    fn file_round_trip_and_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();

        let config = SchedulerConfig {
            pool_capacity: 2,
            cancel_waits_on_finish: false,
            ..Default::default()
        };
        let ron_path = dir.path().join("sched.ron");
        config.to_file(&ron_path).unwrap();
        assert_eq!(SchedulerConfig::from_file(&ron_path).unwrap(), config);

        let toml_path = dir.path().join("sched.toml");
        std::fs::write(&toml_path, "pool_capacity = 2").unwrap();
        match SchedulerConfig::from_file(&toml_path) {
            Err(ConfigError::UnsupportedFormat(ext)) => assert_eq!(ext, "toml"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }
}
