//! Relay configuration.
//!
//! A single JSON file. The first existing path wins:
//!
//! 1. `--config <path>`
//! 2. `$HELIX_DIAG_CONFIG`
//! 3. `./config.json`
//! 4. `~/.helix-diag/config.json`
//!
//! A missing file means defaults. `HELIX_PATH` in the environment overrides
//! `helix_path`. Keys this crate does not know are kept when the file is
//! rewritten.

mod persist;

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use helix_diag_lsp::RelaySettings;
use helix_diag_lsp::types::{DEFAULT_ANALYZER_TIMEOUT, DEFAULT_DEBOUNCE, DEFAULT_DEEP_FLAG};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CONFIG_ENV: &str = "HELIX_DIAG_CONFIG";
pub const HELIX_PATH_ENV: &str = "HELIX_PATH";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } | Self::Write { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Analyzer binary: a path or a name on `PATH`. `${VAR}` is expanded.
    pub helix_path: Option<String>,
    /// TCP port. Absent or 0 lets the OS choose.
    pub port: Option<u16>,
    pub analyzer_timeout_ms: u64,
    pub debounce_ms: u64,
    pub deep_flag: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            helix_path: None,
            port: None,
            analyzer_timeout_ms: DEFAULT_ANALYZER_TIMEOUT.as_millis() as u64,
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            deep_flag: DEFAULT_DEEP_FLAG.to_string(),
            extra: Map::new(),
        }
    }
}

/// A configuration and the file it belongs to.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RelayConfig,
    /// The file that was read, or the explicit path if it does not exist yet.
    /// `None` when no file was found and none was requested.
    pub path: Option<PathBuf>,
}

/// Replace `${VAR}` with the variable's value; unset variables expand to
/// nothing and an unclosed `${` is kept as-is.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".helix-diag"))
}

/// Paths searched for the config file, in priority order.
#[must_use]
pub fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut candidates = Vec::new();
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        candidates.push(PathBuf::from(path));
    }
    candidates.push(PathBuf::from(CONFIG_FILE_NAME));
    if let Some(dir) = config_dir() {
        candidates.push(dir.join(CONFIG_FILE_NAME));
    }
    candidates
}

impl RelayConfig {
    /// Find and load the config, then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        let found = config_candidates(explicit).into_iter().find(|p| p.exists());
        let loaded = match found {
            Some(path) => LoadedConfig {
                config: Self::load_from(&path)?,
                path: Some(path),
            },
            None => {
                tracing::debug!("No config file found; using defaults");
                LoadedConfig {
                    config: Self::default(),
                    path: explicit.map(Path::to_path_buf),
                }
            }
        };
        Ok(LoadedConfig {
            config: loaded.config.with_env_overrides(|key| env::var(key).ok()),
            path: loaded.path,
        })
    }

    /// Read one file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {err}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {}: {err}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(HELIX_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            self.helix_path = Some(path);
        }
        self
    }

    /// `helix_path` with variables expanded; `None` if unset or blank.
    #[must_use]
    pub fn resolved_helix_path(&self) -> Option<String> {
        self.helix_path
            .as_deref()
            .map(expand_env_vars)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
    }

    #[must_use]
    pub fn relay_settings(&self) -> RelaySettings {
        let analyzer_timeout = if self.analyzer_timeout_ms == 0 {
            tracing::warn!("analyzer_timeout_ms = 0 is not usable; using the default");
            DEFAULT_ANALYZER_TIMEOUT
        } else {
            Duration::from_millis(self.analyzer_timeout_ms)
        };
        let deep_flag = match self.deep_flag.trim() {
            "" => DEFAULT_DEEP_FLAG.to_string(),
            flag => flag.to_string(),
        };
        RelaySettings {
            analyzer_binary: self.resolved_helix_path(),
            deep_flag,
            analyzer_timeout,
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    /// Write `port` into the config file at `path`, leaving every other key
    /// untouched. The file is created if missing.
    pub fn persist_port(path: &Path, port: u16) -> Result<(), ConfigError> {
        let mut root = match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Map::new(),
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    tracing::warn!(
                        "Config at {} is not a JSON object; replacing it",
                        path.display()
                    );
                    Map::new()
                }
                Err(source) => {
                    return Err(ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        root.insert("port".to_string(), Value::from(port));

        let mut bytes = serde_json::to_vec_pretty(&Value::Object(root)).map_err(|e| {
            ConfigError::Write {
                path: path.to_path_buf(),
                source: io::Error::other(e),
            }
        })?;
        bytes.push(b'\n');
        persist::atomic_write(path, &bytes).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(port, path = %path.display(), "Persisted port");
        Ok(())
    }
}
