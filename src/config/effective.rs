//! Effective configuration with provenance
//!
//! Captures the merged configuration plus the list of sources that
//! contributed to it, so `fw-merge config` can show where a value came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use crate::build_env::{BoardConfig, BuildEnv, BUILD_DIR, PROGNAME, PYTHONEXE};
use crate::toolchain::PackageSettings;

/// Schema version for effective config output
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "fw-merge/effective_config@1";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "fw-merge.toml";

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Board,
    File,
    Env,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/env/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/env/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ConfigSource {
    fn inline(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            path: None,
            digest: None,
        }
    }

    fn file(origin: ConfigOrigin, path: &Path, digest: String) -> Self {
        Self {
            origin,
            path: Some(path.to_string_lossy().to_string()),
            digest: Some(digest),
        }
    }
}

/// Inputs to [`EffectiveConfig::build`]
#[derive(Debug, Clone, Default)]
pub struct ConfigInputs {
    /// TOML config file; skipped when it does not exist
    pub config_file: Option<PathBuf>,

    /// PlatformIO board manifest; overrides `board_file` from the config file
    pub board_file: Option<PathBuf>,

    /// Layer from environment variables
    pub env: Option<Value>,

    /// Layer from command-line flags
    pub cli: Option<Value>,
}

/// Merged configuration with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,
    pub schema_id: String,
    pub created_at: DateTime<Utc>,

    /// The merged configuration object
    pub config: Value,

    /// Contributing sources in precedence order (lowest first)
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge builtin defaults, board manifest, config file, environment and
    /// CLI layers, in that order of increasing precedence.
    pub fn build(inputs: &ConfigInputs) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        layers.push(BuiltinDefaults::default().to_value());
        sources.push(ConfigSource::inline(ConfigOrigin::Builtin));

        let file = match &inputs.config_file {
            Some(path) if path.exists() => {
                let (value, digest) = Self::load_toml_file(path)?;
                Some((path.as_path(), value, digest))
            }
            Some(path) => {
                debug!(path = %path.display(), "config file not present, skipping");
                None
            }
            None => None,
        };

        let board_path = inputs.board_file.clone().or_else(|| {
            let (path, value, _) = file.as_ref()?;
            let relative = value.get("board_file")?.as_str()?;
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            Some(base.join(relative))
        });

        if let Some(path) = board_path {
            let (manifest, digest) = Self::load_board_manifest(&path)?;
            let mut layer = Map::new();
            layer.insert("board".to_string(), manifest);
            layers.push(Value::Object(layer));
            sources.push(ConfigSource::file(ConfigOrigin::Board, &path, digest));
        }

        if let Some((path, value, digest)) = file {
            layers.push(value);
            sources.push(ConfigSource::file(ConfigOrigin::File, path, digest));
        }

        if let Some(env) = &inputs.env {
            layers.push(env.clone());
            sources.push(ConfigSource::inline(ConfigOrigin::Env));
        }

        if let Some(cli) = &inputs.cli {
            layers.push(cli.clone());
            sources.push(ConfigSource::inline(ConfigOrigin::Cli));
        }

        let merged = merge_layers(layers);
        Self::validate_config(&merged)?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
        })
    }

    fn read_with_digest(path: &Path) -> Result<(Vec<u8>, String), ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        Ok((bytes, digest))
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let (bytes, digest) = Self::read_with_digest(path)?;
        let parse_error = |message: String| ConfigError::Toml {
            path: path.to_path_buf(),
            message,
        };

        let contents =
            String::from_utf8(bytes).map_err(|e| parse_error(format!("invalid UTF-8: {}", e)))?;
        let table: toml::Table = toml::from_str(&contents).map_err(|e| parse_error(e.to_string()))?;

        Ok((Self::toml_to_json(toml::Value::Table(table)), digest))
    }

    /// Load a PlatformIO board manifest (JSON)
    fn load_board_manifest(path: &Path) -> Result<(Value, String), ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::BoardNotFound(path.to_path_buf()));
        }

        let (bytes, digest) = Self::read_with_digest(path)?;
        let manifest: Value = serde_json::from_slice(&bytes).map_err(|e| ConfigError::Board {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if !manifest.is_object() {
            return Err(ConfigError::Board {
                path: path.to_path_buf(),
                message: "expected a JSON object".to_string(),
            });
        }

        Ok((manifest, digest))
    }

    /// Convert TOML Value to JSON Value
    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => Value::Array(arr.into_iter().map(Self::toml_to_json).collect()),
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    fn validate_config(config: &Value) -> Result<(), ConfigError> {
        for key in ["build.dir", "build.python"] {
            let value = key
                .split('.')
                .try_fold(config, |node, part| node.get(part));

            match value {
                None | Some(Value::Null) => {
                    if key == "build.dir" {
                        return Err(ConfigError::Missing(key));
                    }
                }
                Some(Value::String(s)) if s.trim().is_empty() => {
                    return Err(ConfigError::Invalid {
                        key: key.to_string(),
                        reason: "must not be empty".to_string(),
                    });
                }
                Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(ConfigError::Invalid {
                        key: key.to_string(),
                        reason: "expected a string".to_string(),
                    });
                }
            }
        }

        if let Some(board) = config.get("board") {
            if !board.is_object() {
                return Err(ConfigError::Invalid {
                    key: "board".to_string(),
                    reason: "expected a table".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get a config value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// The explicit environment handed to the merge step
    pub fn build_env(&self) -> BuildEnv {
        let mut env = BuildEnv::new(self.get_str("build.dir").unwrap_or_default());
        if let Some(python) = self.get_str("build.python") {
            env = env.with_var(PYTHONEXE, python);
        }
        if let Some(progname) = self.get_str("build.progname") {
            env = env.with_var(PROGNAME, progname);
        }
        debug!(build_dir = ?env.var(BUILD_DIR), "build environment assembled");

        let board = self
            .get("board")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        env.with_board(BoardConfig::new(board))
    }

    /// `[packages]` settings for the package registry
    pub fn package_settings(&self) -> Result<PackageSettings, ConfigError> {
        match self.get("packages") {
            Some(packages) => {
                serde_json::from_value(packages.clone()).map_err(|e| ConfigError::Invalid {
                    key: "packages".to_string(),
                    reason: e.to_string(),
                })
            }
            None => Ok(PackageSettings::default()),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON serialization failed: {}", e),
            )
        })?;
        fs::write(path, json)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Invalid TOML in {}: {message}", path.display())]
    Toml { path: PathBuf, message: String },

    #[error("Invalid board manifest {}: {message}", path.display())]
    Board { path: PathBuf, message: String },

    #[error("Board manifest not found: {}", .0.display())]
    BoardNotFound(PathBuf),

    #[error("Missing required setting '{0}' (set BUILD_DIR, [build] dir, or --build-dir)")]
    Missing(&'static str),

    #[error("Invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}
