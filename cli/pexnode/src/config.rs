//! On-disk configuration.
//!
//! A JSON file (default `config.json`) found in, in order:
//! - `$PEXNODE_CONFIG_DIR`
//! - `./.pexnode/`
//! - the platform config directory (e.g. `~/.config/pexnode/`)
//!
//! Keys are case-insensitive, so `MANAGER_URL` and `manager_url` are the same
//! setting. Every value is a fallback for the matching command-line flag.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::commands::NodeFields;

/// Default config file name.
pub const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "PEXNODE_CONFIG_DIR";

/// Directory name searched for in the working directory.
const LOCAL_CONFIG_DIR: &str = ".pexnode";

/// Locate the config directory. `None` if no candidate exists.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }

    let local = std::env::current_dir().ok()?.join(LOCAL_CONFIG_DIR);
    if local.is_dir() {
        return Some(local);
    }

    ProjectDirs::from("com", "pexnode", "pexnode")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .filter(|dir| dir.is_dir())
}

/// Settings read from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub manager_url: Option<String>,
    pub auth_user: Option<String>,
    pub auth_pass: Option<String>,
    pub insecure: Option<bool>,

    #[serde(flatten)]
    pub node: NodeFields,
}

impl FileConfig {
    /// Load `file_name` from the config directory.
    ///
    /// A missing directory or file yields an empty config. So does a file
    /// that is not valid JSON, with a warning.
    pub fn load(file_name: Option<&str>) -> Result<Self> {
        let Some(dir) = config_dir() else {
            debug!("No config directory found");
            return Ok(Self::default());
        };
        Self::load_from(&dir.join(file_name.unwrap_or(CONFIG_FILE)))
    }

    /// Load a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        match Self::parse(&contents) {
            Ok(config) => {
                debug!(path = %path.display(), "Loaded config file");
                Ok(config)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed config file");
                Ok(Self::default())
            }
        }
    }

    /// Parse config JSON, normalising keys to lower case.
    pub fn parse(contents: &str) -> Result<Self> {
        let raw: Map<String, Value> = serde_json::from_str(contents)?;
        let normalised: Map<String, Value> = raw
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Ok(serde_json::from_value(Value::Object(normalised))?)
    }
}
