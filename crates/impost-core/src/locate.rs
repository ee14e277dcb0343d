//! Database location resolution
//!
//! A database can be addressed three ways, in order of precedence: an
//! explicit root path, an explicit config file naming the path, or a
//! named profile whose config lives under the config home. With none of
//! them set, the default profile applies.
//!
//! Config files are TOML:
//!
//! ```toml
//! [database]
//! path = "/home/mikhail/mail"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::database::{Database, DatabaseMode};
use crate::error::{ImpostError, Result};

/// Directory under the config home holding per-profile configs.
const CONFIG_DIR: &str = "impost";

/// Profile used when none is named.
const DEFAULT_PROFILE: &str = "default";

/// Config file name within a profile directory.
const CONFIG_FILE: &str = "config";

/// Environment variable overriding the platform config home.
pub const CONFIG_HOME_ENV: &str = "XDG_CONFIG_HOME";

#[derive(Debug, Deserialize)]
struct ConfigFile {
    database: DatabaseSection,
}

#[derive(Debug, Deserialize)]
struct DatabaseSection {
    path: PathBuf,
}

/// Where to find a database.
///
/// The environment is read once, in [`DatabaseLocation::from_env`];
/// resolution itself is a pure function of these fields, so callers
/// (and tests) can pin `config_home` explicitly.
#[derive(Debug, Clone, Default)]
pub struct DatabaseLocation {
    /// Explicit database root; wins over everything else.
    pub path: Option<PathBuf>,
    /// Explicit config file naming the database root.
    pub config_file: Option<PathBuf>,
    /// Named profile under the config home.
    pub profile: Option<String>,
    /// Base directory for profile resolution.
    pub config_home: Option<PathBuf>,
}

impl DatabaseLocation {
    /// Location with the config home taken from `XDG_CONFIG_HOME` when
    /// set, else the platform default.
    pub fn from_env(
        path: Option<&Path>,
        config_file: Option<&Path>,
        profile: Option<&str>,
    ) -> Self {
        let config_home = env::var_os(CONFIG_HOME_ENV)
            .map(PathBuf::from)
            .or_else(dirs::config_dir);
        Self {
            path: path.map(Path::to_path_buf),
            config_file: config_file.map(Path::to_path_buf),
            profile: profile.map(str::to_string),
            config_home,
        }
    }

    /// Resolve to the database root directory without opening it.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            if !path.is_dir() {
                return Err(ImpostError::ConfigResolution(format!(
                    "database path does not exist: {}",
                    path.display()
                )));
            }
            return Ok(path.clone());
        }
        if let Some(config_file) = &self.config_file {
            return read_config_file(config_file);
        }
        let home = self.config_home.as_deref().ok_or_else(|| {
            ImpostError::ConfigResolution("no config home directory available".to_string())
        })?;
        let profile = self.profile.as_deref().unwrap_or(DEFAULT_PROFILE);
        read_config_file(&home.join(CONFIG_DIR).join(profile).join(CONFIG_FILE))
    }

    /// Resolve and open.
    pub fn open(&self, mode: DatabaseMode) -> Result<Database> {
        Database::open(self.resolve()?, mode)
    }
}

fn read_config_file(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(ImpostError::ConfigResolution(format!(
            "config file does not exist: {}",
            path.display()
        )));
    }
    let raw = fs::read_to_string(path)?;
    let parsed: ConfigFile = toml::from_str(&raw)
        .map_err(|e| ImpostError::ConfigResolution(format!("{}: {e}", path.display())))?;
    Ok(parsed.database.path)
}
