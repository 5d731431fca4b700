//! Configuration schema and file loading

use crate::error::{Result, WhitelistError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File paths the pipeline operates on
///
/// Passed explicitly into the components at startup so the store and
/// classifier stay testable against temporary files.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Append-only mail login log supplied by the log-routing collaborator
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// SQLite database holding per-(IP, user) success counts
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Draft report output, reviewed by an operator
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/var/log/mail-auth.log")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/f2b-whitelist/whitelist.db")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("/etc/fail2ban/jail.d/ignoreip.draft")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            db_path: default_db_path(),
            report_path: default_report_path(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        // Priority order:
        // 1. $F2B_WHITELIST_CONFIG
        // 2. $XDG_CONFIG_HOME/f2b-whitelist/config.toml
        // 3. ~/.config/f2b-whitelist/config.toml

        if let Ok(path) = env::var("F2B_WHITELIST_CONFIG") {
            return PathBuf::from(path);
        }

        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("f2b-whitelist/config.toml");
        }

        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(".config/f2b-whitelist/config.toml");
        }

        PathBuf::from("config.toml")
    }

    /// Load config from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| WhitelistError::ConfigLoad {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load config from an explicit path, or from the default location,
    /// falling back to built-in defaults when no file exists
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Config> {
        if let Some(p) = path {
            return Self::load_from_file(&p);
        }

        let path = Self::default_config_path();
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
