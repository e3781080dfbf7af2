//! Runtime configuration — where the data dir lives and the few tunables
//! read from an optional `config.toml` next to it.
//!
//! Resolution order for the data dir:
//!   1. `AGENTSYNC_DATA_DIR` environment variable
//!   2. `$XDG_DATA_HOME/agentsync` (unix) / `%APPDATA%\agentsync` (windows)
//!   3. `$HOME/.local/share/agentsync`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tracing::debug;

pub const DATA_DIR_ENV: &str = "AGENTSYNC_DATA_DIR";

/// Tunables from `{data_dir}/config.toml`. Every field is optional; an
/// absent file means all defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Tracing filter directive, e.g. `info` or `agentsync=debug`.
    pub log_level: Option<String>,
    /// Seconds between background drift checks.
    pub drift_poll_secs: Option<u64>,
}

impl Config {
    pub fn drift_poll_interval(&self) -> Duration {
        self.drift_poll_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::drift::poller::DEFAULT_INTERVAL)
    }
}

/// Resolve the data dir without touching the filesystem.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Ok(PathBuf::from(appdata).join("agentsync"));
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join("agentsync"));
        }
    }
    let home = std::env::var("HOME").context("neither HOME nor a data dir override is set")?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("agentsync"))
}

/// Load `config.toml` from the data dir. Absent file means defaults; a
/// malformed file is an error — silently ignoring typos hides real intent.
pub fn load(data_dir: &std::path::Path) -> Result<Config> {
    let path = data_dir.join("config.toml");
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Config::default());
        }
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let config: Config =
        toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_file_is_defaults() {
        let tmp = TempDir::new().unwrap();
        let c = load(tmp.path()).unwrap();
        assert!(c.log_level.is_none());
        assert_eq!(c.drift_poll_interval(), Duration::from_secs(15));
    }

    #[test]
    fn overrides_parse() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "log_level = \"debug\"\ndrift_poll_secs = 60\n",
        )
        .unwrap();
        let c = load(tmp.path()).unwrap();
        assert_eq!(c.log_level.as_deref(), Some("debug"));
        assert_eq!(c.drift_poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "drift_pol_secs = 60\n").unwrap();
        assert!(load(tmp.path()).is_err());
    }
}
