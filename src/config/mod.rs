// src/config/mod.rs
pub mod feeds;

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use feeds::{FileSettings, Settings};

pub const ENV_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/feeds.toml";

pub fn load_file_settings(path: &Path) -> Result<FileSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed settings from {}", path.display()))?;
    FileSettings::parse(&content).with_context(|| format!("in {}", path.display()))
}

/// Resolve settings using env var + fallbacks:
/// 1) $FEED_CONFIG_PATH (must exist)
/// 2) config/feeds.toml (optional)
/// 3) built-in defaults
///
/// Environment variables override whatever the file says.
pub fn load() -> Result<Settings> {
    let file = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display()));
        }
        Some(load_file_settings(&pb)?)
    } else {
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            Some(load_file_settings(&default)?)
        } else {
            None
        }
    };
    Ok(Settings::from_sources(file, |k| std::env::var(k).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[serial_test::serial]
    #[test]
    fn load_uses_env_path_then_default_file() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var("FEED_SUPPLY_TTL_MS");

        // Nothing on disk: defaults.
        assert_eq!(load().unwrap(), Settings::default());

        // Default location is picked up.
        fs::create_dir_all("config").unwrap();
        fs::write(DEFAULT_CONFIG_PATH, "supply_ttl_ms = 60000\n").unwrap();
        assert_eq!(load().unwrap().supply_ttl_ms, 60_000);

        // Explicit path wins over the default file, env wins over both.
        let explicit = tmp.path().join("other.toml");
        fs::write(&explicit, "supply_ttl_ms = 120000\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, explicit.display().to_string());
        assert_eq!(load().unwrap().supply_ttl_ms, 120_000);
        env::set_var("FEED_SUPPLY_TTL_MS", "5000");
        assert_eq!(load().unwrap().supply_ttl_ms, 5_000);
        env::remove_var("FEED_SUPPLY_TTL_MS");

        // Missing explicit path is an error.
        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(load().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
