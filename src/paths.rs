//! Application path management.
//!
//! ## Config file lookup
//!
//! - **Local mode**: `config.yaml` in the current working directory wins.
//!   This keeps `cargo run` and checked-out setups working without install.
//! - **Installed mode** (default): `~/.config/hercules-gw/config.yaml` (or the
//!   platform equivalent from [`dirs::config_dir`]). A default file is written
//!   there on first start so hot reload has something to watch.

use crate::config::AppConfig;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory name under the platform config dir
const APP_DIR: &str = "hercules-gw";
const CONFIG_FILE: &str = "config.yaml";

/// Resolved application paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Whether the config was found in the working directory
    pub is_local: bool,
}

impl AppPaths {
    /// Detect the config location for this process
    pub fn detect() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve(&cwd, dirs::config_dir())
    }

    /// Lookup used by [`AppPaths::detect`], with the directories passed in
    pub fn resolve(cwd: &Path, config_dir: Option<PathBuf>) -> Self {
        let local = cwd.join(CONFIG_FILE);
        if local.exists() {
            return Self {
                config: local,
                is_local: true,
            };
        }

        let base = config_dir.unwrap_or_else(|| cwd.to_path_buf());
        Self {
            config: base.join(APP_DIR).join(CONFIG_FILE),
            is_local: false,
        }
    }

    /// Write a default config file if none exists yet
    pub async fn ensure_config(&self) -> anyhow::Result<()> {
        if self.config.exists() {
            return Ok(());
        }

        if let Some(parent) = self.config.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }

        info!("No config found, writing defaults to {}", self.config.display());
        AppConfig::default()
            .save(&self.config.to_string_lossy())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_config_wins() {
        let cwd = TempDir::new().unwrap();
        std::fs::write(cwd.path().join("config.yaml"), "").unwrap();

        let paths = AppPaths::resolve(cwd.path(), Some(PathBuf::from("/home/dj/.config")));
        assert!(paths.is_local);
        assert_eq!(paths.config, cwd.path().join("config.yaml"));
    }

    #[test]
    fn test_installed_location() {
        let cwd = TempDir::new().unwrap();
        let paths = AppPaths::resolve(cwd.path(), Some(PathBuf::from("/home/dj/.config")));
        assert!(!paths.is_local);
        assert_eq!(paths.config, PathBuf::from("/home/dj/.config/hercules-gw/config.yaml"));
    }

    #[tokio::test]
    async fn test_ensure_config_writes_defaults() -> anyhow::Result<()> {
        let config_dir = TempDir::new()?;
        let cwd = TempDir::new()?;
        let paths = AppPaths::resolve(cwd.path(), Some(config_dir.path().to_path_buf()));

        paths.ensure_config().await?;
        let loaded = AppConfig::load(&paths.config.to_string_lossy()).await?;
        assert_eq!(loaded, AppConfig::default());

        // Existing files are left alone
        std::fs::write(&paths.config, "jog:\n  tick_ms: 20\n")?;
        paths.ensure_config().await?;
        let loaded = AppConfig::load(&paths.config.to_string_lossy()).await?;
        assert_eq!(loaded.jog.tick_ms, 20);
        Ok(())
    }
}
