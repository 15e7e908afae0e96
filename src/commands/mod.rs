//! CLI command implementations.

pub mod detect;
pub mod list;
pub mod sync;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::cmd_abstraction::{CommandExecutor, RealCommandExecutor};
use crate::config::Config;

/// Load the config file, which must exist.
pub(crate) fn load_config(config_path: &Path) -> Result<Config> {
    Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))
}

/// Load the config file, falling back to defaults when it is absent.
pub(crate) fn load_config_or_default(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        load_config(config_path)
    } else {
        warn!("Config file {:?} not found, using defaults", config_path);
        Ok(Config::default())
    }
}

pub(crate) fn executor(config: &Config) -> Arc<dyn CommandExecutor> {
    Arc::new(RealCommandExecutor::new(config.command_timeout()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_or_default_missing_file() {
        let config =
            load_config_or_default(Path::new("/nonexistent/blocksync/config.yaml")).unwrap();
        assert!(config.dual_stack);
    }

    #[test]
    fn test_load_config_or_default_invalid_file_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"feed:\n  url: http://insecure.example.org\n")
            .unwrap();
        assert!(load_config_or_default(file.path()).is_err());
    }

    #[test]
    fn test_load_config_requires_file() {
        let err = load_config(Path::new("/nonexistent/blocksync/config.yaml")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load config"));
    }
}
