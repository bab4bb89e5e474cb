use crate::config::Config;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_WORKSPACE_DIR: &str = "info-collector";

/// Installs the global subscriber. `RUST_LOG` wins over the built-in default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Creates `dir` with a starter `config.toml` unless one exists. Returns the
/// config path.
pub fn init_workspace(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let config_path = dir.join(CONFIG_FILE_NAME);

    if config_path.exists() {
        tracing::info!("Using existing config at {:?}", config_path);
    } else {
        Config::starter().save_to_file(&config_path)?;
        tracing::info!("Wrote starter config to {:?}", config_path);
    }

    Ok(config_path)
}

/// The explicit config path, or the default workspace bootstrapped on demand.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => init_workspace(Path::new(DEFAULT_WORKSPACE_DIR)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_workspace_writes_starter_once() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("collector");

        let path = init_workspace(&workspace).unwrap();
        assert_eq!(path, workspace.join(CONFIG_FILE_NAME));
        let config = Config::load(&path).unwrap();
        assert!(config.modules.contains_key("twitter"));

        fs::write(&path, "[global]\noutput_dir = \"custom\"\n").unwrap();
        init_workspace(&workspace).unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_explicit_config_path_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert_eq!(resolve_config_path(Some(&path)).unwrap(), path);
        assert!(!path.exists());
    }
}
