mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Default configuration file locations, in search order.
pub const DEFAULT_PATHS: [&str; 2] = ["./camsync.toml", "~/.config/camsync/config.toml"];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    for warning in config.validate() {
        tracing::warn!(path = %path.display(), "{}", warning);
    }

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camsync.toml");
        std::fs::write(&path, "[decode]\nreindex = true\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.decode.reindex);
        assert_eq!(config.cache.mode, CacheMode::Sidecar);
    }

    #[test]
    fn test_load_config_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[cache\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err}").contains("broken.toml"));

        let err = load_config(&dir.path().join("missing.toml")).unwrap_err();
        assert!(format!("{err}").contains("Failed to read config file"));
    }
}
