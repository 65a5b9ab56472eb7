//! Configuration file resolution and loading
//!
//! Resolution priority order for a service's config file:
//! 1. Environment variable (explicit path, highest priority)
//! 2. User config directory (`~/.config/teilebot/<file>` on Linux)
//! 3. System config directory (`/etc/teilebot/<file>`, Linux only)
//!
//! A missing config file is not an error; services fall back to compiled
//! defaults and environment overrides.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tracing::debug;

/// Resolve a service config file path.
///
/// Returns `None` when no candidate file exists; the caller should use
/// compiled defaults in that case.
pub fn resolve_config_file(env_var_name: &str, file_name: &str) -> Option<PathBuf> {
    // Priority 1: explicit path from the environment
    if let Ok(path) = std::env::var(env_var_name) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        debug!(path = %path.display(), "config path from {} does not exist", env_var_name);
    }

    // Priority 2: user config directory
    if let Some(dir) = dirs::config_dir() {
        let path = dir.join("teilebot").join(file_name);
        if path.exists() {
            return Some(path);
        }
    }

    // Priority 3: system config directory (Linux)
    if cfg!(target_os = "linux") {
        let path = PathBuf::from("/etc/teilebot").join(file_name);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Load and deserialize a TOML config file.
pub fn load_toml<T: DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Deserialize)]
    struct Sample {
        name: String,
        limit: u32,
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"panel\"\nlimit = 4").unwrap();

        let sample: Sample = load_toml(&file.path().to_path_buf()).unwrap();
        assert_eq!(sample.name, "panel");
        assert_eq!(sample.limit, 4);
    }

    #[test]
    fn test_load_toml_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[").unwrap();

        let result: Result<Sample> = load_toml(&file.path().to_path_buf());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_resolve_missing_returns_none() {
        let resolved = resolve_config_file("TEILEBOT_TEST_NO_SUCH_VAR", "no-such-file.toml");
        assert!(resolved.is_none());
    }
}
