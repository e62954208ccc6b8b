use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Oracle invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    /// "auto" to probe for a CLI on the path, "disabled", or an explicit
    /// path to the oracle executable
    pub mode: String,
    /// Upper bound for one oracle call, in seconds
    pub timeout_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            mode: "auto".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Engine configuration, persisted as YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root directory under which the `test-cases/` store and the
    /// learned-patterns cache live
    pub data_dir: PathBuf,
    /// Root of the project whose source files are scanned
    pub project_root: PathBuf,
    /// Directory holding narrative documentation, if any
    pub docs_dir: Option<PathBuf>,
    /// Directory holding prior run result files, if any
    pub results_dir: Option<PathBuf>,
    pub oracle: OracleSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            project_root: PathBuf::from("."),
            docs_dir: None,
            results_dir: None,
            oracle: OracleSettings::default(),
        }
    }
}

impl SyncConfig {
    /// Loads the configuration from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Save the configuration to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Creates a default config file if it doesn't exist
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        if path.as_ref().exists() {
            return Ok(());
        }
        SyncConfig::default().save(path)
    }

    /// Loads the config from the default location, falling back to defaults
    /// if no file exists yet
    pub fn load_or_default() -> Result<Self> {
        let path = get_config_path()?;
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Gets the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    // Check if TESTSYNC_CONFIG_PATH environment variable is set
    if let Ok(path) = std::env::var("TESTSYNC_CONFIG_PATH") {
        return Ok(PathBuf::from(path));
    }

    // Default to ~/.testsync.config
    let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

    Ok(home_dir.join(".testsync.config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");

        let mut config = SyncConfig::default();
        config.data_dir = PathBuf::from("/tmp/test-cases");
        config.oracle.timeout_secs = 30;
        config.save(&path)?;

        let loaded = SyncConfig::load(&path)?;
        assert_eq!(loaded.data_dir, PathBuf::from("/tmp/test-cases"));
        assert_eq!(loaded.oracle.timeout_secs, 30);
        assert_eq!(loaded.oracle.mode, "auto");

        Ok(())
    }

    #[test]
    fn test_create_default_does_not_overwrite() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");

        let mut config = SyncConfig::default();
        config.oracle.mode = "disabled".to_string();
        config.save(&path)?;

        SyncConfig::create_default(&path)?;
        let loaded = SyncConfig::load(&path)?;
        assert_eq!(loaded.oracle.mode, "disabled");

        Ok(())
    }
}
