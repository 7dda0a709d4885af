//! Configuration loading and root folder resolution
//!
//! The root folder holds `cti.db` and is resolved with the priority:
//! 1. Command-line argument (highest priority)
//! 2. `CTI_ROOT_FOLDER` environment variable
//! 3. TOML config file (`~/.config/cti-scraper/<module>.toml`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable consulted during root folder resolution
pub const ROOT_FOLDER_ENV: &str = "CTI_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "cti.db";

/// TOML configuration file shape (per-module file under the config dir)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder override
    pub root_folder: Option<String>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// LLM provider API key (lowest-priority tier; database wins)
    pub llm_api_key: Option<String>,
    /// LLM model identifier override
    pub llm_model: Option<String>,
    /// LLM provider base URL override
    pub llm_base_url: Option<String>,
}

/// Logging section of the TOML config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level directive (e.g. "info", "cti_ingest=debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolves the root folder for a module following the 4-tier priority order
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<String>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Supply a command-line override (tier 1)
    pub fn with_cli_arg(mut self, arg: Option<String>) -> Self {
        self.cli_arg = arg;
        self
    }

    /// Resolve the root folder. Never fails; falls back to the OS default.
    pub fn resolve(&self) -> PathBuf {
        // Tier 1: command-line argument
        if let Some(path) = &self.cli_arg {
            debug!("Root folder from command line: {}", path);
            return PathBuf::from(path);
        }

        // Tier 2: environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!("Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        // Tier 3: TOML config file
        match load_toml_config(&self.module_name) {
            Ok(config) => {
                if let Some(path) = config.root_folder {
                    debug!("Root folder from TOML config: {}", path);
                    return PathBuf::from(path);
                }
            }
            Err(e) => {
                debug!("No TOML config for {}: {}", self.module_name, e);
            }
        }

        // Tier 4: OS-dependent default
        default_root_folder()
    }
}

/// Creates the resolved root folder and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder (and parents) if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            debug!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    /// Path of the shared SQLite database inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }
}

/// Path of a module's TOML config file (`~/.config/cti-scraper/<module>.toml`)
pub fn toml_config_path(module_name: &str) -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("cti-scraper").join(format!("{}.toml", module_name)))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load a module's TOML config file
pub fn load_toml_config(module_name: &str) -> Result<TomlConfig> {
    let path = toml_config_path(module_name)?;
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a TOML config atomically (write temp file, then rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        warn!("Atomic rename failed, falling back to direct write: {}", e);
        let content = toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
        std::fs::write(path, content)?;
        let _ = std::fs::remove_file(&tmp_path);
    }
    Ok(())
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/cti-scraper (or /var/lib/cti-scraper system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("cti-scraper"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/cti-scraper"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("cti-scraper"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/cti-scraper"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("cti-scraper"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\cti-scraper"))
    } else {
        PathBuf::from("./cti_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arg_wins_over_everything() {
        let resolver =
            RootFolderResolver::new("test-module").with_cli_arg(Some("/tmp/cli-root".to_string()));
        assert_eq!(resolver.resolve(), PathBuf::from("/tmp/cli-root"));
    }

    #[test]
    fn default_root_is_not_empty() {
        let resolver = RootFolderResolver::new("test-module-without-config");
        // No CLI arg; env var may or may not be set in the test environment,
        // but resolution always produces a non-empty path.
        let path = resolver.resolve();
        assert!(!path.as_os_str().is_empty());
    }

    #[test]
    fn initializer_creates_directory_and_names_db() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("root");
        let initializer = RootFolderInitializer::new(root.clone());
        initializer.ensure_directory_exists().unwrap();
        assert!(root.is_dir());
        assert_eq!(initializer.database_path(), root.join("cti.db"));
    }

    #[test]
    fn toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cti-ingest.toml");

        let config = TomlConfig {
            root_folder: Some("/data/cti".to_string()),
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
            llm_api_key: Some("test-key".to_string()),
            llm_model: None,
            llm_base_url: None,
        };

        write_toml_config(&config, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: TomlConfig = toml::from_str(&content).unwrap();

        assert_eq!(parsed.root_folder.as_deref(), Some("/data/cti"));
        assert_eq!(parsed.logging.level, "debug");
        assert_eq!(parsed.llm_api_key.as_deref(), Some("test-key"));
        assert!(parsed.llm_model.is_none());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = load_toml_config("definitely-not-a-real-module-name");
        assert!(err.is_err());
    }
}
