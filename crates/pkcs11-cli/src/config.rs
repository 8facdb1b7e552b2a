//! Configuration file for the PKCS#11 CLI.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use pkcs11_module::Template;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// PKCS#11 library to load (path or loader name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    /// Structure layout of the library; defaults to the host platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<Template>,
    /// Only list slots that hold a token
    pub token_present: bool,
    /// Upper bound on the number of slots requested from the module
    pub max_slots: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            library: None,
            template: None,
            token_present: true,
            max_slots: 64,
        }
    }
}

impl CliConfig {
    /// Load configuration from `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        ProjectDirs::from("org", "pkcs11", "pkcs11-cli")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("pkcs11-cli.toml"))
    }
}
