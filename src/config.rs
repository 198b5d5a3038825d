use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ObrError, Result};

/// One configured repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Display name
    pub name: String,

    /// URL of the repository document (repository.xml, .zip or .gz)
    pub url: String,

    /// Whether this repository is consulted by queries
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Repository list loaded by the query commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub repositories: Vec<RepositoryEntry>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ObrError::Config(format!("Cannot read {}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ObrError::Config(format!("Invalid config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ObrError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Repositories the query commands should consult
    pub fn enabled(&self) -> impl Iterator<Item = &RepositoryEntry> {
        self.repositories.iter().filter(|entry| entry.enabled)
    }

    /// Generate example configuration
    pub fn example() -> Self {
        Self {
            repositories: vec![
                RepositoryEntry {
                    name: "local".to_string(),
                    url: "file:///opt/bundles/repository.xml".to_string(),
                    enabled: true,
                },
                RepositoryEntry {
                    name: "releases".to_string(),
                    url: "https://repository.example.com/releases/repository.xml.gz".to_string(),
                    enabled: false,
                },
            ],
        }
    }
}
