//! CLI configuration handling.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use strata_schema::Dialect;

use crate::error::{CliError, CliResult};

/// Default config file name (lives in the project root).
pub const CONFIG_FILE_NAME: &str = "strata.toml";

/// Default migrations directory.
pub const MIGRATIONS_DIR: &str = "migrations";

/// Strata CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,

    /// Migration configuration.
    pub migrations: MigrationsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            migrations: MigrationsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> CliResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The configured dialect.
    pub fn dialect(&self) -> CliResult<Dialect> {
        Dialect::parse(&self.database.provider).ok_or_else(|| {
            CliError::Config(format!(
                "unknown database provider '{}'",
                self.database.provider
            ))
        })
    }

    /// The connection URL, from config or `DATABASE_URL`.
    pub fn database_url(&self) -> CliResult<String> {
        if let Some(url) = &self.database.url {
            return Ok(url.clone());
        }
        std::env::var("DATABASE_URL").map_err(|_| {
            CliError::Config(
                "no database URL: set database.url in strata.toml or DATABASE_URL".to_string(),
            )
        })
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database provider (postgres, mysql, sqlite).
    pub provider: String,

    /// Database connection URL.
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            provider: "postgres".to_string(),
            url: None,
        }
    }
}

/// Migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Directory holding migration files.
    pub dir: PathBuf,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(MIGRATIONS_DIR),
        }
    }
}
