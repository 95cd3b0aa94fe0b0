use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::pedigree::{RemovalPolicy, RulePolicy, TreeLayout};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cattery: CatteryConfig,
    #[serde(default)]
    pub pedigree: PedigreeConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Core service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatteryConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

/// Pedigree graph tuning: tree bounds, layout and rule policy
#[derive(Debug, Clone, Deserialize)]
pub struct PedigreeConfig {
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    #[serde(default = "default_horizontal_spacing")]
    pub horizontal_spacing: f64,
    #[serde(default = "default_row_height")]
    pub row_height: f64,
    /// Require fathers to be male and mothers female on every validated write.
    #[serde(default = "default_enforce_gender")]
    pub enforce_gender: bool,
    #[serde(default)]
    pub canvas_removal: RemovalPolicy,
}

impl Default for PedigreeConfig {
    fn default() -> Self {
        Self {
            max_generations: default_max_generations(),
            horizontal_spacing: default_horizontal_spacing(),
            row_height: default_row_height(),
            enforce_gender: default_enforce_gender(),
            canvas_removal: RemovalPolicy::default(),
        }
    }
}

impl PedigreeConfig {
    pub fn rule_policy(&self) -> RulePolicy {
        RulePolicy {
            enforce_gender: self.enforce_gender,
        }
    }

    pub fn layout(&self) -> TreeLayout {
        TreeLayout {
            horizontal_spacing: self.horizontal_spacing,
            row_height: self.row_height,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_http_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_authless")]
    pub authless: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            api_key_env: default_http_api_key_env(),
            allowed_origins: default_allowed_origins(),
            authless: default_authless(),
        }
    }
}

fn default_max_generations() -> usize {
    5
}

fn default_horizontal_spacing() -> f64 {
    220.0
}

fn default_row_height() -> f64 {
    160.0
}

fn default_enforce_gender() -> bool {
    true
}

fn default_authless() -> bool {
    false
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_api_key_env() -> String {
    "CATTERY_ADMIN_KEY".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    // Empty means "allow any" - set allowed_origins in config.toml for production
    vec![]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

/// Upper bound on `pedigree.max_generations`; trees wider than 2^16 leaves are not drawable anyway.
pub const MAX_GENERATIONS_LIMIT: usize = 16;

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in CATTERY_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Optional .env; a missing file is fine
        let _ = dotenv::dotenv();

        let config_path = std::env::var("CATTERY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.cattery.db_path.as_os_str().is_empty() {
            anyhow::bail!("cattery.db_path must not be empty");
        }

        if self.pedigree.max_generations == 0 || self.pedigree.max_generations > MAX_GENERATIONS_LIMIT {
            anyhow::bail!(
                "pedigree.max_generations must be between 1 and {}",
                MAX_GENERATIONS_LIMIT
            );
        }

        if !(self.pedigree.horizontal_spacing > 0.0) {
            anyhow::bail!("pedigree.horizontal_spacing must be greater than 0");
        }

        if !(self.pedigree.row_height > 0.0) {
            anyhow::bail!("pedigree.row_height must be greater than 0");
        }

        if !self.http_server.authless && self.http_server.api_key_env.trim().is_empty() {
            anyhow::bail!("http_server.api_key_env must name an environment variable unless authless = true");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.cattery.db_path
    }

    /// Get migrations directory
    pub fn migrations_dir(&self) -> &Path {
        &self.cattery.migrations_dir
    }
}
