//! Configuration file handling for shub-cli

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shub_client::{StreamConfig, DEFAULT_API_URL};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API key used when none is given on the command line
    pub apikey: Option<String>,
    /// API root URL
    pub api_url: Option<String>,
    /// Default output format
    pub output: Option<OutputFormat>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Stream engine tunables
    pub stream: Option<StreamConfig>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("shub-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        apikey: Option<&str>,
        api_url: Option<&str>,
        output: Option<OutputFormat>,
        no_color: bool,
    ) -> MergedConfig {
        MergedConfig {
            apikey: apikey.map(String::from).or_else(|| self.apikey.clone()),
            api_url: api_url
                .map(String::from)
                .or_else(|| self.api_url.clone())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            output: output.or(self.output).unwrap_or_default(),
            no_color: no_color || self.no_color.unwrap_or(false),
            stream: self.stream.clone().unwrap_or_default(),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub apikey: Option<String>,
    pub api_url: String,
    pub output: OutputFormat,
    pub no_color: bool,
    pub stream: StreamConfig,
}
