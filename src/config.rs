//! Configuration
//!
//! Sources in increasing priority: built-in defaults, a TOML file, `TEMPO_*`
//! environment variables (`TEMPO_RUNNER__PACE_MS`), builder overrides.
//! The file is `TEMPO_CONFIG_PATH` or an explicit path when given, otherwise
//! an optional `tempo.toml` in the working directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_VAR: &str = "TEMPO_CONFIG_PATH";

const DEFAULT_PACE_MS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Delay of every checkpoint, in milliseconds
    pub pace_ms: u64,
    /// Start runs with the gate paused
    pub start_paused: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pace_ms: DEFAULT_PACE_MS,
            start_paused: false,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with no overrides
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    pace_ms: Option<u64>,
    start_paused: Option<bool>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn pace_ms(mut self, pace_ms: Option<u64>) -> Self {
        self.pace_ms = pace_ms;
        self
    }

    pub fn start_paused(mut self, start_paused: Option<bool>) -> Self {
        self.start_paused = start_paused;
        self
    }

    pub fn build(self) -> Result<Config> {
        // A missing .env file is not an error
        let _ = dotenvy::dotenv();

        let defaults = RunnerConfig::default();
        let mut builder = config::Config::builder()
            .set_default("runner.pace_ms", defaults.pace_ms)?
            .set_default("runner.start_paused", defaults.start_paused)?;

        let path = self
            .config_path
            .or_else(|| std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from));
        builder = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                builder.add_source(config::File::from(path))
            }
            None => builder.add_source(config::File::with_name("tempo").required(false)),
        };

        builder = builder.add_source(
            config::Environment::with_prefix("TEMPO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(pace_ms) = self.pace_ms {
            builder = builder.set_override("runner.pace_ms", pace_ms)?;
        }
        if let Some(start_paused) = self.start_paused {
            builder = builder.set_override("runner.start_paused", start_paused)?;
        }

        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(config)
    }
}
