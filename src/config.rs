//! Configuration management for backoffice-sim.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::clock::FrozenClock;
use crate::suites::Suite;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub suite: Suite,
    /// Database document loaded before the first call. Empty when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
    /// Save a transcript of every `session` run.
    #[serde(default = "bool_true")]
    pub transcript: bool,
}

fn bool_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            suite: Suite::default(),
            seed: None,
            transcript: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Overrides the suite's frozen literal, `YYYY-MM-DDTHH:MM:SS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tools exposed to the caller; empty means all of the suite's tools.
    #[serde(default)]
    pub enabled: Vec<String>,
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".backoffice-sim").join("config.toml"))
    }

    /// Load from the default path, then apply `BACKOFFICE_*` overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(suite) = lookup("BACKOFFICE_SUITE") {
            self.session.suite = suite
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid BACKOFFICE_SUITE")?;
        }
        if let Some(seed) = lookup("BACKOFFICE_SEED") {
            self.session.seed = Some(PathBuf::from(seed));
        }
        if let Some(timestamp) = lookup("BACKOFFICE_TIMESTAMP") {
            self.clock.timestamp = Some(timestamp);
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if let Some(timestamp) = &self.clock.timestamp {
            FrozenClock::new(timestamp).with_context(|| {
                format!("Invalid clock timestamp '{timestamp}', expected YYYY-MM-DDTHH:MM:SS")
            })?;
        }
        Ok(())
    }

    /// The frozen clock for `suite`: the configured override or the
    /// family's literal.
    pub fn clock(&self, suite: Suite) -> Result<FrozenClock> {
        let literal = self
            .clock
            .timestamp
            .as_deref()
            .unwrap_or(suite.default_timestamp());
        FrozenClock::new(literal).with_context(|| format!("Invalid clock timestamp '{literal}'"))
    }

    pub fn save_default() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        Self::save_default_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_default_to(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
