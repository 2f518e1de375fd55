//! Runtime configuration.
//!
//! Settings are layered: built-in defaults, then an optional JSON config file,
//! then `TIMELESS_*` environment variables, then CLI flags (applied by the
//! caller). The API credential is deliberately not part of this file format;
//! it only comes from the environment.
use crate::catalog::{GRAMMARS_DIR_REL, GRAMMAR_SELECTOR_REL};
use crate::openai::BackendSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PROMPTS_DIR: &str = "system_prompts";

const CONFIG_FILE_REL: &str = "timeless/config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub model: String,
    pub temperature: f64,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Directory holding `grammar_selector` and the `grammars/` catalog.
    pub prompts_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            prompts_dir: PathBuf::from(DEFAULT_PROMPTS_DIR),
        }
    }
}

impl AppConfig {
    pub fn grammars_dir(&self) -> PathBuf {
        self.prompts_dir.join(GRAMMARS_DIR_REL)
    }

    pub fn selector_path(&self) -> PathBuf {
        self.prompts_dir.join(GRAMMAR_SELECTOR_REL)
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Default config file location under the user's config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_FILE_REL))
}

/// Load config from `explicit`, else the default location if it exists, then
/// apply environment overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let mut config = match explicit {
        Some(path) => read_config_file(path)?,
        None => match default_config_path() {
            Some(path) if path.is_file() => read_config_file(&path)?,
            _ => AppConfig::default(),
        },
    };
    apply_env_overrides(&mut config, |key| env::var(key).ok())?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<AppConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: AppConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    tracing::debug!(path = %path.display(), "config file loaded");
    Ok(config)
}

/// Apply `TIMELESS_*` overrides read through `lookup`.
pub fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(model) = lookup("TIMELESS_MODEL") {
        config.model = model;
    }
    if let Some(base_url) = lookup("TIMELESS_BASE_URL") {
        config.base_url = base_url;
    }
    if let Some(raw) = lookup("TIMELESS_TEMPERATURE") {
        config.temperature = raw
            .trim()
            .parse()
            .with_context(|| format!("parse TIMELESS_TEMPERATURE {raw:?}"))?;
    }
    if let Some(raw) = lookup("TIMELESS_TIMEOUT_SECS") {
        config.timeout_secs = raw
            .trim()
            .parse()
            .with_context(|| format!("parse TIMELESS_TIMEOUT_SECS {raw:?}"))?;
    }
    if let Some(dir) = lookup("TIMELESS_PROMPTS_DIR") {
        config.prompts_dir = PathBuf::from(dir);
    }
    Ok(())
}

/// Validate ranges and required values.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.model.trim().is_empty() {
        return Err(anyhow!("model must be non-empty"));
    }
    if config.base_url.trim().is_empty() {
        return Err(anyhow!("base_url must be non-empty"));
    }
    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(anyhow!(
            "temperature must be between 0 and 2 (got {})",
            config.temperature
        ));
    }
    if config.timeout_secs == 0 {
        return Err(anyhow!("timeout_secs must be greater than zero"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
