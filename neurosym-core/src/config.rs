//! Runtime configuration
//!
//! Defaults match a stock local setup: Ollama on port 11434 serving
//! `qwen2.5-coder:7b`, `swipl` on the PATH, programs archived under
//! `prolog_programs/`. A TOML file can override any field:
//!
//! ```toml
//! narrate_failures = true
//!
//! [llm]
//! model = "deepseek-coder-v2:16b"
//!
//! [engine]
//! timeout_secs = 10
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::provider::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "neurosym.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub engine: EngineConfig,
    pub archive: ArchiveConfig,
    /// Send execution failures to the narrator instead of aborting the cycle
    pub narrate_failures: bool,
    /// Stream the narration to the terminal as it is generated
    pub stream: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            engine: EngineConfig::default(),
            archive: ArchiveConfig::default(),
            narrate_failures: false,
            stream: false,
        }
    }
}

/// LLM collaborator settings (OpenAI-compatible endpoint)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            model: "qwen2.5-coder:7b".into(),
            api_key: None,
            timeout_secs: 300,
            temperature: None,
        }
    }
}

impl LlmConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        let config = ProviderConfig::new(&self.base_url, &self.model).with_timeout(self.timeout_secs);
        match &self.api_key {
            Some(key) => config.with_api_key(key),
            None => config,
        }
    }
}

/// Logic engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine binary name or path
    pub program: String,
    /// Entry goal queried after the program is loaded
    pub goal: String,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "swipl".into(),
            goal: "solve(Solution)".into(),
            timeout_secs: 30,
        }
    }
}

/// Program archive settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dir: PathBuf,
    /// File extension for archived programs, without the dot
    pub extension: String,
    /// Append one JSON line per archived program to `archive.jsonl`
    pub journal: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("prolog_programs"),
            extension: "pl".into(),
            journal: true,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `neurosym.toml` in the
    /// working directory is used if present, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            Error::from(e)
                .with_operation("config::load")
                .with_context("path", path.display().to_string())
        })?;

        let config = Self::from_toml_str(&contents)
            .map_err(|e| e.with_context("path", path.display().to_string()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| {
            Error::new(ErrorKind::ConfigInvalid, format!("failed to parse config: {}", e))
                .with_operation("config::parse")
                .set_source(e)
        })
    }

    /// Reject settings that would only fail later, mid-cycle
    pub fn validate(&self) -> Result<()> {
        if !(self.llm.base_url.starts_with("http://") || self.llm.base_url.starts_with("https://")) {
            return Err(Error::config_invalid(
                "llm.base_url",
                format!("'{}' is not an http(s) URL", self.llm.base_url),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(Error::config_invalid("llm.model", "model name is empty"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::config_invalid("llm.timeout_secs", "timeout must be positive"));
        }
        if self.engine.program.trim().is_empty() {
            return Err(Error::config_invalid("engine.program", "engine program is empty"));
        }
        if self.engine.goal.trim().is_empty() {
            return Err(Error::config_invalid("engine.goal", "entry goal is empty"));
        }
        if self.engine.timeout_secs == 0 {
            return Err(Error::config_invalid("engine.timeout_secs", "timeout must be positive"));
        }
        if self.archive.extension.is_empty() || self.archive.extension.contains(['.', '/', '\\']) {
            return Err(Error::config_invalid(
                "archive.extension",
                format!("'{}' is not a bare file extension", self.archive.extension),
            ));
        }
        Ok(())
    }
}
