//! Configuration management
//!
//! This module handles loading and validation of the engine configuration.
//! Configuration is stored in TOML format, by default at
//! `<config_dir>/subagent/engine.toml`.
//!
//! # Configuration Sections
//!
//! - **core**: log level, live scope capacity
//! - **defaults**: per-scope constraint defaults applied field-by-field
//! - **transcript**: per-scope conversation window
//!
//! Every section and every field is optional; omitted values take the
//! documented defaults.
//!
//! # Examples
//!
//! ```
//! use subagent_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str("[defaults]\nmax_turns = 10\n").unwrap();
//! assert_eq!(config.defaults.max_turns, 10);
//! assert_eq!(config.defaults.timeout_ms, 900_000);
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Constraint defaults for new scopes
    #[serde(default)]
    pub defaults: ConstraintDefaults,

    /// Per-scope transcript settings
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum number of scopes registered at once (0 = unbounded)
    #[serde(default)]
    pub max_live_scopes: usize,
}

/// Constraint defaults applied to every scope that omits a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDefaults {
    /// Wall-clock budget of one execution
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of turns per execution
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Memory ceiling reported by the resource sampler, in megabytes
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: f64,

    /// CPU-time ceiling reported by the resource sampler, in milliseconds
    #[serde(default = "default_max_cpu_time_ms")]
    pub max_cpu_time_ms: u64,
}

/// Transcript configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Estimated token window kept per scope
    #[serde(default = "default_context_limit_tokens")]
    pub context_limit_tokens: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_live_scopes: 0,
        }
    }
}

impl Default for ConstraintDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_turns: default_max_turns(),
            max_memory_mb: default_max_memory_mb(),
            max_cpu_time_ms: default_max_cpu_time_ms(),
        }
    }
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            context_limit_tokens: default_context_limit_tokens(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    900_000
}

fn default_max_turns() -> u32 {
    50
}

fn default_max_memory_mb() -> f64 {
    100.0
}

fn default_max_cpu_time_ms() -> u64 {
    300_000
}

fn default_context_limit_tokens() -> usize {
    8000
}

impl EngineConfig {
    /// Load configuration from the default location if it exists,
    /// otherwise fall back to built-in defaults.
    ///
    /// Unlike the explicit loaders this never creates files.
    pub fn load_or_default() -> Result<Self, EngineError> {
        match Self::default_config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Serialize the configuration back to TOML
    pub fn to_toml_string(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Default configuration file path (`<config_dir>/subagent/engine.toml`)
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("subagent").join("engine.toml"))
    }

    /// Maximum number of live scopes, `None` when unbounded
    pub fn scope_capacity(&self) -> Option<usize> {
        (self.core.max_live_scopes > 0).then_some(self.core.max_live_scopes)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.defaults.timeout_ms == 0 {
            return Err(EngineError::Config(
                "defaults.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.defaults.max_turns == 0 {
            return Err(EngineError::Config(
                "defaults.max_turns must be greater than 0".to_string(),
            ));
        }
        if self.defaults.max_memory_mb <= 0.0 || !self.defaults.max_memory_mb.is_finite() {
            return Err(EngineError::Config(
                "defaults.max_memory_mb must be a positive number".to_string(),
            ));
        }
        if self.defaults.max_cpu_time_ms == 0 {
            return Err(EngineError::Config(
                "defaults.max_cpu_time_ms must be greater than 0".to_string(),
            ));
        }
        if self.transcript.context_limit_tokens == 0 {
            return Err(EngineError::Config(
                "transcript.context_limit_tokens must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
