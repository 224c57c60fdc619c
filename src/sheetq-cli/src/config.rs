//! Configuration management for sheetq
//!
//! Settings are layered: built-in defaults, then a TOML config file, then
//! `SHEETQ_*` environment variables, then command-line flags. The result is
//! turned into the option structs the core and the model client take.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use sheetq_core::{
    constants::{DEFAULT_LLM_TIMEOUT_SECS, DEFAULT_SCHEMA_INFERENCE_LENGTH},
    Error, ExecutorOptions, LoadOptions, NumericPrecision, Result,
};
use sheetq_llm::{OllamaConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};

use crate::cli::{Cli, ExecutionArgs};

/// File names searched for, in order, in each config directory
pub const CONFIG_FILE_NAMES: &[&str] = &["sheetq.toml", ".sheetq.toml"];

/// Main configuration structure for sheetq
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language model connection
    pub llm: LlmConfig,
    /// Plan execution
    pub execution: ExecutionConfig,
    /// Workbook loading
    pub io: IoConfig,
    /// Debug and diagnostics
    pub debug: DebugConfig,
}

/// Language model connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama server address
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

/// Plan execution settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Treatment of fractional `sum`/`min`/`max` results
    pub numeric_precision: NumericPrecision,
    /// Run text analysis rows in parallel
    pub parallel_text_analysis: bool,
}

/// Workbook loading settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// CSV field separator
    pub csv_separator: String,
    /// Rows sampled for CSV type inference
    pub infer_schema_length: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            csv_separator: ",".to_string(),
            infer_schema_length: DEFAULT_SCHEMA_INFERENCE_LENGTH,
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// 0 warn, 1 info, 2 debug, 3+ trace
    pub verbosity: u8,
}

impl Config {
    /// Load configuration from a file (explicit or discovered) and the
    /// environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                Self::find_config_file(&cwd, dirs::home_dir().as_deref())
            }
        };

        let mut config = match path {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.merge_env_with_reader(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::config(format!("Invalid TOML config {}: {e}", path.display()))
        })
    }

    /// Find a configuration file in the current directory, then in
    /// `~/.config/sheetq`
    pub fn find_config_file(current_dir: &Path, home: Option<&Path>) -> Option<PathBuf> {
        let mut dirs = vec![current_dir.to_path_buf()];
        if let Some(home) = home {
            dirs.push(home.join(".config").join("sheetq"));
        }
        dirs.iter()
            .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }

    /// Merge `SHEETQ_*` variables read through `env_reader`
    ///
    /// Unparseable numbers fall back to the default with a warning.
    pub fn merge_env_with_reader<F>(&mut self, env_reader: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = env_reader("SHEETQ_LLM_URL") {
            self.llm.base_url = val;
        }

        if let Some(val) = env_reader("SHEETQ_LLM_MODEL") {
            self.llm.model = val;
        }

        if let Some(val) = env_reader("SHEETQ_LLM_TIMEOUT") {
            self.llm.timeout_secs = val.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid SHEETQ_LLM_TIMEOUT '{val}'");
                LlmConfig::default().timeout_secs
            });
        }

        if let Some(val) = env_reader("SHEETQ_PRECISION") {
            self.execution.numeric_precision = val.parse().unwrap_or_else(|e| {
                warn!("Ignoring SHEETQ_PRECISION: {e}");
                NumericPrecision::default()
            });
        }

        if let Some(val) = env_reader("SHEETQ_PARALLEL_TEXT") {
            self.execution.parallel_text_analysis = is_truthy(&val);
        }

        if let Some(val) = env_reader("SHEETQ_VERBOSITY") {
            self.debug.verbosity = val.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid SHEETQ_VERBOSITY '{val}'");
                DebugConfig::default().verbosity
            });
        }
    }

    /// Apply global command-line flags
    pub fn apply_cli(&mut self, cli: &Cli) {
        self.debug.verbosity = self.debug.verbosity.max(cli.verbose);
    }

    /// Apply per-command execution flags
    pub fn apply_execution_args(&mut self, args: &ExecutionArgs) -> Result<()> {
        if let Some(precision) = &args.precision {
            self.execution.numeric_precision = precision.parse()?;
        }
        if args.parallel_text {
            self.execution.parallel_text_analysis = true;
        }
        if let Some(model) = &args.model {
            self.llm.model.clone_from(model);
        }
        Ok(())
    }

    /// Options for loading workbooks
    #[must_use]
    pub fn to_load_options(&self) -> LoadOptions {
        LoadOptions {
            infer_schema_length: self.io.infer_schema_length,
            csv_separator: self.io.csv_separator.bytes().next().unwrap_or(b','),
            max_rows: None,
        }
    }

    /// Options for the plan executor
    #[must_use]
    pub fn to_executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            numeric_precision: self.execution.numeric_precision,
            parallel_text_analysis: self.execution.parallel_text_analysis,
        }
    }

    /// Settings for the model client
    #[must_use]
    pub fn to_ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            timeout: Duration::from_secs(self.llm.timeout_secs),
        }
    }

    /// Save configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}

fn is_truthy(val: &str) -> bool {
    val != "0" && !val.eq_ignore_ascii_case("false")
}

/// Write a config file holding the defaults
pub fn create_default_config_file(path: &Path) -> Result<()> {
    Config::default().save(path)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.llm.timeout_secs == 0 {
        return Err(Error::config("LLM timeout must be greater than 0"));
    }

    if config.llm.model.trim().is_empty() {
        return Err(Error::config("LLM model must not be empty"));
    }

    if config.llm.base_url.trim().is_empty() {
        return Err(Error::config("LLM base URL must not be empty"));
    }

    if config.io.csv_separator.len() != 1 {
        return Err(Error::config("CSV separator must be a single character"));
    }

    if config.io.infer_schema_length == 0 {
        return Err(Error::config("Schema inference length must be greater than 0"));
    }

    Ok(())
}
