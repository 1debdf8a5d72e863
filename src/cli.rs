//! Command line interface and layered application configuration.
//!
//! Precedence, lowest to highest: built-in defaults, configuration file
//! (TOML or JSON), `XML_POOL_*` environment variables, CLI arguments.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ParserConfig;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum VerbosityLevel {
    /// Only show failures
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show every file result
    Verbose,
}

/// Output format for the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Summary,
}

/// Check XML files for well-formedness using a shared parser pool
#[derive(Parser, Debug, Clone)]
#[command(name = "xml-pool")]
#[command(about = "Parse XML files concurrently through a bounded builder pool")]
#[command(version)]
pub struct Cli {
    /// Directory or file to scan
    pub path: PathBuf,

    /// File extensions to process (comma-separated)
    #[arg(short = 'e', long = "extensions", default_value = "xml")]
    pub extensions: String,

    /// Number of concurrent parser threads
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Idle-cache bound of the parser pool
    #[arg(long = "max-idle")]
    pub max_idle: Option<usize>,

    /// Disable namespace processing
    #[arg(long = "no-namespace")]
    pub no_namespace: bool,

    /// Keep comment nodes in parsed trees
    #[arg(long = "keep-comments")]
    pub keep_comments: bool,

    /// Keep whitespace-only text nodes
    #[arg(long = "keep-whitespace")]
    pub keep_whitespace: bool,

    /// Leave entity references unexpanded
    #[arg(long = "no-entity-expansion")]
    pub no_entity_expansion: bool,

    /// Treat any DOCTYPE declaration as a fatal error
    #[arg(long = "forbid-doctype")]
    pub forbid_doctype: bool,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet mode (failures only)
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn get_extensions(&self) -> Vec<String> {
        self.extensions
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Pool-related settings from the configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolSettings {
    pub max_idle: usize,
    pub namespace_aware: bool,
    pub coalescing: bool,
    pub expand_entity_references: bool,
    pub ignore_comments: bool,
    pub ignore_element_content_whitespace: bool,
    pub allow_doctype: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let defaults = ParserConfig::default();
        Self {
            max_idle: defaults.max_idle,
            namespace_aware: defaults.namespace_aware,
            coalescing: defaults.coalescing,
            expand_entity_references: defaults.expand_entity_references,
            ignore_comments: defaults.ignore_comments,
            ignore_element_content_whitespace: defaults.ignore_element_content_whitespace,
            allow_doctype: true,
        }
    }
}

/// File selection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileSettings {
    pub extensions: Vec<String>,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
        }
    }
}

/// Runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RuntimeSettings {
    pub threads: Option<usize>,
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub pool: PoolSettings,
    pub files: FileSettings,
    pub runtime: RuntimeSettings,
}

impl AppConfig {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        // `#[serde(default)]` fills unspecified keys, so a loaded file is
        // already a complete configuration.
        let mut config = if let Some(path) = &cli.config {
            Self::load_from_file(path)?
        } else {
            Self::find_config_file()?.unwrap_or_default()
        };

        config = Self::apply_environment_overrides_with(&SystemEnvProvider, config)?;
        config = Self::merge_with_cli(config, cli);
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                if let Ok(config) = toml::from_str::<AppConfig>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find a configuration file in standard locations
    pub fn find_config_file() -> Result<Option<Self>, ConfigError> {
        let config_names = [
            "xml-pool.toml",
            "xml-pool.json",
            ".xml-pool.toml",
            ".xml-pool.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("xml-pool");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides with a custom provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Self,
    ) -> Result<Self, ConfigError> {
        if let Some(threads) = env.get("XML_POOL_THREADS") {
            config.runtime.threads = Some(threads.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_POOL_THREADS value: {threads}"))
            })?);
        }

        if let Some(max_idle) = env.get("XML_POOL_MAX_IDLE") {
            config.pool.max_idle = max_idle.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_POOL_MAX_IDLE value: {max_idle}"))
            })?;
        }

        if let Some(extensions) = env.get("XML_POOL_EXTENSIONS") {
            config.files.extensions = extensions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(config)
    }

    /// Merge CLI arguments (highest precedence)
    pub fn merge_with_cli(mut config: Self, cli: &Cli) -> Self {
        if cli.threads.is_some() {
            config.runtime.threads = cli.threads;
        }
        if let Some(max_idle) = cli.max_idle {
            config.pool.max_idle = max_idle;
        }
        if cli.no_namespace {
            config.pool.namespace_aware = false;
        }
        if cli.keep_comments {
            config.pool.ignore_comments = false;
        }
        if cli.keep_whitespace {
            config.pool.ignore_element_content_whitespace = false;
        }
        if cli.no_entity_expansion {
            config.pool.expand_entity_references = false;
        }
        if cli.forbid_doctype {
            config.pool.allow_doctype = false;
        }
        config.files.extensions = cli.get_extensions();
        config
    }

    pub fn validate(config: &Self) -> Result<(), ConfigError> {
        if let Some(threads) = config.runtime.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
        }
        if config.files.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "At least one file extension must be specified".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective thread count
    pub fn thread_count(&self) -> usize {
        self.runtime.threads.unwrap_or_else(num_cpus::get)
    }

    /// Translate the file-level settings into a pool configuration
    pub fn to_parser_config(&self) -> ParserConfig {
        let mut config = ParserConfig::default();
        config.max_idle = self.pool.max_idle;
        config.namespace_aware = self.pool.namespace_aware;
        config.coalescing = self.pool.coalescing;
        config.expand_entity_references = self.pool.expand_entity_references;
        config.ignore_comments = self.pool.ignore_comments;
        config.ignore_element_content_whitespace = self.pool.ignore_element_content_whitespace;
        if !self.pool.allow_doctype {
            config
                .features
                .insert(crate::config::feature::ALLOW_DOCTYPE.to_string(), false);
        }
        config
    }
}
