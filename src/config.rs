//! Run configuration, loaded from an optional TOML file.
//!
//! Every field has a default, so an absent file (or an empty one) yields a
//! working Packagist configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "ossatrisk.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub registry: RegistryConfig,
    pub harvest: PagingConfig,
    pub eligibility: EligibilityConfig,
    pub output: OutputConfig,
    pub suggestions: SuggestionsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub base_url: String,
    pub per_page: u32,
    pub timeout_secs: u64,
    pub max_retries: u8,
    pub advisory_batch_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://packagist.org".to_string(),
            per_page: 100,
            timeout_secs: 30,
            max_retries: 3,
            advisory_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub max_pages: usize,
    pub page_delay_ms: u64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            max_pages: 15,
            page_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    /// Namespaces of well-governed ecosystem-core packages
    pub exclude_prefixes: Vec<String>,

    /// Markers of shims, polyfills and other intentionally outdated packages
    pub exclude_segments: Vec<String>,

    /// Packages released within this many days are considered active
    pub inactive_days: u32,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            exclude_prefixes: ["symfony/", "laravel/", "psr/", "composer/"]
                .map(String::from)
                .to_vec(),
            exclude_segments: ["polyfill", "compat", "shim", "metapackage"]
                .map(String::from)
                .to_vec(),
            inactive_days: 365,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/php-packages.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuggestionsConfig {
    pub path: PathBuf,
    pub url_template: String,
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/php-suggestions.json"),
            url_template: "https://packagist.org/packages/{name}".to_string(),
        }
    }
}

/// Loads `path` if given, else `ossatrisk.toml` from the working directory
/// when present, else the defaults.
pub fn load_config(path: Option<&Path>) -> Result<HarvestConfig, ConfigError> {
    match path {
        Some(path) => read_config(path),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                read_config(default_path)
            } else {
                Ok(HarvestConfig::default())
            }
        }
    }
}

fn read_config(path: &Path) -> Result<HarvestConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
