//! Run configuration: loaded once from a YAML file, validated up front,
//! then treated as immutable for the lifetime of the run.
//!
//! Secrets never live in this file. API keys and tokens arrive through the
//! CLI (see [`crate::cli`]) so the config can be committed next to the
//! scheduler definition.

use std::collections::HashSet;
use std::fs;

use serde::Deserialize;
use url::Url;

use crate::error::{PipelineError, Result};

fn default_per_source_items() -> usize {
    2
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_bucket() -> String {
    "post-images".to_string()
}

fn default_monthly_cap() -> u64 {
    500
}

fn default_max_chars() -> usize {
    280
}

/// Top-level configuration for one pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Public base URL of the rendered site, used to build post links for
    /// the mirror message.
    pub site_base_url: String,
    /// Ordered category table. Deficit ties resolve to the earliest entry.
    pub categories: Vec<CategoryConfig>,
    /// How many items to keep from each feed.
    #[serde(default = "default_per_source_items")]
    pub per_source_items: usize,
    /// Request timeout applied to every outbound HTTP call.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

/// One row of the category table.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    /// Target share. The balancer scores a category by stored-count divided
    /// by this weight, so doubling a weight doubles its target share.
    pub weight: f64,
    /// Feed URLs polled when this category wins selection.
    pub feeds: Vec<String>,
}

/// Text-generation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
        }
    }
}

/// Object-storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket that receives re-hosted post images.
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
        }
    }
}

/// Mirror-posting settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Categories eligible for mirroring. Empty disables mirroring outright.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Hard ceiling on mirror posts per calendar month.
    #[serde(default = "default_monthly_cap")]
    pub monthly_cap: u64,
    /// Character budget for the mirror message.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            monthly_cap: default_monthly_cap(),
            max_chars: default_max_chars(),
        }
    }
}

/// Read and validate the configuration file at `path`.
pub fn load(path: &str) -> Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .map_err(|e| PipelineError::Configuration(format!("cannot read {path}: {e}")))?;
    parse(&raw)
}

/// Parse and validate a YAML configuration document.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] if the YAML is malformed, the
/// category table is empty, a name repeats, a weight is not a positive
/// finite number, a category has no feeds, or any URL fails to parse.
pub fn parse(raw: &str) -> Result<AppConfig> {
    let config: AppConfig = serde_yaml::from_str(raw)
        .map_err(|e| PipelineError::Configuration(format!("invalid YAML: {e}")))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<()> {
    Url::parse(&config.site_base_url).map_err(|e| {
        PipelineError::Configuration(format!(
            "site_base_url {:?} is not a valid URL: {e}",
            config.site_base_url
        ))
    })?;

    if config.categories.is_empty() {
        return Err(PipelineError::Configuration(
            "category table is empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for category in &config.categories {
        let name = category.name.trim();
        if name.is_empty() {
            return Err(PipelineError::Configuration(
                "category with empty name".to_string(),
            ));
        }
        if !seen.insert(name.to_string()) {
            return Err(PipelineError::Configuration(format!(
                "duplicate category {name:?}"
            )));
        }
        if !(category.weight.is_finite() && category.weight > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "category {name:?} has non-positive weight {}",
                category.weight
            )));
        }
        if category.feeds.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "category {name:?} has no feeds"
            )));
        }
        for feed in &category.feeds {
            Url::parse(feed).map_err(|e| {
                PipelineError::Configuration(format!(
                    "category {name:?} feed {feed:?} is not a valid URL: {e}"
                ))
            })?;
        }
    }

    if config.per_source_items == 0 {
        return Err(PipelineError::Configuration(
            "per_source_items must be at least 1".to_string(),
        ));
    }

    Ok(())
}
