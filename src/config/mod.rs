//! Configuration management for caseindex
//!
//! Loaded from TOML, overridden by `CASEINDEX_SECTION__KEY` environment
//! variables and optional named profiles, then validated as a whole.

use crate::error::{CaseIndexError, Result};
use crate::partition::BuildParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub cache: CacheConfig,
    pub classifier: ClassifierConfig,
    pub query: QueryConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage locations; relative paths resolve against `data_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub index_dir: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// HNSW build parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_layer: usize,
}

/// Index cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
}

/// Tier 2 classification strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierStrategy {
    /// Distance-weighted vote over global-index neighbors
    Voting,
    /// Plaintiff/defendant counts from the extraction
    PartyCount,
}

impl std::str::FromStr for ClassifierStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "voting" => Ok(ClassifierStrategy::Voting),
            "party_count" => Ok(ClassifierStrategy::PartyCount),
            other => Err(format!("unknown classifier strategy '{}'", other)),
        }
    }
}

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub strategy: ClassifierStrategy,
    /// Neighbors consulted by the vote
    pub vote_k: usize,
    /// Constant a neighbor's distance is subtracted from; larger than any expected distance
    pub ceiling: f32,
}

/// Query defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub default_k: usize,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_strategy: Option<ClassifierStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CaseIndexError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CaseIndexError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| CaseIndexError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| CaseIndexError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(strategy) = overrides.classifier_strategy {
            self.classifier.strategy = strategy;
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = capacity;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CASEINDEX_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("CASEINDEX_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "CACHE__CAPACITY" => self.cache.capacity = parse_env(path, value)?,
            "CLASSIFIER__VOTE_K" => self.classifier.vote_k = parse_env(path, value)?,
            "CLASSIFIER__STRATEGY" => self.classifier.strategy = parse_env(path, value)?,
            "QUERY__DEFAULT_K" => self.query.default_k = parse_env(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    pub fn build_params(&self) -> BuildParams {
        BuildParams {
            m: self.index.m,
            ef_construction: self.index.ef_construction,
            ef_search: self.index.ef_search,
            max_layer: self.index.max_layer,
        }
    }

    /// `~`-expanded data directory
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        self.under_data_dir(&self.storage.database)
    }

    pub fn index_dir(&self) -> Result<PathBuf> {
        self.under_data_dir(&self.storage.index_dir)
    }

    fn under_data_dir(&self, path: &Path) -> Result<PathBuf> {
        let path = expand_path(path)?;
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.data_dir()?.join(path))
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            CaseIndexError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("caseindex").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.caseindex"),
                database: PathBuf::from("cases.db"),
                index_dir: PathBuf::from("indexes"),
            },
            embedding: EmbeddingConfig {
                model: "bge-small-zh-v1.5".to_string(),
                batch_size: 32,
            },
            index: IndexConfig {
                m: 32,
                ef_construction: 200,
                ef_search: 100,
                max_layer: 16,
            },
            cache: CacheConfig {
                capacity: crate::cache::DEFAULT_CAPACITY,
            },
            classifier: ClassifierConfig {
                strategy: ClassifierStrategy::Voting,
                vote_k: 3,
                ceiling: 300.0,
            },
            query: QueryConfig { default_k: 5 },
            profiles: HashMap::new(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| CaseIndexError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| CaseIndexError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            CaseIndexError::Config("Cannot determine home directory".to_string())
        })?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
