//! Configuration management for Verity
//!
//! TOML file at `~/.config/verity/config.toml` by default, then named profile
//! overrides, then `VERITY_SECTION__KEY` environment overrides, then
//! validation.

use crate::aggregation::{AggregationConfig, ConflictTieBreak};
use crate::error::{Result, VerityError};
use crate::index::{IndexSettings, TuningConfig};
use crate::pipeline::PipelineConfig;
use crate::retrieval::{FusionConfig, NormalizationMethod};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub inference: InferenceConfig,
    pub aggregation: AggregationConfig,
    pub pipeline: PipelineSection,
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

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub backend: String, // "fastembed" or "hashing"
    pub model: String,
    /// Vector size for the hashing backend; model backends report their own
    pub dimension: usize,
    pub batch_size: usize,
    /// Fail startup instead of falling back to the hashing backend
    #[serde(default)]
    pub strict: bool,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_breadth: Option<usize>,
    pub recall_floor: f64,
    pub kmeans_iterations: usize,
    pub tuning_queries: usize,
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub candidate_multiplier: usize,
    pub alpha: f32,
    pub normalization: NormalizationMethod,
    pub rrf_k: f32,
    pub fuzzy: bool,
}

/// Inference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub backend: String, // "heuristic" or "cross_encoder"
    pub model: String,
    pub batch_size: usize,
    pub max_evidence_chars: usize,
    #[serde(default)]
    pub strict: bool,
}

/// Latency budget and worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    pub total_budget: String,
    pub embedding_timeout: String,
    pub retrieval_timeout: String,
    pub scoring_timeout: String,
    pub max_concurrent_claims: usize,
    pub model_retries: usize,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_breadth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_budget: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f32>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Parse a file without overrides or validation
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VerityError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| VerityError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VerityError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| VerityError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_profile(profile)?;
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| VerityError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(backend) = overrides.embedding_backend {
            self.embedding.backend = backend;
        }
        if let Some(backend) = overrides.inference_backend {
            self.inference.backend = backend;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        if let Some(breadth) = overrides.search_breadth {
            self.index.search_breadth = Some(breadth);
        }
        if let Some(budget) = overrides.total_budget {
            self.pipeline.total_budget = budget;
        }
        if let Some(threshold) = overrides.confidence_threshold {
            self.aggregation.confidence_threshold = threshold;
        }

        tracing::debug!("Applied profile '{}'", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: VERITY_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("VERITY_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__BACKEND" => self.embedding.backend = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_env(path, value)?,
            "EMBEDDING__STRICT" => self.embedding.strict = parse_env(path, value)?,
            "INDEX__PARTITION_COUNT" => self.index.partition_count = Some(parse_env(path, value)?),
            "INDEX__SEARCH_BREADTH" => self.index.search_breadth = Some(parse_env(path, value)?),
            "INDEX__RECALL_FLOOR" => self.index.recall_floor = parse_env(path, value)?,
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_env(path, value)?,
            "RETRIEVAL__ALPHA" => self.retrieval.alpha = parse_env(path, value)?,
            "RETRIEVAL__FUZZY" => self.retrieval.fuzzy = parse_env(path, value)?,
            "INFERENCE__BACKEND" => self.inference.backend = value.to_string(),
            "INFERENCE__MODEL" => self.inference.model = value.to_string(),
            "INFERENCE__BATCH_SIZE" => self.inference.batch_size = parse_env(path, value)?,
            "INFERENCE__STRICT" => self.inference.strict = parse_env(path, value)?,
            "AGGREGATION__CONFIDENCE_THRESHOLD" => {
                self.aggregation.confidence_threshold = parse_env(path, value)?
            }
            "AGGREGATION__CONFLICT_PENALTY" => {
                self.aggregation.conflict_penalty = parse_env(path, value)?
            }
            "PIPELINE__TOTAL_BUDGET" => self.pipeline.total_budget = value.to_string(),
            "PIPELINE__MAX_CONCURRENT_CLAIMS" => {
                self.pipeline.max_concurrent_claims = parse_env(path, value)?
            }
            "PIPELINE__MODEL_RETRIES" => self.pipeline.model_retries = parse_env(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| VerityError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("verity").join("config.toml"))
    }

    /// Load from `path`, or the default location; defaults when that file does not exist
    pub fn load_or_default(path: Option<&Path>, profile: Option<&str>) -> Result<Self> {
        let resolved = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if path.is_none() && !resolved.exists() {
            tracing::debug!("No config at {:?}, using defaults", resolved);
            let mut config = Self::default();
            if let Some(profile) = profile {
                config.apply_profile(profile)?;
            }
            config.apply_env_overrides();
            ConfigValidator::validate(&config)?;
            return Ok(config);
        }

        match profile {
            Some(profile) => Self::load_with_profile(&resolved, profile),
            None => Self::load(&resolved),
        }
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let duration = |key: &str, value: &str| {
            parse_duration(value).map_err(|message| VerityError::InvalidConfigValue {
                path: format!("pipeline.{}", key),
                message,
            })
        };

        Ok(PipelineConfig {
            total_budget: duration("total_budget", &self.pipeline.total_budget)?,
            embedding_timeout: duration("embedding_timeout", &self.pipeline.embedding_timeout)?,
            retrieval_timeout: duration("retrieval_timeout", &self.pipeline.retrieval_timeout)?,
            scoring_timeout: duration("scoring_timeout", &self.pipeline.scoring_timeout)?,
            max_concurrent_claims: self.pipeline.max_concurrent_claims,
            model_retries: self.pipeline.model_retries,
            top_k: self.retrieval.top_k,
        })
    }

    pub fn fusion_config(&self) -> Result<FusionConfig> {
        Ok(FusionConfig::new(
            self.retrieval.alpha,
            self.retrieval.normalization,
            self.retrieval.rrf_k,
        )?)
    }

    pub fn index_settings(&self, dimension: usize) -> IndexSettings {
        IndexSettings {
            dimension,
            partition_count: self.index.partition_count,
            search_breadth: self.index.search_breadth,
            kmeans_iterations: self.index.kmeans_iterations,
            fuzzy: self.retrieval.fuzzy,
        }
    }

    pub fn tuning_config(&self) -> TuningConfig {
        TuningConfig {
            recall_floor: self.index.recall_floor,
            query_count: self.index.tuning_queries,
            kmeans_iterations: self.index.kmeans_iterations,
        }
    }
}

fn parse_env<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| VerityError::InvalidConfigValue {
        path: path.to_string(),
        message: format!(
            "Cannot parse '{}' as {}",
            value,
            std::any::type_name::<T>()
        ),
    })
}

/// Parse a duration string: `"250ms"`, `"20s"`, `"1m"`, `"1h"`, or bare seconds
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("Invalid duration: '{}'", s))?;

    let seconds = |scale: u64| {
        value
            .checked_mul(scale)
            .map(Duration::from_secs)
            .ok_or_else(|| "duration out of range".to_string())
    };

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => seconds(60),
        "h" => seconds(3600),
        _ => Err(format!("Invalid duration unit in '{}' (use ms, s, m or h)", s)),
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "fast".to_string(),
            ProfileOverrides {
                embedding_backend: Some("hashing".to_string()),
                inference_backend: Some("heuristic".to_string()),
                top_k: Some(5),
                total_budget: Some("10s".to_string()),
                ..ProfileOverrides::default()
            },
        );
        profiles.insert(
            "accuracy".to_string(),
            ProfileOverrides {
                inference_backend: Some("cross_encoder".to_string()),
                top_k: Some(20),
                ..ProfileOverrides::default()
            },
        );

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            embedding: EmbeddingConfig {
                backend: "fastembed".to_string(),
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
                strict: false,
            },
            index: IndexConfig {
                partition_count: None,
                search_breadth: None,
                recall_floor: 0.95,
                kmeans_iterations: 10,
                tuning_queries: 100,
            },
            retrieval: RetrievalConfig {
                top_k: 10,
                candidate_multiplier: 3,
                alpha: 0.7,
                normalization: NormalizationMethod::MinMax,
                rrf_k: 60.0,
                fuzzy: true,
            },
            inference: InferenceConfig {
                backend: "heuristic".to_string(),
                model: "bge-reranker-base".to_string(),
                batch_size: 16,
                max_evidence_chars: 1024,
                strict: false,
            },
            aggregation: AggregationConfig {
                confidence_threshold: 0.5,
                conflict_penalty: 0.5,
                tie_break: ConflictTieBreak::MeanProbability,
            },
            pipeline: PipelineSection {
                total_budget: "60s".to_string(),
                embedding_timeout: "10s".to_string(),
                retrieval_timeout: "10s".to_string(),
                scoring_timeout: "40s".to_string(),
                max_concurrent_claims: 8,
                model_retries: 1,
            },
            profiles,
        }
    }
}
