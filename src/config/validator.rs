use crate::config::{parse_duration, Config, SCHEMA_VERSION};
use crate::error::{Result, ValidationError, VerityError};
use std::time::Duration;

const MAX_BATCH_SIZE: usize = 1024;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_inference(config, &mut errors);
        Self::validate_aggregation(config, &mut errors);
        Self::validate_pipeline(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VerityError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let backend = &config.embedding.backend;
        if backend != "fastembed" && backend != "hashing" {
            errors.push(ValidationError::new(
                "embedding.backend",
                format!("Must be 'fastembed' or 'hashing', got '{}'", backend),
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        Self::check_batch_size("embedding.batch_size", config.embedding.batch_size, errors);
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let index = &config.index;

        if index.partition_count == Some(0) {
            errors.push(ValidationError::new(
                "index.partition_count",
                "Partition count must be greater than 0",
            ));
        }

        if index.search_breadth == Some(0) {
            errors.push(ValidationError::new(
                "index.search_breadth",
                "Search breadth must be greater than 0",
            ));
        }

        if let (Some(partitions), Some(breadth)) = (index.partition_count, index.search_breadth) {
            if breadth > partitions {
                errors.push(ValidationError::new(
                    "index.search_breadth",
                    format!(
                        "Search breadth {} exceeds partition count {}",
                        breadth, partitions
                    ),
                ));
            }
        }

        if !(0.0..=1.0).contains(&index.recall_floor) {
            errors.push(ValidationError::new(
                "index.recall_floor",
                "Recall floor must be between 0.0 and 1.0",
            ));
        }

        if index.kmeans_iterations == 0 {
            errors.push(ValidationError::new(
                "index.kmeans_iterations",
                "K-means iterations must be greater than 0",
            ));
        }

        if index.tuning_queries == 0 {
            errors.push(ValidationError::new(
                "index.tuning_queries",
                "Tuning query count must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        if retrieval.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.candidate_multiplier",
                "Candidate multiplier must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&retrieval.alpha) {
            errors.push(ValidationError::new(
                "retrieval.alpha",
                "Alpha must be between 0.0 and 1.0",
            ));
        }

        if retrieval.rrf_k.is_nan() || retrieval.rrf_k <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                "RRF constant must be positive",
            ));
        }
    }

    fn validate_inference(config: &Config, errors: &mut Vec<ValidationError>) {
        let backend = &config.inference.backend;
        if backend != "heuristic" && backend != "cross_encoder" {
            errors.push(ValidationError::new(
                "inference.backend",
                format!("Must be 'heuristic' or 'cross_encoder', got '{}'", backend),
            ));
        }

        Self::check_batch_size("inference.batch_size", config.inference.batch_size, errors);

        if config.inference.max_evidence_chars == 0 {
            errors.push(ValidationError::new(
                "inference.max_evidence_chars",
                "Evidence length limit must be greater than 0",
            ));
        }
    }

    fn validate_aggregation(config: &Config, errors: &mut Vec<ValidationError>) {
        let aggregation = &config.aggregation;

        if !(0.0..=1.0).contains(&aggregation.confidence_threshold) {
            errors.push(ValidationError::new(
                "aggregation.confidence_threshold",
                "Threshold must be between 0.0 and 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&aggregation.conflict_penalty) {
            errors.push(ValidationError::new(
                "aggregation.conflict_penalty",
                "Conflict penalty must be between 0.0 and 1.0",
            ));
        }
    }

    fn validate_pipeline(config: &Config, errors: &mut Vec<ValidationError>) {
        let pipeline = &config.pipeline;
        let mut durations = Vec::new();

        for (key, value) in [
            ("total_budget", &pipeline.total_budget),
            ("embedding_timeout", &pipeline.embedding_timeout),
            ("retrieval_timeout", &pipeline.retrieval_timeout),
            ("scoring_timeout", &pipeline.scoring_timeout),
        ] {
            match parse_duration(value) {
                Ok(d) if d.is_zero() => errors.push(ValidationError::new(
                    format!("pipeline.{}", key),
                    "Duration must be greater than 0",
                )),
                Ok(d) => durations.push(d),
                Err(message) => errors.push(ValidationError::new(
                    format!("pipeline.{}", key),
                    message,
                )),
            }
        }

        if let [total, stages @ ..] = durations.as_slice() {
            if stages.len() == 3 {
                let sum: Duration = stages.iter().sum();
                if sum > *total {
                    errors.push(ValidationError::new(
                        "pipeline",
                        format!(
                            "Stage timeouts sum to {}ms, exceeding total budget {}ms",
                            sum.as_millis(),
                            total.as_millis()
                        ),
                    ));
                }
            }
        }

        if pipeline.max_concurrent_claims == 0 {
            errors.push(ValidationError::new(
                "pipeline.max_concurrent_claims",
                "Worker count must be greater than 0",
            ));
        }
    }

    fn check_batch_size(path: &str, batch_size: usize, errors: &mut Vec<ValidationError>) {
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            errors.push(ValidationError::new(
                path,
                format!("Batch size must be between 1 and {}", MAX_BATCH_SIZE),
            ));
        }
    }
}
