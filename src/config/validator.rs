use super::{Config, SCHEMA_VERSION};
use crate::embedding::FastEmbedProvider;
use crate::error::{CaseIndexError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire configuration, collecting every error before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_classifier(config, &mut errors);
        Self::validate_query(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CaseIndexError::ConfigValidation { errors })
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

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is not checked; `caseindex build` creates these
        for (path, value) in [
            ("storage.data_dir", &config.storage.data_dir),
            ("storage.database", &config.storage.database),
            ("storage.index_dir", &config.storage.index_dir),
        ] {
            if value.as_os_str().is_empty() {
                errors.push(ValidationError::new(path, "Path cannot be empty"));
            }
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        let model = &config.embedding.model;
        let supported: Vec<&str> = FastEmbedProvider::supported_models().collect();
        if !supported.iter().any(|name| name.eq_ignore_ascii_case(model)) {
            errors.push(ValidationError::new(
                "embedding.model",
                format!("Model must be one of {:?}, got '{}'", supported, model),
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let index = &config.index;

        if index.m < 2 {
            errors.push(ValidationError::new(
                "index.m",
                format!("HNSW M must be at least 2, got {}", index.m),
            ));
        }

        if index.ef_construction < index.m {
            errors.push(ValidationError::new(
                "index.ef_construction",
                format!(
                    "ef_construction ({}) must be at least M ({})",
                    index.ef_construction, index.m
                ),
            ));
        }

        if index.ef_search == 0 {
            errors.push(ValidationError::new(
                "index.ef_search",
                "ef_search must be greater than 0",
            ));
        }

        if !(1..=16).contains(&index.max_layer) {
            errors.push(ValidationError::new(
                "index.max_layer",
                format!("max_layer must be between 1 and 16, got {}", index.max_layer),
            ));
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.cache.capacity == 0 {
            errors.push(ValidationError::new(
                "cache.capacity",
                "Cache capacity must be greater than 0",
            ));
        }
    }

    fn validate_classifier(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.classifier.vote_k == 0 {
            errors.push(ValidationError::new(
                "classifier.vote_k",
                "vote_k must be greater than 0",
            ));
        }

        let ceiling = config.classifier.ceiling;
        if !ceiling.is_finite() || ceiling <= 0.0 {
            errors.push(ValidationError::new(
                "classifier.ceiling",
                format!("Ceiling must be a positive number, got {}", ceiling),
            ));
        }
    }

    fn validate_query(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.query.default_k == 0 {
            errors.push(ValidationError::new(
                "query.default_k",
                "default_k must be greater than 0",
            ));
        }
    }
}
