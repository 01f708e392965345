use crate::config::Config;
use crate::error::{LecternError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_synthesis(config, &mut errors);
        Self::validate_timeouts(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LecternError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.llm.provider;
        let valid_providers = ["ollama"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        let url = &config.llm.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::new(
                "llm.base_url",
                format!("Base URL must be http(s), got '{}'", url),
            ));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        if !(0.0..=1.0).contains(&config.llm.top_p) {
            errors.push(ValidationError::new(
                "llm.top_p",
                format!("top_p must be between 0.0 and 1.0, got {}", config.llm.top_p),
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

        if retrieval.lexical_limit == 0 {
            errors.push(ValidationError::new(
                "retrieval.lexical_limit",
                "Lexical limit must be greater than 0",
            ));
        }

        if retrieval.vector_candidates == 0 {
            errors.push(ValidationError::new(
                "retrieval.vector_candidates",
                "Vector candidates must be greater than 0",
            ));
        }

        if retrieval.document_filter_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.document_filter_multiplier",
                "Document filter multiplier must be greater than 0",
            ));
        }

        if retrieval.max_query_variants == 0 {
            errors.push(ValidationError::new(
                "retrieval.max_query_variants",
                "At least the original query must be searched",
            ));
        }

        let weights = &retrieval.weights;
        for (name, value) in [
            ("entity_match", weights.entity_match),
            ("whole_word_bonus", weights.whole_word_bonus),
            ("identity_cluster_bonus", weights.identity_cluster_bonus),
            ("hybrid_entity", weights.hybrid_entity),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(ValidationError::new(
                    format!("retrieval.weights.{}", name),
                    format!("Weight must be a non-negative number, got {}", value),
                ));
            }
        }

        if !(0.0..=1.0).contains(&retrieval.lexical_confidence) {
            errors.push(ValidationError::new(
                "retrieval.lexical_confidence",
                format!(
                    "Confidence must be between 0.0 and 1.0, got {}",
                    retrieval.lexical_confidence
                ),
            ));
        }

        if retrieval.min_stem_chars < 2 {
            errors.push(ValidationError::new(
                "retrieval.min_stem_chars",
                "Stems shorter than 2 characters match nearly everything",
            ));
        }
    }

    fn validate_synthesis(config: &Config, errors: &mut Vec<ValidationError>) {
        let synthesis = &config.synthesis;

        if synthesis.fragment_char_budget == 0 {
            errors.push(ValidationError::new(
                "synthesis.fragment_char_budget",
                "Fragment budget must be greater than 0",
            ));
        }

        if synthesis.question_context_chars == 0 {
            errors.push(ValidationError::new(
                "synthesis.question_context_chars",
                "Question context budget must be greater than 0",
            ));
        }

        for (name, temp) in [
            ("answer_temperature", synthesis.answer_temperature),
            ("question_temperature", synthesis.question_temperature),
            ("expansion_temperature", synthesis.expansion_temperature),
        ] {
            if !(0.0..=2.0).contains(&temp) {
                errors.push(ValidationError::new(
                    format!("synthesis.{}", name),
                    format!("Temperature must be between 0.0 and 2.0, got {}", temp),
                ));
            }
        }
    }

    fn validate_timeouts(config: &Config, errors: &mut Vec<ValidationError>) {
        let timeouts = &config.timeouts;
        for (name, secs) in [
            ("search_secs", timeouts.search_secs),
            ("expansion_secs", timeouts.expansion_secs),
            ("synthesis_secs", timeouts.synthesis_secs),
            ("request_secs", timeouts.request_secs),
        ] {
            if secs == 0 {
                errors.push(ValidationError::new(
                    format!("timeouts.{}", name),
                    "Timeout must be greater than 0",
                ));
            }
        }
    }
}
