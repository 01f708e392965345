//! Configuration management for Lectern
//!
//! Loads the TOML configuration, applies `LECTERN_SECTION__KEY` environment
//! overrides and named profiles, then validates the result.

use crate::error::{LecternError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisConfig,
    pub timeouts: TimeoutConfig,
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

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name, or "hash" for the download-free hashing embedder
    pub model: String,
    pub batch_size: usize,
}

/// HNSW index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    pub hnsw_m: usize,
    /// Capacity hint for the index
    pub max_elements: usize,
}

/// Generative model service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub top_p: f32,
    pub num_predict: u32,
    pub num_ctx: u32,
}

/// Retrieval and ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Row cap for the relational containment query
    pub lexical_limit: usize,
    /// Nearest neighbours requested per vector search
    pub vector_candidates: usize,
    /// Over-fetch factor applied when filtering vector hits by document
    pub document_filter_multiplier: usize,
    /// Backfill threshold for the hybrid merge
    pub min_merged_results: usize,
    pub query_expansion: bool,
    /// Cap on query variants, original query included
    pub max_query_variants: usize,
    pub weights: ScoringWeights,
    /// Confidence reported when the top result is lexical-only
    pub lexical_confidence: f32,
    /// Identity-cluster stems never shrink below this many characters
    pub min_stem_chars: usize,
    /// Maximum inflection characters trimmed off a name to build its stem
    pub max_inflection_chars: usize,
    /// Extra stop words on top of the built-in list
    #[serde(default)]
    pub extra_stop_words: Vec<String>,
}

/// Heuristic scoring constants for lexical and hybrid ranking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringWeights {
    /// Per distinct entity found in a chunk
    pub entity_match: f32,
    /// Extra credit when the entity matches on whole-word boundaries
    pub whole_word_bonus: f32,
    /// Added once when a proper-noun cluster (name plus inflections) matches
    pub identity_cluster_bonus: f32,
    /// Multiplier on verbatim entity hits for chunks found by both paths
    pub hybrid_entity: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            entity_match: 1.0,
            whole_word_bonus: 1.0,
            identity_cluster_bonus: 3.0,
            hybrid_entity: 2.0,
        }
    }
}

/// Answer and question synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Characters of each fragment placed in the prompt
    pub fragment_char_budget: usize,
    /// Characters of paragraph text placed in the question prompt
    pub question_context_chars: usize,
    /// Characters of the top chunk returned when synthesis is unavailable
    pub fallback_answer_chars: usize,
    pub answer_temperature: f32,
    pub question_temperature: f32,
    pub expansion_temperature: f32,
}

/// Per-stage timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub search_secs: u64,
    pub expansion_secs: u64,
    pub synthesis_secs: u64,
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn expansion(&self) -> Duration {
        Duration::from_secs(self.expansion_secs)
    }

    pub fn synthesis(&self) -> Duration {
        Duration::from_secs(self.synthesis_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_expansion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LecternError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LecternError::Io {
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
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LecternError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LecternError::Io {
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
            .ok_or_else(|| LecternError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(expansion) = overrides.query_expansion {
            self.retrieval.query_expansion = expansion;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LECTERN_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("LECTERN_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__MODEL" => {
                self.llm.model = value.to_string();
            }
            "LLM__BASE_URL" => {
                self.llm.base_url = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "RETRIEVAL__QUERY_EXPANSION" => {
                self.retrieval.query_expansion = parse_env(path, value)?;
            }
            "RETRIEVAL__TOP_K" => {
                self.retrieval.top_k = parse_env(path, value)?;
            }
            "TIMEOUTS__SYNTHESIS_SECS" => {
                self.timeouts.synthesis_secs = parse_env(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LecternError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("lectern").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| LecternError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".lectern"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| LecternError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or_else(|| {
                LecternError::Config("Cannot determine home directory".to_string())
            })?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "fast".to_string(),
            ProfileOverrides {
                query_expansion: Some(false),
                top_k: Some(3),
                ..Default::default()
            },
        );
        profiles.insert(
            "recall".to_string(),
            ProfileOverrides {
                query_expansion: Some(true),
                ..Default::default()
            },
        );

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.lectern"),
            },
            embedding: EmbeddingConfig {
                model: "paraphrase-multilingual-MiniLM-L12-v2".to_string(),
                batch_size: 32,
            },
            indexing: IndexingConfig {
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
                hnsw_m: 16,
                max_elements: 100_000,
            },
            llm: LlmConfig {
                provider: "ollama".to_string(),
                base_url: "http://localhost:11434".to_string(),
                model: "llama3".to_string(),
                top_p: 0.9,
                num_predict: 300,
                num_ctx: 2048,
            },
            retrieval: RetrievalConfig {
                top_k: 5,
                lexical_limit: 50,
                vector_candidates: 20,
                document_filter_multiplier: 4,
                min_merged_results: 3,
                query_expansion: false,
                max_query_variants: 4,
                weights: ScoringWeights::default(),
                lexical_confidence: 0.75,
                min_stem_chars: 4,
                max_inflection_chars: 2,
                extra_stop_words: Vec::new(),
            },
            synthesis: SynthesisConfig {
                fragment_char_budget: 800,
                question_context_chars: 4000,
                fallback_answer_chars: 300,
                answer_temperature: 0.0,
                question_temperature: 0.3,
                expansion_temperature: 0.3,
            },
            timeouts: TimeoutConfig {
                search_secs: 10,
                expansion_secs: 30,
                synthesis_secs: 60,
                request_secs: 120,
            },
            profiles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.top_k = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 7);
        assert_eq!(loaded.retrieval.weights, ScoringWeights::default());
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(&temp.path().join("absent.toml"));
        assert!(matches!(result, Err(LecternError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.apply_profile("recall").unwrap();
        assert!(config.retrieval.query_expansion);

        config.apply_profile("fast").unwrap();
        assert!(!config.retrieval.query_expansion);
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn test_unknown_profile() {
        let mut config = Config::default();
        assert!(config.apply_profile("nope").is_err());
    }

    #[test]
    fn test_env_value_parsing() {
        let mut config = Config::default();
        config
            .set_value_from_env("RETRIEVAL__TOP_K", "9")
            .unwrap();
        assert_eq!(config.retrieval.top_k, 9);

        let bad = config.set_value_from_env("RETRIEVAL__QUERY_EXPANSION", "maybe");
        assert!(bad.is_err());
    }

    #[test]
    fn test_expand_path() {
        let plain = expand_path(Path::new("/tmp/lectern")).unwrap();
        assert_eq!(plain, PathBuf::from("/tmp/lectern"));

        let home = expand_path(Path::new("~/.lectern")).unwrap();
        assert!(home.ends_with(".lectern"));
        assert!(!home.starts_with("~"));
    }
}
