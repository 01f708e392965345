/// Embedding provider trait with FastEmbed and feature-hashing implementations
use ahash::RandomState;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::hash::BuildHasher;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// Implementations are synchronous; async callers run them on the blocking pool.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one per input in order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Build the provider named by `model`
///
/// `"hash"` selects [`HashEmbedder`]; anything else is handed to FastEmbed.
pub fn build_provider(model: &str) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    if model == HashEmbedder::MODEL_NAME {
        return Ok(Arc::new(HashEmbedder::default()));
    }
    Ok(Arc::new(FastEmbedProvider::new(model)?))
}

/// FastEmbed provider for local embedding generation
///
/// Defaults to the multilingual paraphrase MiniLM model so Russian and
/// English textbooks embed into the same space.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub const DEFAULT_MODEL: &'static str = "paraphrase-multilingual-MiniLM-L12-v2";

    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on first use to the FastEmbed cache.
    /// - paraphrase-multilingual-MiniLM-L12-v2: ~470MB (384 dims), default
    /// - all-MiniLM-L6-v2: 90MB (384 dims), English only
    /// - bge-small-en-v1.5: 130MB (384 dims)
    /// - bge-base-en-v1.5: 440MB (768 dims)
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension, model_size_mb) = match model_name {
            "paraphrase-multilingual-MiniLM-L12-v2" => {
                (EmbeddingModel::ParaphraseMLMiniLML12V2, 384, 470)
            }
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384, 90),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384, 130),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768, 440),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: paraphrase-multilingual-MiniLM-L12-v2, \
                     all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, hash",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with the default multilingual model
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new(Self::DEFAULT_MODEL)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embedding = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;

        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping empty inputs would misalign results with their ids
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains empty text".to_string(),
            ));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic feature-hashing embedder
///
/// Hashes lowercase words and their character trigrams into a fixed number of
/// buckets, then L2-normalises. Shared stems of inflected words land in the
/// same trigram buckets, so "Caesar" and "Caesar's" stay close. Needs no model
/// download; used for tests and offline runs.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    hasher: RandomState,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HashEmbedder {
    pub const MODEL_NAME: &'static str = "hash";

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(2),
            // Fixed seeds keep vectors stable across processes
            hasher: RandomState::with_seeds(
                0x6c65_6374_6572_6e01,
                0x9e37_79b9_7f4a_7c15,
                0xbf58_476d_1ce4_e5b9,
                0x94d0_49bb_1331_11eb,
            ),
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        (self.hasher.hash_one(feature) % self.dimension as u64) as usize
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            vector[self.bucket(&word)] += 1.0;

            let padded: Vec<char> = format!("^{}$", word).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                vector[self.bucket(&gram)] += 0.5;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            // Punctuation-only text still needs a direction for cosine distance
            vector[0] = 1.0;
        } else {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (mag_a * mag_b)
    }

    #[test]
    fn test_hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("Caesar was killed by senators").unwrap();
        let b = HashEmbedder::default()
            .embed("Caesar was killed by senators")
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
        let magnitude: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hash_embedder_similarity_follows_overlap() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed("Who killed Caesar?").unwrap();
        let related = embedder.embed("Caesar was killed by senators.").unwrap();
        let unrelated = embedder.embed("Photosynthesis converts light to sugar.").unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_hash_embedder_rejects_empty_text() {
        let embedder = HashEmbedder::default();
        assert!(matches!(
            embedder.embed("   "),
            Err(EmbeddingError::InvalidInput(_))
        ));
        assert!(embedder.embed("?!").unwrap().iter().any(|v| *v > 0.0));
    }

    #[test]
    fn test_build_provider_hash() {
        let provider = build_provider("hash").unwrap();
        assert_eq!(provider.model_name(), "hash");
        assert_eq!(provider.embed_batch(&["a".into(), "b".into()]).unwrap().len(), 2);
    }

    #[test]
    fn test_unsupported_model() {
        assert!(matches!(
            FastEmbedProvider::new("no-such-model"),
            Err(EmbeddingError::InitializationError(_))
        ));
    }

    #[test]
    #[ignore] // Requires model download (~470MB) - run with: cargo test -- --ignored
    fn test_multilingual_similarity() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        assert_eq!(provider.dimension(), 384);

        let ru = provider.embed("Кто убил Цезаря?").unwrap();
        let en = provider.embed("Who killed Caesar?").unwrap();
        let other = provider.embed("Photosynthesis converts light to sugar.").unwrap();

        assert!(cosine_similarity(&ru, &en) > cosine_similarity(&ru, &other));
    }

    #[test]
    #[ignore] // Requires model download (~470MB) - run with: cargo test -- --ignored
    fn test_batch_embedding() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let texts = vec![
            "First test sentence.".to_string(),
            "Second test sentence.".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!(provider.embed_batch(&["".to_string()]).is_err());
    }
}
