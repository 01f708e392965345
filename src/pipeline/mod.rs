//! Question answering pipeline
//!
//! [`QaPipeline`] owns every component of a query: keyword extraction, the
//! lexical and vector paths (plus optional expansion), hybrid ranking and
//! answer synthesis. It is built once and shared by reference.

pub mod history;
mod questions;

pub use history::{record_answer, record_questions};
pub use questions::GeneratedQuestion;

use crate::config::{expand_path, Config};
use crate::embedding::{build_provider, EmbeddingProvider, Indexer, VectorIndex};
use crate::entities::KeywordExtractor;
use crate::error::{LecternError, Result};
use crate::llm::{GenerativeModel, OllamaClient};
use crate::retrieval::{
    pool_vector_hits, HybridRanker, LexicalSearcher, QueryExpander, RankedResult, SearchError,
    SearchHit, SearchPath, VectorSearcher,
};
use crate::storage::{ChunkStore, StorageManager};
use crate::synthesis::{AnswerResult, AnswerSynthesizer};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Per-request defaults taken from configuration
#[derive(Debug, Clone)]
struct PipelineSettings {
    top_k: usize,
    lexical_limit: usize,
    vector_candidates: usize,
    query_expansion: bool,
    search_timeout: Duration,
}

pub struct QaPipeline {
    extractor: KeywordExtractor,
    lexical: LexicalSearcher,
    vector: VectorSearcher,
    expander: QueryExpander,
    ranker: HybridRanker,
    synthesizer: AnswerSynthesizer,
    store: Arc<dyn ChunkStore>,
    settings: PipelineSettings,
}

impl QaPipeline {
    /// Assemble a pipeline from already-built collaborators
    pub fn new(
        config: &Config,
        store: Arc<dyn ChunkStore>,
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        model: Arc<dyn GenerativeModel>,
    ) -> Result<Self> {
        let retrieval = &config.retrieval;

        Ok(Self {
            extractor: KeywordExtractor::new(&retrieval.extra_stop_words),
            lexical: LexicalSearcher::new(Arc::clone(&store), retrieval),
            vector: VectorSearcher::new(
                provider,
                index,
                Arc::clone(&store),
                retrieval.document_filter_multiplier,
            ),
            expander: QueryExpander::new(Arc::clone(&model), config),
            ranker: HybridRanker::new(retrieval),
            synthesizer: AnswerSynthesizer::new(model, config)?,
            store,
            settings: PipelineSettings {
                top_k: retrieval.top_k,
                lexical_limit: retrieval.lexical_limit,
                vector_candidates: retrieval.vector_candidates,
                query_expansion: retrieval.query_expansion,
                search_timeout: config.timeouts.search(),
            },
        })
    }

    /// Retrieve, rank and answer a question
    ///
    /// `top_k` and `expand` fall back to the configured defaults. Search and
    /// generation failures degrade the answer instead of failing the call, and
    /// a question with nothing to search for gets the not-found answer.
    pub async fn answer_question(
        &self,
        query: &str,
        document_id: Option<i64>,
        top_k: Option<usize>,
        expand: Option<bool>,
    ) -> AnswerResult {
        let request_id = Uuid::new_v4();
        self.answer(query, document_id, top_k, expand)
            .instrument(info_span!("answer", request_id = %request_id))
            .await
    }

    async fn answer(
        &self,
        query: &str,
        document_id: Option<i64>,
        top_k: Option<usize>,
        expand: Option<bool>,
    ) -> AnswerResult {
        let start = Instant::now();
        let results = self.retrieve(query, document_id, top_k, expand).await;

        let mut answer = if results.is_empty() {
            AnswerResult::not_found(Duration::ZERO)
        } else {
            self.synthesizer.synthesize(query, &results).await
        };
        answer.processing_time = start.elapsed();

        info!(
            "Answered with {} citations ({:?}, {}) in {:.2}s",
            answer.citations.len(),
            answer.status,
            self.synthesizer.model_name(),
            answer.processing_time.as_secs_f64()
        );
        answer
    }

    /// Ranked results for a question, without synthesis
    ///
    /// A non-positive `document_id` means no document filter.
    pub async fn retrieve(
        &self,
        query: &str,
        document_id: Option<i64>,
        top_k: Option<usize>,
        expand: Option<bool>,
    ) -> Vec<RankedResult> {
        let query = query.trim();
        if query.is_empty() {
            debug!("Empty question, nothing to retrieve");
            return Vec::new();
        }
        let document_id = document_id.filter(|id| *id > 0);

        let top_k = top_k.unwrap_or(self.settings.top_k).max(1);
        let expand = expand.unwrap_or(self.settings.query_expansion);
        let candidates = self.settings.vector_candidates.max(top_k);

        let entities = self.extractor.extract(query);
        debug!("Extracted {} entities", entities.len());

        let lexical = self.guarded(
            SearchPath::Lexical,
            self.lexical
                .search(&entities, document_id, self.settings.lexical_limit),
        );

        let vector = async {
            let variants = if expand {
                self.expander.expand(query).await
            } else {
                vec![query.to_string()]
            };
            let searches = variants.iter().map(|variant| {
                self.guarded(
                    SearchPath::Vector,
                    self.vector.search(variant, candidates, document_id),
                )
            });
            pool_vector_hits(join_all(searches).await)
        };

        let (lexical, vector) = tokio::join!(lexical, vector);
        debug!(
            "Lexical path: {} hits, vector path: {} hits",
            lexical.len(),
            vector.len()
        );

        self.ranker.merge(lexical, vector, &entities, top_k)
    }

    /// Run one search under the search timeout; failures become an empty list
    async fn guarded<F>(&self, path: SearchPath, search: F) -> Vec<SearchHit>
    where
        F: Future<Output = std::result::Result<Vec<SearchHit>, SearchError>>,
    {
        match tokio::time::timeout(self.settings.search_timeout, search).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!("{:?} search failed, continuing without it: {}", path, e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "{:?} search timed out after {:?}, continuing without it",
                    path, self.settings.search_timeout
                );
                Vec::new()
            }
        }
    }
}

/// Everything a command needs, opened from configuration
pub struct Services {
    pub storage: StorageManager,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub index: Arc<VectorIndex>,
}

impl Services {
    /// Open the data directory, load the embedding model and rebuild the
    /// vector index from persisted embeddings
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Self::open_storage(config)?;

        let provider = build_provider(&config.embedding.model)?;
        let embeddings = storage.database.load_embeddings(provider.model_name())?;
        let index = Arc::new(VectorIndex::from_embeddings(
            provider.dimension(),
            &config.indexing,
            &embeddings,
        ));

        Ok(Self {
            storage,
            provider,
            index,
        })
    }

    /// Open only the data directory, without loading the embedding model
    pub fn open_storage(config: &Config) -> Result<StorageManager> {
        let data_dir = expand_path(&config.storage.data_dir)?;
        StorageManager::new(data_dir)
    }

    pub fn indexer(&self, batch_size: usize) -> Indexer {
        Indexer::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.index),
            self.storage.database.clone(),
            batch_size,
        )
    }

    /// Build the pipeline against the configured Ollama server
    ///
    /// An unreachable server is not fatal here; answers degrade to raw
    /// fragments until it comes back.
    pub async fn pipeline(&self, config: &Config) -> Result<QaPipeline> {
        let mut client = OllamaClient::new(&config.llm, config.timeouts.synthesis())
            .map_err(|e| LecternError::Config(e.to_string()))?;
        if !client.is_available().await {
            warn!(
                "Ollama not reachable at {}, answers fall back to raw fragments",
                config.llm.base_url
            );
        } else if let Err(e) = client.resolve_model().await {
            warn!("Generative model unavailable: {}", e);
        }

        let store: Arc<dyn ChunkStore> = Arc::new(self.storage.database.clone());
        QaPipeline::new(
            config,
            store,
            Arc::clone(&self.provider),
            Arc::clone(&self.index),
            Arc::new(client),
        )
    }
}
