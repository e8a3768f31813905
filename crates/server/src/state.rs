//! Application state and bootstrap wiring.

use std::sync::Arc;
use std::time::Duration;

use relia_config::Settings;
use relia_core::{ChunkStore, CrossEncoder, Embedder, LanguageModel, TraceStore};
use relia_ingest::{ChunkingOptions, IngestionPipeline, ParserRegistry, QualityThresholds, StructureChunker};
use relia_llm::{CachedEmbedder, ChatBackend, ChatBackendConfig, HashEmbedder, HttpEmbedder, HttpEmbedderConfig};
use relia_pipeline::{
    AnswerGenerator, ConfidenceScorer, ConfidenceWeights, ContradictionDetector,
    GroundednessChecker, QueryDecomposer, QueryPipeline, QueryUnderstanding,
    SelfConsistencyChecker, TraceSink, VerificationDecisionMaker, VerificationThresholds,
};
use relia_retrieval::{
    Bm25Index, FallbackConfig, FallbackManager, HybridRetriever, LexicalCrossEncoder, Reranker,
    RetrievalQualityScorer, RqWeights, VectorIndex,
};
use relia_storage::{EmbeddingCache, SqliteChunkStore, SqliteTraceStore};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QueryPipeline>,
    pub ingest: Arc<IngestionPipeline>,
    pub chunk_store: Arc<dyn ChunkStore>,
    pub trace_store: Arc<dyn TraceStore>,
    pub vector_index: Arc<VectorIndex>,
    pub bm25_index: Arc<Bm25Index>,
    pub trace_sink: TraceSink,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire every capability from settings. Index snapshots load
    /// best-effort; a missing embedding endpoint selects the deterministic
    /// hash embedder.
    pub async fn bootstrap(settings: Settings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);

        // Stores
        let chunk_store = Arc::new(SqliteChunkStore::new(&settings.storage.doc_db_path));
        chunk_store.initialize().await?;
        let trace_store = Arc::new(SqliteTraceStore::new(&settings.storage.trace_db_path));
        trace_store.initialize().await?;

        // Embedder, wrapped in the content-addressed cache
        let raw_embedder: Arc<dyn Embedder> = if settings.embedding.endpoint.is_empty() {
            tracing::warn!("no embedding endpoint configured, using deterministic hash embedder");
            Arc::new(HashEmbedder::new(settings.embedding.dimensions))
        } else {
            Arc::new(HttpEmbedder::new(HttpEmbedderConfig {
                endpoint: settings.embedding.endpoint.clone(),
                api_key: settings.embedding.api_key.clone(),
                model: settings.embedding.model.clone(),
                dimensions: settings.embedding.dimensions,
                batch_size: settings.embedding.batch_size,
                timeout: Duration::from_secs(30),
            })?)
        };
        let cache = EmbeddingCache::new(
            &settings.storage.embedding_cache_db_path,
            format!("{}:{}", settings.embedding.model, settings.embedding.dimensions),
        );
        cache.initialize().await?;
        let embedder: Arc<dyn Embedder> = Arc::new(CachedEmbedder::new(raw_embedder, cache));

        // Indexes
        let vector_index = Arc::new(VectorIndex::load_or_new(
            &settings.storage.vector_index_path,
            settings.embedding.dimensions,
        ));
        let bm25_index = Arc::new(Bm25Index::load_or_new(&settings.storage.bm25_index_path));
        if bm25_index.size() == 0 {
            let all_chunks = chunk_store.all_chunks().await?;
            if !all_chunks.is_empty() {
                bm25_index.rebuild(all_chunks).await?;
            }
        }

        // Providers
        let llm: Arc<dyn LanguageModel> = Arc::new(ChatBackend::new(ChatBackendConfig {
            endpoint: settings.llm.endpoint.clone(),
            api_key: settings.llm.api_key.clone(),
            model: settings.llm.model.clone(),
            timeout: Duration::from_secs(settings.llm.timeout_secs),
            max_retries: settings.llm.max_retries,
            initial_backoff: Duration::from_millis(settings.llm.initial_backoff_ms),
        })?);
        let cross_encoder: Arc<dyn CrossEncoder> = Arc::new(LexicalCrossEncoder::new());

        // Retrieval components
        let retriever = Arc::new(HybridRetriever::new(
            bm25_index.clone(),
            vector_index.clone(),
            chunk_store.clone(),
            embedder.clone(),
            settings.retrieval.rrf_k,
        ));
        let reranker = Arc::new(Reranker::new(cross_encoder));
        let rq_scorer = RetrievalQualityScorer::new(RqWeights {
            relevance: settings.scoring.rq_w_relevance,
            margin: settings.scoring.rq_w_margin,
            coverage: settings.scoring.rq_w_coverage,
            consistency: settings.scoring.rq_w_consistency,
        });
        let fallback = FallbackManager::new(
            retriever.clone(),
            reranker.clone(),
            rq_scorer.clone(),
            llm.clone(),
            FallbackConfig {
                expand_k: settings.retrieval.fallback_expand_k,
                retry_top_k: settings.retrieval.bm25_top_k,
                rerank_top_n: settings.retrieval.rerank_top_n,
                proceed_threshold: settings.scoring.rq_proceed_threshold,
                fallback_threshold: settings.scoring.rq_fallback_threshold,
            },
        );

        // Pipeline
        let trace_sink = TraceSink::new(trace_store.clone());
        let pipeline = Arc::new(QueryPipeline {
            understanding: QueryUnderstanding::new(),
            decomposer: QueryDecomposer::new(llm.clone()),
            retriever: retriever.clone(),
            reranker,
            rq_scorer,
            fallback,
            generator: AnswerGenerator::new(llm.clone()),
            groundedness: GroundednessChecker::new(llm.clone()),
            contradiction: ContradictionDetector::new(llm.clone()),
            self_consistency: SelfConsistencyChecker::new(
                llm.clone(),
                settings.verification.self_consistency_temperature,
            ),
            decider: VerificationDecisionMaker::new(VerificationThresholds {
                groundedness_pass: settings.verification.groundedness_pass_threshold,
                groundedness_warn: settings.verification.groundedness_warn_threshold,
                contradiction_pass: settings.verification.contradiction_pass_threshold,
                contradiction_warn: settings.verification.contradiction_warn_threshold,
                strict_groundedness_pass: settings.verification.strict_groundedness_pass_threshold,
                strict_contradiction_pass: settings.verification.strict_contradiction_pass_threshold,
            }),
            confidence: ConfidenceScorer::new(ConfidenceWeights {
                alpha: settings.scoring.conf_alpha,
                beta: settings.scoring.conf_beta,
                gamma: settings.scoring.conf_gamma,
            }),
            trace_sink: trace_sink.clone(),
            settings: settings.clone(),
        });

        // Ingest
        let ingest = Arc::new(IngestionPipeline::new(
            ParserRegistry::with_defaults(),
            Arc::new(StructureChunker::new(ChunkingOptions {
                max_tokens: settings.chunking.max_tokens,
                overlap_pct: settings.chunking.overlap_pct,
            })),
            embedder,
            chunk_store.clone(),
            vector_index.clone(),
            bm25_index.clone(),
            QualityThresholds {
                min_chars: settings.chunking.min_chunk_chars,
                max_repetition_ratio: settings.chunking.max_repetition_ratio,
            },
        ));

        let doc_count = chunk_store.count_documents().await?;
        tracing::info!(
            docs = doc_count,
            index_size = vector_index.size(),
            "startup complete"
        );

        Ok(Self {
            pipeline,
            ingest,
            chunk_store,
            trace_store,
            vector_index,
            bm25_index,
            trace_sink,
            settings,
        })
    }

    /// Persist index snapshots and drain pending trace writes. Called on
    /// graceful shutdown.
    pub async fn shutdown(&self) {
        if let Err(e) = self.vector_index.save(&self.settings.storage.vector_index_path) {
            tracing::warn!(error = %e, "vector index save failed");
        }
        if let Err(e) = self.bm25_index.save(&self.settings.storage.bm25_index_path) {
            tracing::warn!(error = %e, "bm25 index save failed");
        }
        self.trace_sink.drain(Duration::from_secs(2)).await;
        tracing::info!("shutdown complete");
    }
}
