//! The query pipeline orchestrator.
//!
//! Walks stages 1-9 under a soft latency budget. The budget is a deadline,
//! not a kill switch: time remaining is checked at stage boundaries and only
//! optional work (self-consistency) is dropped; no stage is interrupted
//! mid-call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::stream;
use futures::{Stream, StreamExt};
use relia_config::Settings;
use relia_core::{
    Chunk, Citation, DebugInfo, DecomposedQuery, Decision, GenerationResult, ProcessedQuery,
    QueryRequest, QueryResponse, ReasonCode, Result, RetrievalCandidate, RetrievalDecision,
    Retriever, TraceContext, VerificationDecision,
};
use relia_retrieval::{dedup_candidates, FallbackManager, Reranker, RetrievalQualityScorer};

use crate::confidence::ConfidenceScorer;
use crate::decomposition::QueryDecomposer;
use crate::generation::{AnswerGenerator, GenerationEvent};
use crate::sink::TraceSink;
use crate::understanding::QueryUnderstanding;
use crate::verification::{
    ContradictionDetector, GroundednessChecker, SelfConsistencyChecker, VerificationDecisionMaker,
};

const ABSTAIN_RETRIEVAL: &str = "I cannot provide a reliable answer. \
The retrieved evidence is insufficient for this question.";

const ABSTAIN_VERIFICATION: &str = "I cannot provide a reliable answer to this question. \
The evidence is insufficient or contradictory.";

const CLARIFY_CAVEAT: &str = "\n\nNote: This answer has moderate uncertainty. \
Some claims may not be fully supported by the available evidence.";

/// Full refusal phrases that unambiguously indicate the model could not
/// answer from the evidence. Substring match, case-insensitive; narrow on
/// purpose to avoid false positives from legitimate wording.
const REFUSAL_PATTERNS: &[&str] = &[
    "do not contain information",
    "does not contain information",
    "do not contain the answer",
    "does not contain the answer",
    "do not contain the necessary",
    "do not contain the coordinates",
    "don't contain information",
    "doesn't contain information",
    "cannot answer the question",
    "cannot answer this question",
    "unable to answer",
    "i cannot provide an answer",
    "i am unable to",
    "no relevant information",
    "outside the scope of",
    "is not discussed in",
    "are not discussed in",
    "not contain any information",
    "do not address",
    "does not address",
    "not provided in the evidence",
];

/// One event of the streaming query path.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A textual fragment of the answer
    Token(String),
    /// The final response payload
    Metadata(QueryResponse),
    /// Terminal marker
    Done,
    /// Terminal error
    Error(String),
}

/// Pipeline state carried from the retrieval gate into generation.
struct StageState {
    trace: TraceContext,
    deadline: Instant,
    processed: ProcessedQuery,
    decomposed: DecomposedQuery,
    reranked: Vec<RetrievalCandidate>,
    rq: f32,
    rq_reasons: Vec<ReasonCode>,
}

enum Prelude {
    /// The gate decided before generation; response is final.
    Early(QueryResponse),
    Ready(Box<StageState>),
}

/// Stages 1-9 wired over capability objects.
pub struct QueryPipeline {
    pub understanding: QueryUnderstanding,
    pub decomposer: QueryDecomposer,
    pub retriever: Arc<dyn Retriever>,
    pub reranker: Arc<Reranker>,
    pub rq_scorer: RetrievalQualityScorer,
    pub fallback: FallbackManager,
    pub generator: AnswerGenerator,
    pub groundedness: GroundednessChecker,
    pub contradiction: ContradictionDetector,
    pub self_consistency: SelfConsistencyChecker,
    pub decider: VerificationDecisionMaker,
    pub confidence: ConfidenceScorer,
    pub trace_sink: TraceSink,
    pub settings: Arc<Settings>,
}

impl QueryPipeline {
    /// Non-streaming query path.
    pub async fn execute(&self, request: QueryRequest) -> Result<QueryResponse> {
        match self.run_to_generation(&request).await? {
            Prelude::Early(response) => Ok(response),
            Prelude::Ready(state) => {
                let mut state = *state;
                let t0 = state.trace.span_start();
                let generated = self
                    .generator
                    .generate(
                        &state.processed.normalized,
                        &state.reranked,
                        Some(&state.decomposed),
                        request.mode,
                    )
                    .await?;
                state.trace.push_span(
                    "generation",
                    t0,
                    serde_json::json!({
                        "answer_len": generated.answer.len(),
                        "citations": generated.cited_chunks.len(),
                    }),
                );
                self.finish(state, generated, &request).await
            }
        }
    }

    /// Streaming query path. Early-exit paths emit only `Metadata` + `Done`;
    /// otherwise answer fragments stream as `Token` events first.
    pub fn execute_stream(
        self: Arc<Self>,
        request: QueryRequest,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        stream! {
            let prelude = match self.run_to_generation(&request).await {
                Ok(prelude) => prelude,
                Err(e) => {
                    yield StreamEvent::Error(e.to_string());
                    return;
                }
            };

            let state = match prelude {
                Prelude::Early(response) => {
                    yield StreamEvent::Metadata(response);
                    yield StreamEvent::Done;
                    return;
                }
                Prelude::Ready(state) => state,
            };
            let mut state = *state;

            let t0 = state.trace.span_start();
            let query = state.processed.normalized.clone();
            let evidence = state.reranked.clone();
            let decomposed = state.decomposed.clone();

            let mut generated = None;
            {
                let mut fragments = self.generator.generate_stream(
                    &query,
                    &evidence,
                    Some(&decomposed),
                    request.mode,
                );
                while let Some(event) = fragments.next().await {
                    match event {
                        Ok(GenerationEvent::Fragment(text)) => yield StreamEvent::Token(text),
                        Ok(GenerationEvent::Completed(result)) => generated = Some(result),
                        Err(e) => {
                            yield StreamEvent::Error(e.to_string());
                            return;
                        }
                    }
                }
            }

            let Some(generated) = generated else {
                yield StreamEvent::Error("generation stream ended without a result".to_string());
                return;
            };
            state.trace.push_span(
                "generation",
                t0,
                serde_json::json!({
                    "answer_len": generated.answer.len(),
                    "citations": generated.cited_chunks.len(),
                }),
            );

            match self.finish(state, generated, &request).await {
                Ok(response) => {
                    yield StreamEvent::Metadata(response);
                    yield StreamEvent::Done;
                }
                Err(e) => yield StreamEvent::Error(e.to_string()),
            }
        }
    }

    /// Stages 1-6: understanding, decomposition, retrieval, reranking,
    /// RQ scoring, gate + fallback.
    async fn run_to_generation(&self, request: &QueryRequest) -> Result<Prelude> {
        let mut trace = TraceContext::new();
        let deadline = Instant::now() + Duration::from_millis(request.latency_budget_ms);

        // STEP 1: understanding
        let t0 = trace.span_start();
        let processed = self.understanding.process(&request.query);
        trace.push_span(
            "query_understanding",
            t0,
            serde_json::json!({"language": processed.language, "intent": processed.intent}),
        );

        // STEP 2: decomposition
        let t0 = trace.span_start();
        let decomposed = self.decomposer.decompose(&processed.normalized).await;
        trace.push_span(
            "decomposition",
            t0,
            serde_json::json!({"sub_questions": decomposed.sub_questions.len()}),
        );

        // STEP 3: hybrid retrieval per sub-question, then dedup
        let t0 = trace.span_start();
        let mut all_candidates = Vec::new();
        for sub_question in &decomposed.sub_questions {
            let candidates = self
                .retriever
                .retrieve(
                    sub_question,
                    self.settings.retrieval.bm25_top_k,
                    self.settings.retrieval.vector_top_k,
                )
                .await?;
            all_candidates.extend(candidates);
        }
        let all_candidates = dedup_candidates(all_candidates);
        trace.push_span(
            "retrieval",
            t0,
            serde_json::json!({"candidates": all_candidates.len()}),
        );

        // STEP 4: reranking against the normalized query
        let t0 = trace.span_start();
        let reranked = self
            .reranker
            .rerank(
                &processed.normalized,
                all_candidates,
                self.settings.retrieval.rerank_top_n,
            )
            .await?;
        trace.push_span("reranking", t0, serde_json::json!({"kept": reranked.len()}));

        // STEP 5: RQ scoring
        let t0 = trace.span_start();
        let (mut rq, mut rq_reasons) = self.rq_scorer.score(&reranked);
        trace.push_span(
            "rq_scoring",
            t0,
            serde_json::json!({"rq": rq, "reasons": rq_reasons}),
        );

        let unique_docs: std::collections::HashSet<&str> =
            reranked.iter().map(|c| c.chunk.doc_id.as_str()).collect();
        tracing::info!(
            trace_id = %trace.trace_id,
            rq,
            num_candidates = reranked.len(),
            unique_docs = unique_docs.len(),
            "retrieval metrics"
        );

        // STEP 6: decision gate
        let proceed_threshold = self.settings.rq_proceed_threshold(request.mode);

        if rq < self.settings.scoring.rq_fallback_threshold {
            let response =
                self.build_abstain_response(ABSTAIN_RETRIEVAL, rq, rq_reasons, trace, request);
            return Ok(Prelude::Early(response));
        }

        let mut reranked = reranked;
        if rq < proceed_threshold {
            let t0 = trace.span_start();
            let fallback_result = self.fallback.fallback_retrieve(&processed.normalized).await?;
            trace.push_span(
                "fallback",
                t0,
                serde_json::json!({
                    "decision": fallback_result.decision,
                    "rq": fallback_result.quality_score,
                }),
            );

            if fallback_result.decision == RetrievalDecision::Abstain {
                rq_reasons.push(ReasonCode::FallbackFailed);
                let response =
                    self.build_abstain_response(ABSTAIN_RETRIEVAL, rq, rq_reasons, trace, request);
                return Ok(Prelude::Early(response));
            }
            reranked = fallback_result.candidates;
            rq = fallback_result.quality_score;
            rq_reasons.push(ReasonCode::FallbackUsed);
        }

        Ok(Prelude::Ready(Box::new(StageState {
            trace,
            deadline,
            processed,
            decomposed,
            reranked,
            rq,
            rq_reasons,
        })))
    }

    /// Stages 7.5-9: self-admitted-ignorance early exit, verification,
    /// confidence, response assembly.
    async fn finish(
        &self,
        mut state: StageState,
        generated: GenerationResult,
        request: &QueryRequest,
    ) -> Result<QueryResponse> {
        // STEP 7.5: the generator admitting ignorance bypasses the verifier;
        // charging verification latency to a non-answer helps nobody.
        if Self::answer_admits_ignorance(&generated.answer) {
            let mut reasons = state.rq_reasons.clone();
            reasons.push(ReasonCode::LowGroundedness);
            // Two arms: good evidence means the model hedged (clarify);
            // poor evidence means there was nothing to answer from (abstain).
            if state.rq >= self.settings.scoring.rq_proceed_threshold {
                tracing::info!(
                    trace_id = %state.trace.trace_id,
                    rq = state.rq,
                    "answer admits ignorance with good evidence, clarifying"
                );
                return Ok(self.build_clarify_response(
                    &generated, state.rq, reasons, state.trace, request,
                ));
            }
            tracing::info!(
                trace_id = %state.trace.trace_id,
                rq = state.rq,
                "answer admits ignorance with poor evidence, abstaining"
            );
            return Ok(self.build_abstain_response(
                ABSTAIN_RETRIEVAL,
                state.rq,
                reasons,
                state.trace,
                request,
            ));
        }

        // STEP 8: verification. Groundedness and contradiction always run,
        // concurrently; self-consistency only if enough budget remains when
        // the stage starts.
        let t0 = state.trace.span_start();
        let remaining_ms = state
            .deadline
            .saturating_duration_since(Instant::now())
            .as_millis() as u64;
        let evidence: Vec<Chunk> = state.reranked.iter().map(|c| c.chunk.clone()).collect();

        let (groundedness, contradiction_rate) = tokio::join!(
            self.groundedness.check(&generated.answer, &evidence),
            self.contradiction.check(&generated.answer, &evidence),
        );

        let self_consistency = if remaining_ms
            > self.settings.verification.self_consistency_min_budget_ms
        {
            Some(
                self.self_consistency
                    .check(&state.processed.normalized, &evidence, &generated.answer)
                    .await,
            )
        } else {
            tracing::debug!(remaining_ms, "self-consistency skipped for budget");
            None
        };

        let verification =
            self.decider
                .decide(groundedness, contradiction_rate, self_consistency, request.mode);
        state.trace.push_span(
            "verification",
            t0,
            serde_json::json!({
                "groundedness": groundedness,
                "contradiction_rate": contradiction_rate,
                "self_consistency": self_consistency,
                "decision": verification.decision,
            }),
        );

        // STEP 9: confidence and final response
        let confidence = self.confidence.score(state.rq, groundedness, contradiction_rate);
        let decision = Self::map_decision(verification.decision);

        tracing::info!(
            trace_id = %state.trace.trace_id,
            groundedness,
            contradiction_rate,
            confidence,
            decision = ?decision,
            "generation metrics"
        );

        let mut reasons = state.rq_reasons;
        reasons.extend(verification.reason_codes);

        let (answer, citations, confidence) = match decision {
            Decision::Abstain => (ABSTAIN_VERIFICATION.to_string(), Vec::new(), 0.0),
            Decision::Clarify => (
                format!("{}{}", generated.answer, CLARIFY_CAVEAT),
                Self::citations_of(&generated),
                confidence,
            ),
            Decision::Answer => (
                generated.answer.clone(),
                Self::citations_of(&generated),
                confidence,
            ),
        };

        let rerank_top_scores: Vec<f32> = state
            .reranked
            .iter()
            .take(5)
            .map(|c| round4(c.score))
            .collect();

        let trace_id = state.trace.trace_id.clone();
        let latency_ms = round2(state.trace.elapsed_ms());
        let trace = state.trace.into_trace(
            request.query.clone(),
            state.rq,
            confidence,
            decision,
            reasons.clone(),
        );
        self.trace_sink.save(trace);

        Ok(QueryResponse {
            answer,
            citations,
            confidence: round4(confidence),
            decision,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
            debug: DebugInfo {
                retrieval_quality: round4(state.rq),
                rerank_top_scores,
                trace_id,
                latency_ms,
            },
        })
    }

    fn build_abstain_response(
        &self,
        message: &str,
        rq: f32,
        reasons: Vec<ReasonCode>,
        trace: TraceContext,
        request: &QueryRequest,
    ) -> QueryResponse {
        let trace_id = trace.trace_id.clone();
        let latency_ms = round2(trace.elapsed_ms());
        let trace_record = trace.into_trace(
            request.query.clone(),
            rq,
            0.0,
            Decision::Abstain,
            reasons.clone(),
        );
        self.trace_sink.save(trace_record);

        QueryResponse {
            answer: message.to_string(),
            citations: Vec::new(),
            confidence: 0.0,
            decision: Decision::Abstain,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
            debug: DebugInfo {
                retrieval_quality: round4(rq),
                rerank_top_scores: Vec::new(),
                trace_id,
                latency_ms,
            },
        }
    }

    fn build_clarify_response(
        &self,
        generated: &GenerationResult,
        rq: f32,
        reasons: Vec<ReasonCode>,
        trace: TraceContext,
        request: &QueryRequest,
    ) -> QueryResponse {
        let confidence = round4(rq * 0.5);
        let trace_id = trace.trace_id.clone();
        let latency_ms = round2(trace.elapsed_ms());
        let trace_record = trace.into_trace(
            request.query.clone(),
            rq,
            confidence,
            Decision::Clarify,
            reasons.clone(),
        );
        self.trace_sink.save(trace_record);

        QueryResponse {
            answer: format!("{}{}", generated.answer, CLARIFY_CAVEAT),
            citations: Self::citations_of(generated),
            confidence,
            decision: Decision::Clarify,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
            debug: DebugInfo {
                retrieval_quality: round4(rq),
                rerank_top_scores: Vec::new(),
                trace_id,
                latency_ms,
            },
        }
    }

    fn citations_of(generated: &GenerationResult) -> Vec<Citation> {
        generated
            .cited_chunks
            .iter()
            .zip(&generated.cited_previews)
            .map(|(chunk, preview)| Citation {
                doc_id: chunk.doc_id.clone(),
                chunk_id: chunk.chunk_id.clone(),
                text_snippet: preview.clone(),
            })
            .collect()
    }

    /// Detect a generated answer that itself says the evidence was not
    /// enough to answer.
    fn answer_admits_ignorance(answer: &str) -> bool {
        let lower = answer.to_lowercase();
        REFUSAL_PATTERNS.iter().any(|phrase| lower.contains(phrase))
    }

    /// Verifier decision to API decision. Mode never enters this mapping.
    fn map_decision(decision: VerificationDecision) -> Decision {
        match decision {
            VerificationDecision::Pass => Decision::Answer,
            VerificationDecision::Warn => Decision::Clarify,
            VerificationDecision::Abstain => Decision::Abstain,
        }
    }
}

fn round4(x: f32) -> f32 {
    (x * 10_000.0).round() / 10_000.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
