//! The online query pipeline
//!
//! Nine stages compose into the orchestrator:
//! understanding -> decomposition -> hybrid retrieval -> reranking ->
//! RQ gate -> fallback -> generation -> verification -> decision.
//!
//! Every stage produces structured signals; the decision gate turns them
//! into one of answer / clarify / abstain.

pub mod confidence;
pub mod decomposition;
pub mod generation;
pub mod orchestrator;
pub mod sink;
pub mod understanding;
pub mod verification;

pub use confidence::{ConfidenceScorer, ConfidenceWeights};
pub use decomposition::QueryDecomposer;
pub use generation::{AnswerGenerator, GenerationEvent};
pub use orchestrator::{QueryPipeline, StreamEvent};
pub use sink::TraceSink;
pub use understanding::QueryUnderstanding;
pub use verification::{
    ContradictionDetector, GroundednessChecker, SelfConsistencyChecker,
    VerificationDecisionMaker, VerificationThresholds,
};
