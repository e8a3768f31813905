//! Per-request trace types and the span recorder.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::Decision;
use crate::reason::ReasonCode;

/// One named stage within a request, with offsets relative to request start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSpan {
    pub name: String,
    pub start_ms: f64,
    pub end_ms: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TraceSpan {
    pub fn duration_ms(&self) -> f64 {
        self.end_ms - self.start_ms
    }
}

/// Persisted observability record, written once per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub query: String,
    /// Wall-clock time the request started (UTC)
    pub timestamp: DateTime<Utc>,
    pub latency_ms: f64,
    pub rq_score: f32,
    pub confidence: f32,
    pub decision: Decision,
    pub reason_codes: Vec<ReasonCode>,
    pub spans: Vec<TraceSpan>,
}

/// Span recorder owned by a single in-flight request.
///
/// Offsets come from a monotonic clock; the trace timestamp is wall-clock at
/// construction. Not shared across tasks: the orchestrator owns it mutably
/// for the lifetime of the request.
#[derive(Debug)]
pub struct TraceContext {
    pub trace_id: String,
    started: Instant,
    started_at: DateTime<Utc>,
    spans: Vec<TraceSpan>,
}

impl TraceContext {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            started_at: Utc::now(),
            spans: Vec::new(),
        }
    }

    /// Milliseconds elapsed since the request started.
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Offset to pass to [`TraceContext::push_span`] when the stage completes.
    pub fn span_start(&self) -> f64 {
        self.elapsed_ms()
    }

    /// Record a completed span ending now.
    pub fn push_span(&mut self, name: impl Into<String>, start_ms: f64, metadata: serde_json::Value) {
        self.spans.push(TraceSpan {
            name: name.into(),
            start_ms,
            end_ms: self.elapsed_ms(),
            metadata,
        });
    }

    /// Finalize into a persistable [`Trace`].
    pub fn into_trace(
        self,
        query: impl Into<String>,
        rq_score: f32,
        confidence: f32,
        decision: Decision,
        reason_codes: Vec<ReasonCode>,
    ) -> Trace {
        let latency_ms = self.elapsed_ms();
        Trace {
            trace_id: self.trace_id,
            query: query.into(),
            timestamp: self.started_at,
            latency_ms,
            rq_score,
            confidence,
            decision,
            reason_codes,
            spans: self.spans,
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}
