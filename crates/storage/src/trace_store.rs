//! SQLite-backed trace store.

use async_trait::async_trait;
use relia_core::{Decision, Result, Trace, TraceStore};
use rusqlite::{params, Row};

use crate::doc_store::parse_timestamp;
use crate::schema::{TRACES_TABLE, TRACES_TIMESTAMP_INDEX};
use crate::{open, run_blocking};

/// Append-only query trace store.
#[derive(Debug, Clone)]
pub struct SqliteTraceStore {
    path: String,
}

impl SqliteTraceStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub async fn initialize(&self) -> Result<()> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = open(&path)?;
            conn.execute(TRACES_TABLE, [])?;
            conn.execute(TRACES_TIMESTAMP_INDEX, [])?;
            Ok(())
        })
        .await
    }

    fn decision_str(decision: Decision) -> &'static str {
        match decision {
            Decision::Answer => "answer",
            Decision::Clarify => "clarify",
            Decision::Abstain => "abstain",
        }
    }

    fn row_to_trace(row: &Row<'_>) -> rusqlite::Result<Trace> {
        let timestamp: String = row.get("timestamp")?;
        let decision: String = row.get("decision")?;
        let reason_codes: String = row.get("reason_codes")?;
        let spans: String = row.get("spans")?;
        Ok(Trace {
            trace_id: row.get("trace_id")?,
            query: row.get("query")?,
            timestamp: parse_timestamp(&timestamp),
            latency_ms: row.get("latency_ms")?,
            rq_score: row.get::<_, f64>("rq_score")? as f32,
            confidence: row.get::<_, f64>("confidence")? as f32,
            decision: match decision.as_str() {
                "answer" => Decision::Answer,
                "clarify" => Decision::Clarify,
                _ => Decision::Abstain,
            },
            reason_codes: serde_json::from_str(&reason_codes).unwrap_or_default(),
            spans: serde_json::from_str(&spans).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl TraceStore for SqliteTraceStore {
    async fn save_trace(&self, trace: &Trace) -> Result<()> {
        let path = self.path.clone();
        let trace = trace.clone();
        run_blocking(move || {
            let conn = open(&path)?;
            conn.execute(
                "INSERT OR REPLACE INTO traces \
                 (trace_id, query, timestamp, latency_ms, rq_score, confidence, decision, \
                  reason_codes, spans) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    trace.trace_id,
                    trace.query,
                    trace.timestamp.to_rfc3339(),
                    trace.latency_ms,
                    trace.rq_score as f64,
                    trace.confidence as f64,
                    Self::decision_str(trace.decision),
                    serde_json::to_string(&trace.reason_codes)
                        .unwrap_or_else(|_| "[]".to_string()),
                    serde_json::to_string(&trace.spans).unwrap_or_else(|_| "[]".to_string()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent_traces(&self, limit: usize) -> Result<Vec<Trace>> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = open(&path)?;
            let mut stmt =
                conn.prepare("SELECT * FROM traces ORDER BY timestamp DESC LIMIT ?1")?;
            let rows = stmt.query_map(params![limit as i64], Self::row_to_trace)?;
            rows.collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relia_core::{ReasonCode, TraceContext};

    #[tokio::test]
    async fn test_save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTraceStore::new(dir.path().join("traces.db").to_str().unwrap());
        store.initialize().await.unwrap();

        let mut ctx = TraceContext::new();
        let t0 = ctx.span_start();
        ctx.push_span("retrieval", t0, serde_json::json!({"candidates": 2}));
        let trace = ctx.into_trace(
            "what is x",
            0.6,
            0.7,
            Decision::Answer,
            vec![ReasonCode::FallbackUsed],
        );
        let id = trace.trace_id.clone();

        store.save_trace(&trace).await.unwrap();

        let recent = store.recent_traces(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        let got = &recent[0];
        assert_eq!(got.trace_id, id);
        assert_eq!(got.decision, Decision::Answer);
        assert_eq!(got.reason_codes, vec![ReasonCode::FallbackUsed]);
        assert_eq!(got.spans.len(), 1);
        assert_eq!(got.spans[0].name, "retrieval");
        assert!((got.timestamp - Utc::now()).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn test_recent_traces_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTraceStore::new(dir.path().join("traces.db").to_str().unwrap());
        store.initialize().await.unwrap();

        for i in 0..5 {
            let trace =
                TraceContext::new().into_trace(format!("q{i}"), 0.1, 0.1, Decision::Abstain, vec![]);
            store.save_trace(&trace).await.unwrap();
        }

        let recent = store.recent_traces(3).await.unwrap();
        assert_eq!(recent.len(), 3);
    }
}
