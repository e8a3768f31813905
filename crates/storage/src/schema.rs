//! Idempotent schema creation.

pub const DOCUMENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS documents (
    doc_id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    content_type TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    raw_text TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

pub const CHUNKS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id TEXT PRIMARY KEY,
    doc_id TEXT NOT NULL,
    text TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    token_count INTEGER NOT NULL,
    FOREIGN KEY (doc_id) REFERENCES documents(doc_id)
)";

pub const CHUNKS_DOC_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id)";

pub const TRACES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS traces (
    trace_id TEXT PRIMARY KEY,
    query TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    latency_ms REAL NOT NULL,
    rq_score REAL NOT NULL,
    confidence REAL NOT NULL,
    decision TEXT NOT NULL,
    reason_codes TEXT NOT NULL DEFAULT '[]',
    spans TEXT NOT NULL DEFAULT '[]'
)";

pub const TRACES_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_traces_timestamp ON traces(timestamp)";

pub const EMBEDDING_CACHE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS embedding_cache (
    text_hash TEXT PRIMARY KEY,
    embedding TEXT NOT NULL
)";
