//! SQLite persistence for the relia query service
//!
//! Three stores share the same access pattern: a database file opened per
//! operation (WAL mode, so concurrent readers never block each other), with
//! all rusqlite work moved onto the blocking thread pool.
//!
//! - [`SqliteChunkStore`] - documents and chunks, batched lookup by chunk id
//! - [`SqliteTraceStore`] - append-only request traces
//! - [`EmbeddingCache`] - content-addressed embedding cache

mod cache;
mod doc_store;
mod schema;
mod trace_store;

pub use cache::EmbeddingCache;
pub use doc_store::SqliteChunkStore;
pub use trace_store::SqliteTraceStore;

use relia_core::{Error, Result};

/// Run blocking SQLite work on the blocking pool, mapping failures into the
/// core error type.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, rusqlite::Error> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f().map_err(Error::storage))
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// Open a connection to `path`, creating parent directories on first use.
pub(crate) fn open(path: &str) -> std::result::Result<rusqlite::Connection, rusqlite::Error> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            // Surfaced as a storage error by the caller if it fails.
            let _ = std::fs::create_dir_all(parent);
        }
    }
    let conn = rusqlite::Connection::open(path)?;
    let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    Ok(conn)
}
