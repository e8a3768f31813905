//! HTTP server for the relia query service
//!
//! Routes:
//! - `POST /query` - full pipeline, JSON response
//! - `POST /query/stream` - Server-Sent Events (token / metadata / done / error)
//! - `POST /ingest` - multipart document upload
//! - `GET /health` - corpus and index counters
//! - `GET /traces/recent` - diagnostic trace listing

pub mod auth;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
