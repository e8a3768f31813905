//! Document ingestion for the relia query service
//!
//! parse -> chunk -> quality filter -> embed -> index -> store.
//!
//! Parsers are registered by file extension; the chunker splits along
//! document structure (headings, paragraphs, sentences) under a token
//! budget with a word-overlap carry-over between adjacent chunks.

pub mod chunker;
pub mod parser;
pub mod pipeline;
pub mod quality;

pub use chunker::{ChunkingOptions, StructureChunker};
pub use parser::{HtmlParser, MarkdownParser, ParserRegistry, TextParser};
pub use pipeline::IngestionPipeline;
pub use quality::{filter_chunks, QualityThresholds};
