//! Structure-aware chunker.
//!
//! Splits by markdown headings first, then paragraphs, then packs sentences
//! up to the token budget. Each chunk after the first carries a word-overlap
//! prefix from its predecessor.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use relia_core::{Chunk, Chunker, Result};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+)$").expect("static regex"));
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("static regex"));

/// Chunker parameters.
#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    /// Approximate token budget per chunk
    pub max_tokens: usize,
    /// Fraction of the previous chunk's words prepended to the next chunk
    pub overlap_pct: f32,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap_pct: 0.15,
        }
    }
}

/// Heading/paragraph/sentence splitter with overlap.
#[derive(Debug, Clone)]
pub struct StructureChunker {
    options: ChunkingOptions,
}

struct RawChunk {
    text: String,
    heading_path: Vec<String>,
}

impl StructureChunker {
    pub fn new(options: ChunkingOptions) -> Self {
        Self { options }
    }

    /// Whitespace-word token approximation, applied consistently at build
    /// and query time.
    fn count_tokens(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Split by markdown headings. Returns `(heading_path, section_text)`
    /// pairs; text before the first heading gets an empty path.
    fn split_by_headings(text: &str) -> Vec<(Vec<String>, String)> {
        let mut sections = Vec::new();
        let mut heading_stack: Vec<String> = Vec::new();
        let mut last_end = 0;

        for captures in HEADING.captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            if whole.start() > last_end {
                let section = &text[last_end..whole.start()];
                if !section.trim().is_empty() {
                    sections.push((heading_stack.clone(), section.to_string()));
                }
            }

            let level = captures[1].len();
            let title = captures[2].trim().to_string();
            heading_stack.truncate(level.saturating_sub(1));
            heading_stack.push(title);
            last_end = whole.end();
        }

        let remaining = &text[last_end..];
        if !remaining.trim().is_empty() {
            sections.push((heading_stack, remaining.to_string()));
        }

        if sections.is_empty() && !text.trim().is_empty() {
            sections.push((Vec::new(), text.to_string()));
        }
        sections
    }

    fn split_by_paragraphs(text: &str) -> Vec<String> {
        PARAGRAPH_BREAK
            .split(text)
            .filter(|p| !p.trim().is_empty())
            .map(|p| p.to_string())
            .collect()
    }

    /// Pack sentences into budget-sized pieces.
    fn pack_sentences(&self, text: &str) -> Vec<String> {
        let mut packed = Vec::new();
        let mut buffer = String::new();

        for sentence in text.unicode_sentences() {
            let candidate = if buffer.is_empty() {
                sentence.trim().to_string()
            } else {
                format!("{} {}", buffer, sentence.trim())
            };
            if Self::count_tokens(&candidate) <= self.options.max_tokens {
                buffer = candidate;
            } else {
                if !buffer.is_empty() {
                    packed.push(buffer);
                }
                buffer = sentence.trim().to_string();
            }
        }
        if !buffer.trim().is_empty() {
            packed.push(buffer);
        }
        packed
    }

    fn collect_raw_chunks(&self, text: &str) -> Vec<RawChunk> {
        let mut raw = Vec::new();
        for (heading_path, section) in Self::split_by_headings(text) {
            if Self::count_tokens(&section) <= self.options.max_tokens {
                raw.push(RawChunk {
                    text: section.trim().to_string(),
                    heading_path,
                });
                continue;
            }
            for paragraph in Self::split_by_paragraphs(&section) {
                if Self::count_tokens(&paragraph) <= self.options.max_tokens {
                    raw.push(RawChunk {
                        text: paragraph.trim().to_string(),
                        heading_path: heading_path.clone(),
                    });
                } else {
                    for piece in self.pack_sentences(&paragraph) {
                        raw.push(RawChunk {
                            text: piece.trim().to_string(),
                            heading_path: heading_path.clone(),
                        });
                    }
                }
            }
        }
        raw.retain(|rc| !rc.text.is_empty());
        raw
    }

    /// Trailing word window of the previous chunk, prepended to the next.
    fn overlap_text(previous: &str, overlap_pct: f32) -> String {
        if overlap_pct <= 0.0 || previous.is_empty() {
            return String::new();
        }
        let words: Vec<&str> = previous.split_whitespace().collect();
        if words.is_empty() {
            return String::new();
        }
        let take = ((words.len() as f32 * overlap_pct) as usize).max(1);
        words[words.len() - take.min(words.len())..].join(" ")
    }
}

impl Default for StructureChunker {
    fn default() -> Self {
        Self::new(ChunkingOptions::default())
    }
}

impl Chunker for StructureChunker {
    fn chunk(
        &self,
        doc_id: &str,
        text: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<Chunk>> {
        let raw = self.collect_raw_chunks(text);
        let mut chunks = Vec::with_capacity(raw.len());

        for (i, rc) in raw.iter().enumerate() {
            let mut chunk_text = rc.text.clone();
            if i > 0 {
                let overlap = Self::overlap_text(&raw[i - 1].text, self.options.overlap_pct);
                if !overlap.is_empty() {
                    chunk_text = format!("{overlap}\n{chunk_text}");
                }
            }

            let mut chunk_metadata = metadata.clone();
            chunk_metadata.insert(
                "heading_path".to_string(),
                serde_json::json!(rc.heading_path),
            );

            let mut chunk = Chunk::new(
                Uuid::new_v4().to_string(),
                doc_id,
                chunk_text.clone(),
                i,
                Self::count_tokens(&chunk_text),
            );
            chunk.metadata = chunk_metadata;
            chunks.push(chunk);
        }

        tracing::debug!(doc_id, chunks = chunks.len(), "document chunked");
        Ok(chunks)
    }
}
