//! Extension-keyed document parsers.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use relia_core::{DocumentParser, Error, Result};

/// Plain text passthrough.
pub struct TextParser;

impl DocumentParser for TextParser {
    fn extensions(&self) -> &[&'static str] {
        &["txt", "text"]
    }

    fn parse(&self, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Markdown passthrough. Heading syntax is preserved on purpose: the
/// structure chunker splits on it.
pub struct MarkdownParser;

impl DocumentParser for MarkdownParser {
    fn extensions(&self) -> &[&'static str] {
        &["md", "markdown"]
    }

    fn parse(&self, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

static SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").expect("static regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("static regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Tag-stripping HTML parser.
pub struct HtmlParser;

impl DocumentParser for HtmlParser {
    fn extensions(&self) -> &[&'static str] {
        &["html", "htm"]
    }

    fn parse(&self, bytes: &[u8]) -> Result<String> {
        let raw = String::from_utf8_lossy(bytes);
        let without_blocks = SCRIPT_STYLE.replace_all(&raw, " ");
        // Block-level closers become newlines so paragraphs survive.
        let with_breaks = without_blocks
            .replace("</p>", "\n\n")
            .replace("</P>", "\n\n")
            .replace("<br>", "\n")
            .replace("<br/>", "\n")
            .replace("<br />", "\n");
        let text = TAG.replace_all(&with_breaks, " ");
        let decoded = text
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&nbsp;", " ");

        let collapsed: String = decoded
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(BLANK_RUNS.replace_all(&collapsed, "\n\n").trim().to_string())
    }
}

/// Looks up a parser for a file by extension.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn DocumentParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the built-in text, markdown, and HTML parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextParser));
        registry.register(Arc::new(MarkdownParser));
        registry.register(Arc::new(HtmlParser));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn DocumentParser>) {
        self.parsers.push(parser);
    }

    /// Find the parser handling `filename`'s extension.
    pub fn for_filename(&self, filename: &str) -> Result<Arc<dyn DocumentParser>> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        self.parsers
            .iter()
            .find(|p| p.extensions().contains(&extension.as_str()))
            .cloned()
            .ok_or_else(|| {
                Error::Ingestion(format!("no parser registered for extension '{extension}'"))
            })
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
