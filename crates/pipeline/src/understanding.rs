//! Query understanding: normalization, language tag, intent, constraints.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use relia_core::{ProcessedQuery, QueryIntent};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").expect("static regex"));
static TIME_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(after|before|since|until)\s+(\w+\s?\d{0,4})").expect("static regex")
});

/// Stage 1: turn the raw query into a [`ProcessedQuery`].
#[derive(Debug, Clone, Default)]
pub struct QueryUnderstanding;

impl QueryUnderstanding {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, raw_query: &str) -> ProcessedQuery {
        let normalized = Self::normalize(raw_query);
        let language = Self::detect_language(&normalized);
        let intent = Self::classify_intent(&normalized);
        let constraints = Self::extract_constraints(&normalized);

        tracing::info!(
            language = %language,
            intent = ?intent,
            constraints = constraints.len(),
            "query processed"
        );

        ProcessedQuery {
            normalized,
            language,
            intent,
            constraints,
        }
    }

    fn normalize(text: &str) -> String {
        WHITESPACE.replace_all(text.trim(), " ").into_owned()
    }

    /// Coarse language tag: ASCII-dominant text is assumed English,
    /// anything else is left undetermined. A real detector can replace this
    /// without touching the rest of the stage.
    fn detect_language(text: &str) -> String {
        let total = text.chars().filter(|c| c.is_alphabetic()).count();
        if total == 0 {
            return "en".to_string();
        }
        let ascii = text
            .chars()
            .filter(|c| c.is_alphabetic() && c.is_ascii())
            .count();
        if ascii * 10 >= total * 9 {
            "en".to_string()
        } else {
            "und".to_string()
        }
    }

    fn classify_intent(query: &str) -> QueryIntent {
        let q = query.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| q.contains(w));

        if contains_any(&["compare", "difference", " vs ", "versus"]) {
            QueryIntent::Comparison
        } else if contains_any(&["how to", "how do", "how can", "steps to"]) {
            QueryIntent::HowTo
        } else if contains_any(&["what is", "what are", "define", "explain"]) {
            QueryIntent::Factual
        } else if contains_any(&["why", "reason", "cause"]) {
            QueryIntent::Causal
        } else if contains_any(&["list", "enumerate", "name all"]) {
            QueryIntent::List
        } else {
            QueryIntent::General
        }
    }

    fn extract_constraints(query: &str) -> HashMap<String, serde_json::Value> {
        let mut constraints = HashMap::new();

        let years: Vec<String> = YEAR
            .captures_iter(query)
            .map(|c| c[1].to_string())
            .collect();
        if !years.is_empty() {
            constraints.insert("years".to_string(), serde_json::json!(years));
        }

        if let Some(captures) = TIME_FILTER.captures(query) {
            constraints.insert(
                "time_filter".to_string(),
                serde_json::json!({
                    "type": captures[1].to_lowercase(),
                    "value": captures[2].trim(),
                }),
            );
        }

        constraints
    }
}
