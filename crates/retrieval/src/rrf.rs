//! Reciprocal Rank Fusion.
//!
//! Rank-based merge of multiple ranked lists. Based on: Cormack, Clarke,
//! Buettcher (2009) - "Reciprocal Rank Fusion outperforms Condorcet and
//! individual Rank Learning Methods".

use std::collections::HashMap;

/// Merge ranked `(chunk_id, score)` lists with RRF.
///
/// Each item at 0-based rank `r` in a list contributes `1 / (k + r + 1)` to
/// its fused score; contributions sum across lists. Input scores only define
/// the per-list order and do not enter the fused score.
///
/// Ties in the fused score break on chunk id, so the result is independent of
/// the order the input lists are given in.
pub fn reciprocal_rank_fusion(
    result_lists: &[Vec<(String, f32)>],
    k: u32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<&str, f32> = HashMap::new();

    for list in result_lists {
        for (rank, (chunk_id, _)) in list.iter().enumerate() {
            let contribution = 1.0 / (k as f32 + rank as f32 + 1.0);
            *scores.entry(chunk_id.as_str()).or_insert(0.0) += contribution;
        }
    }

    let mut fused: Vec<(String, f32)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}
