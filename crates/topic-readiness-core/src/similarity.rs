//! Cosine similarity, relevance gating, and near-duplicate removal.
//!
//! Nearest-neighbour retrieval over a shared corpus always returns *something*,
//! even when nothing on-topic exists. [`filter_relevant`] applies an absolute
//! similarity floor so that the closest-but-unrelated chunks never count as
//! evidence, and [`deduplicate`] collapses near-identical chunks so that one
//! abstract ingested twice (or syndicated across sources) is counted once.

use crate::models::CorpusChunk;

/// Minimum cosine similarity to the topic vector for a chunk to count.
pub const RELEVANCE_THRESHOLD: f32 = 0.30;

/// Chunks more similar than this to an already-kept chunk are duplicates.
pub const DUPLICATE_THRESHOLD: f32 = 0.90;

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Drop every candidate whose similarity to `topic_vec` is below `threshold`.
///
/// Input order is preserved.
pub fn filter_relevant(
    candidates: Vec<CorpusChunk>,
    topic_vec: &[f32],
    threshold: f32,
) -> Vec<CorpusChunk> {
    candidates
        .into_iter()
        .filter(|c| cosine_similarity(&c.embedding, topic_vec) >= threshold)
        .collect()
}

/// Greedy sequential dedup.
///
/// Walks `candidates` in order and keeps a candidate only if its similarity
/// to every already-kept candidate is `<= threshold`. Quadratic in the
/// candidate count, which the retrieval limit bounds.
pub fn deduplicate(candidates: Vec<CorpusChunk>, threshold: f32) -> Vec<CorpusChunk> {
    let mut kept: Vec<CorpusChunk> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let is_duplicate = kept
            .iter()
            .any(|k| cosine_similarity(&candidate.embedding, &k.embedding) > threshold);
        if !is_duplicate {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, embedding: Vec<f32>) -> CorpusChunk {
        CorpusChunk {
            chunk_id: id.to_string(),
            document_id: format!("doc-{}", id),
            text: String::new(),
            embedding,
            publication_year_hint: None,
            doc_title: None,
        }
    }

    /// Unit vector in the (x, y) plane whose cosine with `[1, 0]` is `cos`.
    fn at_cos(cos: f32) -> Vec<f32> {
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_absent_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_relevance_gate_drops_single_nearest_neighbour() {
        let topic = vec![1.0, 0.0];
        let only = vec![chunk("a", at_cos(0.25))];
        assert!(filter_relevant(only, &topic, RELEVANCE_THRESHOLD).is_empty());
    }

    #[test]
    fn test_relevance_gate_keeps_threshold_and_above() {
        let topic = vec![1.0, 0.0];
        let kept = filter_relevant(
            vec![
                chunk("low", at_cos(0.1)),
                chunk("high", at_cos(0.8)),
                chunk("unembedded", vec![]),
            ],
            &topic,
            RELEVANCE_THRESHOLD,
        );
        let ids: Vec<&str> = kept.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["high"]);
    }

    #[test]
    fn test_dedup_two_near_duplicates_and_one_distinct() {
        // a·b = 0.95; c is at 0.5 to both a and b.
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.95, (1.0f32 - 0.95 * 0.95).sqrt(), 0.0];
        let c_x = 0.5f32;
        let c_y = (0.5 - 0.95 * c_x) / b[1];
        let c_z = (1.0 - c_x * c_x - c_y * c_y).sqrt();
        let c = vec![c_x, c_y, c_z];
        assert!((cosine_similarity(&a, &c) - 0.5).abs() < 1e-4);
        assert!((cosine_similarity(&b, &c) - 0.5).abs() < 1e-4);

        let kept = deduplicate(
            vec![chunk("a", a), chunk("b", b), chunk("c", c)],
            DUPLICATE_THRESHOLD,
        );
        let ids: Vec<&str> = kept.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_dedup_all_duplicates_keeps_first() {
        let v = vec![0.3, 0.4, 0.5];
        let kept = deduplicate(
            vec![chunk("1", v.clone()), chunk("2", v.clone()), chunk("3", v)],
            DUPLICATE_THRESHOLD,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "1");
    }

    #[test]
    fn test_dedup_empty() {
        assert!(deduplicate(Vec::new(), DUPLICATE_THRESHOLD).is_empty());
    }
}
