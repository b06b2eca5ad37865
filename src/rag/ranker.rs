use std::cmp::Ordering;

pub trait SimilarityRanker: Send + Sync {
    /// Indices of the best `top_k` candidates with their scores, best first.
    fn rank(&self, query: &[f32], candidates: &[&[f32]], top_k: usize) -> Vec<(usize, f64)>;
}

/// Exhaustive cosine scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearCosineRanker;

impl SimilarityRanker for LinearCosineRanker {
    fn rank(&self, query: &[f32], candidates: &[&[f32]], top_k: usize) -> Vec<(usize, f64)> {
        let mut scores: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
            .collect();

        // sort_by is stable: equal scores keep index order
        scores.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));
        scores.truncate(top_k);
        scores
    }
}

/// Cosine similarity in [-1, 1]. Degenerate inputs (empty, zero magnitude,
/// length mismatch) score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    let score = dot / denom;
    if score.is_nan() {
        0.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}
