//! Vector similarity utilities.

use neurite_core::retrieval::Document;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 =
/// opposite. Returns 0.0 on length mismatch, empty input, or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank documents by cosine similarity to a query embedding.
///
/// Returns the top `k` embedded documents, best first, with `score` set.
/// Documents without embeddings are unreachable.
pub fn rank_documents(documents: &[Document], embedding: &[f32], k: usize) -> Vec<Document> {
    let mut scored: Vec<Document> = documents
        .iter()
        .filter_map(|document| {
            let doc_embedding = document.embedding.as_ref()?;
            let mut hit = document.clone();
            hit.score = cosine_similarity(doc_embedding, embedding);
            Some(hit)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}
