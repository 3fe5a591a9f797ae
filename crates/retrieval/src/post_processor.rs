//! Document post-processors applied after similarity search.

use neurite_core::retrieval::{Document, DocumentPostProcessor};
use tracing::debug;

/// Drop documents scoring below a cutoff.
pub struct ScoreThreshold {
    min_score: f32,
}

impl ScoreThreshold {
    pub fn new(min_score: f32) -> Self {
        Self { min_score }
    }
}

impl DocumentPostProcessor for ScoreThreshold {
    fn process(&self, _question: &str, documents: Vec<Document>) -> Vec<Document> {
        let before = documents.len();
        let kept: Vec<Document> = documents
            .into_iter()
            .filter(|document| document.score >= self.min_score)
            .collect();
        if kept.len() < before {
            debug!(
                dropped = before - kept.len(),
                min_score = self.min_score,
                "Score threshold dropped documents"
            );
        }
        kept
    }
}

/// Keep only the first `k` documents.
pub struct TopK {
    k: usize,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

impl DocumentPostProcessor for TopK {
    fn process(&self, _question: &str, mut documents: Vec<Document>) -> Vec<Document> {
        documents.truncate(self.k);
        documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str, score: f32) -> Document {
        let mut document = Document::new(content);
        document.score = score;
        document
    }

    #[test]
    fn threshold_filters_low_scores() {
        let processor = ScoreThreshold::new(0.5);
        let kept = processor.process(
            "q",
            vec![doc("keep", 0.9), doc("drop", 0.2), doc("edge", 0.5)],
        );

        let contents: Vec<&str> = kept.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["keep", "edge"]);
    }

    #[test]
    fn threshold_keeps_order() {
        let processor = ScoreThreshold::new(0.0);
        let kept = processor.process("q", vec![doc("a", 0.1), doc("b", 0.9)]);
        assert_eq!(kept[0].content, "a");
    }

    #[test]
    fn top_k_truncates() {
        let processor = TopK::new(2);
        let kept = processor.process("q", vec![doc("a", 0.0), doc("b", 0.0), doc("c", 0.0)]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].content, "b");
    }

    #[test]
    fn top_k_larger_than_set_is_identity() {
        let processor = TopK::new(10);
        let kept = processor.process("q", vec![doc("a", 0.0)]);
        assert_eq!(kept.len(), 1);
    }
}
