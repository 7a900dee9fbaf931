use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use ragent_core::{EmbeddingError, EmbeddingProvider};

/// Offline hashed bag-of-words embedder.
///
/// Tokens are lower-cased alphanumeric runs; each token bumps one bucket
/// chosen by xxHash64 and the result is L2-normalized. Identical texts give
/// identical vectors, and texts sharing words score above unrelated ones,
/// which is enough for development corpora and tests.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let weight = 1.0 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += weight;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn provider_id(&self) -> &str {
        "hash"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn tokens_ignore_case_and_punctuation() {
        let e = HashEmbedder::new(64);
        assert_eq!(e.embed_text("Water boils!"), e.embed_text("water, BOILS"));
    }

    #[test]
    fn shared_words_score_higher() {
        let e = HashEmbedder::new(256);
        let q = e.embed_text("boiling point of water");
        let near = e.embed_text("the boiling point of water is 100C");
        let far = e.embed_text("Paris is the capital of France");
        assert!(dot(&q, &near) > dot(&q, &far));
    }

    #[test]
    fn text_without_tokens_is_the_zero_vector() {
        let e = HashEmbedder::new(8);
        assert!(e.embed_text("  ... ").iter().all(|x| *x == 0.0));
    }
}
