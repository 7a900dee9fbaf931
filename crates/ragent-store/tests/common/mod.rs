#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ragent_core::{Chunker, EmbeddingError, EmbeddingProvider, Fragment, SourceMeta};
use ragent_store::ChunkStore;

const KEYWORDS: [&[&str]; 3] =
    [&["water", "boil"], &["paris", "france", "capital"], &["rust", "cargo", "crate"]];

/// Orthogonal topic vectors: one axis per keyword group plus a fallback axis.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v = vec![0f32; KEYWORDS.len() + 1];
        for (axis, words) in KEYWORDS.iter().enumerate() {
            if words.iter().any(|w| lower.contains(w)) {
                v[axis] = 1.0;
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[KEYWORDS.len()] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn provider_id(&self) -> &str {
        "keyword"
    }

    fn dim(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// One-dimensional "text length" embedding.
pub struct LengthEmbedder;

#[async_trait]
impl EmbeddingProvider for LengthEmbedder {
    fn provider_id(&self) -> &str {
        "length"
    }

    fn dim(&self) -> usize {
        1
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| vec![t.chars().count() as f32]).collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn provider_id(&self) -> &str {
        "failing"
    }

    fn dim(&self) -> usize {
        4
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Unreachable("connection refused".into()))
    }
}

/// Returns one vector fewer than asked for.
pub struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    fn provider_id(&self) -> &str {
        "short"
    }

    fn dim(&self) -> usize {
        4
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
    }
}

/// Returns vectors of a fixed, configurable length.
pub struct FixedDimEmbedder(pub usize);

#[async_trait]
impl EmbeddingProvider for FixedDimEmbedder {
    fn provider_id(&self) -> &str {
        "fixed"
    }

    fn dim(&self) -> usize {
        self.0
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![1.0; self.0]).collect())
    }
}

/// Never answers within any reasonable timeout.
pub struct StalledEmbedder;

#[async_trait]
impl EmbeddingProvider for StalledEmbedder {
    fn provider_id(&self) -> &str {
        "stalled"
    }

    fn dim(&self) -> usize {
        4
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(texts.iter().map(|_| vec![1.0; 4]).collect())
    }
}

/// Keyword vectors, but any batch mentioning `marker` takes `delay` first.
pub struct SlowEmbedder {
    marker: &'static str,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(marker: &'static str, delay: Duration) -> Self {
        Self { marker, delay }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn provider_id(&self) -> &str {
        "slow"
    }

    fn dim(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.contains(self.marker)) {
            tokio::time::sleep(self.delay).await;
        }
        Ok(texts.iter().map(|t| KeywordEmbedder::vector(t)).collect())
    }
}

/// Keyword vectors for documents; queries mentioning "hollow" get an empty
/// vector and queries mentioning "narrow" a one-dimensional one.
pub struct OddQueryEmbedder;

#[async_trait]
impl EmbeddingProvider for OddQueryEmbedder {
    fn provider_id(&self) -> &str {
        "odd-query"
    }

    fn dim(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|t| {
                if t.contains("hollow") {
                    Vec::new()
                } else if t.contains("narrow") {
                    vec![1.0]
                } else {
                    KeywordEmbedder::vector(t)
                }
            })
            .collect())
    }
}

pub fn store_in(dir: &Path, embedder: Arc<dyn EmbeddingProvider>) -> ChunkStore {
    store_with_timeout(dir, embedder, Duration::from_secs(5))
}

pub fn store_with_timeout(
    dir: &Path,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
) -> ChunkStore {
    ChunkStore::new(
        dir.join("corpus.json"),
        dir.join("docs"),
        Chunker::new(200, 20).expect("chunker"),
        embedder,
        timeout,
    )
}

pub fn fragment(source: &str, content: &str) -> Vec<Fragment> {
    vec![Fragment { content: content.to_string(), metadata: SourceMeta::new(source) }]
}
