//! Brute-force cosine ranking over a corpus snapshot.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use ragent_core::error::Result;
use ragent_core::{Chunk, ScoredChunk};

use crate::similarity::cosine;
use crate::store::ChunkStore;

pub struct Retriever {
    store: Arc<ChunkStore>,
}

impl Retriever {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// An empty store is loaded first. `k` is clamped to the corpus size and
    /// `k == 0` returns nothing without embedding the query. A query vector
    /// of the wrong length scores 0 everywhere instead of failing.
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if self.store.is_empty().await {
            self.store.load(cancel).await?;
        }
        let snapshot = self.store.snapshot().await;
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.store.embed_query(query, cancel).await?;
        let results = rank(&snapshot, &query_vec, k);
        debug!(k, corpus = snapshot.len(), returned = results.len(), "retrieved");
        Ok(results)
    }
}

/// Score every chunk against `query_vec` and keep the best `k`.
///
/// Ties keep corpus order.
pub fn rank(chunks: &[Chunk], query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<(usize, f32)> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (i, cosine(query_vec, &c.embedding)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(k.min(chunks.len()))
        .map(|(i, score)| ScoredChunk { chunk: chunks[i].clone(), score })
        .collect()
}
