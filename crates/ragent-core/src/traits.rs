use async_trait::async_trait;

use crate::error::EmbeddingError;

/// A batch text embedder, local or remote.
///
/// Implementations return exactly one vector per input, in input order,
/// all of length `dim()`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `openai:text-embedding-3-small`).
    fn provider_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}
