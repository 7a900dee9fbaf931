use std::sync::Arc;

use tracing::info;

use ragent_core::config::{EmbeddingSettings, ProviderKind};
use ragent_core::EmbeddingProvider;

pub mod hash;
pub mod openai;

pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;

/// `APP_USE_FAKE_EMBEDDINGS=1|true` forces the offline hash embedder.
pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn provider_from_settings(
    settings: &EmbeddingSettings,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    if use_fake_embeddings() || settings.provider == ProviderKind::Hash {
        info!(dim = settings.dim, "using hash embeddings");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let provider = OpenAiEmbedder::from_settings(settings)?;
    info!(provider = provider.provider_id(), "using remote embeddings");
    Ok(Arc::new(provider))
}
