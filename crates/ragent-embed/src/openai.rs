//! OpenAI-compatible and Azure OpenAI embeddings over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragent_core::config::{EmbeddingSettings, ProviderKind};
use ragent_core::{EmbeddingError, EmbeddingProvider};

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-04-01-preview";

#[derive(Debug, Clone)]
enum Target {
    OpenAi { base_url: String },
    Azure { endpoint: String, deployment: String, api_version: String },
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: Secret<String>,
    target: Target,
    model: String,
    dim: usize,
    timeout: Duration,
    provider_id: String,
}

fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

pub(crate) fn embeddings_endpoint(base_url: &str) -> String {
    let normalized = normalize_base_url(base_url);
    if normalized.ends_with("/embeddings") {
        return normalized;
    }
    if has_version_suffix(&normalized) {
        return format!("{normalized}/embeddings");
    }
    format!("{normalized}/v1/embeddings")
}

pub(crate) fn azure_endpoint(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{deployment}/embeddings?api-version={api_version}",
        normalize_base_url(endpoint)
    )
}

impl OpenAiEmbedder {
    pub fn from_settings(settings: &EmbeddingSettings) -> anyhow::Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "embedding.api_key is required for the {:?} provider",
                    settings.provider
                )
            })?;
        let target = match settings.provider {
            ProviderKind::Azure => Target::Azure {
                endpoint: settings
                    .endpoint
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("embedding.endpoint is required for azure"))?,
                deployment: settings
                    .deployment
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("embedding.deployment is required for azure"))?,
                api_version: settings
                    .api_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            },
            _ => Target::OpenAi {
                base_url: normalize_base_url(
                    settings.endpoint.as_deref().unwrap_or(DEFAULT_OPENAI_BASE),
                ),
            },
        };
        let client = reqwest::Client::builder().timeout(settings.timeout()).build()?;
        let provider_id = match &target {
            Target::OpenAi { .. } => format!("openai:{}", settings.model),
            Target::Azure { deployment, .. } => format!("azure:{deployment}"),
        };
        Ok(Self {
            client,
            api_key: Secret::new(api_key),
            target,
            model: settings.model.clone(),
            dim: settings.dim,
            timeout: settings.timeout(),
            provider_id,
        })
    }

    fn request(&self) -> reqwest::RequestBuilder {
        match &self.target {
            Target::OpenAi { base_url } => self
                .client
                .post(embeddings_endpoint(base_url))
                .bearer_auth(self.api_key.expose_secret()),
            Target::Azure { endpoint, deployment, api_version } => self
                .client
                .post(azure_endpoint(endpoint, deployment, api_version))
                .header("api-key", self.api_key.expose_secret()),
        }
    }

    fn transport_error(&self, e: &reqwest::Error) -> EmbeddingError {
        if e.is_timeout() {
            EmbeddingError::Timeout(self.timeout)
        } else {
            EmbeddingError::Unreachable(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Order items by `index` when every item carries one, then check shape.
fn into_vectors(
    mut data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if data.len() != expected {
        return Err(EmbeddingError::MalformedResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
    if let Some(first) = vectors.first() {
        if first.is_empty() {
            return Err(EmbeddingError::MalformedResponse("empty embedding vector".into()));
        }
        if vectors.iter().any(|v| v.len() != first.len()) {
            return Err(EmbeddingError::MalformedResponse(
                "embedding vectors differ in length".into(),
            ));
        }
    }
    Ok(vectors)
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest { model: &self.model, input: texts };
        let resp = self
            .request()
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Unreachable(format!("HTTP {status}: {}", detail.trim())));
        }
        let bytes = resp.bytes().await.map_err(|e| self.transport_error(&e))?;
        let parsed: EmbeddingResponse = serde_json::from_slice(&bytes)
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;
        let vectors = into_vectors(parsed.data, texts.len())?;
        debug!(provider = %self.provider_id, count = vectors.len(), "embedded batch");
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_from_host_base_uses_v1_embeddings() {
        assert_eq!(
            embeddings_endpoint("https://api.openai.com/"),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[test]
    fn endpoint_from_versioned_base_appends_embeddings_once() {
        assert_eq!(
            embeddings_endpoint("http://localhost:8080/v1"),
            "http://localhost:8080/v1/embeddings"
        );
        assert_eq!(
            embeddings_endpoint("https://api.example.com/v1/embeddings"),
            "https://api.example.com/v1/embeddings"
        );
    }

    #[test]
    fn azure_endpoint_carries_deployment_and_version() {
        assert_eq!(
            azure_endpoint("https://res.openai.azure.com/", "emb", "2024-02-01"),
            "https://res.openai.azure.com/openai/deployments/emb/embeddings?api-version=2024-02-01"
        );
    }

    #[test]
    fn response_items_are_reordered_by_index() {
        let data = vec![
            EmbeddingData { index: Some(1), embedding: vec![0.0, 1.0] },
            EmbeddingData { index: Some(0), embedding: vec![1.0, 0.0] },
        ];
        let v = into_vectors(data, 2).expect("vectors");
        assert_eq!(v, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn ragged_vectors_are_malformed() {
        let data = vec![
            EmbeddingData { index: None, embedding: vec![1.0] },
            EmbeddingData { index: None, embedding: vec![1.0, 2.0] },
        ];
        assert!(matches!(into_vectors(data, 2), Err(EmbeddingError::MalformedResponse(_))));
    }
}
