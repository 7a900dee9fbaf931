//! Chat completion client (OpenAI-compatible or Azure OpenAI).

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragent_core::config::{LlmSettings, ProviderKind};

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-04-01-preview";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Trimmed, non-empty assistant text.
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

enum Auth {
    Bearer,
    ApiKeyHeader,
}

pub struct ChatClient {
    client: reqwest::Client,
    api_key: Secret<String>,
    url: String,
    auth: Auth,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

pub(crate) fn chat_endpoint(base_url: &str) -> String {
    let normalized = base_url.trim_end_matches('/');
    if normalized.ends_with("/chat/completions") {
        return normalized.to_string();
    }
    let versioned = normalized
        .rsplit('/')
        .next()
        .and_then(|seg| seg.strip_prefix('v'))
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
    if versioned {
        format!("{normalized}/chat/completions")
    } else {
        format!("{normalized}/v1/chat/completions")
    }
}

pub(crate) fn azure_chat_endpoint(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
        endpoint.trim_end_matches('/')
    )
}

impl ChatClient {
    pub fn from_settings(settings: &LlmSettings) -> anyhow::Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("llm.api_key is required"))?;
        let (url, auth) = match settings.provider {
            ProviderKind::OpenAi => (
                chat_endpoint(settings.endpoint.as_deref().unwrap_or(DEFAULT_OPENAI_BASE)),
                Auth::Bearer,
            ),
            ProviderKind::Azure => {
                let endpoint = settings
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("llm.endpoint is required for azure"))?;
                let deployment = settings.deployment.as_deref().unwrap_or(&settings.model);
                let version = settings.api_version.as_deref().unwrap_or(DEFAULT_AZURE_API_VERSION);
                (azure_chat_endpoint(endpoint, deployment, version), Auth::ApiKeyHeader)
            }
            ProviderKind::Hash => anyhow::bail!("llm.provider must be openai or azure"),
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: Secret::new(api_key),
            url,
            auth,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let req = self.client.post(&self.url).json(&body);
        let req = match self.auth {
            Auth::Bearer => req.bearer_auth(self.api_key.expose_secret()),
            Auth::ApiKeyHeader => req.header("api-key", self.api_key.expose_secret()),
        };
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("completion request failed with HTTP {status}: {}", detail.trim());
        }
        let parsed: CompletionResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?;
        debug!(model = %self.model, chars = content.len(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        assert_eq!(
            chat_endpoint("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("http://localhost:11434/v1/"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            azure_chat_endpoint("https://res.openai.azure.com", "gpt", "2024-04-01-preview"),
            concat!(
                "https://res.openai.azure.com/openai/deployments/gpt/chat/completions",
                "?api-version=2024-04-01-preview",
            )
        );
    }
}
