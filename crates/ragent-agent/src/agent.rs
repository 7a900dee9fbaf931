//! One conversational turn: memory, plugins, retrieval, prompt, completion.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ragent_core::config::Settings;
use ragent_core::ScoredChunk;
use ragent_store::Retriever;

use crate::llm::{ChatMessage, CompletionProvider};
use crate::memory::{Message, Role, SessionMemory};
use crate::plugins::{PluginManager, PluginResult};
use crate::prompt::{build_prompt, PromptParts};

#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub response: String,
    /// Session history as it stood when the prompt was built, including
    /// the current user message.
    pub history: Vec<Message>,
    pub rag_chunks: Vec<ScoredChunk>,
    pub plugin_result: Option<PluginResult>,
    pub prompt: String,
}

pub struct Agent {
    memory: SessionMemory,
    plugins: PluginManager,
    retriever: Retriever,
    llm: Arc<dyn CompletionProvider>,
    system_instructions: String,
    top_k: usize,
}

impl Agent {
    pub fn new(
        retriever: Retriever,
        llm: Arc<dyn CompletionProvider>,
        plugins: PluginManager,
        settings: &Settings,
    ) -> Self {
        Self {
            memory: SessionMemory::new(),
            plugins,
            retriever,
            llm,
            system_instructions: settings.llm.system_instructions.clone(),
            top_k: settings.retrieval.top_k,
        }
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    pub async fn handle_message(
        &self,
        session_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<AgentReply> {
        if session_id.trim().is_empty() || message.trim().is_empty() {
            anyhow::bail!("session_id and message are required");
        }
        self.memory.append(session_id, Message::new(Role::User, message)).await;
        let history = self.memory.history(session_id).await;

        let plugin_result = self.plugins.detect_and_run(message).await;

        let rag_chunks = match self.retriever.retrieve_top_k(message, self.top_k, cancel).await {
            Ok(chunks) => chunks,
            Err(e @ ragent_core::Error::Cancelled) => return Err(e.into()),
            Err(e) => {
                warn!(
                    session = session_id,
                    error = %e,
                    "retrieval failed; answering without context"
                );
                Vec::new()
            }
        };

        let prompt = build_prompt(&PromptParts {
            system_instructions: &self.system_instructions,
            memory: &history,
            rag_chunks: &rag_chunks,
            plugin_result: plugin_result.as_ref(),
            user_message: message,
        });

        let response = match self.llm.complete(&[ChatMessage::user(prompt.clone())]).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session = session_id, error = %e, "completion failed");
                format!("Error calling LLM: {e}")
            }
        };
        self.memory.append(session_id, Message::new(Role::Agent, response.clone())).await;
        info!(
            session = session_id,
            chunks = rag_chunks.len(),
            plugin = plugin_result.as_ref().map(|p| p.plugin.as_str()),
            "turn complete"
        );

        Ok(AgentReply { response, history, rag_chunks, plugin_result, prompt })
    }
}
