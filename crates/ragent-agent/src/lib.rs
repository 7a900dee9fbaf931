//! ragent-agent
//!
//! Conversation layer over the retriever: session memory, tool plugins,
//! prompt assembly and the chat completion client.

pub mod agent;
pub mod llm;
pub mod memory;
pub mod plugins;
pub mod prompt;

pub use agent::{Agent, AgentReply};
pub use llm::{ChatClient, ChatMessage, CompletionProvider};
pub use memory::{Message, Role, SessionMemory};
pub use plugins::{Plugin, PluginManager, PluginResult};
pub use prompt::{build_prompt, PromptParts};
