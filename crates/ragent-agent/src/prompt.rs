//! Final LLM input assembly.

use std::fmt::Write;

use ragent_core::ScoredChunk;

use crate::memory::Message;
use crate::plugins::PluginResult;

pub struct PromptParts<'a> {
    pub system_instructions: &'a str,
    pub memory: &'a [Message],
    pub rag_chunks: &'a [ScoredChunk],
    pub plugin_result: Option<&'a PluginResult>,
    pub user_message: &'a str,
}

/// Sections appear only when they have content, in this order: plugin
/// output, retrieved context, conversation history, then the user turn.
pub fn build_prompt(parts: &PromptParts<'_>) -> String {
    let mut prompt = format!("{}\n", parts.system_instructions);
    if let Some(result) = parts.plugin_result {
        let _ = write!(prompt, "\nPlugin Output ({}):\n{}\n", result.plugin, result.output);
    }
    if !parts.rag_chunks.is_empty() {
        prompt.push_str("\nRelevant Context:\n");
        for (i, scored) in parts.rag_chunks.iter().enumerate() {
            let _ = write!(prompt, "Chunk {}:\n{}\n", i + 1, scored.chunk.text);
        }
    }
    if !parts.memory.is_empty() {
        prompt.push_str("\nConversation History:\n");
        for msg in parts.memory {
            let _ = writeln!(prompt, "[{}] {}", msg.role, msg.content);
        }
    }
    let _ = write!(prompt, "\n[User] {}\n[Agent]", parts.user_message);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;
    use ragent_core::{Chunk, SourceMeta};

    fn scored(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: "a#0".into(),
                text: text.into(),
                metadata: SourceMeta::new("a"),
                embedding: vec![1.0],
            },
            score: 0.9,
        }
    }

    #[test]
    fn minimal_prompt() {
        let prompt = build_prompt(&PromptParts {
            system_instructions: "Be helpful.",
            memory: &[],
            rag_chunks: &[],
            plugin_result: None,
            user_message: "hi",
        });
        assert_eq!(prompt, "Be helpful.\n\n[User] hi\n[Agent]");
    }

    #[test]
    fn full_prompt_layout() {
        let plugin = PluginResult { plugin: "MathPlugin".into(), output: "Result: 4".into() };
        let memory = vec![Message::new(Role::User, "math: 2+2")];
        let chunks = vec![scored("first"), scored("second")];
        let prompt = build_prompt(&PromptParts {
            system_instructions: "Sys",
            memory: &memory,
            rag_chunks: &chunks,
            plugin_result: Some(&plugin),
            user_message: "math: 2+2",
        });
        assert_eq!(
            prompt,
            concat!(
                "Sys\n\n",
                "Plugin Output (MathPlugin):\nResult: 4\n\n",
                "Relevant Context:\nChunk 1:\nfirst\nChunk 2:\nsecond\n\n",
                "Conversation History:\n[user] math: 2+2\n\n",
                "[User] math: 2+2\n[Agent]",
            )
        );
    }
}
