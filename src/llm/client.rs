//! `LlmClient` trait, the abstraction over the reasoning oracle.
//!
//! The planner and the operations that need model help depend on this
//! trait only, so tests can substitute a scripted client.

use anyhow::Result;
use async_trait::async_trait;

use super::{LlmResponse, Message};

/// Abstraction over LLM backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a conversation to the LLM and returns the response.
    async fn complete(&self, system_prompt: &str, messages: &[Message]) -> Result<LlmResponse>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in startup logs, e.g. `"openai (gpt-4o-mini)"`.
    fn description(&self) -> String;
}
