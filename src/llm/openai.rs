//! OpenAI-compatible chat completions provider.
//!
//! Calls `POST {endpoint}` with a bearer credential. Works against the
//! OpenAI API itself and against proxies that mirror its wire format.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::LlmClient;
use crate::config::LlmConfig;

/// Client for an OpenAI-compatible chat completions endpoint
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// LLM response with metadata
#[derive(Debug)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn build_request<'a>(&'a self, system_prompt: &str, messages: &[Message]) -> ChatRequest<'a> {
        let mut all = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            all.push(Message {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            });
        }
        all.extend_from_slice(messages);

        ChatRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens_per_request,
            temperature: 0.0,
            messages: all,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system_prompt: &str, messages: &[Message]) -> Result<LlmResponse> {
        let request = self.build_request(system_prompt, messages);

        debug!(
            "Calling chat completions ({}) with {} messages",
            self.config.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({status}): {body}");
        }

        let resp: ChatResponse = response.json().await?;
        parse_response(resp)
    }

    fn description(&self) -> String {
        format!("{} ({})", self.config.provider, self.config.model)
    }
}

fn parse_response(resp: ChatResponse) -> Result<LlmResponse> {
    let text = resp
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow::anyhow!("LLM response contained no message content"))?;

    let (input_tokens, output_tokens) = resp
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));

    info!("LLM response: {input_tokens} in / {output_tokens} out tokens");

    Ok(LlmResponse {
        text,
        input_tokens,
        output_tokens,
    })
}
