//! Scripted `LlmClient` for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{LlmClient, LlmResponse, Message};

/// One canned reply.
pub enum Reply {
    Text(String),
    Fail(String),
    /// Sleeps before answering, to exercise timeouts.
    Slow(Duration, String),
}

/// Replays canned replies in order and records every prompt it receives.
/// Once the script runs out, the last reply is repeated.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Reply>>,
    pub prompts: Mutex<Vec<(String, Vec<Message>)>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn text(reply: &str) -> Self {
        Self::new(vec![Reply::Text(reply.to_string())])
    }

    pub fn failing(error: &str) -> Self {
        Self::new(vec![Reply::Fail(error.to_string())])
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, system_prompt: &str, messages: &[Message]) -> Result<LlmResponse> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), messages.to_vec()));

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().map(|r| match r {
                    Reply::Text(t) => Reply::Text(t.clone()),
                    Reply::Fail(e) => Reply::Fail(e.clone()),
                    Reply::Slow(d, t) => Reply::Slow(*d, t.clone()),
                })
            }
        };

        let text = match reply {
            Some(Reply::Text(text)) => text,
            Some(Reply::Fail(error)) => anyhow::bail!("{error}"),
            Some(Reply::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                text
            }
            None => anyhow::bail!("scripted LLM has no replies"),
        };

        Ok(LlmResponse {
            text,
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    fn description(&self) -> String {
        "scripted (test)".to_string()
    }
}
