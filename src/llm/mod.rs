pub mod client;
pub mod openai;
#[cfg(test)]
pub mod scripted;

pub use client::LlmClient;
pub use openai::{LlmResponse, Message, OpenAiClient};
