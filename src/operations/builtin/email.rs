//! Builtin operation: extract the sender address of an email with the LLM.

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::llm::Message;
use crate::operations::{
    display_path, read_text, write_text, Arguments, Operation, OperationContext, ParamKind,
    ParamSpec,
};
use crate::sandbox::AccessIntent;

const EXTRACT_PROMPT: &str = "You extract the sender's email address from an email message. \
     Reply with the address only, no other text.";

pub struct ExtractEmailSender;

/// Picks the first token that looks like an address out of the model's
/// reply, tolerating quotes, angle brackets and trailing punctuation.
fn find_address(reply: &str) -> Option<String> {
    reply
        .split(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '\'' | ',' | ';'))
        .map(|token| token.trim_matches(|c: char| matches!(c, '.' | ':' | '(' | ')' | '`')))
        .find(|token| {
            token
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
        })
        .map(str::to_string)
}

#[async_trait]
impl Operation for ExtractEmailSender {
    fn name(&self) -> &str {
        "extract_email_sender"
    }

    fn description(&self) -> &str {
        "Extract the sender's email address from a plain-text email and write it to \
         an output file."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::with_default(
                "input",
                ParamKind::Path(AccessIntent::Read),
                "email.txt",
                "plain-text email message",
            ),
            ParamSpec::with_default(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "email-sender.txt",
                "file receiving the address",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let email = read_text(&context.guard, args.path("input")?).await?;

        let response = context
            .llm
            .complete(EXTRACT_PROMPT, &[Message::user(email)])
            .await?;
        let Some(address) = find_address(&response.text) else {
            bail!("no email address in model reply: {}", response.text.trim());
        };

        let output = write_text(&context.guard, args.path("output")?, &address).await?;
        info!("Extracted sender address");

        Ok(json!({
            "sender": address,
            "output": display_path(&context.guard, &output),
        }))
    }
}
