//! Instruction planner.
//!
//! Turns a free-form instruction into an [`OperationPlan`] by asking the
//! oracle once. The oracle only ever *names* an operation; its output is
//! parsed as data and never executed.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::llm::{LlmClient, Message};
use crate::operations::OperationRegistry;

/// Operation name plus raw, not yet validated arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationPlan {
    pub operation: String,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    #[error("planner unavailable: {0}")]
    Unavailable(String),
    #[error("planner timed out after {0:?}")]
    Timeout(Duration),
    #[error("planner returned a malformed plan: {0}")]
    Malformed(String),
}

pub struct InstructionPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    timeout: Duration,
}

impl InstructionPlanner {
    /// Builds the planner prompt from the (already complete) registry.
    pub fn new(llm: Arc<dyn LlmClient>, registry: &OperationRegistry, timeout: Duration) -> Self {
        Self {
            llm,
            system_prompt: build_system_prompt(registry),
            timeout,
        }
    }

    /// Single attempt, no retries.
    pub async fn plan(&self, instruction: &str) -> Result<OperationPlan, PlannerError> {
        let messages = [Message::user(instruction)];
        let response = tokio::time::timeout(
            self.timeout,
            self.llm.complete(&self.system_prompt, &messages),
        )
        .await
        .map_err(|_| PlannerError::Timeout(self.timeout))?
        .map_err(|e| PlannerError::Unavailable(format!("{e:#}")))?;

        debug!(
            "Planner raw response ({} in / {} out tokens): {}",
            response.input_tokens, response.output_tokens, response.text
        );

        let plan = parse_plan(&response.text)?;
        info!(
            "Planned operation `{}` with {} argument(s)",
            plan.operation,
            plan.arguments.len()
        );
        Ok(plan)
    }
}

fn build_system_prompt(registry: &OperationRegistry) -> String {
    format!(
        "You translate a task description into exactly one call of a fixed operation.\n\
         \n\
         Available operations:\n\
         {catalog}\n\
         All paths are relative to the workspace root. Omit optional arguments \
         unless the task asks for a different value.\n\
         \n\
         Respond with a single JSON object and nothing else:\n\
         {{\"operation\": \"<operation name>\", \"arguments\": {{\"<parameter>\": <value>}}}}\n\
         If no listed operation fits the task, respond with \
         {{\"operation\": \"unsupported\", \"arguments\": {{}}}}.",
        catalog = registry.catalog()
    )
}

/// Parses the oracle's text into a plan.
///
/// Accepts a bare JSON object, or one embedded in surrounding prose or a
/// markdown code fence.
pub fn parse_plan(text: &str) -> Result<OperationPlan, PlannerError> {
    let value = first_json_value(text)?;

    let operation = value
        .get("operation")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PlannerError::Malformed("missing `operation` name".to_string()))?
        .to_string();

    let arguments = match value.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(PlannerError::Malformed(
                "`arguments` must be an object".to_string(),
            ))
        }
    };

    Ok(OperationPlan {
        operation,
        arguments,
    })
}

/// Reads one JSON value starting at the first `{`, ignoring whatever follows.
fn first_json_value(text: &str) -> Result<Value, PlannerError> {
    let start = text
        .find('{')
        .ok_or_else(|| PlannerError::Malformed("no JSON object in response".to_string()))?;
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| PlannerError::Malformed("no JSON object in response".to_string()))?
        .map_err(|e| PlannerError::Malformed(e.to_string()))
}
