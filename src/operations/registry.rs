use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;

use super::{Operation, ParamSpec};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation `{0}`")]
pub struct UnknownOperation(pub String);

/// Operation registry.
///
/// Filled once at startup, then shared read-only behind an `Arc`.
/// Iteration order is registration order.
pub struct OperationRegistry {
    operations: Vec<Arc<dyn Operation>>,
    by_name: HashMap<String, usize>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Adds an operation. A name that is already taken is a configuration
    /// error and must abort startup.
    pub fn register(&mut self, operation: Arc<dyn Operation>) -> anyhow::Result<()> {
        let name = operation.name().to_string();
        if self.by_name.contains_key(&name) {
            bail!("operation `{name}` is registered twice");
        }
        self.by_name.insert(name, self.operations.len());
        self.operations.push(operation);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Operation>, UnknownOperation> {
        self.by_name
            .get(name)
            .map(|&i| Arc::clone(&self.operations[i]))
            .ok_or_else(|| UnknownOperation(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    /// Plain-text listing of every operation and its parameters, as shown
    /// to the planner.
    pub fn catalog(&self) -> String {
        let mut out = String::new();
        for op in &self.operations {
            out.push_str(&format!("- {}: {}\n", op.name(), op.description()));
            for param in op.parameters() {
                out.push_str(&format!("    - {}\n", describe_param(&param)));
            }
        }
        out
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_param(param: &ParamSpec) -> String {
    let presence = match (&param.default, param.required) {
        (Some(default), _) => format!("optional, default {default}"),
        (None, true) => "required".to_string(),
        (None, false) => "optional".to_string(),
    };
    format!(
        "{} ({}, {presence}): {}",
        param.name, param.kind, param.description
    )
}
