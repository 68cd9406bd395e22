//! Dispatcher: the core of taskgate.
//!
//! Takes an instruction, plans it, resolves the named operation, validates
//! its arguments against the declared schema (guarding every path), and
//! runs the handler in its own task. Whatever happens, the caller gets an
//! [`OperationResult`]; a failing or panicking handler never escapes this
//! boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::planner::{InstructionPlanner, OperationPlan, PlannerError};
use crate::operations::registry::UnknownOperation;
use crate::operations::{
    ArgValue, Arguments, Operation, OperationContext, OperationRegistry, ParamKind, ParamSpec,
};
use crate::sandbox::{AccessDenied, PathGuard};

/// Error category reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AccessDenied,
    UnknownOperation,
    InvalidArguments,
    PlannerError,
    HandlerFailure,
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    UnknownOperation(#[from] UnknownOperation),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
    #[error("operation failed: {0}")]
    HandlerFailure(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Planner(_) => ErrorKind::PlannerError,
            DispatchError::UnknownOperation(_) => ErrorKind::UnknownOperation,
            DispatchError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            DispatchError::AccessDenied(_) => ErrorKind::AccessDenied,
            DispatchError::HandlerFailure(_) => ErrorKind::HandlerFailure,
        }
    }

    /// Maps a handler's error, keeping guard denials distinguishable.
    fn from_handler(err: anyhow::Error) -> Self {
        match err.downcast_ref::<AccessDenied>() {
            Some(denied) => DispatchError::AccessDenied(denied.clone()),
            None => DispatchError::HandlerFailure(format!("{err:#}")),
        }
    }
}

/// Outcome of one instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult {
    Success { operation: String, detail: Value },
    Error { kind: ErrorKind, detail: String },
}

impl OperationResult {
    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        OperationResult::Error {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OperationResult::Success { .. } => None,
            OperationResult::Error { kind, .. } => Some(*kind),
        }
    }
}

impl From<DispatchError> for OperationResult {
    fn from(err: DispatchError) -> Self {
        OperationResult::error(err.kind(), err.to_string())
    }
}

pub struct Dispatcher {
    planner: InstructionPlanner,
    registry: Arc<OperationRegistry>,
    context: Arc<OperationContext>,
}

impl Dispatcher {
    pub fn new(
        planner: InstructionPlanner,
        registry: Arc<OperationRegistry>,
        context: Arc<OperationContext>,
    ) -> Self {
        Self {
            planner,
            registry,
            context,
        }
    }

    pub fn guard(&self) -> &PathGuard {
        &self.context.guard
    }

    /// Plans and runs one instruction. Never fails; errors come back as
    /// `OperationResult::Error`.
    pub async fn execute(&self, instruction: &str) -> OperationResult {
        let span = info_span!("task", id = %Uuid::new_v4());
        async {
            info!("Received instruction: {instruction}");
            match self.planner.plan(instruction).await {
                Ok(plan) => self.execute_plan(plan).await,
                Err(e) => {
                    error!("Planning failed: {e}");
                    DispatchError::from(e).into()
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs an already-built plan.
    pub async fn execute_plan(&self, plan: OperationPlan) -> OperationResult {
        match self.run_plan(plan).await {
            Ok((operation, detail)) => {
                info!("Operation `{operation}` succeeded");
                OperationResult::Success { operation, detail }
            }
            Err(e) => {
                error!("Operation failed ({:?}): {e}", e.kind());
                e.into()
            }
        }
    }

    async fn run_plan(&self, plan: OperationPlan) -> Result<(String, Value), DispatchError> {
        let operation = self.registry.lookup(&plan.operation)?;
        let args = bind_arguments(operation.as_ref(), &plan.arguments, &self.context.guard)?;

        info!(
            "Executing `{}` with {} argument(s)",
            plan.operation,
            args.len()
        );

        // Own task per handler: a panic surfaces as a JoinError here
        // instead of unwinding through the caller.
        let context = Arc::clone(&self.context);
        let handle = tokio::spawn(async move { operation.execute(args, &context).await });

        match handle.await {
            Ok(Ok(detail)) => Ok((plan.operation, detail)),
            Ok(Err(e)) => Err(DispatchError::from_handler(e)),
            Err(join) if join.is_panic() => Err(DispatchError::HandlerFailure(format!(
                "operation `{}` panicked",
                plan.operation
            ))),
            Err(join) => Err(DispatchError::HandlerFailure(join.to_string())),
        }
    }
}

/// Validates raw plan arguments against an operation's schema and converts
/// them into a typed [`Arguments`] record.
///
/// Rejects unknown names, missing required values and type mismatches.
/// Path values go through the guard with the intent their schema declares.
pub fn bind_arguments(
    operation: &dyn Operation,
    raw: &Map<String, Value>,
    guard: &PathGuard,
) -> Result<Arguments, DispatchError> {
    let specs = operation.parameters();

    if let Some(unknown) = raw.keys().find(|key| !specs.iter().any(|s| s.name == key.as_str())) {
        return Err(DispatchError::InvalidArguments(format!(
            "unknown argument `{unknown}` for `{}`",
            operation.name()
        )));
    }

    let mut values = BTreeMap::new();
    for spec in &specs {
        let supplied = raw.get(spec.name).filter(|v| !v.is_null());
        let value = match supplied.or(spec.default.as_ref()) {
            Some(value) => value,
            None if spec.required => {
                return Err(DispatchError::InvalidArguments(format!(
                    "missing required argument `{}`",
                    spec.name
                )))
            }
            None => continue,
        };
        values.insert(spec.name.to_string(), convert(spec, value, guard)?);
    }

    Ok(Arguments::new(values))
}

fn convert(spec: &ParamSpec, value: &Value, guard: &PathGuard) -> Result<ArgValue, DispatchError> {
    let mismatch = || {
        DispatchError::InvalidArguments(format!(
            "argument `{}` must be {}, got {value}",
            spec.name, spec.kind
        ))
    };

    match spec.kind {
        ParamKind::String => value
            .as_str()
            .map(|s| ArgValue::Text(s.to_string()))
            .ok_or_else(mismatch),
        ParamKind::Integer => value.as_i64().map(ArgValue::Integer).ok_or_else(mismatch),
        ParamKind::Url => {
            let raw = value.as_str().ok_or_else(mismatch)?;
            let url = url::Url::parse(raw).map_err(|_| mismatch())?;
            match url.scheme() {
                "http" | "https" => Ok(ArgValue::Url(url)),
                _ => Err(mismatch()),
            }
        }
        ParamKind::Path(intent) => {
            let raw = value
                .as_str()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(mismatch)?;
            Ok(ArgValue::Path(guard.validate(raw, intent)?))
        }
    }
}
