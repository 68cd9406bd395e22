pub mod builtin;
pub mod command;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::ToolsConfig;
use crate::llm::LlmClient;
use crate::sandbox::{AccessIntent, PathGuard};

pub use registry::OperationRegistry;

/// Shared, read-only state handed to every operation.
pub struct OperationContext {
    pub guard: PathGuard,
    pub llm: Arc<dyn LlmClient>,
    pub tools: ToolsConfig,
    pub http: reqwest::Client,
}

impl OperationContext {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_secs)
    }
}

/// Declared type of one operation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    /// An absolute http(s) URL.
    Url,
    /// A workspace path, guarded for the given intent before the handler runs.
    Path(AccessIntent),
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::String => f.write_str("string"),
            ParamKind::Integer => f.write_str("integer"),
            ParamKind::Url => f.write_str("url"),
            ParamKind::Path(intent) => write!(f, "path ({intent})"),
        }
    }
}

/// One entry of an operation's argument schema.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            description,
        }
    }

    pub fn with_default(
        name: &'static str,
        kind: ParamKind,
        default: impl Into<Value>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default.into()),
            description,
        }
    }
}

/// A validated argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Integer(i64),
    Url(url::Url),
    /// Normalized absolute path, already checked by the guard.
    Path(PathBuf),
}

/// Typed argument record produced by the dispatcher from an operation plan.
///
/// Every declared parameter that was supplied (or has a default) is present
/// with the declared type; nothing else is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, ArgValue>,
}

impl Arguments {
    pub fn new(values: BTreeMap<String, ArgValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(s)) => Ok(s),
            _ => Err(missing(name, "string")),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64> {
        match self.values.get(name) {
            Some(ArgValue::Integer(n)) => Ok(*n),
            _ => Err(missing(name, "integer")),
        }
    }

    pub fn url(&self, name: &str) -> Result<&url::Url> {
        match self.values.get(name) {
            Some(ArgValue::Url(u)) => Ok(u),
            _ => Err(missing(name, "url")),
        }
    }

    pub fn path(&self, name: &str) -> Result<&Path> {
        self.opt_path(name).ok_or_else(|| missing(name, "path"))
    }

    pub fn opt_path(&self, name: &str) -> Option<&Path> {
        match self.values.get(name) {
            Some(ArgValue::Path(p)) => Some(p),
            _ => None,
        }
    }
}

fn missing(name: &str, kind: &str) -> anyhow::Error {
    anyhow!("Missing {kind} argument: {name}")
}

/// A single registered operation.
///
/// Implementations perform exactly one transformation. They must pass every
/// path they open through `context.guard` right before opening it, including
/// paths that already arrived validated in `args`.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Unique registry key, lowercase with underscores (e.g. "sort_contacts").
    fn name(&self) -> &str;

    /// One-line description shown to the planner.
    fn description(&self) -> &str;

    /// Ordered argument schema.
    fn parameters(&self) -> Vec<ParamSpec>;

    /// Runs the operation and returns a JSON payload describing the outcome.
    async fn execute(&self, args: Arguments, context: &OperationContext) -> Result<Value>;
}

// ── Guarded file helpers ─────────────────────────────────

/// Reads a UTF-8 workspace file after checking it for read access.
pub async fn read_text(guard: &PathGuard, path: &Path) -> Result<String> {
    let path = guard.validate(path, AccessIntent::Read)?;
    tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))
}

/// Writes a workspace file after checking it for write access, creating
/// missing parent directories.
pub async fn write_text(guard: &PathGuard, path: &Path, contents: &str) -> Result<PathBuf> {
    let path = guard.validate(path, AccessIntent::Write)?;
    ensure_parent(&path).await?;
    tokio::fs::write(&path, contents)
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

/// Creates the parent directory of an already-validated path.
pub async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    Ok(())
}

/// Workspace-relative display form of a guarded path, used in payloads.
pub fn display_path(guard: &PathGuard, path: &Path) -> String {
    path.strip_prefix(guard.root())
        .unwrap_or(path)
        .display()
        .to_string()
}
