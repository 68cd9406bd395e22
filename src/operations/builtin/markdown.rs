//! Builtin operations on markdown files: HTML conversion and formatting.

use std::ffi::OsStr;

use anyhow::bail;
use async_trait::async_trait;
use pulldown_cmark::{html, Parser};
use serde_json::{json, Value};
use tracing::info;

use crate::operations::{
    command, display_path, read_text, write_text, Arguments, Operation, OperationContext,
    ParamKind, ParamSpec,
};
use crate::sandbox::AccessIntent;

// ── convert_markdown ─────────────────────────────────────

pub struct ConvertMarkdown;

fn to_html(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new(markdown));
    out
}

#[async_trait]
impl Operation for ConvertMarkdown {
    fn name(&self) -> &str {
        "convert_markdown"
    }

    fn description(&self) -> &str {
        "Convert a CommonMark markdown file to an HTML fragment."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input", ParamKind::Path(AccessIntent::Read), "markdown file"),
            ParamSpec::required(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "file receiving the HTML",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let markdown = read_text(&context.guard, args.path("input")?).await?;
        let rendered = to_html(&markdown);
        let output = write_text(&context.guard, args.path("output")?, &rendered).await?;
        info!("Converted markdown to {} bytes of HTML", rendered.len());

        Ok(json!({
            "bytes": rendered.len(),
            "output": display_path(&context.guard, &output),
        }))
    }
}

// ── format_markdown ──────────────────────────────────────

pub struct FormatMarkdown;

#[async_trait]
impl Operation for FormatMarkdown {
    fn name(&self) -> &str {
        "format_markdown"
    }

    fn description(&self) -> &str {
        "Reformat a markdown file in place with the prettier formatter."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::with_default(
            "input",
            ParamKind::Path(AccessIntent::Write),
            "format.md",
            "markdown file, rewritten in place",
        )]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let raw = args.path("input")?;
        let input = context.guard.validate(raw, AccessIntent::Read)?;
        if !input.is_file() {
            bail!("markdown file not found: {}", display_path(&context.guard, &input));
        }
        let input = context.guard.validate(&input, AccessIntent::Write)?;

        let before = tokio::fs::read(&input).await?;
        command::run(
            &context.tools.prettier,
            [OsStr::new("--write"), input.as_os_str()],
            context.guard.root(),
            context.tool_timeout(),
        )
        .await?;
        let changed = tokio::fs::read(&input).await? != before;

        info!("Formatted {} (changed: {changed})", input.display());
        Ok(json!({
            "changed": changed,
            "output": display_path(&context.guard, &input),
        }))
    }
}
