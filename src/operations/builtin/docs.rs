//! Builtin operation: index markdown documents by their first H1 heading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::operations::{
    display_path, read_text, write_text, Arguments, Operation, OperationContext, ParamKind,
    ParamSpec,
};
use crate::sandbox::AccessIntent;

pub struct IndexDocs;

/// All `.md` files below `root`, recursively, sorted by path.
/// Symlinked entries are not followed.
async fn markdown_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("cannot list {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && path.extension().and_then(|e| e.to_str()) == Some("md")
            {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Text of the first `# ` heading, if any.
fn first_heading(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
}

#[async_trait]
impl Operation for IndexDocs {
    fn name(&self) -> &str {
        "index_docs"
    }

    fn description(&self) -> &str {
        "Build a JSON index mapping every markdown file under a directory (relative \
         path) to the text of its first '# ' heading."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::with_default(
                "docs_dir",
                ParamKind::Path(AccessIntent::Read),
                "docs",
                "directory of markdown files",
            ),
            ParamSpec::with_default(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "docs/index.json",
                "file receiving the JSON index",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let docs_dir = context
            .guard
            .validate(args.path("docs_dir")?, AccessIntent::Read)?;

        let mut index = BTreeMap::new();
        for file in markdown_files(&docs_dir).await? {
            let content = read_text(&context.guard, &file).await?;
            if let Some(title) = first_heading(&content) {
                let key = file
                    .strip_prefix(&docs_dir)
                    .unwrap_or(&file)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                index.insert(key, title);
            }
        }

        let rendered = serde_json::to_string_pretty(&index)?;
        let output = write_text(&context.guard, args.path("output")?, &rendered).await?;
        info!("Indexed {} markdown documents", index.len());

        Ok(json!({
            "documents": index.len(),
            "output": display_path(&context.guard, &output),
        }))
    }
}
