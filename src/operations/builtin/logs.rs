//! Builtin operation: collect the first line of the most recent log files.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::operations::{
    display_path, write_text, Arguments, Operation, OperationContext, ParamKind, ParamSpec,
};
use crate::sandbox::{AccessIntent, PathGuard};

pub struct RecentLogs;

/// `.log` files directly inside `dir`, newest first. Equal timestamps are
/// ordered by file name so repeated runs agree.
async fn newest_logs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot list {}", dir.display()))?;

    let mut logs: Vec<(SystemTime, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let meta = entry.metadata().await?;
        if meta.is_file() {
            logs.push((meta.modified()?, path));
        }
    }

    logs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(logs.into_iter().map(|(_, path)| path).collect())
}

async fn first_line(guard: &PathGuard, path: &Path) -> anyhow::Result<String> {
    let path = guard.validate(path, AccessIntent::Read)?;
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[async_trait]
impl Operation for RecentLogs {
    fn name(&self) -> &str {
        "recent_logs"
    }

    fn description(&self) -> &str {
        "Write the first line of each of the most recently modified .log files in a \
         directory to an output file, newest first."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::with_default(
                "logs_dir",
                ParamKind::Path(AccessIntent::Read),
                "logs",
                "directory containing .log files",
            ),
            ParamSpec::with_default(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "logs-recent.txt",
                "file receiving one line per log",
            ),
            ParamSpec::with_default("count", ParamKind::Integer, 10, "number of log files"),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let count = args.integer("count")?;
        if count <= 0 {
            bail!("count must be positive, got {count}");
        }

        let dir = context
            .guard
            .validate(args.path("logs_dir")?, AccessIntent::Read)?;
        let logs = newest_logs(&dir).await?;

        let mut out = String::new();
        let selected: Vec<_> = logs.iter().take(count as usize).collect();
        for log in &selected {
            debug!("Reading first line of {}", log.display());
            out.push_str(&first_line(&context.guard, log).await?);
            out.push('\n');
        }

        let output = write_text(&context.guard, args.path("output")?, &out).await?;
        info!("Collected first lines from {} log files", selected.len());

        Ok(json!({
            "files": selected
                .iter()
                .map(|p| display_path(&context.guard, p))
                .collect::<Vec<_>>(),
            "output": display_path(&context.guard, &output),
        }))
    }
}
