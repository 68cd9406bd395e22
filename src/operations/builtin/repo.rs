//! Builtin operation: clone a git repository into the workspace.

use std::ffi::OsStr;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::operations::{
    command, display_path, ensure_parent, Arguments, Operation, OperationContext, ParamKind,
    ParamSpec,
};
use crate::sandbox::AccessIntent;

pub struct CloneRepo;

#[async_trait]
impl Operation for CloneRepo {
    fn name(&self) -> &str {
        "clone_repo"
    }

    fn description(&self) -> &str {
        "Clone a git repository from an http(s) URL into a new workspace directory."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("repo_url", ParamKind::Url, "http:// or https:// clone URL"),
            ParamSpec::with_default(
                "destination",
                ParamKind::Path(AccessIntent::Write),
                "repo",
                "directory to clone into; must not exist yet",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let url = args.url("repo_url")?;
        let destination = context
            .guard
            .validate(args.path("destination")?, AccessIntent::Write)?;
        if tokio::fs::symlink_metadata(&destination).await.is_ok() {
            bail!(
                "destination already exists: {}",
                display_path(&context.guard, &destination)
            );
        }
        ensure_parent(&destination).await?;

        command::run(
            &context.tools.git,
            [
                OsStr::new("clone"),
                OsStr::new("--"),
                OsStr::new(url.as_str()),
                destination.as_os_str(),
            ],
            context.guard.root(),
            context.tool_timeout(),
        )
        .await?;

        info!("Cloned {url} into {}", destination.display());
        Ok(json!({
            "repo_url": url.as_str(),
            "destination": display_path(&context.guard, &destination),
        }))
    }
}
