//! External command runner.
//!
//! Operations that delegate to command-line tools (git, tesseract,
//! ImageMagick, whisper, prettier) go through [`run`]. The child gets no
//! stdin, is killed if the timeout fires, and a non-zero exit becomes an
//! error carrying the tool's stderr.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tokio::process::Command;
use tracing::debug;

/// Maximum stderr excerpt kept in error messages (in characters).
const MAX_STDERR_EXCERPT: usize = 2_000;

/// Captured output of a successful command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
}

/// Runs `program` with `args` inside `cwd`, bounded by `timeout`.
pub async fn run<I, S>(program: &str, args: I, cwd: &Path, timeout: Duration) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running external command: {:?}", command.as_std());

    let child = command
        .spawn()
        .map_err(|e| anyhow!("failed to start `{program}`: {e}"))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| anyhow!("`{program}` failed: {e}"))?,
        Err(_) => bail!("`{program}` timed out after {}s", timeout.as_secs_f32()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.trim().chars().take(MAX_STDERR_EXCERPT).collect();
        bail!("`{program}` exited with {}: {excerpt}", output.status);
    }

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cwd() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let dir = cwd();
        let out = run("echo", ["hello", "world"], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello world");
    }

    #[tokio::test]
    async fn test_run_uses_working_directory() {
        let dir = cwd();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let out = run("ls", ["marker.txt"], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "marker.txt");
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_error() {
        let dir = cwd();
        let err = run("false", Vec::<&str>::new(), dir.path(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("`false` exited with"));
    }

    #[tokio::test]
    async fn test_run_failure_carries_stderr_excerpt() {
        let dir = cwd();
        let err = run(
            "sh",
            ["-c", "echo 'bad input' >&2; exit 3"],
            dir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().ends_with(": bad input"), "{err}");
    }

    #[tokio::test]
    async fn test_run_missing_program_is_error() {
        let dir = cwd();
        let err = run(
            "taskgate-no-such-tool",
            ["--version"],
            dir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("failed to start `taskgate-no-such-tool`"));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let dir = cwd();
        let err = run("sleep", ["5"], dir.path(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
