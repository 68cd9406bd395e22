//! Builtin operation: transcribe an audio file with `whisper`.

use std::ffi::OsStr;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::operations::{
    command, display_path, Arguments, Operation, OperationContext, ParamKind, ParamSpec,
};
use crate::sandbox::AccessIntent;

pub struct TranscribeAudio;

#[async_trait]
impl Operation for TranscribeAudio {
    fn name(&self) -> &str {
        "transcribe_audio"
    }

    fn description(&self) -> &str {
        "Transcribe speech in an audio file to a plain-text transcript placed in an \
         output directory."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input", ParamKind::Path(AccessIntent::Read), "audio file"),
            ParamSpec::with_default(
                "output_dir",
                ParamKind::Path(AccessIntent::Write),
                "transcripts",
                "directory receiving <name>.txt",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let input = context
            .guard
            .validate(args.path("input")?, AccessIntent::Read)?;
        if !input.is_file() {
            bail!("audio file not found: {}", display_path(&context.guard, &input));
        }
        let Some(stem) = input.file_stem() else {
            bail!("audio file has no name: {}", input.display());
        };

        let output_dir = context
            .guard
            .validate(args.path("output_dir")?, AccessIntent::Write)?;
        tokio::fs::create_dir_all(&output_dir)
            .await
            .with_context(|| format!("cannot create {}", output_dir.display()))?;

        command::run(
            &context.tools.whisper,
            [
                input.as_os_str(),
                OsStr::new("--output_format"),
                OsStr::new("txt"),
                OsStr::new("--output_dir"),
                output_dir.as_os_str(),
            ],
            context.guard.root(),
            context.tool_timeout(),
        )
        .await?;

        let mut name = stem.to_os_string();
        name.push(".txt");
        let transcript = context
            .guard
            .validate(output_dir.join(name), AccessIntent::Read)?;
        if !transcript.is_file() {
            bail!(
                "transcriber produced no transcript at {}",
                display_path(&context.guard, &transcript)
            );
        }

        info!("Transcribed {}", input.display());
        Ok(json!({
            "transcript": display_path(&context.guard, &transcript),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::testing::{bind, context};

    #[tokio::test]
    async fn test_transcribe_writes_transcript() {
        let dir = tempfile::tempdir().unwrap();
        // Invoked as `sh <audio> --output_format txt --output_dir <dir>`
        std::fs::write(
            dir.path().join("meeting.mp3"),
            "printf 'hello team' > \"$4/meeting.txt\"\n",
        )
        .unwrap();
        let mut ctx = context(dir.path());
        ctx.tools.whisper = "sh".to_string();

        let args = bind(&TranscribeAudio, json!({"input": "meeting.mp3"}), &ctx);
        let result = TranscribeAudio.execute(args, &ctx).await.unwrap();
        assert_eq!(result["transcript"], "transcripts/meeting.txt");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("transcripts/meeting.txt")).unwrap(),
            "hello team"
        );
    }

    #[tokio::test]
    async fn test_transcribe_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("silence.wav"), "true\n").unwrap();
        let mut ctx = context(dir.path());
        ctx.tools.whisper = "sh".to_string();

        let args = bind(&TranscribeAudio, json!({"input": "silence.wav"}), &ctx);
        let err = TranscribeAudio.execute(args, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("no transcript"));
    }

    #[tokio::test]
    async fn test_transcribe_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let args = bind(&TranscribeAudio, json!({"input": "nope.mp3"}), &ctx);
        let err = TranscribeAudio.execute(args, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("audio file not found"));
    }
}
