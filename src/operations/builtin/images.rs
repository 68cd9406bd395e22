//! Builtin operations on image files: OCR of a card number and resizing.
//!
//! Both delegate to external tools (`tesseract`, ImageMagick `convert`)
//! through the command runner.

use std::ffi::OsStr;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::operations::{
    command, display_path, ensure_parent, write_text, Arguments, Operation, OperationContext,
    ParamKind, ParamSpec,
};
use crate::sandbox::AccessIntent;

/// Largest accepted thumbnail edge, in pixels.
const MAX_DIMENSION: i64 = 10_000;

// ── extract_card_number ──────────────────────────────────

pub struct ExtractCardNumber;

/// Finds a 12–19 digit number in OCR output. Digits may be grouped by
/// whitespace on a single line.
fn find_card_number(ocr_text: &str) -> Option<String> {
    ocr_text.lines().find_map(|line| {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        let is_number = (12..=19).contains(&compact.len()) && compact.chars().all(|c| c.is_ascii_digit());
        is_number.then_some(compact)
    })
}

#[async_trait]
impl Operation for ExtractCardNumber {
    fn name(&self) -> &str {
        "extract_card_number"
    }

    fn description(&self) -> &str {
        "Read the card number from an image of a credit card using OCR and write it, \
         without spaces, to an output file."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::with_default(
                "input",
                ParamKind::Path(AccessIntent::Read),
                "credit-card.png",
                "image of the card",
            ),
            ParamSpec::with_default(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "credit-card.txt",
                "file receiving the number",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let input = context
            .guard
            .validate(args.path("input")?, AccessIntent::Read)?;
        if !input.is_file() {
            bail!("image not found: {}", display_path(&context.guard, &input));
        }

        let ocr = command::run(
            &context.tools.tesseract,
            [input.as_os_str(), OsStr::new("stdout")],
            context.guard.root(),
            context.tool_timeout(),
        )
        .await?;

        let Some(number) = find_card_number(&ocr.stdout) else {
            bail!("no card number recognized in image");
        };

        let output = write_text(&context.guard, args.path("output")?, &number).await?;
        info!("Extracted a {}-digit card number", number.len());

        Ok(json!({
            "digits": number.len(),
            "output": display_path(&context.guard, &output),
        }))
    }
}

// ── resize_image ─────────────────────────────────────────

pub struct ResizeImage;

fn dimension(args: &Arguments, name: &str) -> anyhow::Result<i64> {
    let value = args.integer(name)?;
    if !(1..=MAX_DIMENSION).contains(&value) {
        bail!("{name} must be between 1 and {MAX_DIMENSION}, got {value}");
    }
    Ok(value)
}

#[async_trait]
impl Operation for ResizeImage {
    fn name(&self) -> &str {
        "resize_image"
    }

    fn description(&self) -> &str {
        "Shrink an image to fit within a width x height box, keeping its aspect ratio."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input", ParamKind::Path(AccessIntent::Read), "source image"),
            ParamSpec::required(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "resized image; the extension picks the format",
            ),
            ParamSpec::with_default("width", ParamKind::Integer, 128, "maximum width in pixels"),
            ParamSpec::with_default("height", ParamKind::Integer, 128, "maximum height in pixels"),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let width = dimension(&args, "width")?;
        let height = dimension(&args, "height")?;

        let input = context
            .guard
            .validate(args.path("input")?, AccessIntent::Read)?;
        let output = context
            .guard
            .validate(args.path("output")?, AccessIntent::Write)?;
        ensure_parent(&output).await?;

        let geometry = format!("{width}x{height}");
        command::run(
            &context.tools.convert,
            [
                input.as_os_str(),
                OsStr::new("-thumbnail"),
                OsStr::new(&geometry),
                output.as_os_str(),
            ],
            context.guard.root(),
            context.tool_timeout(),
        )
        .await?;

        info!("Resized {} to fit {geometry}", input.display());
        Ok(json!({
            "geometry": geometry,
            "output": display_path(&context.guard, &output),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::testing::{bind, context};

    #[test]
    fn test_find_card_number() {
        let ocr = "VISA\nCARDHOLDER NAME\n4111 1111 1111 1111\nVALID THRU 12/27\n";
        assert_eq!(find_card_number(ocr), Some("4111111111111111".to_string()));
        assert_eq!(find_card_number("3782 822463 10005"), Some("378282246310005".to_string()));
        assert_eq!(find_card_number("12/27\nJOHN DOE"), None);
        assert_eq!(find_card_number("4111 1111 11O1 1111"), None);
    }

    #[tokio::test]
    async fn test_card_number_via_ocr_tool() {
        let dir = tempfile::tempdir().unwrap();
        // `sh` stands in for tesseract: it runs the "image" as a script
        // that prints OCR-like output.
        std::fs::write(
            dir.path().join("credit-card.png"),
            "echo 'BANK'\necho '5555 5555 5555 4444'\necho 'VALID THRU 01/30'\n",
        )
        .unwrap();
        let mut ctx = context(dir.path());
        ctx.tools.tesseract = "sh".to_string();

        let args = bind(&ExtractCardNumber, json!({}), &ctx);
        let result = ExtractCardNumber.execute(args, &ctx).await.unwrap();
        assert_eq!(result["digits"], 16);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("credit-card.txt")).unwrap(),
            "5555555555554444"
        );
    }

    #[tokio::test]
    async fn test_card_number_ocr_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("credit-card.png"), b"\x89PNG garbage").unwrap();
        let mut ctx = context(dir.path());
        ctx.tools.tesseract = "false".to_string();

        let args = bind(&ExtractCardNumber, json!({}), &ctx);
        let err = ExtractCardNumber.execute(args, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("exited with"));
        assert!(!dir.path().join("credit-card.txt").exists());
    }

    #[tokio::test]
    async fn test_card_number_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let args = bind(&ExtractCardNumber, json!({}), &ctx);
        let err = ExtractCardNumber.execute(args, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("image not found"));
    }

    #[tokio::test]
    async fn test_resize_passes_geometry_to_tool() {
        let dir = tempfile::tempdir().unwrap();
        // Invoked as `sh <input> -thumbnail <geometry> <output>`
        std::fs::write(dir.path().join("photo.png"), "printf '%s' \"$2\" > \"$3\"\n").unwrap();
        let mut ctx = context(dir.path());
        ctx.tools.convert = "sh".to_string();

        let args = bind(
            &ResizeImage,
            json!({"input": "photo.png", "output": "thumbs/photo.png", "width": 64, "height": 32}),
            &ctx,
        );
        let result = ResizeImage.execute(args, &ctx).await.unwrap();
        assert_eq!(result["geometry"], "64x32");
        assert_eq!(result["output"], "thumbs/photo.png");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("thumbs/photo.png")).unwrap(),
            "64x32"
        );
    }

    #[tokio::test]
    async fn test_resize_rejects_bad_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let args = bind(
            &ResizeImage,
            json!({"input": "a.png", "output": "b.png", "width": 0}),
            &ctx,
        );
        let err = ResizeImage.execute(args, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("width must be between"));
    }

    #[tokio::test]
    async fn test_resize_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), "x").unwrap();
        let mut ctx = context(dir.path());
        ctx.tools.convert = "taskgate-no-such-tool".to_string();
        let args = bind(&ResizeImage, json!({"input": "a.png", "output": "b.png"}), &ctx);
        let err = ResizeImage.execute(args, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
