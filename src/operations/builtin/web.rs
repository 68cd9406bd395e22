//! Builtin operations that read from the web: raw download and text scrape.
//!
//! Both use the shared HTTP client from the operation context. Non-2xx
//! responses and oversized bodies are failures.

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::operations::{
    display_path, ensure_parent, write_text, Arguments, Operation, OperationContext, ParamKind,
    ParamSpec,
};
use crate::sandbox::AccessIntent;

/// Maximum response body size (5 MB).
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024;

/// Maximum scraped text returned in the payload (in characters).
const MAX_TEXT_PREVIEW: usize = 2_000;

/// Text wrapping width for html2text conversion.
const TEXT_WIDTH: usize = 100;

struct Fetched {
    content_type: String,
    body: Vec<u8>,
}

async fn fetch(client: &reqwest::Client, url: &url::Url) -> anyhow::Result<Fetched> {
    debug!("Fetching URL: {url}");
    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("{url} returned HTTP {status}");
    }
    if let Some(len) = response.content_length() {
        if len as usize > MAX_RESPONSE_SIZE {
            bail!("response too large ({len} bytes, limit is {MAX_RESPONSE_SIZE} bytes)");
        }
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/html")
        .to_string();

    let body = response.bytes().await.context("failed to read response body")?;
    if body.len() > MAX_RESPONSE_SIZE {
        bail!(
            "response too large ({} bytes, limit is {MAX_RESPONSE_SIZE} bytes)",
            body.len()
        );
    }

    Ok(Fetched {
        content_type,
        body: body.to_vec(),
    })
}

fn is_html(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml")
}

/// Readable text of a response body. HTML is rendered to plain text; other
/// content is decoded as UTF-8.
fn extract_text(content_type: &str, body: &[u8]) -> String {
    if is_html(content_type) {
        html2text::from_read(body, TEXT_WIDTH)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())
    } else {
        String::from_utf8_lossy(body).into_owned()
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > MAX_TEXT_PREVIEW {
        let head: String = text.chars().take(MAX_TEXT_PREVIEW).collect();
        format!("{head}\n[truncated]")
    } else {
        text.to_string()
    }
}

// ── fetch_url ────────────────────────────────────────────

pub struct FetchUrl;

#[async_trait]
impl Operation for FetchUrl {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Download the body of an http(s) URL unchanged into a workspace file."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("url", ParamKind::Url, "http:// or https:// URL to download"),
            ParamSpec::required(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "file receiving the response body",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let url = args.url("url")?;
        let fetched = fetch(&context.http, url).await?;

        let output = context
            .guard
            .validate(args.path("output")?, AccessIntent::Write)?;
        ensure_parent(&output).await?;
        tokio::fs::write(&output, &fetched.body)
            .await
            .with_context(|| format!("cannot write {}", output.display()))?;
        info!("Saved {} bytes from {url}", fetched.body.len());

        Ok(json!({
            "url": url.as_str(),
            "bytes": fetched.body.len(),
            "content_type": fetched.content_type,
            "output": display_path(&context.guard, &output),
        }))
    }
}

// ── scrape_website ───────────────────────────────────────

pub struct ScrapeWebsite;

#[async_trait]
impl Operation for ScrapeWebsite {
    fn name(&self) -> &str {
        "scrape_website"
    }

    fn description(&self) -> &str {
        "Fetch a web page and extract its readable text, stripped of HTML markup, \
         optionally saving the text to a workspace file."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("url", ParamKind::Url, "http:// or https:// page to scrape"),
            ParamSpec::optional(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "file receiving the extracted text",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let url = args.url("url")?;
        let fetched = fetch(&context.http, url).await?;
        let text = extract_text(&fetched.content_type, &fetched.body);

        let mut detail = json!({
            "url": url.as_str(),
            "characters": text.chars().count(),
            "text": preview(&text),
        });

        if let Some(path) = args.opt_path("output") {
            let output = write_text(&context.guard, path, &text).await?;
            detail["output"] = json!(display_path(&context.guard, &output));
        }

        info!("Scraped {} characters from {url}", text.chars().count());
        Ok(detail)
    }
}
