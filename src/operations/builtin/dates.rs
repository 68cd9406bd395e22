//! Builtin operation: count dates that fall on a given weekday.
//!
//! The input is a line-delimited list of dates in mixed formats. Lines that
//! match none of the known formats are skipped with a warning instead of
//! failing the whole run.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::operations::{
    display_path, read_text, write_text, Arguments, Operation, OperationContext, ParamKind,
    ParamSpec,
};
use crate::sandbox::AccessIntent;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%d %b %Y",
    "%m/%d/%Y",
    "%Y.%m.%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub struct CountWeekday;

/// Parses a date in any of the supported formats, ignoring any time part.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        })
}

/// Returns `(matches, skipped)` over the non-blank lines of `content`.
fn count_weekday(content: &str, weekday: Weekday) -> (usize, usize) {
    let mut matches = 0;
    let mut skipped = 0;
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_date(line) {
            Some(date) if date.weekday() == weekday => matches += 1,
            Some(_) => {}
            None => {
                warn!("Skipping invalid date: {line}");
                skipped += 1;
            }
        }
    }
    (matches, skipped)
}

#[async_trait]
impl Operation for CountWeekday {
    fn name(&self) -> &str {
        "count_weekday"
    }

    fn description(&self) -> &str {
        "Count how many dates in a line-delimited date list fall on a given weekday \
         and write the number to an output file."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::with_default(
                "input",
                ParamKind::Path(AccessIntent::Read),
                "dates.txt",
                "file with one date per line",
            ),
            ParamSpec::with_default(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "dates-wednesdays.txt",
                "file receiving the count",
            ),
            ParamSpec::with_default(
                "weekday",
                ParamKind::String,
                "wednesday",
                "weekday name, e.g. monday or sun",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let weekday_name = args.text("weekday")?;
        let weekday: Weekday = weekday_name
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown weekday: {weekday_name}"))?;

        let content = read_text(&context.guard, args.path("input")?).await?;
        let (count, skipped) = count_weekday(&content, weekday);

        let output = write_text(&context.guard, args.path("output")?, &count.to_string()).await?;
        info!("Counted {count} {weekday:?} dates ({skipped} skipped)");

        Ok(json!({
            "weekday": format!("{weekday:?}"),
            "count": count,
            "skipped": skipped,
            "output": display_path(&context.guard, &output),
        }))
    }
}
