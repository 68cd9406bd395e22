//! Builtin operations over SQLite databases in the workspace.
//!
//! Databases are opened read-only with `ATTACH` disabled, so a statement
//! can only see the file it was given. Queries run on the blocking pool.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use rusqlite::limits::Limit;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::operations::{
    display_path, write_text, Arguments, Operation, OperationContext, ParamKind, ParamSpec,
};
use crate::sandbox::AccessIntent;

/// Maximum rows returned by `sql_query`.
const MAX_ROWS: usize = 1_000;

fn open_read_only(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("cannot open database {}", path.display()))?;
    conn.set_limit(Limit::SQLITE_LIMIT_ATTACHED, 0);
    Ok(conn)
}

/// Runs blocking database work off the async runtime.
async fn blocking<T, F>(work: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("database task failed")?
}

/// Formats a sales total the way users expect to read it: integral totals
/// without a fractional part.
fn format_total(total: f64) -> String {
    if total.fract() == 0.0 && total.abs() < 1e15 {
        format!("{}", total as i64)
    } else {
        total.to_string()
    }
}

// ── ticket_sales ─────────────────────────────────────────

pub struct TicketSales;

fn ticket_sales_total(db: &Path, ticket_type: &str) -> anyhow::Result<f64> {
    let conn = open_read_only(db)?;
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(units * price), 0) FROM tickets WHERE type = ?1",
        [ticket_type],
        |row| row.get(0),
    )?;
    Ok(total)
}

#[async_trait]
impl Operation for TicketSales {
    fn name(&self) -> &str {
        "ticket_sales"
    }

    fn description(&self) -> &str {
        "Compute total sales (sum of units * price) for one ticket type in the \
         `tickets` table of a SQLite database and write the total to an output file."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::with_default(
                "database",
                ParamKind::Path(AccessIntent::Read),
                "ticket-sales.db",
                "SQLite database with a tickets(type, units, price) table",
            ),
            ParamSpec::with_default("ticket_type", ParamKind::String, "Gold", "ticket type to total"),
            ParamSpec::with_default(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "ticket-sales-gold.txt",
                "file receiving the total",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let db = context
            .guard
            .validate(args.path("database")?, AccessIntent::Read)?;
        let ticket_type = args.text("ticket_type")?.to_string();

        let total = {
            let ticket_type = ticket_type.clone();
            blocking(move || ticket_sales_total(&db, &ticket_type)).await?
        };
        let rendered = format_total(total);

        let output = write_text(&context.guard, args.path("output")?, &rendered).await?;
        info!("Total sales for {ticket_type}: {rendered}");

        Ok(json!({
            "ticket_type": ticket_type,
            "total": total,
            "output": display_path(&context.guard, &output),
        }))
    }
}

// ── sql_query ────────────────────────────────────────────

pub struct SqlQuery;

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => json!(format!("<{} byte blob>", b.len())),
    }
}

struct QueryRows {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    truncated: bool,
}

fn run_query(db: &Path, sql: &str) -> anyhow::Result<QueryRows> {
    let conn = open_read_only(db)?;
    let mut stmt = conn.prepare(sql)?;
    // VACUUM INTO and friends create files even on a read-only connection
    if !stmt.readonly() {
        bail!("only read-only statements are allowed");
    }
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = Vec::new();
    let mut truncated = false;
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        if rows.len() == MAX_ROWS {
            truncated = true;
            break;
        }
        let values = (0..columns.len())
            .map(|i| row.get_ref(i).map(to_json))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(values);
    }

    Ok(QueryRows {
        columns,
        rows,
        truncated,
    })
}

#[async_trait]
impl Operation for SqlQuery {
    fn name(&self) -> &str {
        "sql_query"
    }

    fn description(&self) -> &str {
        "Run a read-only SQL query against a SQLite database in the workspace and \
         return the rows, optionally saving them as JSON."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required(
                "database",
                ParamKind::Path(AccessIntent::Read),
                "SQLite database file",
            ),
            ParamSpec::required("query", ParamKind::String, "SQL statement to run"),
            ParamSpec::optional(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "file receiving the rows as JSON",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let db: PathBuf = context
            .guard
            .validate(args.path("database")?, AccessIntent::Read)?;
        if !db.is_file() {
            bail!("database not found: {}", display_path(&context.guard, &db));
        }
        let sql = args.text("query")?.to_string();
        debug!("Running SQL query: {sql}");

        let result = blocking(move || run_query(&db, &sql)).await?;

        let row_count = result.rows.len();
        let mut detail = json!({
            "columns": result.columns,
            "rows": result.rows,
            "truncated": result.truncated,
        });

        if let Some(path) = args.opt_path("output") {
            let rendered = serde_json::to_string_pretty(&detail["rows"])?;
            let output = write_text(&context.guard, path, &rendered).await?;
            detail["output"] = json!(display_path(&context.guard, &output));
        }

        info!("SQL query returned {row_count} rows");
        Ok(detail)
    }
}
