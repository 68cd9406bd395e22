//! Builtin operation: sort a JSON contact list by last name, then first name.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::operations::{
    display_path, read_text, write_text, Arguments, Operation, OperationContext, ParamKind,
    ParamSpec,
};
use crate::sandbox::AccessIntent;

pub struct SortContacts;

/// Sort key of one contact. Every contact must carry both name fields as
/// strings; other fields are kept untouched.
fn sort_key(index: usize, contact: &Map<String, Value>) -> anyhow::Result<(String, String)> {
    let field = |name: &str| {
        contact
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("contact #{index} has no string `{name}`"))
    };
    Ok((field("last_name")?, field("first_name")?))
}

/// Stable sort by `(last_name, first_name)`.
fn sort_contacts(contacts: Vec<Map<String, Value>>) -> anyhow::Result<Vec<Map<String, Value>>> {
    let mut keyed = contacts
        .into_iter()
        .enumerate()
        .map(|(i, c)| sort_key(i, &c).map(|key| (key, c)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, c)| c).collect())
}

#[async_trait]
impl Operation for SortContacts {
    fn name(&self) -> &str {
        "sort_contacts"
    }

    fn description(&self) -> &str {
        "Sort a JSON array of contacts by last_name, then first_name, and write the \
         sorted array to an output file."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::with_default(
                "input",
                ParamKind::Path(AccessIntent::Read),
                "contacts.json",
                "JSON array of objects with first_name and last_name",
            ),
            ParamSpec::with_default(
                "output",
                ParamKind::Path(AccessIntent::Write),
                "contacts-sorted.json",
                "file receiving the sorted array",
            ),
        ]
    }

    async fn execute(&self, args: Arguments, context: &OperationContext) -> anyhow::Result<Value> {
        let content = read_text(&context.guard, args.path("input")?).await?;
        let contacts: Vec<Map<String, Value>> = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("contacts file is not a JSON array of objects: {e}"))?;

        let sorted = sort_contacts(contacts)?;
        let rendered = serde_json::to_string_pretty(&sorted)?;
        let output = write_text(&context.guard, args.path("output")?, &rendered).await?;

        info!("Sorted {} contacts", sorted.len());
        Ok(json!({
            "contacts": sorted.len(),
            "output": display_path(&context.guard, &output),
        }))
    }
}
