//! Query command implementation.

use anyhow::{Context, Result};
use mdms::DatabaseAccess;
use rusqlite::types::Value;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::table_refs;
use crate::OutputFormat;

#[derive(Serialize)]
struct QueryOutput {
    columns: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
}

pub fn run(
    access: &mut DatabaseAccess,
    sql: &str,
    tables: &[String],
    format: OutputFormat,
) -> Result<()> {
    let rows = access
        .query(sql, &table_refs(tables), [], |row| {
            (0..row.as_ref().column_count())
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .context("query failed")?;
    let columns = column_names(access, sql)?;

    match format {
        OutputFormat::Text => {
            println!("{}", columns.join("\t"));
            for row in &rows {
                let cells: Vec<String> = row.iter().map(format_text).collect();
                println!("{}", cells.join("\t"));
            }
            println!("({} row(s))", rows.len());
        }
        OutputFormat::Json => {
            let output = QueryOutput {
                columns,
                rows: rows
                    .iter()
                    .map(|row| row.iter().map(to_json).collect())
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn column_names(access: &DatabaseAccess, sql: &str) -> Result<Vec<String>> {
    let stmt = access.connection()?.prepare_cached(sql)?;
    let names = stmt.column_names().into_iter().map(str::to_owned).collect();
    Ok(names)
}

fn format_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::from(*i),
        Value::Real(f) => JsonValue::from(*f),
        Value::Text(s) => JsonValue::from(s.as_str()),
        Value::Blob(b) => JsonValue::from(b.clone()),
    }
}
