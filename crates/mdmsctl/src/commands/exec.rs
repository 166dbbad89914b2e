//! Exec command implementation.

use anyhow::{Context, Result};
use mdms::DatabaseAccess;
use serde::Serialize;

use super::table_refs;
use crate::OutputFormat;

#[derive(Serialize)]
struct ExecOutput {
    tables: Vec<String>,
    statements_executed: u64,
}

pub fn run(
    access: &mut DatabaseAccess,
    sql: &str,
    tables: &[String],
    format: OutputFormat,
) -> Result<()> {
    access
        .execute_write(sql, &table_refs(tables))
        .context("failed to execute statement")?;
    access.flush().context("failed to flush statement")?;

    let output = ExecOutput {
        tables: tables.to_vec(),
        statements_executed: access.stats().statements_executed,
    };

    match format {
        OutputFormat::Text => {
            println!(
                "Executed {} statement(s) on {}",
                output.statements_executed,
                output.tables.join(", ")
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
