//! Deps command implementation.

use anyhow::{Context, Result};
use mdms::DatabaseAccess;
use serde::Serialize;

use crate::OutputFormat;

#[derive(Serialize)]
struct TableDependencies {
    table: String,
    references: Vec<String>,
}

#[derive(Serialize)]
struct DepsOutput {
    tables: Vec<TableDependencies>,
}

pub fn run(access: &mut DatabaseAccess, tables: &[String], format: OutputFormat) -> Result<()> {
    let mut output = DepsOutput { tables: Vec::new() };
    for table in tables {
        let references = access
            .referenced_tables(table)
            .with_context(|| format!("failed to look up foreign keys of {table}"))?;
        output.tables.push(TableDependencies {
            table: table.clone(),
            references: references.into_iter().collect(),
        });
    }

    match format {
        OutputFormat::Text => {
            println!("{:<30} REFERENCES", "TABLE");
            println!("{}", "-".repeat(60));
            for entry in &output.tables {
                let references = if entry.references.is_empty() {
                    "-".to_string()
                } else {
                    entry.references.join(", ")
                };
                println!("{:<30} {}", entry.table, references);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
