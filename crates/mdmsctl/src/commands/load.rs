//! Load command implementation.
//!
//! Reads tab-separated rows and inserts them through a batch writer, so the
//! rows are written in batches ordered after pending writes of the tables the
//! target references.

use anyhow::{bail, Context, Result};
use mdms::db::{table_set, ParamRow, TableSet, WriterFactory};
use mdms::DatabaseAccess;
use rusqlite::types::Value;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::OutputFormat;

/// Marker for a NULL field, as written by SQLite and PostgreSQL dumps.
const NULL_MARKER: &str = "\\N";

/// Inserts tab-separated records into one table.
struct TsvWriterFactory {
    name: String,
    sql: String,
    table: String,
    references: TableSet,
}

impl TsvWriterFactory {
    fn new(table: &str, columns: &[String], references: TableSet) -> Self {
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            name: format!("load:{table}"),
            sql: format!(
                "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
                quote_identifier(table)
            ),
            table: table.to_owned(),
            references,
        }
    }
}

impl WriterFactory for TsvWriterFactory {
    type Element = Vec<String>;

    fn name(&self) -> &str {
        &self.name
    }

    fn sql(&self) -> &str {
        &self.sql
    }

    fn accessed_tables(&self) -> TableSet {
        self.references.clone()
    }

    fn manipulated_tables(&self) -> TableSet {
        table_set([self.table.as_str()])
    }

    fn bind(&self, fields: &Vec<String>) -> ParamRow {
        fields
            .iter()
            .map(|field| {
                if field == NULL_MARKER {
                    Value::Null
                } else {
                    Value::Text(field.clone())
                }
            })
            .collect()
    }
}

#[derive(Serialize)]
struct LoadOutput {
    table: String,
    rows: u64,
    batches: u64,
}

pub fn run(
    access: &mut DatabaseAccess,
    table: &str,
    columns: Vec<String>,
    file: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    if columns.is_empty() {
        bail!("at least one column is required");
    }
    let references = access
        .referenced_tables(table)
        .with_context(|| format!("failed to look up foreign keys of {table}"))?;
    let writer = access
        .create_writer(TsvWriterFactory::new(table, &columns, references))
        .context("failed to create writer")?;

    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let batches_before = access.stats().batches_executed;
    let mut rows = 0u64;
    for (number, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.is_empty() {
            continue;
        }
        let fields = split_record(&line);
        if fields.len() != columns.len() {
            bail!(
                "line {}: expected {} fields, found {}",
                number + 1,
                columns.len(),
                fields.len()
            );
        }
        access
            .add(&writer, &fields)
            .with_context(|| format!("failed to load line {}", number + 1))?;
        rows += 1;
    }
    access.flush().context("failed to flush loaded rows")?;

    let output = LoadOutput {
        table: table.to_owned(),
        rows,
        batches: access.stats().batches_executed - batches_before,
    };

    match format {
        OutputFormat::Text => {
            println!(
                "Loaded {} row(s) into {} in {} batch(es)",
                output.rows, output.table, output.batches
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn split_record(line: &str) -> Vec<String> {
    line.split('\t').map(str::to_owned).collect()
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
