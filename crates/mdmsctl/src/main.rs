//! mdmsctl: Command-line interface for the MDMS metadata store.
//!
//! Provides commands for inspecting foreign-key dependencies, executing
//! writes, running queries, and bulk-loading rows from the terminal.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdms::observability::tracing::init_tracing;
use mdms::{Config, DatabaseAccess};
use std::path::PathBuf;

/// Command-line interface for the MDMS metadata store.
#[derive(Parser)]
#[command(name = "mdmsctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the tables each table references through foreign keys
    Deps {
        /// Table names
        #[arg(required = true)]
        tables: Vec<String>,
    },
    /// Execute a write statement
    Exec {
        /// SQL statement
        sql: String,
        /// Table manipulated by the statement (repeatable)
        #[arg(short, long = "table", required = true)]
        tables: Vec<String>,
    },
    /// Run a query and print its rows
    Query {
        /// SQL query
        sql: String,
        /// Table read by the query (repeatable)
        #[arg(short, long = "table")]
        tables: Vec<String>,
    },
    /// Load tab-separated rows into a table through a batch writer
    Load {
        /// Target table
        table: String,
        /// Comma-separated target columns
        #[arg(short, long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
        /// Read rows from file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.config.log_level);

    let mut access = DatabaseAccess::open(&cli.config.database, cli.config.access_config())
        .with_context(|| format!("failed to open {}", cli.config.database.display()))?;
    tracing::debug!(config = ?access.config(), "Session ready");

    let result = match cli.command {
        Commands::Deps { tables } => commands::deps::run(&mut access, &tables, cli.output),
        Commands::Exec { sql, tables } => {
            commands::exec::run(&mut access, &sql, &tables, cli.output)
        }
        Commands::Query { sql, tables } => {
            commands::query::run(&mut access, &sql, &tables, cli.output)
        }
        Commands::Load {
            table,
            columns,
            file,
        } => commands::load::run(&mut access, &table, columns, file.as_deref(), cli.output),
    };

    // Close even if the command failed so buffered rows are not lost.
    let closed = access.close().context("failed to close database");
    result?;
    closed?;
    Ok(())
}
