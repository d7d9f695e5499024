//! CLI argument parsing for the solarcrm-worker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::services::header_resolver::{ColumnRef, MappingOverrides};
use crate::types::{DocumentPolicy, ImportKind};

#[derive(Parser)]
#[command(name = "solarcrm-worker", about = "GD solar CRM import worker", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the NATS worker (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Show the proposed column mapping of a file
    Detect {
        file: PathBuf,
        #[arg(long, value_enum)]
        kind: ImportKind,
    },
    /// Import a client-base or invoice file
    Import {
        file: PathBuf,
        #[arg(long, value_enum)]
        kind: ImportKind,
        #[arg(long)]
        tenant: String,
        /// Override one field: `field=column` (index or header name), `field=` to clear
        #[arg(long = "map", value_parser = parse_map_arg)]
        map: Vec<MapArg>,
        /// Confirm the proposed mapping (required to import)
        #[arg(long)]
        accept_mapping: bool,
        #[arg(long, value_enum)]
        document_policy: Option<DocumentPolicy>,
        /// Print the result as JSON instead of the report
        #[arg(long)]
        json: bool,
    },
    /// Import every recognised sheet of a workbook
    Workbook {
        file: PathBuf,
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        accept_mapping: bool,
        #[arg(long)]
        json: bool,
    },
}

/// One `--map field=column` override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapArg {
    pub field: String,
    pub column: Option<ColumnRef>,
}

fn parse_map_arg(s: &str) -> Result<MapArg, String> {
    let (field, column) = s
        .split_once('=')
        .ok_or_else(|| format!("expected field=column, got '{}'", s))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{}'", s));
    }
    let column = column.trim();
    Ok(MapArg {
        field: field.to_string(),
        column: (!column.is_empty()).then(|| ColumnRef::parse(column)),
    })
}

pub fn overrides(args: &[MapArg]) -> MappingOverrides {
    args.iter().map(|a| (a.field.clone(), a.column.clone())).collect()
}
