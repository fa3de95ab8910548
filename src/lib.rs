pub mod archive;
pub mod cast;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod contract;
pub mod data;
pub mod delimited;
pub mod domain;
pub mod encoding;
pub mod error;
pub mod fixed_width;
pub mod hash;
pub mod io_utils;
pub mod keys;
pub mod layout;
pub mod metadata;
pub mod metrics;
pub mod normalize;
pub mod parse_cmd;
pub mod pipeline;
pub mod quarantine;
pub mod raw;
pub mod router;
pub mod table;
pub mod workbook;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser as _;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands};

pub use crate::{
    catalog::Catalog,
    config::ParserConfig,
    contract::{ContractRegistry, SchemaContract},
    error::{ParseError, ParseOutcome, RejectCode, Severity},
    layout::{LayoutRegistry, LayoutSpec},
    metadata::ParseMetadata,
    metrics::{ParseMetrics, Provenance},
    pipeline::{DataTable, ParseResult, Parser},
    router::{Route, Router, SourceFormat},
};

/// Recorded in every provenance record. Row hashes are only comparable across
/// runs that share the major version.
pub const PARSER_VERSION: &str = env!("CARGO_PKG_VERSION");

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("vintage_parse", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Parse(args) => parse_cmd::execute(&args),
        Commands::Route(args) => handle_route(&args),
        Commands::Layout(args) => handle_layout(&args),
    }
}

fn handle_route(args: &cli::RouteArgs) -> Result<()> {
    let catalog = Catalog::load_dir(&args.catalog)
        .with_context(|| format!("Loading catalog {:?}", args.catalog))?;
    let filename = args
        .input
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("Input path {:?} has no file name", args.input))?;
    let prefix = io_utils::read_prefix(&args.input, catalog.config.sniff_bytes)?;
    let route = catalog
        .router
        .route(filename, prefix.as_deref())
        .map_err(|err| anyhow!("[{}] {err}", err.kind()))?;
    let contract_version = catalog
        .contracts
        .get(&route.schema_id)
        .map(|contract| contract.version.clone())
        .unwrap_or_else(|| "-".to_string());
    info!(
        "'{}' routes to {} ({})",
        filename, route.schema_id, route.format
    );
    let pairs = vec![
        ("dataset_id".to_string(), route.dataset_id.clone()),
        ("schema_id".to_string(), route.schema_id.clone()),
        ("contract_version".to_string(), contract_version),
        ("format".to_string(), route.format.to_string()),
        ("pattern".to_string(), route.pattern.clone()),
        (
            "sniffed".to_string(),
            prefix.is_some().to_string(),
        ),
    ];
    print!("{}", table::render_pairs(&pairs));
    Ok(())
}

fn handle_layout(args: &cli::LayoutArgs) -> Result<()> {
    let catalog = Catalog::load_dir(&args.catalog)
        .with_context(|| format!("Loading catalog {:?}", args.catalog))?;
    let layout = catalog
        .layouts
        .get_layout(&args.dataset, args.year, args.quarter.as_deref())?
        .ok_or_else(|| {
            anyhow!(
                "No layout for dataset '{}' {} {}",
                args.dataset,
                args.year,
                args.quarter.as_deref().unwrap_or("annual")
            )
        })?;
    println!(
        "{} {} {} (version {}, min_line_length {})",
        layout.dataset,
        layout.year,
        layout.quarter.as_deref().unwrap_or("annual"),
        layout.version,
        layout.min_line_length
    );
    let headers = ["name", "start", "end", "width", "type", "nullable"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = layout
        .sorted_columns()
        .into_iter()
        .map(|column| {
            vec![
                column.name.clone(),
                column.start.to_string(),
                column.end.to_string(),
                column.width().to_string(),
                column.datatype.to_string(),
                column.nullable.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
