use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::info;

use crate::{
    catalog::Catalog,
    cli::ParseArgs,
    io_utils,
    metadata::ParseMetadata,
    pipeline::{ParseResult, Parser},
    table,
};

pub fn execute(args: &ParseArgs) -> Result<()> {
    let filename = routing_name(args)?;
    let mut catalog = Catalog::load_dir(&args.catalog)
        .with_context(|| format!("Loading catalog {:?}", args.catalog))?;
    if let Some(rows) = args.chunk_rows {
        let mut config = catalog.config.clone();
        config.chunk_rows = Some(rows);
        catalog = catalog.with_config(config)?;
    }

    let metadata = build_metadata(args)?;
    let bytes = io_utils::read_input_bytes(&args.input)?;
    info!(
        "Parsing '{}' ({} bytes) for release {}",
        filename,
        bytes.len(),
        metadata.release_id
    );
    let result = Parser::new(&catalog)
        .parse(&bytes, &filename, &metadata)
        .map_err(|err| anyhow!("[{}] {err}", err.kind()))?;

    let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    let delimiter = args
        .output_delimiter
        .unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
    let stem = artifact_stem(&filename);
    let paths = io_utils::write_artifacts(&result, &args.out_dir, &stem, delimiter, encoding)?;
    info!(
        "Wrote {:?}, {:?} and {:?}",
        paths.data, paths.rejects, paths.metrics
    );

    print_metrics(&result);
    if args.preview > 0 {
        print_preview(&result, args.preview);
    }
    Ok(())
}

fn routing_name(args: &ParseArgs) -> Result<String> {
    if let Some(name) = &args.filename {
        return Ok(name.clone());
    }
    if io_utils::is_dash(&args.input) {
        return Err(anyhow!("--filename is required when reading from stdin"));
    }
    args.input
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Input path {:?} has no file name", args.input))
}

fn build_metadata(args: &ParseArgs) -> Result<ParseMetadata> {
    let mut metadata = ParseMetadata::new(&args.release_id, args.year, args.quarter.as_deref());
    metadata = metadata.with_source_uri(
        args.source_uri
            .clone()
            .unwrap_or_else(|| args.input.display().to_string()),
    );
    if let Some(raw) = &args.published_at {
        let published = DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Parsing --published-at '{raw}'"))?
            .with_timezone(&Utc);
        metadata = metadata.with_published_at(published);
    }
    if let Some(checksum) = &args.checksum {
        metadata = metadata.with_checksum(checksum);
    }
    if let Some(schema_id) = &args.schema_id {
        metadata = metadata.with_schema_id(schema_id);
    }
    if let Some(version) = &args.layout_version {
        metadata = metadata.with_layout_version(version);
    }
    Ok(metadata)
}

fn artifact_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("parsed")
        .to_string()
}

fn print_metrics(result: &ParseResult) {
    let pairs = result
        .metrics
        .to_flat_map()
        .into_iter()
        .map(|(key, value)| {
            let rendered = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => "-".to_string(),
                other => other.to_string(),
            };
            (key, rendered)
        })
        .collect::<Vec<_>>();
    print!("{}", table::render_pairs(&pairs));
}

fn print_preview(result: &ParseResult, limit: usize) {
    let rows = result
        .data
        .rows
        .iter()
        .take(limit)
        .map(|row| {
            row.values
                .iter()
                .map(|value| value.as_ref().map(|v| v.as_display()).unwrap_or_default())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    println!();
    table::print_table(&result.data.columns, &rows);
}
