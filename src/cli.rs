use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Parse vintage government source files into validated, hashed datasets",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse one source file and write data, rejects and metrics artifacts
    Parse(ParseArgs),
    /// Show which dataset, contract and format a file routes to
    Route(RouteArgs),
    /// Show the fixed-width layout resolved for a dataset vintage
    Layout(LayoutArgs),
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Catalog directory holding routes.yml, contracts/ and layouts/
    #[arg(short = 'c', long = "catalog")]
    pub catalog: PathBuf,
    /// Source file to parse ('-' reads stdin and requires --filename)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Filename used for routing when it differs from the input path
    #[arg(long = "filename")]
    pub filename: Option<String>,
    /// Directory receiving <stem>.data.csv, <stem>.rejects.csv and <stem>.metrics.json
    #[arg(short = 'o', long = "out-dir")]
    pub out_dir: PathBuf,
    /// Release identifier recorded in provenance
    #[arg(long = "release-id")]
    pub release_id: String,
    /// Product year of the vintage
    #[arg(long = "year")]
    pub year: i32,
    /// Quarter label of the vintage (Q1..Q4); omit for annual products
    #[arg(long = "quarter")]
    pub quarter: Option<String>,
    /// Publication timestamp of the vintage (RFC 3339)
    #[arg(long = "published-at")]
    pub published_at: Option<String>,
    /// Source URI recorded in provenance
    #[arg(long = "source-uri")]
    pub source_uri: Option<String>,
    /// Expected checksum (`sha256:<hex>` or bare hex)
    #[arg(long = "checksum")]
    pub checksum: Option<String>,
    /// Expected schema contract identifier
    #[arg(long = "schema-id")]
    pub schema_id: Option<String>,
    /// Expected layout version for fixed-width sources
    #[arg(long = "layout-version")]
    pub layout_version: Option<String>,
    /// Validate rows in chunks of this size (overrides parser.yml)
    #[arg(long = "chunk-rows")]
    pub chunk_rows: Option<usize>,
    /// Delimiter for the data and reject artifacts
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding for the data and reject artifacts (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Print the first N valid rows as a table after parsing
    #[arg(long = "preview", default_value_t = 0)]
    pub preview: usize,
}

#[derive(Debug, Args)]
pub struct RouteArgs {
    /// Catalog directory holding routes.yml, contracts/ and layouts/
    #[arg(short = 'c', long = "catalog")]
    pub catalog: PathBuf,
    /// File to route; its leading bytes are sniffed when it exists
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct LayoutArgs {
    /// Catalog directory holding routes.yml, contracts/ and layouts/
    #[arg(short = 'c', long = "catalog")]
    pub catalog: PathBuf,
    /// Dataset identifier
    #[arg(long = "dataset")]
    pub dataset: String,
    /// Product year
    #[arg(long = "year")]
    pub year: i32,
    /// Quarter label (Q1..Q4); omit for annual layouts
    #[arg(long = "quarter")]
    pub quarter: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
