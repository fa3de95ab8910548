#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};
use vintage_parse::{Catalog, ParseMetadata};
use zip::{ZipWriter, write::SimpleFileOptions};

pub const ROUTES: &str = r#"
routes:
  - pattern: '^pprrvu\d{2}_[a-z]{3}\.txt$'
    dataset_id: pprrvu
    schema_id: pprrvu_v1
    format: fixed_width
  - pattern: '^rvu\d{2}[a-d]\.zip$'
    dataset_id: pprrvu
    schema_id: pprrvu_v1
  - pattern: '^gpci\d{4}.*\.(csv|txt)$'
    dataset_id: gpci
    schema_id: gpci_v1
    format: csv
  - pattern: '^zip_locality.*\.csv$'
    dataset_id: locality_crosswalk
    schema_id: locality_crosswalk_v1
  - pattern: '^anes\d{4}.*\.(xlsx|zip)$'
    dataset_id: anes
    schema_id: anes_v1
"#;

pub const PPRRVU_CONTRACT: &str = r#"
dataset_id: pprrvu
version: 1.2.0
natural_keys: [hcpcs, modifier]
duplicate_policy: block
columns:
  - name: hcpcs
    type: string
    nullable: false
  - name: modifier
    type: string
  - name: status_code
    type: category
    domain: [A, I, R, T]
  - name: work_rvu
    type: decimal
    precision: 2
    min: 0
  - name: effective_date
    type: date
    format: "%Y%m%d"
"#;

pub const GPCI_CONTRACT: &str = r#"
dataset_id: gpci
version: 1.0.0
natural_keys: [locality_id]
duplicate_policy: block
null_tokens: ["N/A"]
aliases:
  "Locality Number": locality_id
  "2025 PW GPCI": work_gpci
columns:
  - name: mac
    type: string
    nullable: false
  - name: state
    type: string
    nullable: false
  - name: locality_id
    type: string
    nullable: false
  - name: locality_name
    type: string
  - name: work_gpci
    type: decimal
    precision: 3
    nullable: false
    min: 0
    max: 2
  - name: pe_gpci
    type: decimal
    precision: 3
"#;

pub const LOCALITY_CONTRACT: &str = r#"
dataset_id: locality_crosswalk
version: 1.0.0
natural_keys: [zip_code]
duplicate_policy: warn
columns:
  - name: zip_code
    type: string
    nullable: false
  - name: locality
    type: string
    nullable: false
  - name: effective_year
    type: integer
"#;

pub const ANES_CONTRACT: &str = r#"
dataset_id: anes
version: 1.0.0
natural_keys: [contractor, locality]
duplicate_policy: block
sheet: ANES
columns:
  - name: contractor
    type: string
    nullable: false
  - name: locality
    type: string
    nullable: false
  - name: locality_name
    type: string
  - name: conversion_factor
    type: decimal
    precision: 2
  - name: effective_date
    type: date
"#;

pub const PPRRVU_LAYOUTS: &str = r#"
layouts:
  - dataset: pprrvu
    year: 2025
    quarter: Q1
    version: 1.0.0
    min_line_length: 20
    columns:
      - {name: hcpcs, start: 0, end: 5, nullable: false}
      - {name: modifier, start: 5, end: 7}
      - {name: status_code, start: 7, end: 8, type: category}
      - {name: work_rvu, start: 8, end: 15, type: decimal, nullable: false}
      - {name: effective_date, start: 15, end: 23, type: date}
  - dataset: pprrvu
    year: 2024
    version: 0.9.0
    min_line_length: 20
    columns:
      - {name: hcpcs, start: 0, end: 5, nullable: false}
      - {name: modifier, start: 5, end: 7}
      - {name: status_code, start: 7, end: 8, type: category}
      - {name: work_rvu, start: 8, end: 15, type: decimal, nullable: false}
      - {name: effective_date, start: 15, end: 23, type: date}
"#;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` under the workspace, creating parent directories.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }
}

/// Committed sample files under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Writes the standard catalog into `workspace/catalog` and returns its path.
pub fn write_catalog(workspace: &TestWorkspace, parser_yml: Option<&str>) -> PathBuf {
    workspace.write("catalog/routes.yml", ROUTES);
    workspace.write("catalog/contracts/pprrvu.yml", PPRRVU_CONTRACT);
    workspace.write("catalog/contracts/gpci.yml", GPCI_CONTRACT);
    workspace.write("catalog/contracts/locality.yml", LOCALITY_CONTRACT);
    workspace.write("catalog/contracts/anes.yml", ANES_CONTRACT);
    workspace.write("catalog/layouts/pprrvu.yml", PPRRVU_LAYOUTS);
    if let Some(config) = parser_yml {
        workspace.write("catalog/parser.yml", config);
    }
    workspace.path().join("catalog")
}

pub fn load_catalog(parser_yml: Option<&str>) -> (TestWorkspace, Catalog) {
    let workspace = TestWorkspace::new();
    let dir = write_catalog(&workspace, parser_yml);
    let catalog = Catalog::load_dir(&dir).expect("catalog loads");
    (workspace, catalog)
}

pub fn q1_metadata() -> ParseMetadata {
    ParseMetadata::new("2025-Q1", 2025, Some("Q1")).with_source_uri("https://example.gov/pprrvu25_jan.zip")
}

/// One fixed-width PPRRVU record: hcpcs(5) modifier(2) status(1) rvu(7) date(8).
pub fn pprrvu_line(hcpcs: &str, modifier: &str, status: &str, rvu: &str) -> String {
    format!("{hcpcs:<5}{modifier:<2}{status:<1}{rvu:>7}20250101")
}

/// A title line, a column header line, `rows` data lines and a footer.
pub fn pprrvu_fixed_width(rows: usize) -> String {
    let statuses = ["A", "I", "R", "T"];
    let mut text = String::from("PPRRVU RELEASE\n");
    text.push_str("HCPCS MOD STATUS WORK_RVU EFFECTIVE_DATE\n");
    for idx in 0..rows {
        let hcpcs = format!("{:05}", 10000 + idx);
        let modifier = if idx % 3 == 0 { "26" } else { "" };
        let rvu = format!("{}.{:02}", idx % 7, (idx * 13) % 100);
        text.push_str(&pprrvu_line(&hcpcs, modifier, statuses[idx % 4], &rvu));
        text.push('\n');
    }
    text.push_str(&format!("TOTAL {rows}\n"));
    text
}

pub fn gpci_csv() -> String {
    [
        "MAC,State,Locality Number,Locality Name,2025 PW GPCI,PE GPCI",
        "10112,AL,00,ALABAMA,1.000,0.869",
        "02102,AK,01,ALASKA,1.500,1.081",
        "03102,AZ,00B,ARIZONA,1.000,N/A",
        "01112,CA,26,\"ANAHEIM, SANTA ANA\",1.049,1.177",
    ]
    .join("\n")
        + "\n"
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            zip.start_file(*name, options).expect("start member");
            zip.write_all(content).expect("write member");
        }
        zip.finish().expect("finish archive");
    }
    buffer
}
