//! File I/O for the operator binary.
//!
//! The parsing core never touches the filesystem; everything the binary reads
//! or persists goes through here:
//!
//! - **Input**: whole-file reads, with `-` meaning stdin.
//! - **Artifacts**: data and reject CSVs with provenance columns appended, and
//!   a JSON metrics record.
//! - **Encoding**: artifacts can be transcoded from UTF-8 via `encoding_rs`.
//! - **Quoting**: CSV output uses `QuoteStyle::Always` for round-trip safety.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use serde_json::json;

use crate::{ParseResult, metrics::Provenance};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn read_input_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if is_dash(path) {
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Reading source from stdin")?;
    } else {
        File::open(path)
            .with_context(|| format!("Opening input file {path:?}"))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("Reading input file {path:?}"))?;
    }
    Ok(bytes)
}

/// Leading bytes of a file for routing, or `None` when the file does not exist.
pub fn read_prefix(path: &Path, limit: usize) -> Result<Option<Vec<u8>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut prefix = Vec::with_capacity(limit);
    File::open(path)
        .with_context(|| format!("Opening input file {path:?}"))?
        .take(limit as u64)
        .read_to_end(&mut prefix)
        .with_context(|| format!("Reading input file {path:?}"))?;
    Ok(Some(prefix))
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn open_csv_writer(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = Box::new(BufWriter::new(
        File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
    ));
    let writer: Box<dyn Write> = if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

/// Where [`write_artifacts`] put each file.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub data: PathBuf,
    pub rejects: PathBuf,
    pub metrics: PathBuf,
}

fn provenance_headers(provenance: &Provenance) -> Vec<String> {
    provenance
        .columns()
        .into_iter()
        .map(|(name, _)| name.to_string())
        .collect()
}

fn provenance_values(provenance: &Provenance) -> Vec<String> {
    provenance
        .columns()
        .into_iter()
        .map(|(_, value)| value)
        .collect()
}

fn artifact_extension(delimiter: u8) -> &'static str {
    if delimiter == DEFAULT_TSV_DELIMITER {
        "tsv"
    } else {
        "csv"
    }
}

/// Persists one parse as `<stem>.data.csv`, `<stem>.rejects.csv` and
/// `<stem>.metrics.json` inside `out_dir` (`.tsv` for tab-delimited output).
pub fn write_artifacts(
    result: &ParseResult,
    out_dir: &Path,
    stem: &str,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<ArtifactPaths> {
    fs::create_dir_all(out_dir).with_context(|| format!("Creating output directory {out_dir:?}"))?;
    let extension = artifact_extension(delimiter);
    let paths = ArtifactPaths {
        data: out_dir.join(format!("{stem}.data.{extension}")),
        rejects: out_dir.join(format!("{stem}.rejects.{extension}")),
        metrics: out_dir.join(format!("{stem}.metrics.json")),
    };
    write_data(result, &paths.data, delimiter, encoding)?;
    write_rejects(result, &paths.rejects, delimiter, encoding)?;
    write_metrics(result, &paths.metrics)?;
    Ok(paths)
}

fn write_data(
    result: &ParseResult,
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    let mut writer = open_csv_writer(path, delimiter, encoding)?;
    let mut headers = vec!["row_index".to_string()];
    headers.extend(result.data.columns.iter().cloned());
    headers.push("row_hash".to_string());
    headers.push("source_id".to_string());
    headers.extend(provenance_headers(&result.provenance));
    writer
        .write_record(&headers)
        .with_context(|| format!("Writing header to {path:?}"))?;

    let provenance = provenance_values(&result.provenance);
    for row in &result.data.rows {
        let mut record = Vec::with_capacity(headers.len());
        record.push(row.row_index.to_string());
        record.extend(
            row.values
                .iter()
                .map(|value| value.as_ref().map(|v| v.as_display()).unwrap_or_default()),
        );
        record.push(row.row_hash.clone());
        record.push(row.source.source_id());
        record.extend(provenance.iter().cloned());
        writer
            .write_record(&record)
            .with_context(|| format!("Writing row to {path:?}"))?;
    }
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}

fn write_rejects(
    result: &ParseResult,
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    let mut writer = open_csv_writer(path, delimiter, encoding)?;
    let width = result
        .rejects
        .rows
        .iter()
        .map(|row| row.values.len())
        .max()
        .unwrap_or(0)
        .max(result.rejects.columns.len());
    let mut headers = vec!["source_id".to_string(), "source_line".to_string()];
    headers.extend((0..width).map(|idx| {
        result
            .rejects
            .columns
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("field_{}", idx + 1))
    }));
    headers.extend(
        ["error_code", "error_message", "rule_id", "severity"]
            .iter()
            .map(|s| s.to_string()),
    );
    headers.extend(provenance_headers(&result.provenance));
    writer
        .write_record(&headers)
        .with_context(|| format!("Writing header to {path:?}"))?;

    let provenance = provenance_values(&result.provenance);
    for row in &result.rejects.rows {
        let mut record = vec![row.source_id.clone(), row.source_line.to_string()];
        record.extend((0..width).map(|idx| row.values.get(idx).cloned().unwrap_or_default()));
        record.push(row.error_code.to_string());
        record.push(row.error_message.clone());
        record.push(row.rule_id.clone());
        record.push(row.severity.to_string());
        record.extend(provenance.iter().cloned());
        writer
            .write_record(&record)
            .with_context(|| format!("Writing reject to {path:?}"))?;
    }
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}

fn write_metrics(result: &ParseResult, path: &Path) -> Result<()> {
    let record = json!({
        "metrics": result.metrics.to_flat_map(),
        "provenance": result.provenance,
    });
    let file = File::create(path).with_context(|| format!("Creating metrics file {path:?}"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &record)
        .with_context(|| format!("Writing metrics to {path:?}"))?;
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}

struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    buffer: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            buffer: Vec::new(),
        }
    }

    /// Encodes every complete UTF-8 sequence in the buffer. A trailing partial
    /// sequence waits for more input unless `force` is set.
    fn flush_buffer(&mut self, force: bool) -> io::Result<()> {
        let valid_up_to = match std::str::from_utf8(&self.buffer) {
            Ok(_) => self.buffer.len(),
            Err(err) if err.error_len().is_some() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid UTF-8 sequence in output stream",
                ));
            }
            Err(err) => err.valid_up_to(),
        };
        if force && valid_up_to < self.buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Incomplete UTF-8 sequence at end of output stream",
            ));
        }
        if valid_up_to == 0 {
            return Ok(());
        }
        let pending = self.buffer.split_off(valid_up_to);
        let text = String::from_utf8(std::mem::replace(&mut self.buffer, pending))
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let (encoded, _, had_errors) = self.encoding.encode(&text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to encode text using {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(encoded.as_ref())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.flush_buffer(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer(true)?;
        self.inner.flush()
    }
}
