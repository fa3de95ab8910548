use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SNIFF_BYTES: usize = 8 * 1024;
pub const DEFAULT_DIALECT_SAMPLE_LINES: usize = 20;
pub const DEFAULT_MAX_ARCHIVE_MEMBER_BYTES: u64 = 2 * 1024 * 1024 * 1024;
pub const DEFAULT_REJECT_RATE_ALERT_THRESHOLD: f64 = 0.05;

/// Process-wide parser settings, loaded once alongside the registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Bytes read from the front of a file for routing and encoding sniffing.
    pub sniff_bytes: usize,
    pub dialect_sample_lines: usize,
    /// Validate rows in chunks of this size. Output is identical either way.
    pub chunk_rows: Option<usize>,
    pub max_archive_member_bytes: u64,
    pub reject_rate_alert_threshold: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            sniff_bytes: DEFAULT_SNIFF_BYTES,
            dialect_sample_lines: DEFAULT_DIALECT_SAMPLE_LINES,
            chunk_rows: None,
            max_archive_member_bytes: DEFAULT_MAX_ARCHIVE_MEMBER_BYTES,
            reject_rate_alert_threshold: DEFAULT_REJECT_RATE_ALERT_THRESHOLD,
        }
    }
}

impl ParserConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: ParserConfig = serde_yaml::from_str(raw).context("Parsing parser config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening parser config {path:?}"))?;
        let config: ParserConfig =
            serde_yaml::from_reader(BufReader::new(file)).context("Parsing parser config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.sniff_bytes > 0, "sniff_bytes must be positive");
        ensure!(
            self.dialect_sample_lines > 0,
            "dialect_sample_lines must be positive"
        );
        ensure!(
            self.chunk_rows.is_none_or(|rows| rows > 0),
            "chunk_rows must be positive when set"
        );
        ensure!(
            (0.0..=1.0).contains(&self.reject_rate_alert_threshold),
            "reject_rate_alert_threshold must be within [0, 1]"
        );
        Ok(())
    }
}
