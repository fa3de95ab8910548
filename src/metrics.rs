//! Per-parse metrics and provenance.
//!
//! Numeric min/max are computed over validated values only and report
//! `unavailable` for a column with no values instead of a sentinel number.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::{
    cast::{ColumnBinding, TypedRow},
    contract::SchemaContract,
    metadata::{ParseMetadata, Vintage},
    quarantine::RejectTable,
    raw::RawRow,
};

pub const UNAVAILABLE: &str = "unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum NumericRange {
    Available { min: String, max: String },
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseMetrics {
    pub dataset_id: String,
    pub schema_id: String,
    pub source_format: String,
    pub layout_version: Option<String>,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub reject_rows: usize,
    pub parse_duration_ms: u64,
    /// `None` for binary workbooks, which carry their own encoding.
    pub encoding_detected: Option<String>,
    pub encoding_fallback: bool,
    pub bom_detected: bool,
    pub delimiter: Option<String>,
    pub skipped_lines: usize,
    pub unmapped_columns: Vec<String>,
    pub archive_members: Vec<String>,
    /// Required columns only; `None` when there were no rows to measure.
    pub null_rates: BTreeMap<String, Option<f64>>,
    pub numeric_ranges: BTreeMap<String, NumericRange>,
    pub rejects_by_code: BTreeMap<String, usize>,
    pub reject_rate: f64,
    pub reject_rate_exceeded: bool,
}

impl ParseMetrics {
    pub fn record_rejects(&mut self, rejects: &RejectTable) {
        self.reject_rows = rejects.len();
        self.rejects_by_code.clear();
        for row in &rejects.rows {
            *self
                .rejects_by_code
                .entry(row.error_code.as_str().to_string())
                .or_default() += 1;
        }
        self.reject_rate = if self.total_rows == 0 {
            0.0
        } else {
            self.reject_rows as f64 / self.total_rows as f64
        };
    }

    /// Flags (and logs) a reject rate above the alert threshold.
    pub fn check_reject_rate(&mut self, threshold: f64) {
        self.reject_rate_exceeded = self.reject_rows > 0 && self.reject_rate > threshold;
        if self.reject_rate_exceeded {
            warn!(
                "Dataset '{}': reject rate {:.2}% exceeds alert threshold {:.2}% ({} of {} rows)",
                self.dataset_id,
                self.reject_rate * 100.0,
                threshold * 100.0,
                self.reject_rows,
                self.total_rows
            );
        }
    }

    /// Flattens into `key → scalar`, e.g. `null_rate.hcpcs` or `rejects.ROW_DUPLICATE`.
    pub fn to_flat_map(&self) -> BTreeMap<String, JsonValue> {
        let mut map = BTreeMap::new();
        map.insert("dataset_id".to_string(), json!(self.dataset_id));
        map.insert("schema_id".to_string(), json!(self.schema_id));
        map.insert("source_format".to_string(), json!(self.source_format));
        map.insert("layout_version".to_string(), json!(self.layout_version));
        map.insert("total_rows".to_string(), json!(self.total_rows));
        map.insert("valid_rows".to_string(), json!(self.valid_rows));
        map.insert("reject_rows".to_string(), json!(self.reject_rows));
        map.insert("parse_duration_ms".to_string(), json!(self.parse_duration_ms));
        map.insert("encoding_detected".to_string(), json!(self.encoding_detected));
        map.insert("encoding_fallback".to_string(), json!(self.encoding_fallback));
        map.insert("bom_detected".to_string(), json!(self.bom_detected));
        map.insert("delimiter".to_string(), json!(self.delimiter));
        map.insert("skipped_lines".to_string(), json!(self.skipped_lines));
        map.insert("unmapped_columns".to_string(), json!(self.unmapped_columns.join(",")));
        if !self.archive_members.is_empty() {
            map.insert("archive_members".to_string(), json!(self.archive_members.join(",")));
        }
        map.insert("reject_rate".to_string(), json!(self.reject_rate));
        map.insert(
            "reject_rate_exceeded".to_string(),
            json!(self.reject_rate_exceeded),
        );
        for (column, rate) in &self.null_rates {
            let value = match rate {
                Some(rate) => json!(rate),
                None => json!(UNAVAILABLE),
            };
            map.insert(format!("null_rate.{column}"), value);
        }
        for (column, range) in &self.numeric_ranges {
            let (min, max) = match range {
                NumericRange::Available { min, max } => (json!(min), json!(max)),
                NumericRange::Unavailable => (json!(UNAVAILABLE), json!(UNAVAILABLE)),
            };
            map.insert(format!("min.{column}"), min);
            map.insert(format!("max.{column}"), max);
        }
        for (code, count) in &self.rejects_by_code {
            map.insert(format!("rejects.{code}"), json!(count));
        }
        map
    }
}

/// Counts empty cells in required columns across every raw row, including
/// rows that later end up rejected.
#[derive(Debug, Clone, Default)]
pub struct NullTally {
    rows: usize,
    nulls: BTreeMap<String, usize>,
}

impl NullTally {
    pub fn new(contract: &SchemaContract) -> Self {
        Self {
            rows: 0,
            nulls: contract
                .columns
                .iter()
                .filter(|spec| spec.required())
                .map(|spec| (spec.name.clone(), 0))
                .collect(),
        }
    }

    pub fn observe(&mut self, rows: &[RawRow], binding: &ColumnBinding, contract: &SchemaContract) {
        self.rows += rows.len();
        for (idx, spec) in contract.columns.iter().enumerate() {
            let Some(count) = self.nulls.get_mut(&spec.name) else {
                continue;
            };
            *count += rows
                .iter()
                .filter(|row| binding.cell(row, idx, contract).is_none())
                .count();
        }
    }

    /// `None` per column when no rows were observed.
    pub fn rates(&self) -> BTreeMap<String, Option<f64>> {
        self.nulls
            .iter()
            .map(|(column, nulls)| {
                let rate = (self.rows > 0).then(|| *nulls as f64 / self.rows as f64);
                (column.clone(), rate)
            })
            .collect()
    }
}

/// Min/max of each numeric column over the validated rows.
pub fn numeric_ranges(rows: &[TypedRow], contract: &SchemaContract) -> BTreeMap<String, NumericRange> {
    contract
        .columns
        .iter()
        .enumerate()
        .filter(|(_, spec)| spec.datatype.is_numeric())
        .map(|(idx, spec)| {
            let mut present = rows.iter().filter_map(|row| row.values.get(idx)?.as_ref());
            let range = match present.next() {
                None => NumericRange::Unavailable,
                Some(first) => {
                    let (min, max) = present.fold((first, first), |(min, max), value| {
                        (min.min(value), max.max(value))
                    });
                    NumericRange::Available {
                        min: min.as_display(),
                        max: max.as_display(),
                    }
                }
            };
            (spec.name.clone(), range)
        })
        .collect()
}

/// Where a result came from. Callers inject [`Provenance::columns`] into their
/// persisted artifacts; these columns never enter the row hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub release_id: String,
    pub vintage: Vintage,
    pub source_uri: String,
    pub source_filename: String,
    pub file_checksum: String,
    pub dataset_id: String,
    pub schema_id: String,
    pub contract_version: String,
    pub layout_version: Option<String>,
    pub parser_version: String,
    pub parsed_at: DateTime<Utc>,
    pub host_os: String,
    pub host_arch: String,
}

impl Provenance {
    pub fn new(
        metadata: &ParseMetadata,
        filename: &str,
        file_checksum: String,
        contract: &SchemaContract,
        layout_version: Option<String>,
    ) -> Self {
        Self {
            release_id: metadata.release_id.clone(),
            vintage: metadata.vintage.clone(),
            source_uri: metadata.source_uri.clone(),
            source_filename: filename.to_string(),
            file_checksum,
            dataset_id: contract.dataset_id.clone(),
            schema_id: contract.schema_id(),
            contract_version: contract.version.clone(),
            layout_version,
            parser_version: crate::PARSER_VERSION.to_string(),
            parsed_at: Utc::now(),
            host_os: std::env::consts::OS.to_string(),
            host_arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Metadata columns appended to persisted rows.
    pub fn columns(&self) -> Vec<(&'static str, String)> {
        vec![
            ("release_id", self.release_id.clone()),
            ("vintage_year", self.vintage.product_year.to_string()),
            (
                "vintage_quarter",
                self.vintage.quarter.clone().unwrap_or_default(),
            ),
            (
                "published_at",
                self.vintage
                    .published_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
            ),
            ("source_uri", self.source_uri.clone()),
            ("file_checksum", self.file_checksum.clone()),
            ("schema_id", self.schema_id.clone()),
            (
                "layout_version",
                self.layout_version.clone().unwrap_or_default(),
            ),
            ("parser_version", self.parser_version.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cast::bind_columns,
        data::Value,
        error::RejectCode,
        quarantine::RejectRow,
    };

    fn contract() -> SchemaContract {
        SchemaContract::from_yaml_str(
            r#"
dataset_id: anes
version: 1.0.0
columns:
  - name: code
    type: string
    nullable: false
  - name: units
    type: integer
  - name: factor
    type: decimal
"#,
        )
        .unwrap()
    }

    #[test]
    fn null_rates_cover_required_columns_over_all_rows() {
        let contract = contract();
        let binding = bind_columns(&["code".to_string(), "units".to_string()], &contract).unwrap();
        let rows = vec![
            RawRow::new(2, vec!["00100".into(), "5".into()]),
            RawRow::new(3, vec![" ".into(), "".into()]),
        ];
        let mut tally = NullTally::new(&contract);
        assert_eq!(tally.rates()["code"], None);
        tally.observe(&rows, &binding, &contract);
        let rates = tally.rates();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates["code"], Some(0.5));
    }

    #[test]
    fn empty_numeric_columns_are_unavailable() {
        let contract = contract();
        let rows = vec![
            TypedRow::new(
                RawRow::new(2, vec![]),
                vec![Some(Value::String("a".into())), Some(Value::Integer(7)), None],
            ),
            TypedRow::new(
                RawRow::new(3, vec![]),
                vec![Some(Value::String("b".into())), Some(Value::Integer(-2)), None],
            ),
        ];
        let ranges = numeric_ranges(&rows, &contract);
        assert_eq!(
            ranges["units"],
            NumericRange::Available {
                min: "-2".into(),
                max: "7".into()
            }
        );
        assert_eq!(ranges["factor"], NumericRange::Unavailable);

        let mut metrics = ParseMetrics {
            numeric_ranges: ranges,
            ..ParseMetrics::default()
        };
        metrics.total_rows = 2;
        let flat = metrics.to_flat_map();
        assert_eq!(flat["min.factor"], json!("unavailable"));
        assert_eq!(flat["max.units"], json!("7"));
    }

    #[test]
    fn reject_counts_and_alert_threshold() {
        let mut table = RejectTable::new(vec![]);
        let row = RawRow::new(2, vec![]);
        table.extend([
            RejectRow::from_raw(&row, RejectCode::CategoryUnknown, "domain:x", "bad"),
            RejectRow::from_raw(&row, RejectCode::CategoryUnknown, "domain:x", "bad"),
            RejectRow::from_raw(&row, RejectCode::OutOfRange, "range:y", "bad"),
        ]);
        let mut metrics = ParseMetrics {
            total_rows: 10,
            ..ParseMetrics::default()
        };
        metrics.record_rejects(&table);
        metrics.check_reject_rate(0.05);
        let flat = metrics.to_flat_map();
        assert_eq!(flat["rejects.CATEGORY_UNKNOWN"], json!(2));
        assert_eq!(flat["rejects.OUT_OF_RANGE"], json!(1));
        assert_eq!(flat["reject_rate_exceeded"], json!(true));
        assert!((metrics.reject_rate - 0.3).abs() < f64::EPSILON);
    }
}
