//! BLOCK-severity outcomes and the severity/reject-code vocabulary.
//!
//! A parse either returns a [`crate::ParseResult`] (rejects included) or fails
//! with one of the [`ParseError`] variants below. WARN-level problems never
//! surface here; they travel as reject rows tagged with a [`RejectCode`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Block,
    #[default]
    Warn,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Block => "BLOCK",
            Severity::Warn => "WARN",
            Severity::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    CategoryUnknown,
    TypeCastError,
    RowDuplicate,
    OutOfRange,
    RequiredValueNull,
    FieldCountMismatch,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::CategoryUnknown => "CATEGORY_UNKNOWN",
            RejectCode::TypeCastError => "TYPE_CAST_ERROR",
            RejectCode::RowDuplicate => "ROW_DUPLICATE",
            RejectCode::OutOfRange => "OUT_OF_RANGE",
            RejectCode::RequiredValueNull => "REQUIRED_VALUE_NULL",
            RejectCode::FieldCountMismatch => "FIELD_COUNT_MISMATCH",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One natural-key combination that occurs more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateKeyGroup {
    pub key: Vec<String>,
    pub lines: Vec<usize>,
}

impl fmt::Display for DuplicateKeyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self
            .lines
            .iter()
            .map(|line| line.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({}) at lines [{}]", self.key.join(", "), lines)
    }
}

fn describe_groups(groups: &[DuplicateKeyGroup]) -> String {
    groups
        .iter()
        .map(|group| group.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("No route matches file '{filename}'")]
    Routing { filename: String },

    #[error("Encoding undecidable: {reason}")]
    EncodingUndecidable { reason: String },

    #[error("Delimiter undecidable after sampling {sampled_lines} line(s): {reason}")]
    DialectUndecidable { sampled_lines: usize, reason: String },

    #[error("No layout registered for dataset '{dataset}' year {year} quarter {quarter}")]
    LayoutNotFound {
        dataset: String,
        year: i32,
        quarter: String,
    },

    #[error("Layout mismatch for dataset '{dataset}' (layout {version}): {detail}")]
    LayoutMismatch {
        dataset: String,
        version: String,
        detail: String,
    },

    #[error("Required column '{column}' missing from source; found [{}]", .found.join(", "))]
    RequiredColumnMissing { column: String, found: Vec<String> },

    #[error("Schema contract '{schema_id}' violated: {detail}")]
    ContractViolation { schema_id: String, detail: String },

    #[error("Schema contract '{schema_id}' is not registered")]
    ContractNotFound { schema_id: String },

    #[error("Line {line}: column '{column}' expected {expected} but found '{value}'")]
    TypeCast {
        line: usize,
        column: String,
        value: String,
        expected: String,
    },

    #[error(
        "Line {line}: column '{column}' value '{value}' is outside domain [{}]",
        .allowed.join(", ")
    )]
    CategoryBlocked {
        line: usize,
        column: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error(
        "Duplicate natural key ({}) in dataset '{dataset_id}': {}",
        .key_columns.join(", "),
        describe_groups(.groups)
    )]
    DuplicateKey {
        dataset_id: String,
        key_columns: Vec<String>,
        groups: Vec<DuplicateKeyGroup>,
    },

    #[error("Checksum mismatch: caller supplied {expected} but content hashes to {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Archive unreadable: {detail}")]
    Archive { detail: String },

    #[error("Workbook unreadable: {detail}")]
    Workbook { detail: String },

    #[error("Delimited text unreadable: {0}")]
    Delimited(#[from] csv::Error),

    #[error("Reading source failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Row accounting broken: {total} total but {valid} valid + {rejected} rejected")]
    JoinInvariant {
        total: usize,
        valid: usize,
        rejected: usize,
    },
}

impl ParseError {
    /// Stable identifier for alerting and for the operator binary's exit report.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::Routing { .. } => "ROUTING",
            ParseError::EncodingUndecidable { .. } => "ENCODING_UNDECIDABLE",
            ParseError::DialectUndecidable { .. } => "DIALECT_UNDECIDABLE",
            ParseError::LayoutNotFound { .. } => "LAYOUT_NOT_FOUND",
            ParseError::LayoutMismatch { .. } => "LAYOUT_MISMATCH",
            ParseError::RequiredColumnMissing { .. } => "REQUIRED_COLUMN_MISSING",
            ParseError::ContractViolation { .. } => "CONTRACT_VIOLATION",
            ParseError::ContractNotFound { .. } => "CONTRACT_NOT_FOUND",
            ParseError::TypeCast { .. } => "TYPE_CAST_BLOCK",
            ParseError::CategoryBlocked { .. } => "CATEGORY_BLOCK",
            ParseError::DuplicateKey { .. } => "DUPLICATE_KEY",
            ParseError::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            ParseError::Archive { .. } => "ARCHIVE",
            ParseError::Workbook { .. } => "WORKBOOK",
            ParseError::Delimited(_) => "DELIMITED",
            ParseError::Io(_) => "IO",
            ParseError::JoinInvariant { .. } => "JOIN_INVARIANT",
        }
    }
}

pub type ParseOutcome<T> = std::result::Result<T, ParseError>;
