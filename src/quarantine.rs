//! Reject rows and the row-accounting invariant.
//!
//! Every row that leaves the valid set is kept here in its original shape with
//! the code, rule and severity that removed it, so that
//! `total_rows == valid_rows + reject_rows` always holds.

use serde::{Deserialize, Serialize};

use crate::{
    error::{ParseError, ParseOutcome, RejectCode, Severity},
    raw::RawRow,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRow {
    /// `line` or `member:line`; stable across runs of the same input.
    pub source_id: String,
    pub source_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_member: Option<String>,
    pub values: Vec<String>,
    pub error_code: RejectCode,
    pub error_message: String,
    pub rule_id: String,
    pub severity: Severity,
}

impl RejectRow {
    pub fn from_raw(
        row: &RawRow,
        error_code: RejectCode,
        rule_id: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            source_id: row.source_id(),
            source_line: row.line,
            source_member: row.member.clone(),
            values: row.values.clone(),
            error_code,
            error_message: error_message.into(),
            rule_id: rule_id.into(),
            severity: Severity::Warn,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectTable {
    /// Source headers, so reject values line up with the original file.
    pub columns: Vec<String>,
    pub rows: Vec<RejectRow>,
}

impl RejectTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = RejectRow>) {
        self.rows.extend(rows);
    }

    /// Orders rejects by source position so the table does not depend on which
    /// stage (or chunk) produced each row.
    pub fn sort_by_source(&mut self) {
        self.rows.sort_by(|a, b| {
            a.source_member
                .cmp(&b.source_member)
                .then(a.source_line.cmp(&b.source_line))
        });
    }
}

pub fn check_join_invariant(total: usize, valid: usize, rejected: usize) -> ParseOutcome<()> {
    if total == valid + rejected {
        Ok(())
    } else {
        Err(ParseError::JoinInvariant {
            total,
            valid,
            rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_keep_original_shape_and_trace_id() {
        let mut row = RawRow::new(12, vec!["99213".to_string(), "Z".to_string()]);
        row.member = Some("PPRRVU.txt".to_string());
        let reject = RejectRow::from_raw(
            &row,
            RejectCode::CategoryUnknown,
            "domain:status_code",
            "value 'Z' not in domain",
        );
        assert_eq!(reject.source_id, "PPRRVU.txt:12");
        assert_eq!(reject.values, row.values);
        assert_eq!(reject.severity, Severity::Warn);
    }

    #[test]
    fn sort_by_source_is_stable_within_a_line() {
        let a = RawRow::new(5, vec![]);
        let b = RawRow::new(2, vec![]);
        let mut table = RejectTable::new(vec![]);
        table.extend([
            RejectRow::from_raw(&a, RejectCode::RowDuplicate, "r1", "first"),
            RejectRow::from_raw(&b, RejectCode::TypeCastError, "r2", "second"),
            RejectRow::from_raw(&a, RejectCode::OutOfRange, "r3", "third"),
        ]);
        table.sort_by_source();
        let rules = table.rows.iter().map(|r| r.rule_id.as_str()).collect::<Vec<_>>();
        assert_eq!(rules, vec!["r2", "r1", "r3"]);
    }

    #[test]
    fn join_invariant_detects_lost_rows() {
        assert!(check_join_invariant(10, 7, 3).is_ok());
        assert!(matches!(
            check_join_invariant(10, 7, 2),
            Err(ParseError::JoinInvariant { .. })
        ));
    }
}
