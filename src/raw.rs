//! Untyped table produced by the format readers, before any casting.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// 1-based line (text) or row (workbook) number in the source.
    pub line: usize,
    /// Archive member the row came from, when the source was a ZIP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    pub values: Vec<String>,
}

impl RawRow {
    pub fn new(line: usize, values: Vec<String>) -> Self {
        Self {
            line,
            member: None,
            values,
        }
    }

    /// Stable identifier that traces a reject back to its source row.
    pub fn source_id(&self) -> String {
        match &self.member {
            Some(member) => format!("{member}:{}", self.line),
            None => self.line.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    /// Headers as they appeared in the source (fixed-width: layout names).
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Leading/trailing lines discarded as header or footer noise.
    pub skipped_lines: usize,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
            skipped_lines: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Marks every row as coming from the named archive member.
    pub fn tag_member(&mut self, member: &str) {
        for row in &mut self.rows {
            row.member = Some(member.to_string());
        }
    }
}
