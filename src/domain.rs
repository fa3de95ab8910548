//! Enumerated-domain pre-check, run on the raw strings before any conversion.
//!
//! Checking after conversion would let an unknown code slip through as null,
//! so membership is decided here and the row is either kept intact, moved to
//! the reject table, or (for `block` severity) the whole parse is stopped.

use std::collections::HashSet;

use crate::{
    cast::ColumnBinding,
    contract::{ColumnSpec, SchemaContract},
    error::{ParseError, ParseOutcome, RejectCode, Severity},
    quarantine::RejectRow,
    raw::RawRow,
};

struct DomainColumn<'c> {
    index: usize,
    spec: &'c ColumnSpec,
    allowed: HashSet<&'c str>,
}

fn domain_columns<'c>(contract: &'c SchemaContract, binding: &ColumnBinding) -> Vec<DomainColumn<'c>> {
    contract
        .columns
        .iter()
        .enumerate()
        .filter(|(index, _)| binding.is_bound(*index))
        .filter_map(|(index, spec)| {
            spec.domain.as_ref().map(|domain| DomainColumn {
                index,
                spec,
                allowed: domain.iter().map(String::as_str).collect(),
            })
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct DomainOutcome {
    pub kept: Vec<RawRow>,
    pub rejected: Vec<RejectRow>,
}

/// Splits rows into in-domain (or null) and out-of-domain. Null handling is
/// left to the caster, which knows whether the column is nullable.
pub fn partition(
    rows: Vec<RawRow>,
    binding: &ColumnBinding,
    contract: &SchemaContract,
) -> ParseOutcome<DomainOutcome> {
    let columns = domain_columns(contract, binding);
    if columns.is_empty() {
        return Ok(DomainOutcome {
            kept: rows,
            rejected: Vec::new(),
        });
    }

    let mut outcome = DomainOutcome::default();
    'rows: for row in rows {
        for column in &columns {
            let Some(value) = binding.cell(&row, column.index, contract) else {
                continue;
            };
            if column.allowed.contains(value) {
                continue;
            }
            let allowed = column.spec.domain.clone().unwrap_or_default();
            if column.spec.domain_severity == Severity::Block {
                return Err(ParseError::CategoryBlocked {
                    line: row.line,
                    column: column.spec.name.clone(),
                    value: value.to_string(),
                    allowed,
                });
            }
            let message = format!(
                "column '{}' value '{value}' is not one of [{}]",
                column.spec.name,
                allowed.join(", ")
            );
            let reject = RejectRow::from_raw(
                &row,
                RejectCode::CategoryUnknown,
                format!("domain:{}", column.spec.name),
                message,
            )
            .with_severity(column.spec.domain_severity);
            outcome.rejected.push(reject);
            continue 'rows;
        }
        outcome.kept.push(row);
    }
    Ok(outcome)
}
