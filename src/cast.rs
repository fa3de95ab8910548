//! Header binding and typed conversion of raw rows.
//!
//! Conversion never substitutes a default. A value that does not parse either
//! raises (required column) or sends its row to the reject table (optional
//! column); a blank or null-token cell becomes `None`.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    contract::{ColumnSpec, SchemaContract},
    data::{Value, parse_typed_value},
    error::{ParseError, ParseOutcome, RejectCode},
    normalize::{canonical_header, clean_value, normalize_header},
    quarantine::RejectRow,
    raw::RawRow,
};

/// How the source columns line up with the contract's declared columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    /// For each contract column (declared order), the source column feeding it.
    pub sources: Vec<Option<usize>>,
    /// Canonical source headers, in source order.
    pub canonical_headers: Vec<String>,
    /// Source headers with no counterpart in the contract.
    pub unmapped: Vec<String>,
    pub source_width: usize,
}

impl ColumnBinding {
    /// Cleaned cell for contract column `column`, or `None` when the column is
    /// absent from the source, the cell is blank or it holds a null token.
    pub fn cell<'r>(
        &self,
        row: &'r RawRow,
        column: usize,
        contract: &SchemaContract,
    ) -> Option<&'r str> {
        let source = self.sources.get(column).copied().flatten()?;
        let value = clean_value(row.values.get(source)?);
        if value.is_empty() || contract.is_null_token(value) {
            None
        } else {
            Some(value)
        }
    }

    pub fn is_bound(&self, column: usize) -> bool {
        self.sources.get(column).is_some_and(Option::is_some)
    }
}

fn resolve_column(contract: &SchemaContract, canonical: &str) -> Option<usize> {
    contract
        .column_index(canonical)
        .or_else(|| {
            contract
                .columns
                .iter()
                .position(|column| normalize_header(&column.name) == canonical)
        })
}

/// Canonicalizes source headers and maps them onto the contract.
///
/// A required column with no source header is a BLOCK; a nullable one is
/// filled with nulls. Two headers that canonicalize to the same column make
/// the mapping ambiguous and violate the contract.
pub fn bind_columns(headers: &[String], contract: &SchemaContract) -> ParseOutcome<ColumnBinding> {
    let schema_id = contract.schema_id();
    let canonical_headers = headers
        .iter()
        .map(|header| canonical_header(header, &contract.aliases))
        .collect::<Vec<_>>();

    let mut positions = HashMap::<usize, usize>::new();
    let mut unmapped = Vec::new();
    for (source_idx, canonical) in canonical_headers.iter().enumerate() {
        let Some(column_idx) = resolve_column(contract, canonical) else {
            unmapped.push(headers[source_idx].clone());
            continue;
        };
        if let Some(previous) = positions.insert(column_idx, source_idx) {
            return Err(ParseError::ContractViolation {
                schema_id,
                detail: format!(
                    "headers '{}' and '{}' both map to column '{}'",
                    headers[previous], headers[source_idx], contract.columns[column_idx].name
                ),
            });
        }
    }

    let mut sources = Vec::with_capacity(contract.columns.len());
    for (column_idx, column) in contract.columns.iter().enumerate() {
        let source = positions.get(&column_idx).copied();
        if source.is_none() {
            if column.required() {
                return Err(ParseError::RequiredColumnMissing {
                    column: column.name.clone(),
                    found: canonical_headers.clone(),
                });
            }
            debug!(
                "Column '{}' absent from source; filling with nulls",
                column.name
            );
        }
        sources.push(source);
    }
    if positions.is_empty() {
        return Err(ParseError::ContractViolation {
            schema_id,
            detail: format!(
                "no source header maps to a contract column (found: {})",
                canonical_headers.join(", ")
            ),
        });
    }

    Ok(ColumnBinding {
        sources,
        canonical_headers,
        unmapped,
        source_width: headers.len(),
    })
}

/// A validated row. `values` follow the contract's declared column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedRow {
    /// Position in the final sorted output.
    pub row_index: usize,
    pub values: Vec<Option<Value>>,
    pub row_hash: String,
    pub source: RawRow,
}

impl TypedRow {
    pub fn new(source: RawRow, values: Vec<Option<Value>>) -> Self {
        Self {
            row_index: 0,
            values,
            row_hash: String::new(),
            source,
        }
    }
}

#[derive(Debug, Default)]
pub struct CastOutcome {
    pub valid: Vec<TypedRow>,
    pub rejected: Vec<RejectRow>,
}

/// Rejects delimited records whose width differs from the header's.
pub fn screen_field_count(rows: Vec<RawRow>, binding: &ColumnBinding) -> (Vec<RawRow>, Vec<RejectRow>) {
    let mut kept = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    for row in rows {
        if row.values.len() == binding.source_width {
            kept.push(row);
        } else {
            let message = format!(
                "expected {} fields but found {}",
                binding.source_width,
                row.values.len()
            );
            rejected.push(RejectRow::from_raw(
                &row,
                RejectCode::FieldCountMismatch,
                "shape:field_count",
                message,
            ));
        }
    }
    (kept, rejected)
}

enum RowVerdict {
    Valid(Vec<Option<Value>>),
    Rejected(RejectRow),
}

fn out_of_range(spec: &ColumnSpec, value: &Value) -> Option<String> {
    let number = value.as_decimal()?;
    if let Some(min) = spec.min
        && number < min
    {
        return Some(format!("{number} is below the minimum {min}"));
    }
    if let Some(max) = spec.max
        && number > max
    {
        return Some(format!("{number} is above the maximum {max}"));
    }
    None
}

fn cast_row(row: &RawRow, binding: &ColumnBinding, contract: &SchemaContract) -> ParseOutcome<RowVerdict> {
    let mut values = Vec::with_capacity(contract.columns.len());
    for (idx, spec) in contract.columns.iter().enumerate() {
        let Some(raw) = binding.cell(row, idx, contract) else {
            if spec.required() {
                return Ok(RowVerdict::Rejected(RejectRow::from_raw(
                    row,
                    RejectCode::RequiredValueNull,
                    format!("required:{}", spec.name),
                    format!("column '{}' is required but empty", spec.name),
                )));
            }
            values.push(None);
            continue;
        };
        let value = match parse_typed_value(raw, &spec.datatype, spec.format.as_deref()) {
            Ok(value) => value,
            Err(_) if spec.required() => {
                return Err(ParseError::TypeCast {
                    line: row.line,
                    column: spec.name.clone(),
                    value: raw.to_string(),
                    expected: spec.datatype.to_string(),
                });
            }
            Err(err) => {
                return Ok(RowVerdict::Rejected(RejectRow::from_raw(
                    row,
                    RejectCode::TypeCastError,
                    format!("cast:{}", spec.name),
                    format!("column '{}': {err}", spec.name),
                )));
            }
        };
        if let Some(detail) = out_of_range(spec, &value) {
            return Ok(RowVerdict::Rejected(RejectRow::from_raw(
                row,
                RejectCode::OutOfRange,
                format!("range:{}", spec.name),
                format!("column '{}': {detail}", spec.name),
            )));
        }
        values.push(Some(value));
    }
    Ok(RowVerdict::Valid(values))
}

/// Converts rows that already passed the domain pre-check.
pub fn cast_rows(
    rows: Vec<RawRow>,
    binding: &ColumnBinding,
    contract: &SchemaContract,
) -> ParseOutcome<CastOutcome> {
    let mut outcome = CastOutcome::default();
    for row in rows {
        match cast_row(&row, binding, contract)? {
            RowVerdict::Valid(values) => outcome.valid.push(TypedRow::new(row, values)),
            RowVerdict::Rejected(reject) => outcome.rejected.push(reject),
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const CONTRACT: &str = r#"
dataset_id: gpci
version: 1.0.0
null_tokens: ["N/A"]
aliases:
  "Locality Number": locality
columns:
  - name: locality
    type: string
    nullable: false
  - name: work_gpci
    type: decimal
    nullable: false
    min: 0
    max: 2
  - name: effective_date
    type: date
  - name: pe_gpci
    type: decimal
"#;

    fn contract() -> SchemaContract {
        SchemaContract::from_yaml_str(CONTRACT).expect("contract")
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(line: usize, values: &[&str]) -> RawRow {
        RawRow::new(line, values.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn binding_uses_aliases_and_records_extras() {
        let contract = contract();
        let binding = bind_columns(
            &headers(&["Locality Number", "Work GPCI", "Notes", "Effective Date"]),
            &contract,
        )
        .expect("binding");
        assert_eq!(binding.sources, vec![Some(0), Some(1), Some(3), None]);
        assert_eq!(binding.unmapped, vec!["Notes".to_string()]);
        assert!(!binding.is_bound(3));
    }

    #[test]
    fn missing_required_column_blocks() {
        let err = bind_columns(&headers(&["locality", "pe_gpci"]), &contract()).expect_err("block");
        match err {
            ParseError::RequiredColumnMissing { column, found } => {
                assert_eq!(column, "work_gpci");
                assert_eq!(found, vec!["locality", "pe_gpci"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ambiguous_headers_violate_contract() {
        let err = bind_columns(
            &headers(&["locality", "Locality Number", "work_gpci"]),
            &contract(),
        )
        .expect_err("ambiguous");
        assert!(matches!(err, ParseError::ContractViolation { .. }));
    }

    #[test]
    fn rows_cast_and_reject_without_coercion() {
        let contract = contract();
        let binding = bind_columns(
            &headers(&["locality", "work_gpci", "effective_date", "pe_gpci"]),
            &contract,
        )
        .unwrap();
        let rows = vec![
            row(2, &["01", "1.000", "2025-01-01", " 0.9 "]),
            row(3, &["02", "1.5", "N/A", "abc"]),
            row(4, &["03", "2.5", "", ""]),
            row(5, &["", "1.0", "", ""]),
        ];
        let outcome = cast_rows(rows, &binding, &contract).expect("cast");
        assert_eq!(outcome.valid.len(), 1);
        let first = &outcome.valid[0];
        assert_eq!(
            first.values[1],
            Some(Value::Decimal(Decimal::from_str("1.000").unwrap()))
        );
        assert_eq!(
            first.values[3],
            Some(Value::Decimal(Decimal::from_str("0.9").unwrap()))
        );
        let codes = outcome
            .rejected
            .iter()
            .map(|r| (r.source_line, r.error_code))
            .collect::<Vec<_>>();
        assert_eq!(
            codes,
            vec![
                (3, RejectCode::TypeCastError),
                (4, RejectCode::OutOfRange),
                (5, RejectCode::RequiredValueNull),
            ]
        );
        assert_eq!(outcome.rejected[0].rule_id, "cast:pe_gpci");
    }

    #[test]
    fn cast_failure_on_required_column_blocks_with_context() {
        let contract = contract();
        let binding = bind_columns(&headers(&["locality", "work_gpci"]), &contract).unwrap();
        let err = cast_rows(vec![row(7, &["01", "one"])], &binding, &contract).expect_err("block");
        match err {
            ParseError::TypeCast {
                line,
                column,
                value,
                expected,
            } => {
                assert_eq!(line, 7);
                assert_eq!(column, "work_gpci");
                assert_eq!(value, "one");
                assert_eq!(expected, "decimal");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn field_count_screen_quarantines_ragged_records() {
        let contract = contract();
        let binding = bind_columns(&headers(&["locality", "work_gpci"]), &contract).unwrap();
        let (kept, rejected) = screen_field_count(
            vec![row(2, &["01", "1.0"]), row(3, &["02", "1.0", "extra"])],
            &binding,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(rejected[0].error_code, RejectCode::FieldCountMismatch);
        assert_eq!(rejected[0].values.len(), 3);
    }
}
