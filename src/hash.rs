//! Row content hashing and deterministic ordering.
//!
//! Canonical form per value: null is empty, numbers are fixed-point at the
//! column's hash precision (round half away from zero on the exact decimal),
//! dates are `YYYY-MM-DD`, datetimes are ISO-8601 UTC with a `Z` suffix,
//! strings are trimmed with case preserved. Values are joined with the ASCII
//! unit separator and digested with SHA-256. Changing any of these rules
//! changes every hash and needs a major version bump of the crate.

use rust_decimal::{Decimal, RoundingStrategy};
use sha2::{Digest, Sha256};

use crate::{
    cast::TypedRow,
    contract::SchemaContract,
    data::Value,
    keys::key_of,
};

pub const FIELD_SEPARATOR: char = '\u{1F}';

fn fixed_point(value: Decimal, precision: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(precision);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded.to_string()
}

pub fn canonical_value(value: Option<&Value>, precision: u32) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Integer(i)) => fixed_point(Decimal::from(*i), precision),
        Some(Value::Decimal(d)) => fixed_point(*d, precision),
        Some(Value::Boolean(b)) => b.to_string(),
        Some(Value::Date(d)) => d.format("%Y-%m-%d").to_string(),
        Some(Value::DateTime(dt)) => dt.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string(),
    }
}

/// Hashes rows of one contract. Precisions follow the declared column order.
#[derive(Debug, Clone)]
pub struct RowHasher {
    precisions: Vec<u32>,
}

impl RowHasher {
    pub fn new(precisions: Vec<u32>) -> Self {
        Self { precisions }
    }

    pub fn for_contract(contract: &SchemaContract) -> Self {
        Self::new(contract.columns.iter().map(|c| c.hash_precision()).collect())
    }

    pub fn canonical_row(&self, values: &[Option<Value>]) -> String {
        let mut canonical = String::new();
        for (idx, value) in values.iter().enumerate() {
            if idx > 0 {
                canonical.push(FIELD_SEPARATOR);
            }
            let precision = self
                .precisions
                .get(idx)
                .copied()
                .unwrap_or(crate::contract::DEFAULT_HASH_PRECISION);
            canonical.push_str(&canonical_value(value.as_ref(), precision));
        }
        canonical
    }

    /// Full 64-character lowercase hex digest.
    pub fn hash(&self, values: &[Option<Value>]) -> String {
        let digest = Sha256::digest(self.canonical_row(values).as_bytes());
        hex::encode(digest)
    }
}

/// Fills `row_hash`, stable-sorts by natural key and renumbers `row_index`.
pub fn finalize_rows(rows: &mut [TypedRow], contract: &SchemaContract) {
    let hasher = RowHasher::for_contract(contract);
    for row in rows.iter_mut() {
        row.row_hash = hasher.hash(&row.values);
    }
    let key_indices = contract.natural_key_indices();
    if !key_indices.is_empty() {
        rows.sort_by_cached_key(|row| key_of(row, &key_indices));
    }
    for (idx, row) in rows.iter_mut().enumerate() {
        row.row_index = idx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::RawRow;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn decimals_round_half_up_on_exact_values() {
        assert_eq!(canonical_value(Some(&Value::Decimal(dec("1.495"))), 2), "1.50");
        assert_eq!(canonical_value(Some(&Value::Decimal(dec("2.675"))), 2), "2.68");
        assert_eq!(canonical_value(Some(&Value::Decimal(dec("-1.005"))), 2), "-1.01");
        assert_eq!(canonical_value(Some(&Value::Decimal(dec("0.5"))), 6), "0.500000");
        assert_eq!(canonical_value(Some(&Value::Decimal(dec("-0.0001"))), 2), "0.00");
    }

    #[test]
    fn integers_use_fixed_point_precision() {
        assert_eq!(canonical_value(Some(&Value::Integer(42)), 6), "42.000000");
        assert_eq!(canonical_value(Some(&Value::Integer(-7)), 2), "-7.00");
        assert_eq!(canonical_value(Some(&Value::Integer(42)), 0), "42");
    }

    #[test]
    fn null_and_strings_canonicalize() {
        assert_eq!(canonical_value(None, 6), "");
        assert_eq!(canonical_value(Some(&Value::String("  MiXed ".into())), 6), "MiXed");
    }

    #[test]
    fn digest_matches_reference_value() {
        let hasher = RowHasher::new(vec![6, 2, 6, 6, 6]);
        let values = vec![
            Some(Value::String("99213".into())),
            Some(Value::Decimal(dec("1.495"))),
            Some(Value::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())),
            None,
            Some(Value::Boolean(true)),
        ];
        assert_eq!(
            hasher.canonical_row(&values),
            "99213\u{1F}1.50\u{1F}2025-01-01\u{1F}\u{1F}true"
        );
        assert_eq!(
            hasher.hash(&values),
            "abf52b950baf3e0d9e19289a7a0e9c931ec7db6a5340c110121747952d40c45c"
        );
    }

    #[test]
    fn equal_values_at_precision_hash_equal() {
        let hasher = RowHasher::new(vec![2]);
        assert_eq!(
            hasher.hash(&[Some(Value::Decimal(dec("1.5")))]),
            hasher.hash(&[Some(Value::Decimal(dec("1.500")))])
        );
    }

    #[test]
    fn finalize_sorts_stably_and_renumbers() {
        let contract = SchemaContract::from_yaml_str(
            r#"
dataset_id: zip_locality
version: 1.0.0
natural_keys: [zip]
columns:
  - name: zip
    type: string
  - name: locality
    type: string
"#,
        )
        .unwrap();
        let make = |line: usize, zip: &str, locality: &str| {
            TypedRow::new(
                RawRow::new(line, vec![]),
                vec![
                    Some(Value::String(zip.into())),
                    Some(Value::String(locality.into())),
                ],
            )
        };
        let mut rows = vec![make(2, "94110", "05"), make(3, "10001", "01"), make(4, "94110", "06")];
        finalize_rows(&mut rows, &contract);
        let order = rows.iter().map(|r| r.source.line).collect::<Vec<_>>();
        assert_eq!(order, vec![3, 2, 4]);
        assert_eq!(rows.iter().map(|r| r.row_index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(rows.iter().all(|r| r.row_hash.len() == 64));
    }
}
