//! Natural-key uniqueness under the dataset's duplicate policy.

use std::collections::BTreeMap;

use log::warn;

use crate::{
    cast::TypedRow,
    contract::{DuplicatePolicy, SchemaContract},
    data::ComparableValue,
    error::{DuplicateKeyGroup, ParseError, ParseOutcome, RejectCode},
    quarantine::RejectRow,
};

pub fn key_of(row: &TypedRow, key_indices: &[usize]) -> Vec<ComparableValue> {
    key_indices
        .iter()
        .map(|idx| ComparableValue(row.values.get(*idx).cloned().flatten()))
        .collect()
}

fn display_key(key: &[ComparableValue]) -> Vec<String> {
    key.iter()
        .map(|value| {
            value
                .0
                .as_ref()
                .map(|v| v.as_display())
                .unwrap_or_default()
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct UniquenessOutcome {
    pub kept: Vec<TypedRow>,
    pub rejected: Vec<RejectRow>,
}

/// Groups rows by natural key. Under `block` any repeated key fails the parse
/// with every offending group listed; under `warn` the first occurrence in
/// source order survives and the rest become `ROW_DUPLICATE` rejects.
pub fn enforce_unique(rows: Vec<TypedRow>, contract: &SchemaContract) -> ParseOutcome<UniquenessOutcome> {
    let key_indices = contract.natural_key_indices();
    if key_indices.is_empty() {
        return Ok(UniquenessOutcome {
            kept: rows,
            rejected: Vec::new(),
        });
    }

    let mut groups = BTreeMap::<Vec<ComparableValue>, Vec<usize>>::new();
    for (position, row) in rows.iter().enumerate() {
        groups.entry(key_of(row, &key_indices)).or_default().push(position);
    }
    let mut duplicates = groups
        .into_iter()
        .filter(|(_, positions)| positions.len() > 1)
        .collect::<Vec<_>>();
    if duplicates.is_empty() {
        return Ok(UniquenessOutcome {
            kept: rows,
            rejected: Vec::new(),
        });
    }
    duplicates.sort_by_key(|(_, positions)| positions[0]);

    let rule_id = format!("unique:{}", contract.natural_keys.join("+"));
    match contract.duplicate_policy {
        DuplicatePolicy::Block => {
            let groups = duplicates
                .iter()
                .map(|(key, positions)| DuplicateKeyGroup {
                    key: display_key(key),
                    lines: positions.iter().map(|p| rows[*p].source.line).collect(),
                })
                .collect();
            Err(ParseError::DuplicateKey {
                dataset_id: contract.dataset_id.clone(),
                key_columns: contract.natural_keys.clone(),
                groups,
            })
        }
        DuplicatePolicy::Warn => {
            let mut first_of = vec![None; rows.len()];
            for (_, positions) in &duplicates {
                let first = positions[0];
                for position in &positions[1..] {
                    first_of[*position] = Some(first);
                }
            }
            let first_ids = first_of
                .iter()
                .map(|first| first.map(|p| rows[p].source.source_id()))
                .collect::<Vec<_>>();
            let mut outcome = UniquenessOutcome::default();
            for (row, first_id) in rows.into_iter().zip(first_ids) {
                match first_id {
                    None => outcome.kept.push(row),
                    Some(first_id) => {
                        let message = format!(
                            "natural key ({}) already seen at {first_id}",
                            display_key(&key_of(&row, &key_indices)).join(", ")
                        );
                        outcome.rejected.push(
                            RejectRow::from_raw(&row.source, RejectCode::RowDuplicate, &rule_id, message)
                                .with_severity(contract.duplicate_policy.severity()),
                        );
                    }
                }
            }
            warn!(
                "Dataset '{}': quarantined {} duplicate row(s) across {} key(s)",
                contract.dataset_id,
                outcome.rejected.len(),
                duplicates.len()
            );
            Ok(outcome)
        }
    }
}
