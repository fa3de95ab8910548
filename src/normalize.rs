//! Header canonicalization and cell cleanup.
//!
//! Both operations are idempotent: feeding canonical output back in returns it
//! unchanged.

use std::collections::BTreeMap;

use heck::ToSnakeCase;

const NBSP: char = '\u{00A0}';

fn is_blank(c: char) -> bool {
    c.is_whitespace() || c == NBSP || c == '\u{FEFF}'
}

/// Trims whitespace, non-breaking spaces and stray BOM characters from both ends.
pub fn clean_value(value: &str) -> &str {
    value.trim_matches(is_blank)
}

/// Trim, collapse internal whitespace, then snake_case.
pub fn normalize_header(name: &str) -> String {
    let collapsed = clean_value(name)
        .split(is_blank)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let replaced = collapsed
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>();
    replaced.to_snake_case()
}

/// Normalizes then resolves through the alias table. Alias keys are compared in
/// normalized form so contracts may spell them as they appear in the source.
pub fn canonical_header(name: &str, aliases: &BTreeMap<String, String>) -> String {
    let normalized = normalize_header(name);
    aliases
        .iter()
        .find(|(alias, _)| normalize_header(alias) == normalized)
        .map(|(_, target)| target.clone())
        .unwrap_or(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_become_snake_case() {
        assert_eq!(normalize_header("  HCPCS Code "), "hcpcs_code");
        assert_eq!(normalize_header("Work\u{00A0}RVU"), "work_rvu");
        assert_eq!(normalize_header("Status   Code"), "status_code");
        assert_eq!(normalize_header("Non-Facility PE RVU"), "non_facility_pe_rvu");
        assert_eq!(normalize_header("\u{FEFF}code"), "code");
        assert_eq!(normalize_header("effectiveDate"), "effective_date");
    }

    #[test]
    fn aliases_map_to_canonical_names() {
        let mut aliases = BTreeMap::new();
        aliases.insert("HCPCS Code".to_string(), "hcpcs".to_string());
        assert_eq!(canonical_header("hcpcs_code", &aliases), "hcpcs");
        assert_eq!(canonical_header("HCPCS CODE", &aliases), "hcpcs");
        assert_eq!(canonical_header("modifier", &aliases), "modifier");
    }

    #[test]
    fn clean_value_strips_nbsp() {
        assert_eq!(clean_value("\u{00A0} 12.5 \t"), "12.5");
        assert_eq!(clean_value("A B"), "A B");
    }
}
