//! Fixed-width text reader.
//!
//! Lines are sliced by the layout's `[start, end)` character offsets after
//! sorting columns by `start`. Leading and trailing lines are header/footer
//! noise when blank, header-like, or shorter than `min_line_length` with
//! slices that do not fit the layout. A short line in the body of the file is
//! always data.

use log::debug;

use crate::{
    error::{ParseError, ParseOutcome},
    data::parse_typed_value,
    layout::{LayoutColumn, LayoutSpec, slice_line},
    normalize::{clean_value, normalize_header},
    raw::{RawRow, RawTable},
};

/// A line is header-like when at least half of the column names appear in it
/// as whole snake_case tokens.
fn looks_like_header(line: &str, columns: &[&LayoutColumn]) -> bool {
    let tokens = format!("_{}_", normalize_header(line));
    let matches = columns
        .iter()
        .filter(|column| tokens.contains(&format!("_{}_", normalize_header(&column.name))))
        .count();
    matches > 0 && matches * 2 >= columns.len()
}

/// Every slice is either empty in a nullable column or parses as the column's
/// declared type.
fn fits_layout(line: &str, columns: &[&LayoutColumn]) -> bool {
    slice_line(line, columns)
        .iter()
        .zip(columns)
        .all(|(raw, column)| match clean_value(raw) {
            "" => column.nullable,
            value => parse_typed_value(value, &column.datatype, None).is_ok(),
        })
}

fn is_edge_noise(line: &str, layout: &LayoutSpec, columns: &[&LayoutColumn]) -> bool {
    if clean_value(line).is_empty() || looks_like_header(line, columns) {
        return true;
    }
    line.chars().count() < layout.min_line_length && !fits_layout(line, columns)
}

pub fn read_fixed_width(text: &str, layout: &LayoutSpec) -> ParseOutcome<RawTable> {
    let columns = layout.sorted_columns();
    let lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect::<Vec<_>>();

    let first = lines
        .iter()
        .position(|line| !is_edge_noise(line, layout, &columns));
    let Some(first) = first else {
        return Err(ParseError::LayoutMismatch {
            dataset: layout.dataset.clone(),
            version: layout.version.clone(),
            detail: format!(
                "none of {} line(s) reaches min_line_length {} or fits the columns",
                lines.len(),
                layout.min_line_length
            ),
        });
    };
    let last = lines
        .iter()
        .rposition(|line| !is_edge_noise(line, layout, &columns))
        .unwrap_or(first);

    let mut table = RawTable::new(columns.iter().map(|c| c.name.clone()).collect());
    for (idx, line) in lines.iter().enumerate().take(last + 1).skip(first) {
        if clean_value(line).is_empty() {
            table.skipped_lines += 1;
            continue;
        }
        table.rows.push(RawRow::new(idx + 1, slice_line(line, &columns)));
    }
    let trailing_blank = lines
        .last()
        .is_some_and(|line| line.is_empty() && lines.len() > last + 1);
    table.skipped_lines += first + (lines.len() - last - 1) - usize::from(trailing_blank);
    debug!(
        "Fixed-width layout {} {}: {} data line(s), {} skipped",
        layout.dataset,
        layout.version,
        table.rows.len(),
        table.skipped_lines
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutRegistry;

    fn layout() -> LayoutSpec {
        let registry = LayoutRegistry::from_yaml_str(
            r#"
layouts:
  - dataset: locality
    year: 2025
    version: 1.0.0
    min_line_length: 10
    columns:
      - {name: code, start: 0, end: 5, type: integer, nullable: false}
      - {name: state, start: 5, end: 7}
      - {name: amount, start: 7, end: 12}
"#,
        )
        .unwrap();
        registry.get_layout("locality", 2025, None).unwrap().unwrap().clone()
    }

    #[test]
    fn header_and_footer_lines_are_skipped() {
        let text = "REPORT\ncode state amount\n00100AL 1.25\n00200AK 2.50\nEND 2\n";
        let table = read_fixed_width(text, &layout()).expect("read");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 3);
        assert_eq!(table.rows[0].values, vec!["00100", "AL", " 1.25"]);
        assert_eq!(table.skipped_lines, 3);
    }

    #[test]
    fn short_body_lines_are_kept() {
        let text = "00100AL 1.25\n00200AK\n00300AZ 3.75\n";
        let table = read_fixed_width(text, &layout()).expect("read");
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[1].values, vec!["00200", "AK", ""]);
    }

    #[test]
    fn short_edge_records_that_fit_are_kept() {
        let table = read_fixed_width("00100AL 1.25\n00200AK\n", &layout()).expect("read");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.skipped_lines, 0);
        assert_eq!(table.rows[1].line, 2);
        assert_eq!(table.rows[1].values, vec!["00200", "AK", ""]);

        let table = read_fixed_width("00050AZ\n00100AL 1.25\n", &layout()).expect("read");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 1);
    }

    #[test]
    fn short_edge_lines_missing_required_slices_are_noise() {
        let table = read_fixed_width("00100AL 1.25\nAK\n", &layout()).expect("read");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.skipped_lines, 1);
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let text = "00100AL 1.25\r\n00200AK 2.50\r\n";
        let table = read_fixed_width(text, &layout()).expect("read");
        assert_eq!(table.rows[1].values[2], " 2.50");
    }

    #[test]
    fn noise_only_input_is_a_layout_mismatch() {
        let err = read_fixed_width("HEADER\n\nFOOTER\n", &layout()).expect_err("mismatch");
        assert!(matches!(err, ParseError::LayoutMismatch { .. }));
    }
}
