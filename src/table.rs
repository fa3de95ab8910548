//! Plain-text tables for the operator binary.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Column alignment; numbers read better right-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

fn looks_numeric(value: &str) -> bool {
    !value.is_empty() && value.parse::<f64>().is_ok()
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    let mut numeric = vec![!rows.is_empty(); column_count];
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
            numeric[idx] &= cell.is_empty() || looks_numeric(cell);
        }
    }
    let aligns = numeric
        .iter()
        .map(|&n| if n { Align::Right } else { Align::Left })
        .collect::<Vec<_>>();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &aligns));
    let rule = widths.iter().map(|w| "-".repeat((*w).max(1))).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths, &aligns));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &aligns));
    }
    output
}

/// Two-column `key  value` listing, used for metrics and routing decisions.
pub fn render_pairs(pairs: &[(String, String)]) -> String {
    let headers = vec!["key".to_string(), "value".to_string()];
    let rows = pairs
        .iter()
        .map(|(key, value)| vec![key.clone(), value.clone()])
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let cells = values
        .iter()
        .zip(widths.iter().zip(aligns))
        .map(|(value, (width, align))| {
            let cell = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&cell)));
            match align {
                Align::Left => format!("{cell}{padding}"),
                Align::Right => format!("{padding}{cell}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t', '\u{1F}']) {
        Cow::Owned(value.replace(['\n', '\r', '\t', '\u{1F}'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_columns_align_right() {
        let headers = vec!["code".to_string(), "rvu".to_string()];
        let rows = vec![
            vec!["99213".to_string(), "1.5".to_string()],
            vec!["G0008".to_string(), "12.25".to_string()],
        ];
        let rendered = render_table(&headers, &rows);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "code     rvu");
        assert_eq!(lines[2], "99213    1.5");
        assert_eq!(lines[3], "G0008  12.25");
    }

    #[test]
    fn control_characters_are_flattened() {
        let rendered = render_pairs(&[("note".to_string(), "a\tb\nc".to_string())]);
        assert!(rendered.contains("a b c"));
    }
}
