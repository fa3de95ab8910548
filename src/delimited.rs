use std::io::Read;

use csv::StringRecord;

use crate::{
    encoding::Dialect,
    error::ParseOutcome,
    raw::{RawRow, RawTable},
};

pub fn open_csv_reader<R>(reader: R, dialect: &Dialect) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(dialect.delimiter)
        .quote(dialect.quote)
        .double_quote(dialect.escape.is_none())
        .escape(dialect.escape)
        .flexible(true);
    builder.from_reader(reader)
}

fn record_is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

/// Reads decoded delimited text. The first non-blank record is the header;
/// blank records are skipped. Records of the wrong width are kept so the
/// validator can quarantine them.
pub fn read_delimited(text: &str, dialect: &Dialect) -> ParseOutcome<RawTable> {
    let mut reader = open_csv_reader(text.as_bytes(), dialect);
    let mut record = StringRecord::new();
    let mut table: Option<RawTable> = None;
    let mut skipped = 0usize;

    while reader.read_record(&mut record)? {
        let line = record
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or_default();
        if record_is_blank(&record) {
            skipped += 1;
            continue;
        }
        let values = record.iter().map(|field| field.to_string()).collect();
        match table.as_mut() {
            None => table = Some(RawTable::new(values)),
            Some(table) => table.rows.push(RawRow::new(line, values)),
        }
    }

    let mut table = table.unwrap_or_default();
    table.skipped_lines = skipped;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_row_and_line_numbers_are_captured() {
        let text = "code,desc\n\n1,\"a, b\"\n2,c\n";
        let table = read_delimited(text, &Dialect::default()).expect("read");
        assert_eq!(table.headers, vec!["code", "desc"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].values, vec!["1", "a, b"]);
        assert_eq!(table.rows[0].line, 3);
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn ragged_rows_survive_reading() {
        let text = "a|b|c\n1|2\n";
        let dialect = Dialect {
            delimiter: b'|',
            ..Dialect::default()
        };
        let table = read_delimited(text, &dialect).expect("read");
        assert_eq!(table.rows[0].values.len(), 2);
    }

    #[test]
    fn backslash_escapes_are_honoured() {
        let text = "a,b\n\"say \\\"hi\\\"\",2\n";
        let dialect = Dialect {
            escape: Some(b'\\'),
            ..Dialect::default()
        };
        let table = read_delimited(text, &dialect).expect("read");
        assert_eq!(table.rows[0].values[0], "say \"hi\"");
    }
}
