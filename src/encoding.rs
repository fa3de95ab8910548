//! Byte-level encoding detection and delimited-text dialect sniffing.
//!
//! Encoding cascade: BOM (UTF-8, UTF-16 LE/BE) → strict UTF-8 → strict
//! CP1252 (the five undefined bytes fail it) → Latin-1, which always decodes.
//! Every step past UTF-8 is reported as a fallback so callers can see it in
//! metrics.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use log::{debug, warn};
use serde::Serialize;

use crate::error::{ParseError, ParseOutcome};

const CP1252_UNDEFINED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];
const DIALECT_CANDIDATES: [u8; 3] = [b',', b'\t', b'|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Cp1252,
    Latin1,
}

impl TextEncoding {
    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Cp1252 => "cp1252",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    fn encoding_rs(&self) -> Option<&'static Encoding> {
        match self {
            TextEncoding::Utf8 => Some(UTF_8),
            TextEncoding::Utf16Le => Some(UTF_16LE),
            TextEncoding::Utf16Be => Some(UTF_16BE),
            TextEncoding::Cp1252 => Some(WINDOWS_1252),
            TextEncoding::Latin1 => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectedEncoding {
    pub encoding: TextEncoding,
    pub bom_present: bool,
    pub fallback: bool,
}

impl DetectedEncoding {
    fn primary(encoding: TextEncoding, bom_present: bool) -> Self {
        Self {
            encoding,
            bom_present,
            fallback: false,
        }
    }
}

fn sniff_bom(bytes: &[u8]) -> Option<(TextEncoding, usize)> {
    match Encoding::for_bom(bytes) {
        Some((enc, len)) if enc == UTF_8 => Some((TextEncoding::Utf8, len)),
        Some((enc, len)) if enc == UTF_16LE => Some((TextEncoding::Utf16Le, len)),
        Some((enc, len)) if enc == UTF_16BE => Some((TextEncoding::Utf16Be, len)),
        _ => None,
    }
}

fn is_strict_cp1252(bytes: &[u8]) -> bool {
    !bytes.iter().any(|b| CP1252_UNDEFINED.contains(b))
}

/// Checks UTF-8 validity of a prefix that may have been cut mid-sequence.
fn utf8_prefix_valid(bytes: &[u8]) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none(),
    }
}

fn fallback_after_utf8(bytes: &[u8]) -> DetectedEncoding {
    let encoding = if is_strict_cp1252(bytes) {
        TextEncoding::Cp1252
    } else {
        TextEncoding::Latin1
    };
    DetectedEncoding {
        encoding,
        bom_present: false,
        fallback: true,
    }
}

/// Determines the decoding for a byte prefix.
pub fn detect(byte_prefix: &[u8]) -> ParseOutcome<DetectedEncoding> {
    if let Some((encoding, _)) = sniff_bom(byte_prefix) {
        debug!("BOM sniffed: {}", encoding.label());
        return Ok(DetectedEncoding::primary(encoding, true));
    }
    if byte_prefix.contains(&0) {
        return Err(ParseError::EncodingUndecidable {
            reason: "NUL bytes present without a UTF-16 byte order mark".to_string(),
        });
    }
    if utf8_prefix_valid(byte_prefix) {
        return Ok(DetectedEncoding::primary(TextEncoding::Utf8, false));
    }
    Ok(fallback_after_utf8(byte_prefix))
}

/// Decodes the full content with a prefix-based detection, escalating down the
/// cascade when bytes past the prefix disagree with it. The BOM is stripped.
pub fn decode(bytes: &[u8], detected: DetectedEncoding) -> ParseOutcome<(String, DetectedEncoding)> {
    let body = match sniff_bom(bytes) {
        Some((_, len)) if detected.bom_present => &bytes[len..],
        _ => bytes,
    };
    let mut effective = detected;
    if effective.encoding == TextEncoding::Utf8 && std::str::from_utf8(body).is_err() {
        if detected.bom_present {
            return Err(ParseError::EncodingUndecidable {
                reason: "UTF-8 byte order mark present but content is not valid UTF-8"
                    .to_string(),
            });
        }
        effective = fallback_after_utf8(body);
    }
    if effective.encoding == TextEncoding::Cp1252 && !is_strict_cp1252(body) {
        effective.encoding = TextEncoding::Latin1;
        effective.fallback = true;
    }
    if effective.fallback {
        warn!(
            "Content is not valid UTF-8; decoding as {}",
            effective.encoding.label()
        );
    }

    let text = match effective.encoding.encoding_rs() {
        Some(encoding) => {
            let (text, had_errors) = encoding.decode_without_bom_handling(body);
            if had_errors {
                return Err(ParseError::EncodingUndecidable {
                    reason: format!("content is not valid {}", effective.encoding.label()),
                });
            }
            text.into_owned()
        }
        None => body.iter().map(|&b| b as char).collect(),
    };
    Ok((text, effective))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: Option<u8>,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: None,
        }
    }
}

fn count_outside_quotes(line: &str, delimiter: u8, quote: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == quote {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

fn detect_quote(lines: &[&str]) -> u8 {
    let mut double = 0usize;
    let mut single = 0usize;
    for line in lines {
        for candidate in DIALECT_CANDIDATES {
            let sep = candidate as char;
            double += line.matches(&format!("{sep}\"")).count();
            single += line.matches(&format!("{sep}'")).count();
        }
        if line.starts_with('"') {
            double += 1;
        }
        if line.starts_with('\'') {
            single += 1;
        }
    }
    if single > double { b'\'' } else { b'"' }
}

/// Picks the delimiter whose per-line field count is most consistent across
/// the first `sample_lines` non-empty lines. Ties go to comma, then tab, then pipe.
pub fn detect_dialect(
    text: &str,
    sample_lines: usize,
    expected_columns: usize,
) -> ParseOutcome<Dialect> {
    let lines = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(sample_lines.max(1))
        .collect::<Vec<_>>();
    if lines.is_empty() {
        return Ok(Dialect::default());
    }
    let quote = detect_quote(&lines);
    let escape = lines
        .iter()
        .any(|line| line.contains(&format!("\\{}", quote as char)))
        .then_some(b'\\');

    let mut best: Option<(u8, usize, usize)> = None;
    for candidate in DIALECT_CANDIDATES {
        let counts = lines
            .iter()
            .map(|line| count_outside_quotes(line, candidate, quote))
            .collect::<Vec<_>>();
        let header_count = counts[0];
        if header_count == 0 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == header_count).count();
        let better = match best {
            None => true,
            Some((_, best_consistent, best_count)) => {
                consistent > best_consistent
                    || (consistent == best_consistent && header_count > best_count)
            }
        };
        if better {
            best = Some((candidate, consistent, header_count));
        }
    }

    match best {
        Some((delimiter, _, _)) => {
            debug!(
                "Sniffed delimiter '{}' over {} line(s)",
                crate::printable_delimiter(delimiter),
                lines.len()
            );
            Ok(Dialect {
                delimiter,
                quote,
                escape,
            })
        }
        None if expected_columns <= 1 => Ok(Dialect {
            quote,
            escape,
            ..Dialect::default()
        }),
        None => Err(ParseError::DialectUndecidable {
            sampled_lines: lines.len(),
            reason: format!(
                "no comma, tab or pipe found but {expected_columns} columns are expected"
            ),
        }),
    }
}
