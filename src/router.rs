//! Filename + content-sniff routing.
//!
//! Route rules are case-insensitive regexes over the file's base name,
//! evaluated most-specific-first (most literal characters; declaration order
//! breaks ties). The parse strategy comes from sniffed magic bytes when they
//! are conclusive, then from the rule, then from the extension. Nothing
//! defaults silently: an unmatched file is a routing error.

use std::{fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use log::debug;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseOutcome};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    FixedWidth,
    Csv,
    Excel,
    Zip,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::FixedWidth => "fixed_width",
            SourceFormat::Csv => "csv",
            SourceFormat::Excel => "excel",
            SourceFormat::Zip => "zip",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Magic-byte sniffing. `None` means the prefix looks like plain text.
pub fn sniff(prefix: &[u8]) -> Option<SourceFormat> {
    if prefix.starts_with(OLE_MAGIC) {
        return Some(SourceFormat::Excel);
    }
    if prefix.starts_with(ZIP_MAGIC) || prefix.starts_with(ZIP_EMPTY_MAGIC) {
        if contains(prefix, b"[Content_Types].xml") || contains(prefix, b"xl/") {
            return Some(SourceFormat::Excel);
        }
        return Some(SourceFormat::Zip);
    }
    None
}

pub fn format_from_extension(filename: &str) -> Option<SourceFormat> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())?
        .to_ascii_lowercase();
    match ext.as_str() {
        "csv" | "tsv" | "psv" => Some(SourceFormat::Csv),
        "txt" | "dat" | "fw" | "fix" => Some(SourceFormat::FixedWidth),
        "xls" | "xlsx" | "xlsm" => Some(SourceFormat::Excel),
        "zip" => Some(SourceFormat::Zip),
        _ => None,
    }
}

/// Number of characters in a pattern that must match literally.
fn specificity(pattern: &str) -> usize {
    let mut count = 0;
    let mut chars = pattern.chars();
    let mut class_depth = 0usize;
    let mut in_quantifier = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next()
                    && class_depth == 0
                    && !escaped.is_ascii_alphanumeric()
                {
                    count += 1;
                }
            }
            '[' => class_depth += 1,
            ']' => class_depth = class_depth.saturating_sub(1),
            '{' => in_quantifier = true,
            '}' => in_quantifier = false,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '|' => {}
            _ if class_depth == 0 && !in_quantifier => count += 1,
            _ => {}
        }
    }
    count
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    pub pattern: String,
    pub dataset_id: String,
    pub schema_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<SourceFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub dataset_id: String,
    pub schema_id: String,
    pub format: SourceFormat,
    pub pattern: String,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: RouteRule,
    regex: Regex,
    specificity: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct RouteFile {
    routes: Vec<RouteRule>,
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    rules: Vec<CompiledRule>,
}

impl Router {
    pub fn new(rules: Vec<RouteRule>) -> Result<Self> {
        let mut compiled = rules
            .into_iter()
            .map(|rule| {
                let regex = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("Compiling route pattern '{}'", rule.pattern))?;
                let specificity = specificity(&rule.pattern);
                Ok(CompiledRule {
                    rule,
                    regex,
                    specificity,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        compiled.sort_by(|a, b| b.specificity.cmp(&a.specificity));
        Ok(Self { rules: compiled })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: RouteFile = serde_yaml::from_str(raw).context("Parsing route YAML")?;
        Self::new(file.routes)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening route file {path:?}"))?;
        let parsed: RouteFile = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing route file {path:?}"))?;
        Self::new(parsed.routes)
    }

    pub fn rules(&self) -> impl Iterator<Item = &RouteRule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    pub fn route(&self, filename: &str, content_prefix: Option<&[u8]>) -> ParseOutcome<Route> {
        let base = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(filename);
        let matched = self
            .rules
            .iter()
            .find(|compiled| compiled.regex.is_match(base))
            .ok_or_else(|| ParseError::Routing {
                filename: filename.to_string(),
            })?;

        let sniffed = content_prefix.and_then(sniff);
        let format = sniffed
            .or(matched.rule.format)
            .or_else(|| format_from_extension(base))
            .ok_or_else(|| ParseError::Routing {
                filename: filename.to_string(),
            })?;
        if let Some(sniffed) = sniffed
            && matched.rule.format.is_some_and(|declared| declared != sniffed)
        {
            debug!(
                "Content of '{base}' sniffs as {sniffed}, overriding declared {}",
                matched.rule.format.map(|f| f.as_str()).unwrap_or("-")
            );
        }
        debug!(
            "Routed '{base}' via '{}' to {} ({format})",
            matched.rule.pattern, matched.rule.schema_id
        );
        Ok(Route {
            dataset_id: matched.rule.dataset_id.clone(),
            schema_id: matched.rule.schema_id.clone(),
            format,
            pattern: matched.rule.pattern.clone(),
        })
    }
}
