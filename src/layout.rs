//! Fixed-width layout registry.
//!
//! Layouts are addressed by `(dataset, product_year, quarter)` and carry their
//! own version, independent of the schema contract. Column offsets are
//! character indices with an exclusive `end`.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::contract::{ColumnType, SchemaContract};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QuarterKey {
    Quarter(u8),
    Annual,
}

impl QuarterKey {
    /// Accepts `Q1`, `q1`, `2025Q1`, `1`, `annual`, `A` or nothing.
    pub fn from_label(label: Option<&str>) -> Result<Self> {
        let Some(raw) = label.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(QuarterKey::Annual);
        };
        let upper = raw.to_ascii_uppercase();
        if matches!(upper.as_str(), "A" | "ANNUAL" | "FY") {
            return Ok(QuarterKey::Annual);
        }
        let digits = match upper.rfind('Q') {
            Some(pos) => &upper[pos + 1..],
            None => upper.as_str(),
        };
        match digits.parse::<u8>() {
            Ok(quarter @ 1..=4) => Ok(QuarterKey::Quarter(quarter)),
            _ => bail!("Unrecognized quarter label '{raw}'"),
        }
    }
}

impl fmt::Display for QuarterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuarterKey::Quarter(q) => write!(f, "Q{q}"),
            QuarterKey::Annual => f.write_str("annual"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutColumn {
    pub name: String,
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type", default = "LayoutColumn::default_type")]
    pub datatype: ColumnType,
    #[serde(default = "LayoutColumn::default_nullable")]
    pub nullable: bool,
}

impl LayoutColumn {
    fn default_type() -> ColumnType {
        ColumnType::String
    }

    const fn default_nullable() -> bool {
        true
    }

    pub fn width(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub dataset: String,
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarter: Option<String>,
    pub version: String,
    pub min_line_length: usize,
    pub columns: Vec<LayoutColumn>,
}

impl LayoutSpec {
    pub fn key(&self) -> Result<(String, i32, QuarterKey)> {
        Ok((
            self.dataset.clone(),
            self.year,
            QuarterKey::from_label(self.quarter.as_deref())?,
        ))
    }

    /// Columns ordered by `start`. Registry files need not be sorted.
    pub fn sorted_columns(&self) -> Vec<&LayoutColumn> {
        let mut columns = self.columns.iter().collect::<Vec<_>>();
        columns.sort_by_key(|column| (column.start, column.end));
        columns
    }

    /// Right edge of the widest column.
    pub fn record_width(&self) -> usize {
        self.columns.iter().map(|c| c.end).max().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.columns.is_empty(),
            "Layout '{}' {} declares no columns",
            self.dataset,
            self.version
        );
        crate::contract::parse_semver(&self.version)
            .with_context(|| format!("Layout '{}' version", self.dataset))?;
        let mut names = HashSet::new();
        for column in &self.columns {
            ensure!(
                column.start < column.end,
                "Layout '{}' column '{}' has start {} >= end {}",
                self.dataset,
                column.name,
                column.start,
                column.end
            );
            ensure!(
                names.insert(column.name.as_str()),
                "Layout '{}' declares column '{}' twice",
                self.dataset,
                column.name
            );
        }
        let sorted = self.sorted_columns();
        for pair in sorted.windows(2) {
            ensure!(
                pair[0].end <= pair[1].start,
                "Layout '{}' columns '{}' [{}, {}) and '{}' [{}, {}) overlap",
                self.dataset,
                pair[0].name,
                pair[0].start,
                pair[0].end,
                pair[1].name,
                pair[1].start,
                pair[1].end
            );
        }
        Ok(())
    }

    /// Layout column names must equal the contract's column names exactly.
    pub fn check_against(&self, contract: &SchemaContract) -> std::result::Result<(), String> {
        let layout_names = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<HashSet<_>>();
        let contract_names = contract
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<HashSet<_>>();
        let mut missing = contract_names
            .difference(&layout_names)
            .copied()
            .collect::<Vec<_>>();
        let mut extra = layout_names
            .difference(&contract_names)
            .copied()
            .collect::<Vec<_>>();
        if missing.is_empty() && extra.is_empty() {
            for column in &self.columns {
                if let Some(spec) = contract.columns.iter().find(|c| c.name == column.name)
                    && spec.datatype != column.datatype
                {
                    return Err(format!(
                        "column '{}' is {} in the layout but {} in contract '{}'",
                        column.name,
                        column.datatype,
                        spec.datatype,
                        contract.schema_id()
                    ));
                }
            }
            return Ok(());
        }
        missing.sort_unstable();
        extra.sort_unstable();
        Err(format!(
            "layout columns differ from contract '{}': missing [{}], unexpected [{}]",
            contract.schema_id(),
            missing.join(", "),
            extra.join(", ")
        ))
    }
}

/// Slices one line into column values using `[start, end)` character offsets.
/// Columns past the end of a short line come back empty.
pub fn slice_line(line: &str, columns: &[&LayoutColumn]) -> Vec<String> {
    let chars = line.chars().collect::<Vec<_>>();
    columns
        .iter()
        .map(|column| {
            if column.start >= chars.len() {
                return String::new();
            }
            let end = column.end.min(chars.len());
            chars[column.start..end].iter().collect()
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
struct LayoutFile {
    layouts: Vec<LayoutSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    layouts: BTreeMap<(String, i32, QuarterKey), LayoutSpec>,
}

impl LayoutRegistry {
    pub fn new(layouts: Vec<LayoutSpec>) -> Result<Self> {
        let mut registry = BTreeMap::new();
        for layout in layouts {
            layout.validate()?;
            let key = layout.key()?;
            if registry.contains_key(&key) {
                bail!(
                    "Layout for dataset '{}' year {} {} is registered twice",
                    key.0,
                    key.1,
                    key.2
                );
            }
            registry.insert(key, layout);
        }
        Ok(Self { layouts: registry })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: LayoutFile = serde_yaml::from_str(raw).context("Parsing layout YAML")?;
        Self::new(file.layouts)
    }

    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut layouts = Vec::new();
        for path in crate::catalog::yaml_files_in(dir)? {
            let file = File::open(&path).with_context(|| format!("Opening layout file {path:?}"))?;
            let parsed: LayoutFile = serde_yaml::from_reader(BufReader::new(file))
                .with_context(|| format!("Parsing layout file {path:?}"))?;
            layouts.extend(parsed.layouts);
        }
        Self::new(layouts)
    }

    /// Exact `(dataset, year, quarter)` first, then the annual layout for the year.
    pub fn get_layout(
        &self,
        dataset: &str,
        product_year: i32,
        quarter_label: Option<&str>,
    ) -> Result<Option<&LayoutSpec>> {
        let quarter = QuarterKey::from_label(quarter_label)?;
        let exact = self
            .layouts
            .get(&(dataset.to_string(), product_year, quarter));
        if exact.is_some() {
            return Ok(exact);
        }
        Ok(self
            .layouts
            .get(&(dataset.to_string(), product_year, QuarterKey::Annual)))
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUTS: &str = r#"
layouts:
  - dataset: gpci
    year: 2025
    version: 1.0.0
    min_line_length: 12
    columns:
      - {name: value, start: 7, end: 12, type: decimal}
      - {name: locality, start: 0, end: 2}
      - {name: state, start: 2, end: 4, nullable: false}
  - dataset: gpci
    year: 2025
    quarter: Q2
    version: 1.1.0
    min_line_length: 12
    columns:
      - {name: locality, start: 0, end: 3}
"#;

    #[test]
    fn quarter_labels_normalize() {
        assert_eq!(QuarterKey::from_label(Some("q3")).unwrap(), QuarterKey::Quarter(3));
        assert_eq!(
            QuarterKey::from_label(Some("2025Q1")).unwrap(),
            QuarterKey::Quarter(1)
        );
        assert_eq!(QuarterKey::from_label(None).unwrap(), QuarterKey::Annual);
        assert_eq!(QuarterKey::from_label(Some("annual")).unwrap(), QuarterKey::Annual);
        assert!(QuarterKey::from_label(Some("Q5")).is_err());
    }

    #[test]
    fn lookup_falls_back_to_annual() {
        let registry = LayoutRegistry::from_yaml_str(LAYOUTS).expect("layouts");
        let q2 = registry.get_layout("gpci", 2025, Some("Q2")).unwrap().unwrap();
        assert_eq!(q2.version, "1.1.0");
        let q3 = registry.get_layout("gpci", 2025, Some("Q3")).unwrap().unwrap();
        assert_eq!(q3.version, "1.0.0");
        assert!(registry.get_layout("gpci", 2024, None).unwrap().is_none());
    }

    #[test]
    fn slicing_sorts_columns_and_excludes_end() {
        let registry = LayoutRegistry::from_yaml_str(LAYOUTS).expect("layouts");
        let layout = registry.get_layout("gpci", 2025, None).unwrap().unwrap();
        let columns = layout.sorted_columns();
        assert_eq!(columns[0].name, "locality");
        let values = slice_line("01AL   1.025", &columns);
        assert_eq!(values, vec!["01", "AL", "1.025"]);
    }

    #[test]
    fn short_lines_slice_to_empty_trailing_columns() {
        let registry = LayoutRegistry::from_yaml_str(LAYOUTS).expect("layouts");
        let layout = registry.get_layout("gpci", 2025, None).unwrap().unwrap();
        let values = slice_line("01A", &layout.sorted_columns());
        assert_eq!(values, vec!["01", "A", ""]);
    }

    #[test]
    fn overlapping_columns_are_rejected() {
        let raw = LAYOUTS.replace("start: 2, end: 4", "start: 1, end: 4");
        let err = LayoutRegistry::from_yaml_str(&raw).expect_err("overlap");
        assert!(err.to_string().contains("overlap"));
    }
}
