//! Schema contracts: the declarative column/type/key definition of a dataset.
//!
//! A contract is authored once per dataset major version and never mutated
//! after loading. [`ContractRegistry`] resolves identifiers such as
//! `pprrvu_v2` or `pprrvu_v2.1` to the newest published contract of that
//! major version.
//!
//! ## Responsibilities
//!
//! - YAML loading via `serde_yaml`
//! - Load-time validation (unique columns, declared natural keys, precision
//!   bounds, non-empty domains, coherent range bounds)
//! - Stable identifier derivation by stripping the minor version

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::Severity;

pub const DEFAULT_HASH_PRECISION: u32 = 6;
const DECIMAL_MAX_PRECISION: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Category,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Category => "category",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "string", "integer", "decimal", "boolean", "date", "datetime", "category",
        ]
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Decimal)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "str" | "text" => Ok(ColumnType::String),
            "integer" | "int" => Ok(ColumnType::Integer),
            "decimal" | "numeric" | "number" => Ok(ColumnType::Decimal),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "date" => Ok(ColumnType::Date),
            "datetime" | "timestamp" => Ok(ColumnType::DateTime),
            "category" | "categorical" | "enum" => Ok(ColumnType::Category),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Block,
    Warn,
}

impl DuplicatePolicy {
    pub fn severity(&self) -> Severity {
        match self {
            DuplicatePolicy::Block => Severity::Block,
            DuplicatePolicy::Warn => Severity::Warn,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub datatype: ColumnType,
    #[serde(default = "ColumnSpec::default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Vec<String>>,
    #[serde(default)]
    pub domain_severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
    /// chrono format string for date/datetime columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ColumnSpec {
    pub const fn default_nullable() -> bool {
        true
    }

    pub fn required(&self) -> bool {
        !self.nullable
    }

    /// Decimal places used when canonicalizing numeric values for hashing.
    pub fn hash_precision(&self) -> u32 {
        self.precision.unwrap_or(DEFAULT_HASH_PRECISION)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.name.trim().is_empty(), "Column names must not be empty");
        if let Some(precision) = self.precision {
            ensure!(
                self.datatype.is_numeric(),
                "Column '{}' declares precision but is {}",
                self.name,
                self.datatype
            );
            ensure!(
                precision <= DECIMAL_MAX_PRECISION,
                "Column '{}' precision must be <= {}",
                self.name,
                DECIMAL_MAX_PRECISION
            );
        }
        if let Some(domain) = &self.domain {
            ensure!(
                !domain.is_empty(),
                "Column '{}' declares an empty domain",
                self.name
            );
        }
        if self.datatype == ColumnType::Category {
            ensure!(
                self.domain.is_some(),
                "Category column '{}' must declare a domain",
                self.name
            );
        }
        if self.min.is_some() || self.max.is_some() {
            ensure!(
                self.datatype.is_numeric(),
                "Column '{}' declares a range but is {}",
                self.name,
                self.datatype
            );
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            ensure!(
                min <= max,
                "Column '{}' range is inverted ({min} > {max})",
                self.name
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContract {
    pub dataset_id: String,
    pub version: String,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub natural_keys: Vec<String>,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Source header (after normalization) → canonical column name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub null_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

impl SchemaContract {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let contract: SchemaContract =
            serde_yaml::from_str(raw).context("Parsing schema contract YAML")?;
        contract.validate()?;
        Ok(contract)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening contract file {path:?}"))?;
        let reader = BufReader::new(file);
        let contract: SchemaContract =
            serde_yaml::from_reader(reader).context("Parsing schema contract YAML")?;
        contract
            .validate()
            .with_context(|| format!("Validating contract {path:?}"))?;
        Ok(contract)
    }

    pub fn semver(&self) -> Result<(u64, u64, u64)> {
        parse_semver(&self.version)
    }

    pub fn schema_id(&self) -> String {
        let major = self.semver().map(|(major, _, _)| major).unwrap_or_default();
        format!("{}_v{major}", self.dataset_id)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn natural_key_indices(&self) -> Vec<usize> {
        self.natural_keys
            .iter()
            .filter_map(|key| self.column_index(key))
            .collect()
    }

    pub fn is_null_token(&self, value: &str) -> bool {
        self.null_tokens.iter().any(|token| token == value)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.dataset_id.trim().is_empty(),
            "Contract dataset_id must not be empty"
        );
        self.semver()
            .with_context(|| format!("Contract '{}' version", self.dataset_id))?;
        ensure!(
            !self.columns.is_empty(),
            "Contract '{}' declares no columns",
            self.dataset_id
        );
        let mut seen = HashSet::new();
        for column in &self.columns {
            column.validate()?;
            ensure!(
                seen.insert(column.name.as_str()),
                "Contract '{}' declares column '{}' twice",
                self.dataset_id,
                column.name
            );
        }
        for key in &self.natural_keys {
            ensure!(
                seen.contains(key.as_str()),
                "Natural key '{key}' is not a column of contract '{}'",
                self.dataset_id
            );
        }
        for (alias, target) in &self.aliases {
            ensure!(
                seen.contains(target.as_str()),
                "Alias '{alias}' points at unknown column '{target}'"
            );
        }
        Ok(())
    }
}

pub fn parse_semver(value: &str) -> Result<(u64, u64, u64)> {
    let trimmed = value.trim().trim_start_matches('v');
    let parts = trimmed.split('.').collect::<Vec<_>>();
    ensure!(
        (1..=3).contains(&parts.len()),
        "Version '{value}' is not MAJOR.MINOR.PATCH"
    );
    let mut numbers = [0u64; 3];
    for (idx, part) in parts.iter().enumerate() {
        numbers[idx] = part
            .parse()
            .with_context(|| format!("Version component '{part}' in '{value}'"))?;
    }
    Ok((numbers[0], numbers[1], numbers[2]))
}

/// Reduces `name_v2`, `name_v2.1` or `name_v2.1.3` to `name_v2`.
pub fn stable_schema_id(identifier: &str) -> String {
    let trimmed = identifier.trim();
    if let Some(pos) = trimmed.rfind("_v") {
        let (base, version) = trimmed.split_at(pos + 2);
        if let Some(major) = version.split('.').next()
            && !major.is_empty()
            && major.chars().all(|c| c.is_ascii_digit())
        {
            return format!("{base}{major}");
        }
    }
    trimmed.to_string()
}

/// Read-only lookup of contracts by stable identifier.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, SchemaContract>,
}

impl ContractRegistry {
    pub fn new(contracts: Vec<SchemaContract>) -> Result<Self> {
        let mut registry = BTreeMap::<String, SchemaContract>::new();
        for contract in contracts {
            contract.validate()?;
            let id = contract.schema_id();
            if let Some(existing) = registry.get(&id) {
                let incoming = contract.semver()?;
                let current = existing.semver()?;
                if incoming == current {
                    bail!(
                        "Contract '{id}' version {} is registered twice",
                        contract.version
                    );
                }
                if incoming < current {
                    debug!(
                        "Keeping contract '{id}' {} over older {}",
                        existing.version, contract.version
                    );
                    continue;
                }
            }
            registry.insert(id, contract);
        }
        Ok(Self {
            contracts: registry,
        })
    }

    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut contracts = Vec::new();
        for path in crate::catalog::yaml_files_in(dir)? {
            contracts.push(SchemaContract::load(&path)?);
        }
        Self::new(contracts)
    }

    pub fn get(&self, schema_id: &str) -> Option<&SchemaContract> {
        self.contracts.get(&stable_schema_id(schema_id))
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
