use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// As-published release window of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vintage {
    pub published_at: Option<DateTime<Utc>>,
    pub product_year: i32,
    /// `Q1`..`Q4`, or `None` for annual products.
    pub quarter: Option<String>,
}

/// Caller-supplied context for one parse invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseMetadata {
    pub release_id: String,
    pub vintage: Vintage,
    pub source_uri: String,
    /// `sha256:<hex>` or bare hex. Verified against the bytes when present.
    pub file_checksum: Option<String>,
    pub parser_version: String,
    /// Expected contract; must agree with the route when present.
    pub schema_id: Option<String>,
    /// Expected layout version for fixed-width sources.
    pub layout_version: Option<String>,
}

impl ParseMetadata {
    pub fn new(release_id: impl Into<String>, product_year: i32, quarter: Option<&str>) -> Self {
        Self {
            release_id: release_id.into(),
            vintage: Vintage {
                published_at: None,
                product_year,
                quarter: quarter.map(str::to_string),
            },
            source_uri: String::new(),
            file_checksum: None,
            parser_version: crate::PARSER_VERSION.to_string(),
            schema_id: None,
            layout_version: None,
        }
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = uri.into();
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.vintage.published_at = Some(published_at);
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.file_checksum = Some(checksum.into());
        self
    }

    pub fn with_schema_id(mut self, schema_id: impl Into<String>) -> Self {
        self.schema_id = Some(schema_id.into());
        self
    }

    pub fn with_layout_version(mut self, version: impl Into<String>) -> Self {
        self.layout_version = Some(version.into());
        self
    }
}

/// Strips an optional `sha256:` prefix and lowercases for comparison.
pub fn normalize_checksum(value: &str) -> String {
    let trimmed = value.trim();
    let bare = trimmed
        .strip_prefix("sha256:")
        .or_else(|| trimmed.strip_prefix("SHA256:"))
        .unwrap_or(trimmed);
    bare.to_ascii_lowercase()
}
