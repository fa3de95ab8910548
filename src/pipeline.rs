//! The parse entry point: bytes + filename + metadata in, one
//! [`ParseResult`] out (or a BLOCK [`ParseError`]).
//!
//! ## Stages
//!
//! 1. Checksum cross-check and routing on the filename plus a sniffed prefix
//! 2. Source reading: fixed-width (layout registry), delimited (encoding and
//!    dialect detection), workbook, or ZIP members routed one by one
//! 3. Header binding against the contract
//! 4. Row validation in chunks: field count, domain pre-check, cast, range
//! 5. Natural-key uniqueness, row hashing, stable sort by natural key
//! 6. Metrics, provenance and the row-accounting check
//!
//! The parser keeps no state between calls and only reads from the shared
//! [`Catalog`], so one catalog can serve parses on many threads at once.

use std::{io::Read, time::Instant};

use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    archive,
    cast::{self, TypedRow},
    catalog::Catalog,
    contract::{SchemaContract, stable_schema_id},
    domain,
    encoding::{self, DetectedEncoding},
    error::{ParseError, ParseOutcome},
    fixed_width, hash, keys,
    layout::LayoutSpec,
    metadata::{ParseMetadata, normalize_checksum},
    metrics::{NullTally, ParseMetrics, Provenance, numeric_ranges},
    quarantine::{RejectTable, check_join_invariant},
    raw::RawTable,
    router::{Route, SourceFormat},
    workbook,
};

/// Validated, hashed rows in natural-key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    /// Contract column names, declared order.
    pub columns: Vec<String>,
    pub rows: Vec<TypedRow>,
}

impl DataTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_hashes(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.row_hash.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub data: DataTable,
    pub rejects: RejectTable,
    pub metrics: ParseMetrics,
    pub provenance: Provenance,
}

/// A readable unit of the source: the file itself, or one archive member.
struct Segment {
    member: Option<String>,
    format: SourceFormat,
    table: RawTable,
}

#[derive(Debug, Default)]
struct SourceFacts {
    encoding: Option<DetectedEncoding>,
    delimiter: Option<u8>,
    layout_version: Option<String>,
    members: Vec<String>,
}

pub struct Parser<'c> {
    catalog: &'c Catalog,
}

impl<'c> Parser<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    /// Routes a file the way [`Parser::parse`] would, without reading past the prefix.
    pub fn route(&self, filename: &str, content: &[u8]) -> ParseOutcome<Route> {
        self.catalog
            .router
            .route(filename, Some(self.prefix(content)))
    }

    pub fn parse_reader<R: Read>(
        &self,
        mut reader: R,
        filename: &str,
        metadata: &ParseMetadata,
    ) -> ParseOutcome<ParseResult> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.parse(&bytes, filename, metadata)
    }

    pub fn parse(
        &self,
        bytes: &[u8],
        filename: &str,
        metadata: &ParseMetadata,
    ) -> ParseOutcome<ParseResult> {
        let started = Instant::now();
        let checksum = format!("sha256:{}", hex::encode(Sha256::digest(bytes)));
        if let Some(expected) = &metadata.file_checksum
            && normalize_checksum(expected) != normalize_checksum(&checksum)
        {
            return Err(ParseError::ChecksumMismatch {
                expected: expected.clone(),
                actual: checksum,
            });
        }

        let route = self.route(filename, bytes)?;
        let contract = self.contract_for(&route.schema_id)?;
        if let Some(expected) = &metadata.schema_id
            && stable_schema_id(expected) != contract.schema_id()
        {
            return Err(ParseError::ContractViolation {
                schema_id: contract.schema_id(),
                detail: format!(
                    "caller expected schema '{expected}' but '{filename}' routes to '{}'",
                    contract.schema_id()
                ),
            });
        }

        let mut facts = SourceFacts::default();
        let segments = self.read_source(bytes, &route, contract, metadata, &mut facts)?;

        let reject_columns = segments
            .first()
            .map(|segment| segment.table.headers.clone())
            .unwrap_or_default();
        let mut rejects = RejectTable::new(reject_columns);
        let mut valid = Vec::new();
        let mut tally = NullTally::new(contract);
        let mut unmapped = Vec::<String>::new();
        let mut total_rows = 0;
        let mut skipped_lines = 0;
        let chunk_rows = self
            .catalog
            .config
            .chunk_rows
            .filter(|rows| *rows > 0)
            .unwrap_or(usize::MAX);

        for segment in segments {
            let binding = cast::bind_columns(&segment.table.headers, contract)?;
            for column in &binding.unmapped {
                if !unmapped.contains(column) {
                    unmapped.push(column.clone());
                }
            }
            total_rows += segment.table.len();
            skipped_lines += segment.table.skipped_lines;
            tally.observe(&segment.table.rows, &binding, contract);
            debug!(
                "Validating {} row(s){} in chunks of {}",
                segment.table.len(),
                segment
                    .member
                    .as_deref()
                    .map(|m| format!(" from member '{m}'"))
                    .unwrap_or_default(),
                if chunk_rows == usize::MAX {
                    "all".to_string()
                } else {
                    chunk_rows.to_string()
                }
            );

            for chunk in &segment.table.rows.into_iter().chunks(chunk_rows) {
                let mut batch = chunk.collect::<Vec<_>>();
                if segment.format == SourceFormat::Csv {
                    let (kept, ragged) = cast::screen_field_count(batch, &binding);
                    rejects.extend(ragged);
                    batch = kept;
                }
                let screened = domain::partition(batch, &binding, contract)?;
                rejects.extend(screened.rejected);
                let cast = cast::cast_rows(screened.kept, &binding, contract)?;
                rejects.extend(cast.rejected);
                valid.extend(cast.valid);
            }
        }

        let unique = keys::enforce_unique(valid, contract)?;
        rejects.extend(unique.rejected);
        let mut rows = unique.kept;
        hash::finalize_rows(&mut rows, contract);
        rejects.sort_by_source();
        check_join_invariant(total_rows, rows.len(), rejects.len())?;

        let mut metrics = ParseMetrics {
            dataset_id: route.dataset_id.clone(),
            schema_id: contract.schema_id(),
            source_format: route.format.to_string(),
            layout_version: facts.layout_version.clone(),
            total_rows,
            valid_rows: rows.len(),
            encoding_detected: facts.encoding.map(|e| e.encoding.label().to_string()),
            encoding_fallback: facts.encoding.is_some_and(|e| e.fallback),
            bom_detected: facts.encoding.is_some_and(|e| e.bom_present),
            delimiter: facts.delimiter.map(crate::printable_delimiter),
            skipped_lines,
            unmapped_columns: unmapped,
            archive_members: facts.members.clone(),
            null_rates: tally.rates(),
            numeric_ranges: numeric_ranges(&rows, contract),
            ..ParseMetrics::default()
        };
        metrics.record_rejects(&rejects);
        metrics.check_reject_rate(self.catalog.config.reject_rate_alert_threshold);
        metrics.parse_duration_ms = started.elapsed().as_millis() as u64;

        let provenance = Provenance::new(
            metadata,
            filename,
            checksum,
            contract,
            facts.layout_version,
        );
        info!(
            "Parsed '{}' as {}: {} row(s), {} valid, {} rejected in {} ms",
            filename,
            metrics.schema_id,
            metrics.total_rows,
            metrics.valid_rows,
            metrics.reject_rows,
            metrics.parse_duration_ms
        );

        Ok(ParseResult {
            data: DataTable {
                columns: contract.column_names(),
                rows,
            },
            rejects,
            metrics,
            provenance,
        })
    }

    fn prefix<'b>(&self, bytes: &'b [u8]) -> &'b [u8] {
        &bytes[..bytes.len().min(self.catalog.config.sniff_bytes)]
    }

    fn contract_for(&self, schema_id: &str) -> ParseOutcome<&'c SchemaContract> {
        self.catalog
            .contracts
            .get(schema_id)
            .ok_or_else(|| ParseError::ContractNotFound {
                schema_id: schema_id.to_string(),
            })
    }

    fn read_source(
        &self,
        bytes: &[u8],
        route: &Route,
        contract: &SchemaContract,
        metadata: &ParseMetadata,
        facts: &mut SourceFacts,
    ) -> ParseOutcome<Vec<Segment>> {
        if route.format != SourceFormat::Zip {
            let table = self.read_single(bytes, route, contract, metadata, facts)?;
            return Ok(vec![Segment {
                member: None,
                format: route.format,
                table,
            }]);
        }

        let members = archive::read_members(bytes, self.catalog.config.max_archive_member_bytes)?;
        let mut segments = Vec::new();
        for member in members {
            let member_route = match self.route(&member.name, &member.bytes) {
                Ok(member_route) => member_route,
                Err(ParseError::Routing { .. }) => {
                    debug!("Archive member '{}' matches no route; ignoring", member.name);
                    continue;
                }
                Err(err) => return Err(err),
            };
            if member_route.format == SourceFormat::Zip
                || stable_schema_id(&member_route.schema_id) != contract.schema_id()
            {
                debug!(
                    "Archive member '{}' routes to {} ({}); ignoring",
                    member.name, member_route.schema_id, member_route.format
                );
                continue;
            }
            let mut member_facts = SourceFacts::default();
            let mut table =
                self.read_single(&member.bytes, &member_route, contract, metadata, &mut member_facts)?;
            table.tag_member(&member.name);
            facts.encoding = facts.encoding.or(member_facts.encoding);
            facts.delimiter = facts.delimiter.or(member_facts.delimiter);
            facts.layout_version = facts.layout_version.take().or(member_facts.layout_version);
            facts.members.push(member.name.clone());
            segments.push(Segment {
                member: Some(member.name.clone()),
                format: member_route.format,
                table,
            });
        }
        if segments.is_empty() {
            return Err(ParseError::Archive {
                detail: format!("no member routes to schema '{}'", contract.schema_id()),
            });
        }
        Ok(segments)
    }

    fn read_single(
        &self,
        bytes: &[u8],
        route: &Route,
        contract: &SchemaContract,
        metadata: &ParseMetadata,
        facts: &mut SourceFacts,
    ) -> ParseOutcome<RawTable> {
        match route.format {
            SourceFormat::FixedWidth => {
                let layout = self.layout_for(route, contract, metadata)?;
                facts.layout_version = Some(layout.version.clone());
                let text = self.decode_text(bytes, facts)?;
                fixed_width::read_fixed_width(&text, layout)
            }
            SourceFormat::Csv => {
                let text = self.decode_text(bytes, facts)?;
                let dialect = encoding::detect_dialect(
                    &text,
                    self.catalog.config.dialect_sample_lines,
                    contract.columns.len(),
                )?;
                facts.delimiter = Some(dialect.delimiter);
                crate::delimited::read_delimited(&text, &dialect)
            }
            SourceFormat::Excel => workbook::read_workbook(bytes, contract.sheet.as_deref()),
            SourceFormat::Zip => Err(ParseError::Archive {
                detail: "nested archives are not supported".to_string(),
            }),
        }
    }

    fn decode_text(&self, bytes: &[u8], facts: &mut SourceFacts) -> ParseOutcome<String> {
        let detected = encoding::detect(self.prefix(bytes))?;
        let (text, effective) = encoding::decode(bytes, detected)?;
        debug!(
            "Decoded {} byte(s) as {} (bom: {}, fallback: {})",
            bytes.len(),
            effective.encoding.label(),
            effective.bom_present,
            effective.fallback
        );
        facts.encoding = Some(effective);
        Ok(text)
    }

    fn layout_for(
        &self,
        route: &Route,
        contract: &SchemaContract,
        metadata: &ParseMetadata,
    ) -> ParseOutcome<&'c LayoutSpec> {
        let year = metadata.vintage.product_year;
        let quarter = metadata.vintage.quarter.as_deref();
        let not_found = || ParseError::LayoutNotFound {
            dataset: route.dataset_id.clone(),
            year,
            quarter: quarter.unwrap_or("annual").to_string(),
        };
        let layout = self
            .catalog
            .layouts
            .get_layout(&route.dataset_id, year, quarter)
            .map_err(|err| {
                debug!("Layout lookup failed: {err:#}");
                not_found()
            })?
            .ok_or_else(not_found)?;

        if let Some(expected) = &metadata.layout_version
            && expected.trim() != layout.version
        {
            return Err(ParseError::LayoutMismatch {
                dataset: layout.dataset.clone(),
                version: layout.version.clone(),
                detail: format!("caller expected layout version {expected}"),
            });
        }
        layout
            .check_against(contract)
            .map_err(|detail| ParseError::LayoutMismatch {
                dataset: layout.dataset.clone(),
                version: layout.version.clone(),
                detail,
            })?;
        debug!(
            "Resolved layout {} {} for {year} {}",
            layout.dataset,
            layout.version,
            quarter.unwrap_or("annual")
        );
        Ok(layout)
    }
}
