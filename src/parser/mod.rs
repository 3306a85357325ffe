pub mod ifc;
pub mod json;
pub mod normalize;
pub mod step;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use crate::error::{IngestionError, MalformedRecordError};
pub use normalize::{classify_shape, normalize, RawFields, RawHeight};
pub use step::{StepEntity, StepFile, StepValue};

use crate::model::ColumnRecord;

/// Payload formats the ingestion parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Ifc,
}

impl Format {
    /// Derives the format from a file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, IngestionError> {
        let extension = path
            .as_ref()
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_default();
        extension.parse()
    }
}

impl FromStr for Format {
    type Err = IngestionError;

    /// Accepts bare names, extensions and content types, case-insensitively.
    fn from_str(declared: &str) -> Result<Self, Self::Err> {
        let token = declared.trim().to_ascii_lowercase();
        let token = token.split(';').next().unwrap_or_default().trim();
        let token = token.strip_prefix('.').unwrap_or(token);

        match token {
            "json" | "application/json" | "text/json" => Ok(Format::Json),
            "ifc" | "ifc-spf" | "step" | "stp" | "application/x-step" | "application/ifc"
            | "model/ifc" | "application/x-ifc" => Ok(Format::Ifc),
            _ => Err(IngestionError::UnsupportedFormat {
                declared: declared.to_string(),
            }),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Json => "JSON",
            Format::Ifc => "IFC",
        })
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// Surviving records in source order.
    pub records: Vec<ColumnRecord>,
    /// One entry per skipped record, in source order.
    pub warnings: Vec<MalformedRecordError>,
}

/// Decodes a payload and normalizes every record in it.
///
/// Malformed records are skipped and reported in
/// [`ParseOutcome::warnings`]. The call fails only when the payload cannot be
/// decoded as `format` or when no record survives.
///
/// # Example
///
/// ```
/// use column_catalog::parser::{parse, Format};
///
/// let payload = br#"[{"name":"C1","type":"Round","height":3000}]"#;
/// let outcome = parse(payload, Format::Json)?;
/// assert_eq!(outcome.records.len(), 1);
/// # Ok::<(), column_catalog::error::IngestionError>(())
/// ```
pub fn parse(payload: &[u8], format: Format) -> Result<ParseOutcome, IngestionError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| IngestionError::parse(format, format!("payload is not UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let raw_records = match format {
        Format::Json => json::read_records(text)?,
        Format::Ifc => ifc::read_records(text)?,
    };
    tracing::debug!(%format, raw = raw_records.len(), "decoded payload");

    let mut records = Vec::with_capacity(raw_records.len());
    let mut warnings = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    // Generated ids must not collide with any id the payload spells out
    let explicit_ids: HashSet<String> = raw_records
        .iter()
        .filter_map(|raw| raw.as_ref().ok())
        .filter_map(normalize::explicit_id)
        .map(str::to_string)
        .collect();

    for raw in raw_records {
        let result = raw.and_then(|fields| {
            let position = fields.position;
            let record = normalize::normalize_with(fields, |id| {
                explicit_ids.contains(id) || seen_ids.contains(id)
            })?;
            if seen_ids.insert(record.id().to_string()) {
                Ok(record)
            } else {
                Err(MalformedRecordError::DuplicateId {
                    position,
                    id: record.id().to_string(),
                })
            }
        });

        match result {
            Ok(record) => records.push(record),
            Err(warning) => {
                tracing::warn!(%warning, "skipping malformed record");
                warnings.push(warning);
            }
        }
    }

    if records.is_empty() {
        return Err(IngestionError::EmptyResult {
            skipped: warnings.len(),
            warnings,
        });
    }

    Ok(ParseOutcome { records, warnings })
}
