//! Error types for the column catalog.

use std::path::PathBuf;
use thiserror::Error;

use crate::parser::Format;

/// A single source record that could not be normalized.
///
/// These never abort an ingestion on their own. The parser collects them as
/// warnings and keeps going with the next record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedRecordError {
    /// The record carries no height at all.
    #[error("record {position}: height is missing")]
    MissingHeight { position: usize },

    /// The height could not be read as a number.
    #[error("record {position}: height '{value}' is not numeric")]
    InvalidHeight { position: usize, value: String },

    /// The height was read but is zero or negative.
    #[error("record {position}: height {height} must be greater than zero")]
    NonPositiveHeight { position: usize, height: f64 },

    /// Neither an id nor a name is present, so there is nothing to display.
    #[error("record {position}: both id and name are missing")]
    MissingIdentity { position: usize },

    /// The record is not an object (JSON) or entity (IFC) at all.
    #[error("record {position}: expected an object, found {found}")]
    NotAnObject { position: usize, found: String },

    /// Another record earlier in the same payload already uses this id.
    #[error("record {position}: duplicate id '{id}'")]
    DuplicateId { position: usize, id: String },
}

impl MalformedRecordError {
    /// 1-based position of the offending record in the source payload.
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::MissingHeight { position }
            | Self::InvalidHeight { position, .. }
            | Self::NonPositiveHeight { position, .. }
            | Self::MissingIdentity { position }
            | Self::NotAnObject { position, .. }
            | Self::DuplicateId { position, .. } => *position,
        }
    }
}

/// Errors that abort a whole load. The previously loaded catalog stays in place.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The declared format is neither JSON nor IFC.
    #[error("unsupported format '{declared}' (expected JSON or IFC)")]
    UnsupportedFormat { declared: String },

    /// The payload cannot be decoded as the declared format at all.
    #[error("invalid {format} payload: {message}")]
    Parse { format: Format, message: String },

    /// Every record in the payload was malformed.
    #[error("no usable columns found ({skipped} malformed records skipped)")]
    EmptyResult {
        skipped: usize,
        warnings: Vec<MalformedRecordError>,
    },

    /// A newer load was submitted before this one could commit.
    #[error("load #{token} superseded by load #{latest}")]
    Superseded { token: u64, latest: u64 },

    /// Failed to read the payload from disk.
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl IngestionError {
    pub(crate) fn parse(format: Format, message: impl Into<String>) -> Self {
        Self::Parse {
            format,
            message: message.into(),
        }
    }
}

/// Errors that can occur when exporting data.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Failed to create the output file.
    #[error("failed to create file '{path}': {source}")]
    FileCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write data to the file.
    #[error("failed to write data: {message}")]
    WriteError { message: String },

    /// Failed to serialize data to JSON.
    #[error("JSON serialization failed: {source}")]
    JsonSerialize {
        #[from]
        source: serde_json::Error,
    },

    /// Failed to write CSV data.
    #[error("CSV write failed: {source}")]
    CsvWrite {
        #[from]
        source: csv::Error,
    },
}
