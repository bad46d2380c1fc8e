use crate::models::{MeterId, UnitId};
use thiserror::Error;

/// Errors produced by the export pipeline itself.
///
/// Plumbing around the pipeline (config files, the reading store, the CLI)
/// reports through `anyhow`; anything that crosses a pipeline stage ends up
/// here so callers can match on the failure kind.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    Lookup { kind: LookupKind, id: String },

    #[error("fetch failed for meter {meter_id}: {message}")]
    Fetch { meter_id: MeterId, message: String },

    #[error("write failed: {0}")]
    Write(String),

    #[error("export cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Meter,
    Unit,
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupKind::Meter => f.write_str("meter"),
            LookupKind::Unit => f.write_str("unit"),
        }
    }
}

impl ExportError {
    pub fn meter_not_found(id: MeterId) -> Self {
        Self::Lookup {
            kind: LookupKind::Meter,
            id: id.to_string(),
        }
    }

    pub fn unit_not_found(id: UnitId) -> Self {
        Self::Lookup {
            kind: LookupKind::Unit,
            id: id.to_string(),
        }
    }

    pub fn fetch(meter_id: MeterId, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            meter_id,
            message: err.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup { .. })
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Write(err.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        Self::Write(err.to_string())
    }
}

pub type ExportResult<T> = Result<T, ExportError>;
