//! Error types for spatial index operations.

use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::bounding_box::BoundingBox;
use crate::dataset::RowId;

/// Errors that can occur while building, opening or querying a spatial index.
#[derive(Debug, Error)]
pub enum SindexError {
    /// The dataset cannot be opened, or cannot report its row count.
    #[error("Dataset unavailable: {path}: {reason}")]
    DatasetUnavailable { path: PathBuf, reason: String },

    /// A geometry payload could not be decoded into a bounding box.
    #[error("Corrupt geometry at row {row_id}: {reason}")]
    CorruptGeometry { row_id: RowId, reason: String },

    /// Building the index was aborted; nothing was published.
    #[error("Index build failed for {path}: {source}")]
    IndexBuildFailed {
        path: PathBuf,
        #[source]
        source: Box<SindexError>,
    },

    /// An existing index artifact is unreadable or incompatible.
    #[error("Index corrupt: {path}: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    /// A row id outside `[0, total_rows)` was requested.
    #[error("Invalid row id {row_id}: dataset has {total_rows} rows")]
    InvalidRowId { row_id: RowId, total_rows: u64 },

    /// The dataset carries no coordinate reference system for its geometry column.
    #[error("Missing CRS for column '{column}' in {path}")]
    MissingCrs { path: PathBuf, column: String },

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(BoundingBox),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Index is closed")]
    Closed,
}

/// Fieldless discriminant of [`SindexError`], convenient for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DatasetUnavailable,
    CorruptGeometry,
    IndexBuildFailed,
    IndexCorrupt,
    InvalidRowId,
    MissingCrs,
    InvalidBoundingBox,
    IOError,
    SerializationError,
    InvalidOperation,
    Closed,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::DatasetUnavailable => write!(f, "Dataset unavailable"),
            ErrorKind::CorruptGeometry => write!(f, "Corrupt geometry"),
            ErrorKind::IndexBuildFailed => write!(f, "Index build failed"),
            ErrorKind::IndexCorrupt => write!(f, "Index corrupt"),
            ErrorKind::InvalidRowId => write!(f, "Invalid row id"),
            ErrorKind::MissingCrs => write!(f, "Missing CRS"),
            ErrorKind::InvalidBoundingBox => write!(f, "Invalid bounding box"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::SerializationError => write!(f, "Serialization error"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::Closed => write!(f, "Closed"),
        }
    }
}

impl SindexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SindexError::DatasetUnavailable { .. } => ErrorKind::DatasetUnavailable,
            SindexError::CorruptGeometry { .. } => ErrorKind::CorruptGeometry,
            SindexError::IndexBuildFailed { .. } => ErrorKind::IndexBuildFailed,
            SindexError::IndexCorrupt { .. } => ErrorKind::IndexCorrupt,
            SindexError::InvalidRowId { .. } => ErrorKind::InvalidRowId,
            SindexError::MissingCrs { .. } => ErrorKind::MissingCrs,
            SindexError::InvalidBoundingBox(_) => ErrorKind::InvalidBoundingBox,
            SindexError::Io(_) => ErrorKind::IOError,
            SindexError::Serialization(_) => ErrorKind::SerializationError,
            SindexError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            SindexError::Closed => ErrorKind::Closed,
        }
    }

    pub(crate) fn dataset_unavailable(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        SindexError::DatasetUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn index_corrupt(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        SindexError::IndexCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps an error raised while draining the bounds stream into a build failure.
    pub(crate) fn build_failed(path: impl Into<PathBuf>, source: SindexError) -> Self {
        SindexError::IndexBuildFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for spatial index operations
pub type SindexResult<T> = Result<T, SindexError>;
