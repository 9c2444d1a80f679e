//! Error types for zonetrack.

use thiserror::Error;

use crate::model::ZoneId;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or degenerate boundary at registration. The zone is not created.
    #[error("invalid zone boundary: {0}")]
    InvalidBoundary(String),

    #[error("zone name already registered: {0}")]
    DuplicateZoneName(String),

    /// A stored timestamp lacks timezone information and cannot be safely
    /// compared with an aware instant.
    #[error("stored timestamp is not timezone-aware: {0:?}")]
    NaiveTimestamp(String),

    #[error("zone not found: {0}")]
    ZoneNotFound(ZoneId),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
