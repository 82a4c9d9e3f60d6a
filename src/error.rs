//! Error types for the lookup client.
//!
//! Background update failures are never surfaced through these types
//! directly; they are observable via `UpdateClient::status` and recover on
//! their own with backoff.

use crate::threat::UrlThreat;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The local database has missed its refresh window. Lookups still run
    /// against the stale snapshot and report this alongside their results.
    #[error("threat list is stale")]
    Stale,

    /// A list failed checksum validation. Lookups fail until the next
    /// successful reset update.
    #[error("threat list is corrupt")]
    Corrupt,

    #[error("API request failed: {0}")]
    Api(#[from] reqwest::Error),

    /// The server sent a diff the client cannot apply (bad indices,
    /// duplicate prefixes, undecodable additions).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The persisted database file could not be written or is unusable
    /// (wrong version, failed validation). A fresh fetch recovers.
    #[error("database persistence failed: {0}")]
    Storage(String),

    #[error("client is closed")]
    Closed,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of a `lookup_urls` call, carrying whatever verdicts were
/// computed before the error. The partial result always has one inner list
/// per input URL.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct LookupFailure {
    pub partial: Vec<Vec<UrlThreat>>,
    #[source]
    pub error: Error,
}

impl LookupFailure {
    pub(crate) fn new(partial: Vec<Vec<UrlThreat>>, error: Error) -> Self {
        Self { partial, error }
    }
}
