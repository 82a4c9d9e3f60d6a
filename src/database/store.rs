//! On-disk snapshot of the database.
//!
//! A single versioned file holds every subscribed list's state so a
//! restart can resume incremental diffs instead of refetching the world.
//! Writes go to a sibling temp file first and rename into place; loads
//! that fail version or checksum validation are discarded wholesale.

use super::prefix_set::PrefixSet;
use crate::error::{Error, Result};
use crate::hash::HashPrefix;
use crate::threat::ThreatType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseFile {
    pub version: u32,
    pub last_update: DateTime<Utc>,
    pub lists: Vec<ListRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRecord {
    pub threat_type: ThreatType,
    pub version_token: Vec<u8>,
    pub checksum: Vec<u8>,
    pub last_update: DateTime<Utc>,
    pub prefixes: Vec<HashPrefix>,
}

pub fn save(path: &Path, file: &DatabaseFile) -> Result<()> {
    let bytes =
        bincode::serialize(file).map_err(|e| Error::Storage(format!("encode failed: {e}")))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Loads and validates a database file, returning each list's state as a
/// verified [`PrefixSet`].
pub fn load(path: &Path) -> Result<(DatabaseFile, Vec<PrefixSet>)> {
    let bytes = fs::read(path)?;
    let file: DatabaseFile =
        bincode::deserialize(&bytes).map_err(|e| Error::Storage(format!("decode failed: {e}")))?;
    if file.version != FORMAT_VERSION {
        return Err(Error::Storage(format!(
            "unsupported database version {}",
            file.version
        )));
    }
    let mut sets = Vec::with_capacity(file.lists.len());
    for record in &file.lists {
        let set = PrefixSet::from_prefixes(record.prefixes.clone()).map_err(|e| {
            Error::Storage(format!("list {} invalid: {e}", record.threat_type))
        })?;
        if set.checksum() != record.checksum {
            warn!(list = %record.threat_type, "stored checksum mismatch, discarding file");
            return Err(Error::Storage(format!(
                "list {} checksum mismatch",
                record.threat_type
            )));
        }
        sets.push(set);
    }
    Ok((file, sets))
}
