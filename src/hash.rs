//! Hash prefixes, the unit the blocklist database stores.
//!
//! A full hash is the 32-byte SHA-256 of a canonicalized URL expression. A
//! prefix is its leading 4 to 32 bytes; the database holds prefixes, the
//! cache and the remote service deal in full hashes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Shortest prefix the service will ever serve.
pub const MIN_HASH_PREFIX_LEN: usize = 4;
/// Length of a full SHA-256 hash.
pub const FULL_HASH_LEN: usize = 32;

/// A byte prefix of a full SHA-256 hash. Ordering is lexicographic over
/// the raw bytes, which is the order the database keeps its arrays in.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HashPrefix(Box<[u8]>);

impl HashPrefix {
    /// Computes the full hash of a canonical pattern.
    pub fn full(pattern: &str) -> Self {
        let digest = Sha256::digest(pattern.as_bytes());
        HashPrefix(digest.as_slice().into())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        HashPrefix(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is a well-formed prefix (4..=32 bytes).
    pub fn is_valid(&self) -> bool {
        (MIN_HASH_PREFIX_LEN..=FULL_HASH_LEN).contains(&self.0.len())
    }

    /// Whether this is a complete 32-byte hash.
    pub fn is_full(&self) -> bool {
        self.0.len() == FULL_HASH_LEN
    }

    /// Whether `self` begins with `prefix`.
    pub fn has_prefix(&self, prefix: &HashPrefix) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Debug for HashPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashPrefix(")?;
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// SHA-256 over the concatenation of a sorted prefix array; the checksum
/// the update protocol validates after every applied diff.
pub fn checksum_prefixes<'a, I>(prefixes: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a HashPrefix>,
{
    let mut hasher = Sha256::new();
    for p in prefixes {
        hasher.update(p.as_bytes());
    }
    hasher.finalize().to_vec()
}
