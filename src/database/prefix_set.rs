//! The ordered prefix array backing one threat list.

use crate::error::{Error, Result};
use crate::hash::{checksum_prefixes, HashPrefix, MIN_HASH_PREFIX_LEN};

/// A strictly increasing array of hash prefixes. Immutable once built;
/// diff application produces a new set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixSet {
    prefixes: Vec<HashPrefix>,
}

impl PrefixSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a set from prefixes in any order. Fails on invalid lengths
    /// or duplicates.
    pub fn from_prefixes(mut prefixes: Vec<HashPrefix>) -> Result<Self> {
        prefixes.sort_unstable();
        for pair in prefixes.windows(2) {
            if pair[0] == pair[1] {
                return Err(Error::Protocol(format!(
                    "duplicate prefix {:?}",
                    pair[0]
                )));
            }
        }
        if let Some(bad) = prefixes.iter().find(|p| !p.is_valid()) {
            return Err(Error::Protocol(format!(
                "prefix length {} out of range",
                bad.len()
            )));
        }
        Ok(Self { prefixes })
    }

    /// Finds the shortest stored prefix that `full` begins with. `None`
    /// means the hash is definitely absent from this list.
    ///
    /// Every candidate lies between the hash's 4-byte prefix and the hash
    /// itself in lexicographic order, so two binary searches bound a scan
    /// that is almost always a single element.
    pub fn lookup(&self, full: &HashPrefix) -> Option<&HashPrefix> {
        let bytes = full.as_bytes();
        if bytes.len() < MIN_HASH_PREFIX_LEN {
            return None;
        }
        let lo = self
            .prefixes
            .partition_point(|p| p.as_bytes() < &bytes[..MIN_HASH_PREFIX_LEN]);
        let hi = self.prefixes.partition_point(|p| p.as_bytes() <= bytes);
        self.prefixes[lo..hi].iter().find(|p| full.has_prefix(p))
    }

    /// Applies one server diff: delete `removals` (indices into the
    /// current array, applied descending), then merge the sorted
    /// `additions`. Duplicates anywhere are a protocol error.
    pub fn apply_diff(&self, removals: &[u32], additions: Vec<HashPrefix>) -> Result<PrefixSet> {
        let mut survivors = self.prefixes.clone();
        let mut indices = removals.to_vec();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        for window in indices.windows(2) {
            if window[0] == window[1] {
                return Err(Error::Protocol(format!(
                    "duplicate removal index {}",
                    window[0]
                )));
            }
        }
        for idx in indices {
            let idx = idx as usize;
            if idx >= survivors.len() {
                return Err(Error::Protocol(format!(
                    "removal index {idx} out of range ({} entries)",
                    survivors.len()
                )));
            }
            survivors.remove(idx);
        }

        let mut additions = additions;
        additions.sort_unstable();

        let mut merged = Vec::with_capacity(survivors.len() + additions.len());
        let mut old = survivors.into_iter().peekable();
        let mut new = additions.into_iter().peekable();
        loop {
            let take_old = match (old.peek(), new.peek()) {
                (Some(a), Some(b)) if a == b => {
                    return Err(Error::Protocol(format!("duplicate prefix {a:?}")));
                }
                (Some(a), Some(b)) => a < b,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_old {
                old.next().unwrap()
            } else {
                new.next().unwrap()
            };
            if !next.is_valid() {
                return Err(Error::Protocol(format!(
                    "prefix length {} out of range",
                    next.len()
                )));
            }
            if let Some(last) = merged.last() {
                if *last == next {
                    return Err(Error::Protocol(format!("duplicate prefix {next:?}")));
                }
            }
            merged.push(next);
        }

        Ok(PrefixSet { prefixes: merged })
    }

    /// SHA-256 over the concatenated array, as the update protocol
    /// validates it.
    pub fn checksum(&self) -> Vec<u8> {
        checksum_prefixes(&self.prefixes)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HashPrefix> {
        self.prefixes.iter()
    }
}
