//! Per-full-hash verdict cache.
//!
//! Once the remote service has adjudicated a full hash, the verdict stays
//! authoritative until its server-supplied expiry: positives per threat
//! type, negatives ("confirmed not on any subscribed list") for the hash
//! as a whole. The whole cache is dropped after every successful database
//! update, since prefix churn invalidates prior adjudications.

use crate::api::types::SearchHashesResponse;
use crate::hash::HashPrefix;
use crate::threat::ThreatType;
use chrono::{DateTime, Duration, Utc};
use rustc_hash::FxHashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheResult {
    /// The hash is a known threat for at least one type.
    PositiveHit,
    /// The server recently confirmed this hash is on no subscribed list.
    NegativeHit,
    /// Nothing usable cached; the API must be asked.
    Miss,
}

#[derive(Debug, Default)]
struct Entry {
    positives: FxHashMap<ThreatType, DateTime<Utc>>,
    negative_expiry: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Cache {
    entries: Mutex<FxHashMap<HashPrefix, Entry>>,
    /// Overrides server-supplied expirations when set. Testing hook.
    fixed_ttl: Option<Duration>,
}

impl Cache {
    pub fn new(fixed_ttl: Option<std::time::Duration>) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            fixed_ttl: fixed_ttl.and_then(|d| Duration::from_std(d).ok()),
        }
    }

    /// Looks up a full hash. On a positive hit the returned map holds the
    /// unexpired threat types with their expiries. Entries whose contents
    /// have all expired are removed on the way out.
    pub fn lookup(
        &self,
        hash: &HashPrefix,
        now: DateTime<Utc>,
    ) -> (FxHashMap<ThreatType, DateTime<Utc>>, CacheResult) {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(hash) else {
            return (FxHashMap::default(), CacheResult::Miss);
        };

        let live: FxHashMap<ThreatType, DateTime<Utc>> = entry
            .positives
            .iter()
            .filter(|(_, expiry)| now < **expiry)
            .map(|(tt, expiry)| (*tt, *expiry))
            .collect();

        let negative_live = entry.negative_expiry.is_some_and(|e| now < e);
        if negative_live && live.is_empty() {
            return (live, CacheResult::NegativeHit);
        }
        if !live.is_empty() {
            return (live, CacheResult::PositiveHit);
        }

        entries.remove(hash);
        (live, CacheResult::Miss)
    }

    /// Merges one API response into the cache. `covered` is the set of
    /// full hashes the queried prefix covers; every covered hash the
    /// response did not flag gets the response's negative expiry.
    pub fn update(&self, covered: &[HashPrefix], resp: &SearchHashesResponse, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap();

        for threat in &resp.threats {
            if !threat.hash.is_full() {
                continue;
            }
            let expiry = match self.fixed_ttl {
                Some(ttl) => now + ttl,
                None => threat.expire_time,
            };
            let entry = entries.entry(threat.hash.clone()).or_default();
            for &tt in &threat.threat_types {
                let slot = entry.positives.entry(tt).or_insert(expiry);
                if expiry > *slot {
                    *slot = expiry;
                }
            }
        }

        let negative_expiry = match self.fixed_ttl {
            Some(ttl) => Some(now + ttl),
            None => resp.negative_expire_time,
        };
        if let Some(negative_expiry) = negative_expiry {
            for hash in covered {
                let flagged = resp
                    .threats
                    .iter()
                    .any(|t| t.hash == *hash);
                if !flagged {
                    entries.entry(hash.clone()).or_default().negative_expiry =
                        Some(negative_expiry);
                }
            }
        }
    }

    /// Drops every entry.
    pub fn purge(&self) {
        self.entries.lock().unwrap().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
