//! The local blocklist database.
//!
//! Holds one sorted prefix array per subscribed threat list, answers
//! "is this full hash possibly listed?" without blocking the updater, and
//! drives the incremental sync protocol. Readers load an immutable
//! snapshot through an `ArcSwap`; the update cycle builds the next
//! snapshot on the side and publishes it with a single pointer swap.

mod prefix_set;
mod store;

pub use prefix_set::PrefixSet;
pub use store::{DatabaseFile, ListRecord, FORMAT_VERSION};

use crate::api::types::{
    CompressionType, ListUpdateConstraints, ListUpdateRequest, ListUpdateResponse, ResponseType,
    ThreatEntryAdditions,
};
use crate::api::ThreatApi;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::HashPrefix;
use crate::rice;
use crate::threat::ThreatType;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How many list diffs are requested concurrently during one sync pass.
const CONCURRENT_LIST_UPDATES: usize = 4;

#[derive(Debug, Clone)]
struct ListState {
    prefixes: Arc<PrefixSet>,
    version_token: Vec<u8>,
    last_update: DateTime<Utc>,
    /// Set on checksum mismatch; forces RESET semantics next cycle.
    corrupt: bool,
}

#[derive(Debug, Default)]
struct Snapshot {
    lists: FxHashMap<ThreatType, ListState>,
    /// Completion time of the last fully successful sync pass.
    last_update: Option<DateTime<Utc>>,
}

pub struct Database {
    snapshot: ArcSwap<Snapshot>,
    ready_tx: watch::Sender<bool>,
    threat_lists: Vec<ThreatType>,
    update_period: Duration,
    db_path: Option<PathBuf>,
    max_diff_entries: u32,
    max_database_entries: u32,
}

impl Database {
    pub fn new(config: &Config, threat_lists: Vec<ThreatType>) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            ready_tx,
            threat_lists,
            update_period: config.update_period(),
            db_path: config.db_path.clone(),
            max_diff_entries: config.max_diff_entries,
            max_database_entries: config.max_database_entries,
        }
    }

    /// Observes `true` once the database has ever reached a healthy
    /// state.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// Finds the shortest stored prefix of `full` across the subscribed
    /// lists, with every list that contains a matching prefix. `None`
    /// means the hash is definitely on no list.
    pub fn lookup(&self, full: &HashPrefix) -> Option<(HashPrefix, Vec<ThreatType>)> {
        let snapshot = self.snapshot.load();
        let mut matched: Option<&HashPrefix> = None;
        let mut threats = Vec::new();
        for tt in &self.threat_lists {
            let Some(state) = snapshot.lists.get(tt) else {
                continue;
            };
            if let Some(prefix) = state.prefixes.lookup(full) {
                if matched.map_or(true, |m| prefix.len() < m.len()) {
                    matched = Some(prefix);
                }
                threats.push(*tt);
            }
        }
        matched.map(|m| (m.clone(), threats))
    }

    /// Health of the current snapshot: `Ok`, stale (no successful sync
    /// within twice the update period), or corrupt (checksum mismatch
    /// awaiting a reset).
    pub fn status(&self) -> Result<()> {
        let snapshot = self.snapshot.load();
        if snapshot.lists.values().any(|l| l.corrupt) {
            return Err(Error::Corrupt);
        }
        match snapshot.last_update {
            None => Err(Error::Stale),
            Some(last) => {
                let age = (Utc::now() - last).to_std().unwrap_or_default();
                if age > self.update_period * 2 {
                    Err(Error::Stale)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Time since the last successful sync pass, or `None` if there has
    /// never been one.
    pub fn since_last_update(&self) -> Option<Duration> {
        self.snapshot
            .load()
            .last_update
            .map(|last| (Utc::now() - last).to_std().unwrap_or_default())
    }

    /// Zero while the next update is still scheduled in the future,
    /// otherwise the time since the missed deadline.
    pub fn update_lag(&self) -> Duration {
        let Some(age) = self.since_last_update() else {
            return Duration::ZERO;
        };
        age.saturating_sub(self.update_period)
    }

    /// Initializes from the persisted file. Returns `true` when the
    /// loaded state is fresh enough that the next update can wait a full
    /// period; `false` means an immediate update is required (the loaded
    /// tokens, if any, still allow it to be incremental).
    pub fn init_from_file(&self) -> bool {
        let Some(path) = &self.db_path else {
            return false;
        };
        if !path.exists() {
            return false;
        }
        let (file, sets) = match store::load(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("ignoring persisted database: {e}");
                return false;
            }
        };

        let mut lists = FxHashMap::default();
        for (record, set) in file.lists.into_iter().zip(sets) {
            lists.insert(
                record.threat_type,
                ListState {
                    prefixes: Arc::new(set),
                    version_token: record.version_token,
                    last_update: record.last_update,
                    corrupt: false,
                },
            );
        }
        // Every subscribed list must be present; a partial file cannot
        // answer lookups soundly.
        if self.threat_lists.iter().any(|tt| !lists.contains_key(tt)) {
            warn!("persisted database is missing subscribed lists, refetching");
            return false;
        }

        let age = (Utc::now() - file.last_update).to_std().unwrap_or_default();
        self.snapshot.store(Arc::new(Snapshot {
            lists,
            last_update: Some(file.last_update),
        }));
        info!(age_secs = age.as_secs(), "database restored from disk");

        if self.status().is_ok() {
            self.ready_tx.send_replace(true);
        }
        age < self.update_period
    }

    /// Runs one sync pass over every subscribed list and publishes the
    /// result. Returns the suggested delay before the next pass and
    /// whether the pass fully succeeded.
    pub async fn update(&self, api: &dyn ThreatApi) -> (Duration, bool) {
        let old = self.snapshot.load_full();

        let requests = self.threat_lists.iter().map(|&tt| {
            let token = old
                .lists
                .get(&tt)
                .filter(|s| !s.corrupt)
                .map(|s| s.version_token.clone())
                .unwrap_or_default();
            let request = ListUpdateRequest {
                threat_type: tt,
                version_token: token,
                constraints: ListUpdateConstraints {
                    supported_compressions: vec![CompressionType::Raw, CompressionType::Rice],
                    max_diff_entries: self.max_diff_entries,
                    max_database_entries: self.max_database_entries,
                    ..Default::default()
                },
            };
            async move { (tt, api.list_update(request).await) }
        }).collect::<Vec<_>>();
        let results: Vec<(ThreatType, Result<ListUpdateResponse>)> = stream::iter(requests)
            .buffer_unordered(CONCURRENT_LIST_UPDATES)
            .collect()
            .await;

        let now = Utc::now();
        let mut lists = old.lists.clone();
        let mut all_ok = true;
        let mut wait: Option<Duration> = None;

        for (tt, result) in results {
            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!(list = %tt, "list update failed: {e}");
                    all_ok = false;
                    continue;
                }
            };
            if let Some(w) = response.minimum_wait() {
                wait = Some(wait.map_or(w, |cur| cur.max(w)));
            }

            let base = match response.response_type {
                ResponseType::Reset => Arc::new(PrefixSet::empty()),
                _ => old
                    .lists
                    .get(&tt)
                    .map(|s| s.prefixes.clone())
                    .unwrap_or_default(),
            };
            match apply_response(&base, &response) {
                Ok(prefixes) => {
                    info!(list = %tt, entries = prefixes.len(), "list updated");
                    lists.insert(
                        tt,
                        ListState {
                            prefixes: Arc::new(prefixes),
                            version_token: response.new_version_token,
                            last_update: now,
                            corrupt: false,
                        },
                    );
                }
                Err(e) => {
                    error!(list = %tt, "discarding list: {e}");
                    all_ok = false;
                    lists.insert(
                        tt,
                        ListState {
                            prefixes: Arc::new(PrefixSet::empty()),
                            version_token: Vec::new(),
                            last_update: now,
                            corrupt: true,
                        },
                    );
                }
            }
        }

        let snapshot = Arc::new(Snapshot {
            lists,
            last_update: if all_ok { Some(now) } else { old.last_update },
        });
        self.snapshot.store(snapshot);

        if all_ok {
            if self.status().is_ok() {
                self.ready_tx.send_replace(true);
            }
            self.persist();
        }

        (wait.unwrap_or(self.update_period), all_ok)
    }

    /// Serializes the current snapshot to the configured path. Failure is
    /// logged, not fatal; the database simply stays memory-only.
    fn persist(&self) {
        let Some(path) = &self.db_path else {
            return;
        };
        let snapshot = self.snapshot.load();
        let Some(last_update) = snapshot.last_update else {
            return;
        };
        let mut lists: Vec<ListRecord> = snapshot
            .lists
            .iter()
            .map(|(&tt, state)| ListRecord {
                threat_type: tt,
                version_token: state.version_token.clone(),
                checksum: state.prefixes.checksum(),
                last_update: state.last_update,
                prefixes: state.prefixes.iter().cloned().collect(),
            })
            .collect();
        lists.sort_by_key(|r| r.threat_type);

        let file = DatabaseFile {
            version: FORMAT_VERSION,
            last_update,
            lists,
        };
        if let Err(e) = store::save(path, &file) {
            warn!("failed to persist database: {e}");
        }
    }
}

/// Applies a diff response on top of `base` and validates the advertised
/// checksum.
fn apply_response(base: &PrefixSet, response: &ListUpdateResponse) -> Result<PrefixSet> {
    let removals = response
        .removals
        .as_ref()
        .map(|r| r.indices.as_slice())
        .unwrap_or_default();
    let additions = match &response.additions {
        Some(additions) => decode_additions(additions)?,
        None => Vec::new(),
    };
    let merged = base.apply_diff(removals, additions)?;
    if merged.checksum() != response.checksum.sha256 {
        return Err(Error::Corrupt);
    }
    Ok(merged)
}

/// Decodes both supported additions encodings into prefixes.
fn decode_additions(additions: &ThreatEntryAdditions) -> Result<Vec<HashPrefix>> {
    let mut out = Vec::new();
    for raw in &additions.raw_hashes {
        let size = raw.prefix_size as usize;
        if !(4..=32).contains(&size) {
            return Err(Error::Protocol(format!("bad prefix size {size}")));
        }
        if raw.raw_hashes.len() % size != 0 {
            return Err(Error::Protocol(format!(
                "raw hashes length {} not a multiple of {size}",
                raw.raw_hashes.len()
            )));
        }
        out.extend(raw.raw_hashes.chunks(size).map(HashPrefix::from_bytes));
    }
    if let Some(rice_hashes) = &additions.rice_hashes {
        let values = rice::decode(&rice_hashes.clone().into())?;
        out.extend(
            values
                .into_iter()
                .map(|v| HashPrefix::from_bytes(&v.to_le_bytes())),
        );
    }
    out.sort_unstable();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{Checksum, RawHashes};

    fn full(lead: &[u8]) -> HashPrefix {
        let mut bytes = lead.to_vec();
        bytes.resize(32, 0xee);
        HashPrefix::from_bytes(&bytes)
    }

    fn diff_response(additions: Vec<HashPrefix>, expected: &PrefixSet) -> ListUpdateResponse {
        let mut raw = Vec::new();
        for p in &additions {
            assert_eq!(p.len(), 4);
            raw.extend_from_slice(p.as_bytes());
        }
        ListUpdateResponse {
            response_type: ResponseType::Diff,
            removals: None,
            additions: Some(ThreatEntryAdditions {
                raw_hashes: vec![RawHashes {
                    prefix_size: 4,
                    raw_hashes: raw,
                }],
                rice_hashes: None,
            }),
            new_version_token: b"tok".to_vec(),
            checksum: Checksum {
                sha256: expected.checksum(),
            },
            minimum_wait_duration: None,
        }
    }

    #[test]
    fn test_decode_rice_additions() {
        let values = vec![0x01020304u32, 0x01020305, 0x7fffffff];
        let encoded = rice::encode(&values, 16).unwrap();
        let additions = ThreatEntryAdditions {
            raw_hashes: vec![],
            rice_hashes: Some(encoded.into()),
        };
        let prefixes = decode_additions(&additions).unwrap();
        assert_eq!(prefixes.len(), 3);
        assert!(prefixes
            .iter()
            .any(|p| p.as_bytes() == 0x01020304u32.to_le_bytes().as_slice()));
        for w in prefixes.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn test_decode_rejects_ragged_raw() {
        let additions = ThreatEntryAdditions {
            raw_hashes: vec![RawHashes {
                prefix_size: 4,
                raw_hashes: vec![0; 6],
            }],
            rice_hashes: None,
        };
        assert!(decode_additions(&additions).is_err());
    }

    #[test]
    fn test_apply_response_checksum_gate() {
        let base = PrefixSet::empty();
        let additions = vec![HashPrefix::from_bytes(&[1, 2, 3, 4])];
        let expected = PrefixSet::from_prefixes(additions.clone()).unwrap();
        let ok = diff_response(additions.clone(), &expected);
        assert_eq!(apply_response(&base, &ok).unwrap(), expected);

        let mut bad = diff_response(additions, &expected);
        bad.checksum.sha256[0] ^= 0xff;
        assert!(matches!(
            apply_response(&base, &bad),
            Err(Error::Corrupt)
        ));
    }

    #[test]
    fn test_lookup_across_lists() {
        let config = Config::default();
        let db = Database::new(
            &config,
            vec![ThreatType::Malware, ThreatType::UnwantedSoftware],
        );
        let target = full(&[0xaa, 0xbb, 0xcc, 0xdd]);
        let prefix = HashPrefix::from_bytes(&target.as_bytes()[..4]);
        let set = Arc::new(PrefixSet::from_prefixes(vec![prefix.clone()]).unwrap());

        let mut lists = FxHashMap::default();
        for tt in [ThreatType::Malware, ThreatType::UnwantedSoftware] {
            lists.insert(
                tt,
                ListState {
                    prefixes: set.clone(),
                    version_token: vec![],
                    last_update: Utc::now(),
                    corrupt: false,
                },
            );
        }
        db.snapshot.store(Arc::new(Snapshot {
            lists,
            last_update: Some(Utc::now()),
        }));

        let (matched, threats) = db.lookup(&target).unwrap();
        assert_eq!(matched, prefix);
        assert_eq!(
            threats,
            vec![ThreatType::Malware, ThreatType::UnwantedSoftware]
        );
        assert!(db.lookup(&full(&[0x01, 0x02, 0x03, 0x04])).is_none());
        assert!(db.status().is_ok());
    }

    #[test]
    fn test_status_stale_until_first_update() {
        let db = Database::new(&Config::default(), vec![ThreatType::Malware]);
        assert!(matches!(db.status(), Err(Error::Stale)));
        assert_eq!(db.update_lag(), Duration::ZERO);
        assert!(db.since_last_update().is_none());
    }
}
