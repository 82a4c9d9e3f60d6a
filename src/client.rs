//! The client facade.
//!
//! Owns the database, the verdict cache, and the background updater, and
//! runs the per-query pipeline: hash the URL, consult the database, then
//! the cache, and only then ask the remote service about the matched
//! prefix.

use crate::api::{NetApi, ThreatApi};
use crate::cache::{Cache, CacheResult};
use crate::config::Config;
use crate::database::Database;
use crate::error::{Error, LookupFailure, Result};
use crate::hash::HashPrefix;
use crate::stats::{Stats, StatsCollector};
use crate::threat::{ThreatType, UrlThreat};
use crate::updater;
use crate::urls;
use chrono::Utc;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// A handle to the lookup pipeline. Cheap to share behind an `Arc`; all
/// methods take `&self` and are safe to call concurrently.
pub struct UpdateClient {
    stats: StatsCollector,
    config: Config,
    api: Arc<dyn ThreatApi>,
    db: Arc<Database>,
    cache: Arc<Cache>,
    lists: FxHashSet<ThreatType>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    updater: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateClient {
    /// Builds a client against the real service and starts the
    /// background updater. When no valid persisted database exists the
    /// initial fetch happens here, bounded by the request timeout.
    pub async fn new(config: Config) -> Result<Self> {
        let api = Arc::new(NetApi::new(&config)?);
        Self::with_api(config, api).await
    }

    /// Like [`new`](Self::new) but with a caller-supplied transport.
    /// This is how tests plug in an in-memory service.
    pub async fn with_api(config: Config, api: Arc<dyn ThreatApi>) -> Result<Self> {
        let threat_lists = config.effective_threat_lists()?;
        let db = Arc::new(Database::new(&config, threat_lists.clone()));
        let cache = Arc::new(Cache::new(config.fixed_cache_ttl()));

        let initial_delay = if db.init_from_file() {
            config
                .update_period()
                .saturating_sub(db.since_last_update().unwrap_or_default())
        } else {
            // Nothing usable on disk: fetch now. A failure here is not
            // fatal; the updater retries with backoff and status() shows
            // the gap in the meantime.
            let fetch = tokio::time::timeout(config.request_timeout(), db.update(api.as_ref()));
            match fetch.await {
                Ok((delay, true)) => delay,
                _ => Duration::ZERO,
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(updater::run(
            db.clone(),
            cache.clone(),
            api.clone(),
            config.request_timeout(),
            initial_delay,
            shutdown_rx,
        ));
        info!(lists = threat_lists.len(), "lookup client started");

        Ok(Self {
            stats: StatsCollector::new(),
            config,
            api,
            db,
            cache,
            lists: threat_lists.into_iter().collect(),
            closed: AtomicBool::new(false),
            shutdown,
            updater: Mutex::new(Some(handle)),
        })
    }

    /// Looks up the provided URLs. The outer dimension of the result
    /// always mirrors `urls`; the inner lists carry every
    /// pattern/threat-type hit for that URL. Safe to call concurrently.
    ///
    /// On failure the returned [`LookupFailure`] carries the best-effort
    /// partial result; with a stale database the result is complete but
    /// the staleness is still reported.
    pub async fn lookup_urls<S: AsRef<str>>(
        &self,
        urls: &[S],
    ) -> std::result::Result<Vec<Vec<UrlThreat>>, LookupFailure> {
        let mut threats: Vec<Vec<UrlThreat>> = vec![Vec::new(); urls.len()];
        if self.closed.load(Ordering::SeqCst) {
            return Err(LookupFailure::new(threats, Error::Closed));
        }
        let stale = match self.db.status() {
            Ok(()) => None,
            // Stale verdicts are still verdicts; run the pipeline and
            // report the staleness alongside.
            Err(Error::Stale) => Some(Error::Stale),
            Err(e) => {
                self.stats.add_fail(urls.len() as u64);
                return Err(LookupFailure::new(threats, e));
            }
        };

        let deadline = Instant::now() + self.config.request_timeout();
        let now = Utc::now();

        // Full hash -> canonical pattern, and full hash -> input indexes,
        // for attributing API results back to every URL that produced
        // the hash.
        let mut patterns: FxHashMap<HashPrefix, String> = FxHashMap::default();
        let mut hash_to_urls: FxHashMap<HashPrefix, Vec<usize>> = FxHashMap::default();
        let mut queries: Vec<(HashPrefix, HashPrefix, Vec<ThreatType>)> = Vec::new();
        let mut queried: FxHashSet<HashPrefix> = FxHashSet::default();

        for (i, url) in urls.iter().enumerate() {
            let url_hashes = match urls::generate_hashes(url.as_ref()) {
                Ok(h) => h,
                Err(e) => {
                    // Broken caller input fails this and every later URL.
                    self.stats.add_fail((urls.len() - i) as u64);
                    return Err(LookupFailure::new(threats, e));
                }
            };
            for (full, pattern) in url_hashes {
                hash_to_urls.entry(full.clone()).or_default().push(i);

                let Some((prefix, unsure)) = self.db.lookup(&full) else {
                    // No stored prefix: definitely not on any list.
                    patterns.insert(full, pattern);
                    self.stats.inc_database();
                    continue;
                };

                let (cached, result) = self.cache.lookup(&full, now);
                match result {
                    CacheResult::PositiveHit => {
                        for tt in &unsure {
                            if cached.contains_key(tt) {
                                threats[i].push(UrlThreat {
                                    pattern: pattern.clone(),
                                    threat_type: *tt,
                                });
                            }
                        }
                        self.stats.inc_cache();
                    }
                    CacheResult::NegativeHit => {
                        self.stats.inc_cache();
                    }
                    CacheResult::Miss => {
                        if queried.insert(full.clone()) {
                            queries.push((full.clone(), prefix, unsure));
                        }
                    }
                }
                patterns.insert(full, pattern);
            }
        }

        for (full, prefix, unsure) in queries {
            debug!(hash = ?full, "querying API for prefix match");
            let remaining = deadline.saturating_duration_since(Instant::now());
            let call = tokio::time::timeout(remaining, self.api.search_hashes(&prefix, &unsure));
            let response = match call.await {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => {
                    self.stats.add_fail(1);
                    return Err(LookupFailure::new(threats, e));
                }
                Err(_) => {
                    self.stats.add_fail(1);
                    return Err(LookupFailure::new(threats, Error::DeadlineExceeded));
                }
            };

            // Every full hash behind the queried prefix was adjudicated
            // by this response, one way or the other.
            let covered: Vec<HashPrefix> = patterns
                .keys()
                .filter(|h| h.has_prefix(&prefix))
                .cloned()
                .collect();
            self.cache.update(&covered, &response, now);

            for threat in &response.threats {
                if !threat.hash.is_full() {
                    continue;
                }
                let (Some(pattern), Some(idxs)) =
                    (patterns.get(&threat.hash), hash_to_urls.get(&threat.hash))
                else {
                    continue;
                };
                for &tt in &threat.threat_types {
                    if !self.lists.contains(&tt) {
                        continue;
                    }
                    for &idx in idxs {
                        threats[idx].push(UrlThreat {
                            pattern: pattern.clone(),
                            threat_type: tt,
                        });
                    }
                }
            }
            self.stats.inc_api();
        }

        match stale {
            Some(e) => Err(LookupFailure::new(threats, e)),
            None => Ok(threats),
        }
    }

    /// Current statistics and the database's health, if degraded. Most
    /// degradations are transient and recover on their own.
    pub fn status(&self) -> (Stats, Option<Error>) {
        let stats = self.stats.snapshot(self.db.update_lag());
        (stats, self.db.status().err())
    }

    /// Resolves once the database has ever reached a healthy state, or
    /// with [`Error::Closed`] when the client shuts down first. Callers
    /// wanting a bound wrap this in `tokio::time::timeout`.
    pub async fn wait_until_ready(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        let mut ready = self.db.ready();
        let mut shutdown = self.shutdown.subscribe();
        if *ready.borrow_and_update() {
            return Ok(());
        }
        loop {
            tokio::select! {
                changed = ready.changed() => {
                    if changed.is_err() {
                        return Err(Error::Closed);
                    }
                    if *ready.borrow_and_update() {
                        return Ok(());
                    }
                }
                _ = shutdown.changed() => return Err(Error::Closed),
            }
        }
    }

    /// Runs one sync pass right now, outside the updater's schedule, and
    /// flushes the cache on success. Returns whether the pass fully
    /// succeeded.
    pub async fn force_update(&self) -> bool {
        let (_, ok) = self.db.update(self.api.as_ref()).await;
        if ok {
            self.cache.purge();
        }
        ok
    }

    /// Stops the updater and marks the client closed. Idempotent;
    /// lookups already in flight complete on their own.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        let handle = self.updater.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("client closed");
    }
}
