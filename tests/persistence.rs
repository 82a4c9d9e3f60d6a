//! Persisted-database lifecycle: a client that saved its state restarts
//! without refetching, and a damaged file falls back to a fresh fetch.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use urlrisk::api::types::{
    Checksum, ListUpdateRequest, ListUpdateResponse, RawHashes, ResponseType, SearchHashesResponse,
    ThreatEntryAdditions,
};
use urlrisk::api::ThreatApi;
use urlrisk::hash::{checksum_prefixes, HashPrefix};
use urlrisk::{Config, ThreatType, UpdateClient};

struct CountingApi {
    prefixes: Vec<HashPrefix>,
    update_calls: AtomicUsize,
}

impl CountingApi {
    fn new(blocked_patterns: &[&str]) -> Arc<Self> {
        let mut prefixes: Vec<HashPrefix> = blocked_patterns
            .iter()
            .map(|p| {
                let full = HashPrefix::full(p);
                HashPrefix::from_bytes(&full.as_bytes()[..8])
            })
            .collect();
        prefixes.sort();
        Arc::new(Self {
            prefixes,
            update_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ThreatApi for CountingApi {
    async fn list_update(
        &self,
        _request: ListUpdateRequest,
    ) -> urlrisk::Result<ListUpdateResponse> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut raw = Vec::new();
        for p in &self.prefixes {
            raw.extend_from_slice(p.as_bytes());
        }
        Ok(ListUpdateResponse {
            response_type: ResponseType::Reset,
            removals: None,
            additions: Some(ThreatEntryAdditions {
                raw_hashes: vec![RawHashes {
                    prefix_size: 8,
                    raw_hashes: raw,
                }],
                rice_hashes: None,
            }),
            new_version_token: b"disk-state".to_vec(),
            checksum: Checksum {
                sha256: checksum_prefixes(&self.prefixes),
            },
            minimum_wait_duration: None,
        })
    }

    async fn search_hashes(
        &self,
        _prefix: &HashPrefix,
        _threat_types: &[ThreatType],
    ) -> urlrisk::Result<SearchHashesResponse> {
        Ok(SearchHashesResponse::default())
    }
}

fn config_with_db(path: &std::path::Path) -> Config {
    Config {
        threat_list_arg: "MALWARE".into(),
        db_path: Some(path.to_path_buf()),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_restart_resumes_from_disk_without_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threats.db");

    let api = CountingApi::new(&["evil.test/"]);
    let client = UpdateClient::with_api(config_with_db(&path), api.clone())
        .await
        .unwrap();
    client.wait_until_ready().await.unwrap();
    client.close().await;
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
    assert!(path.exists());

    // Same file, fresh client: ready immediately, no fetch needed, and
    // the restored prefixes still answer lookups.
    let api2 = CountingApi::new(&["evil.test/"]);
    let client2 = UpdateClient::with_api(config_with_db(&path), api2.clone())
        .await
        .unwrap();
    client2.wait_until_ready().await.unwrap();
    assert_eq!(api2.update_calls.load(Ordering::SeqCst), 0);

    let verdicts = client2.lookup_urls(&["http://good.test/"]).await.unwrap();
    assert_eq!(verdicts, vec![Vec::new()]);
    let (stats, err) = client2.status();
    assert!(err.is_none());
    assert!(stats.queries_by_database >= 1);
    client2.close().await;
}

#[tokio::test]
async fn test_damaged_file_triggers_fresh_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threats.db");
    std::fs::write(&path, b"garbage, not a database").unwrap();

    let api = CountingApi::new(&["evil.test/"]);
    let client = UpdateClient::with_api(config_with_db(&path), api.clone())
        .await
        .unwrap();
    client.wait_until_ready().await.unwrap();

    // The unreadable file was ignored and replaced by a fetched one.
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
    client.close().await;

    let api2 = CountingApi::new(&["evil.test/"]);
    let client2 = UpdateClient::with_api(config_with_db(&path), api2.clone())
        .await
        .unwrap();
    client2.wait_until_ready().await.unwrap();
    assert_eq!(api2.update_calls.load(Ordering::SeqCst), 0);
    client2.close().await;
}

#[tokio::test]
async fn test_subscription_change_invalidates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threats.db");

    let api = CountingApi::new(&["evil.test/"]);
    let client = UpdateClient::with_api(config_with_db(&path), api.clone())
        .await
        .unwrap();
    client.wait_until_ready().await.unwrap();
    client.close().await;

    // A file that lacks a newly subscribed list cannot be used as-is.
    let api2 = CountingApi::new(&["evil.test/"]);
    let config = Config {
        threat_list_arg: "MALWARE,SOCIAL_ENGINEERING".into(),
        db_path: Some(path.clone()),
        ..Config::default()
    };
    let client2 = UpdateClient::with_api(config, api2.clone()).await.unwrap();
    client2.wait_until_ready().await.unwrap();
    assert_eq!(api2.update_calls.load(Ordering::SeqCst), 2);
    client2.close().await;
}
