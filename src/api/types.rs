//! Wire types for the update and hash-search endpoints.
//!
//! The JSON encoding follows the service's protobuf-JSON mapping:
//! camelCase keys, byte fields as base64, timestamps as RFC 3339,
//! durations as `"<seconds>s"` strings.

use crate::hash::HashPrefix;
use crate::rice::RiceDeltaEncoding;
use crate::threat::ThreatType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base64 transport for binary fields.
mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompressionType {
    #[serde(rename = "COMPRESSION_TYPE_UNSPECIFIED")]
    Unspecified,
    Raw,
    Rice,
}

/// One incremental-sync request for a single threat list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUpdateRequest {
    pub threat_type: ThreatType,
    /// Opaque token from the previous response; empty forces a RESET.
    #[serde(with = "b64")]
    pub version_token: Vec<u8>,
    pub constraints: ListUpdateConstraints,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUpdateConstraints {
    pub supported_compressions: Vec<CompressionType>,
    /// 0 means no limit.
    #[serde(default)]
    pub max_diff_entries: u32,
    #[serde(default)]
    pub max_database_entries: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_constraint_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    #[serde(rename = "RESPONSE_TYPE_UNSPECIFIED")]
    Unspecified,
    /// Apply removals and additions on top of the current state.
    Diff,
    /// Discard local state and start from the additions alone.
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUpdateResponse {
    pub response_type: ResponseType,
    #[serde(default)]
    pub removals: Option<ThreatEntryRemovals>,
    #[serde(default)]
    pub additions: Option<ThreatEntryAdditions>,
    #[serde(with = "b64")]
    pub new_version_token: Vec<u8>,
    pub checksum: Checksum,
    /// Server's requested pause before the next update, e.g. `"1800s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_wait_duration: Option<String>,
}

impl ListUpdateResponse {
    pub fn minimum_wait(&self) -> Option<Duration> {
        let raw = self.minimum_wait_duration.as_deref()?;
        let secs: f64 = raw.strip_suffix('s')?.parse().ok()?;
        (secs >= 0.0).then(|| Duration::from_secs_f64(secs))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatEntryRemovals {
    /// Indices into the *old* sorted prefix array.
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatEntryAdditions {
    #[serde(default)]
    pub raw_hashes: Vec<RawHashes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rice_hashes: Option<RiceHashes>,
}

/// Concatenated fixed-size prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHashes {
    pub prefix_size: u32,
    #[serde(with = "b64")]
    pub raw_hashes: Vec<u8>,
}

/// Rice-Golomb-coded 4-byte prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiceHashes {
    #[serde(default)]
    pub first_value: u32,
    pub rice_parameter: u32,
    pub entry_count: u32,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

impl From<RiceHashes> for RiceDeltaEncoding {
    fn from(r: RiceHashes) -> Self {
        RiceDeltaEncoding {
            first_value: r.first_value,
            rice_parameter: r.rice_parameter,
            entry_count: r.entry_count,
            data: r.data,
        }
    }
}

impl From<RiceDeltaEncoding> for RiceHashes {
    fn from(r: RiceDeltaEncoding) -> Self {
        RiceHashes {
            first_value: r.first_value,
            rice_parameter: r.rice_parameter,
            entry_count: r.entry_count,
            data: r.data,
        }
    }
}

/// SHA-256 over the list's full prefix array after the diff is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checksum {
    #[serde(with = "b64")]
    pub sha256: Vec<u8>,
}

/// One adjudicated full hash from a prefix search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatHash {
    #[serde(with = "hash_b64")]
    pub hash: HashPrefix,
    pub threat_types: Vec<ThreatType>,
    pub expire_time: DateTime<Utc>,
}

mod hash_b64 {
    use crate::hash::HashPrefix;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &HashPrefix, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(hash.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<HashPrefix, D::Error> {
        let s = String::deserialize(de)?;
        let bytes = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
        Ok(HashPrefix::from_bytes(&bytes))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHashesResponse {
    #[serde(default)]
    pub threats: Vec<ThreatHash>,
    /// Until when the absence of the covered hashes may be cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_expire_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_update_request_wire_shape() {
        let req = ListUpdateRequest {
            threat_type: ThreatType::Malware,
            version_token: vec![1, 2, 3],
            constraints: ListUpdateConstraints {
                supported_compressions: vec![CompressionType::Raw, CompressionType::Rice],
                max_diff_entries: 1024,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["threatType"], "MALWARE");
        assert_eq!(json["versionToken"], "AQID");
        assert_eq!(json["constraints"]["supportedCompressions"][1], "RICE");
    }

    #[test]
    fn test_list_update_response_parses() {
        let json = r#"{
            "responseType": "DIFF",
            "removals": {"indices": [0, 4]},
            "additions": {
                "rawHashes": [{"prefixSize": 4, "rawHashes": "AAECAw=="}]
            },
            "newVersionToken": "dG9r",
            "checksum": {"sha256": "AAAA"},
            "minimumWaitDuration": "593.4s"
        }"#;
        let resp: ListUpdateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.response_type, ResponseType::Diff);
        assert_eq!(resp.new_version_token, b"tok");
        assert_eq!(
            resp.minimum_wait(),
            Some(Duration::from_secs_f64(593.4))
        );
        assert_eq!(resp.removals.unwrap().indices, vec![0, 4]);
    }

    #[test]
    fn test_search_response_parses() {
        let json = r#"{
            "threats": [{
                "hash": "q80SNPA2YCCHhL2GcPkPkgU7xTf2E2eJTdqiTK/Hh7s=",
                "threatTypes": ["MALWARE", "UNWANTED_SOFTWARE"],
                "expireTime": "2026-08-02T12:00:00Z"
            }],
            "negativeExpireTime": "2026-08-02T11:10:00Z"
        }"#;
        let resp: SearchHashesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.threats.len(), 1);
        assert!(resp.threats[0].hash.is_full());
        assert_eq!(
            resp.threats[0].threat_types,
            vec![ThreatType::Malware, ThreatType::UnwantedSoftware]
        );
        assert!(resp.negative_expire_time.is_some());
    }

    #[test]
    fn test_minimum_wait_malformed() {
        let mut resp: ListUpdateResponse = serde_json::from_str(
            r#"{"responseType": "RESET", "newVersionToken": "", "checksum": {"sha256": ""}}"#,
        )
        .unwrap();
        assert_eq!(resp.minimum_wait(), None);
        resp.minimum_wait_duration = Some("soon".into());
        assert_eq!(resp.minimum_wait(), None);
    }
}
