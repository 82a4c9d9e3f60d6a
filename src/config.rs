//! Configuration for the lookup client.
//!
//! Defines the structure and default values for the client's settings,
//! using `serde` for (de)serialization and `toml` for the file format.
//!
//! # Example Config
//! ```toml
//! api_key = "AIza..."
//! db_path = "/var/lib/urlrisk/threats.db"
//!
//! update_period_secs = 1800
//! threat_list_arg = "MALWARE,SOCIAL_ENGINEERING"
//! ```

use crate::error::{Error, Result};
use crate::threat::{parse_threat_types, ThreatType, DEFAULT_THREAT_LISTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Default endpoint of the threat-intelligence service.
pub const DEFAULT_SERVER_URL: &str = "webrisk.googleapis.com";
/// Default client identifier sent with each API call.
pub const DEFAULT_ID: &str = "WebRiskContainer";
/// Default client version sent with each API call.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Main configuration struct for an [`UpdateClient`](crate::UpdateClient).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Base URL of the API server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Optional HTTP proxy for all requests. When unset the underlying
    /// HTTP stack falls back to the usual proxy environment variables.
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// API key used to authenticate with the service. Required.
    #[serde(default)]
    pub api_key: String,

    /// Client identity metadata attached to each request, similar in
    /// spirit to an HTTP User-Agent.
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,

    /// Path to the persistent database file. When unset the blocklist
    /// database lives only in memory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// How often the blocklist database is refreshed, in seconds.
    #[serde(default = "default_update_period_secs")]
    pub update_period_secs: u64,

    /// Timeout for a single API request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Threat lists to subscribe to. Empty means all of them.
    #[serde(default)]
    pub threat_lists: Vec<ThreatType>,

    /// Comma-separated threat type names ("MALWARE,..." or "ALL").
    /// When non-empty this takes precedence over `threat_lists`.
    #[serde(default)]
    pub threat_list_arg: String,

    /// Overrides server-supplied cache expirations, in seconds. Intended
    /// for tests.
    #[serde(default)]
    pub fixed_cache_ttl_secs: Option<u64>,

    /// Maximum diff entries the client asks the server for. 0 = no limit.
    #[serde(default)]
    pub max_diff_entries: u32,

    /// Maximum database entries the client is willing to hold. 0 = no
    /// limit.
    #[serde(default)]
    pub max_database_entries: u32,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}
fn default_id() -> String {
    DEFAULT_ID.to_string()
}
fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}
fn default_update_period_secs() -> u64 {
    30 * 60
}
fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            proxy_url: None,
            api_key: String::new(),
            id: default_id(),
            version: default_version(),
            db_path: None,
            update_period_secs: default_update_period_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            threat_lists: vec![],
            threat_list_arg: String::new(),
            fixed_cache_ttl_secs: None,
            max_diff_entries: 0,
            max_database_entries: 0,
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::InvalidConfig(format!("bad config TOML: {e}")))?;
        Ok(config)
    }

    pub fn update_period(&self) -> Duration {
        Duration::from_secs(self.update_period_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn fixed_cache_ttl(&self) -> Option<Duration> {
        self.fixed_cache_ttl_secs.map(Duration::from_secs)
    }

    /// Resolves the subscribed threat lists: `threat_list_arg` when set,
    /// else `threat_lists`, else the default four.
    pub fn effective_threat_lists(&self) -> Result<Vec<ThreatType>> {
        if !self.threat_list_arg.is_empty() {
            return parse_threat_types(&self.threat_list_arg);
        }
        if self.threat_lists.is_empty() {
            return Ok(DEFAULT_THREAT_LISTS.to_vec());
        }
        if self.threat_lists.contains(&ThreatType::Unspecified) {
            return Err(Error::InvalidConfig(
                "THREAT_TYPE_UNSPECIFIED is not a subscribable list".into(),
            ));
        }
        Ok(self.threat_lists.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.id, "WebRiskContainer");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.update_period(), Duration::from_secs(1800));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(
            config.effective_threat_lists().unwrap(),
            DEFAULT_THREAT_LISTS
        );
    }

    #[test]
    fn test_threat_list_arg_precedence() {
        let config = Config {
            threat_lists: vec![ThreatType::Malware],
            threat_list_arg: "UNWANTED_SOFTWARE".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.effective_threat_lists().unwrap(),
            vec![ThreatType::UnwantedSoftware]
        );

        let config = Config {
            threat_list_arg: "ALL".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.effective_threat_lists().unwrap(),
            DEFAULT_THREAT_LISTS
        );
    }

    #[test]
    fn test_bad_threat_list_arg() {
        let config = Config {
            threat_list_arg: "MALWARE,NOPE".to_string(),
            ..Config::default()
        };
        assert!(config.effective_threat_lists().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
            api_key = "secret"
            update_period_secs = 600
            threat_lists = ["MALWARE", "SOCIAL_ENGINEERING"]
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.update_period(), Duration::from_secs(600));
        assert_eq!(
            config.effective_threat_lists().unwrap(),
            vec![ThreatType::Malware, ThreatType::SocialEngineering]
        );
        // Defaults should still hold for missing fields
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.request_timeout_secs, 60);
    }
}
