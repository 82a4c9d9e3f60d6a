//! A client for URL threat-intelligence lookups against the Web Risk
//! family of APIs.
//!
//! A query never leaves the host in the clear: the URL is canonicalized,
//! decomposed into host-suffix/path-prefix expressions, and hashed, and
//! only a short hash prefix is ever sent to the service. Each hash is
//! presented to three tiers in order:
//!
//! 1. the **local database** of blocklist prefixes, synchronized in the
//!    background; a miss here is an authoritative "safe";
//! 2. the **verdict cache** of full hashes the service has recently
//!    adjudicated, positive and negative entries alike;
//! 3. the **remote API**, queried by hash prefix only, whose answer
//!    refreshes the cache.
//!
//! The database and cache exist to satisfy as many queries as possible
//! before spending an API call.
//!
//! ```no_run
//! use urlrisk::{Config, UpdateClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = UpdateClient::new(Config {
//!     api_key: "AIza...".into(),
//!     ..Config::default()
//! })
//! .await?;
//! client.wait_until_ready().await?;
//!
//! let verdicts = client.lookup_urls(&["http://testsafebrowsing.appspot.com/s/malware.html"]).await?;
//! if verdicts[0].is_empty() {
//!     println!("safe");
//! } else {
//!     println!("unsafe: {:?}", verdicts[0]);
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod hash;
pub mod rice;
pub mod stats;
pub mod threat;
pub mod urls;

mod updater;

pub use client::UpdateClient;
pub use config::{Config, DEFAULT_ID, DEFAULT_SERVER_URL, DEFAULT_VERSION};
pub use error::{Error, LookupFailure, Result};
pub use stats::Stats;
pub use threat::{ThreatType, UrlThreat, DEFAULT_THREAT_LISTS};
