//! Remote API surface.
//!
//! The rest of the crate talks to the service through [`ThreatApi`], so
//! tests can drop in an in-memory fake and the updater/orchestrator never
//! know the difference.

pub mod net;
pub mod types;

pub use net::NetApi;

use crate::error::Result;
use crate::hash::HashPrefix;
use crate::threat::ThreatType;
use async_trait::async_trait;
use types::{ListUpdateRequest, ListUpdateResponse, SearchHashesResponse};

/// The two RPCs the client needs: incremental list diffs for the updater
/// and privacy-preserving prefix searches for the lookup path.
#[async_trait]
pub trait ThreatApi: Send + Sync {
    async fn list_update(&self, request: ListUpdateRequest) -> Result<ListUpdateResponse>;

    async fn search_hashes(
        &self,
        prefix: &HashPrefix,
        threat_types: &[ThreatType],
    ) -> Result<SearchHashesResponse>;
}
