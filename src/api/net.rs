//! HTTP transport for the remote service.

use super::types::{ListUpdateRequest, ListUpdateResponse, SearchHashesResponse};
use super::ThreatApi;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::HashPrefix;
use crate::threat::ThreatType;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use reqwest::Client;
use tracing::debug;

/// Stateless API client over HTTPS+JSON. Each call is bounded by the
/// configured request timeout; errors are surfaced verbatim.
pub struct NetApi {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NetApi {
    pub fn new(config: &Config) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::InvalidConfig("api_key is required".into()));
        }

        let mut builder = Client::builder()
            .user_agent(format!("{} {}", config.id, config.version))
            .timeout(config.request_timeout());
        if let Some(proxy) = &config.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        let base_url = if config.server_url.contains("://") {
            config.server_url.clone()
        } else {
            format!("https://{}", config.server_url)
        };

        Ok(Self {
            client: builder.build()?,
            base_url,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ThreatApi for NetApi {
    async fn list_update(&self, request: ListUpdateRequest) -> Result<ListUpdateResponse> {
        debug!(threat_type = %request.threat_type, "requesting list diff");
        let url = format!("{}/v1/threatLists:computeDiff", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn search_hashes(
        &self,
        prefix: &HashPrefix,
        threat_types: &[ThreatType],
    ) -> Result<SearchHashesResponse> {
        debug!(prefix_len = prefix.len(), "searching hash prefix");
        let url = format!("{}/v1/hashes:search", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("key", self.api_key.clone()),
            ("hashPrefix", URL_SAFE.encode(prefix.as_bytes())),
        ];
        for tt in threat_types {
            query.push(("threatTypes", tt.to_string()));
        }
        let resp = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let config = Config::default();
        assert!(matches!(
            NetApi::new(&config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_scheme_added_when_missing() {
        let config = Config {
            api_key: "k".into(),
            ..Config::default()
        };
        let api = NetApi::new(&config).unwrap();
        assert_eq!(api.base_url, "https://webrisk.googleapis.com");

        let config = Config {
            api_key: "k".into(),
            server_url: "http://localhost:8080".into(),
            ..Config::default()
        };
        let api = NetApi::new(&config).unwrap();
        assert_eq!(api.base_url, "http://localhost:8080");
    }
}
