//! Discovery over HTTP

use async_trait::async_trait;
use mybaby_api::RecentDeviceSighting;
use mybaby_host_api::{DiscoveryError, DiscoveryResult, DiscoveryService};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{HttpSetupError, build_client};

/// Either a bare list or `{ "devices": [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum SightingsBody {
    List(Vec<serde_json::Value>),
    Wrapped { devices: Vec<serde_json::Value> },
}

/// Decode a discovery response body.
///
/// Only the envelope has to be well formed. Records that do not decode are
/// logged and skipped.
pub fn parse_sightings(body: &str) -> DiscoveryResult<Vec<RecentDeviceSighting>> {
    let records = match serde_json::from_str(body) {
        Ok(SightingsBody::List(records)) | Ok(SightingsBody::Wrapped { devices: records }) => {
            records
        }
        Err(e) => return Err(DiscoveryError::InvalidResponse(e.to_string())),
    };

    let total = records.len();
    let sightings: Vec<RecentDeviceSighting> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(sighting) => Some(sighting),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed sighting record");
                None
            }
        })
        .collect();

    if sightings.len() < total {
        debug!(kept = sightings.len(), total, "Some sighting records were skipped");
    }
    Ok(sightings)
}

/// Fetches sightings with `GET <url>`
pub struct HttpDiscovery {
    client: Client,
    url: String,
}

impl HttpDiscovery {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, HttpSetupError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DiscoveryService for HttpDiscovery {
    async fn fetch_sightings(&self) -> DiscoveryResult<Vec<RecentDeviceSighting>> {
        debug!(url = %self.url, "Fetching sightings");

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                DiscoveryError::Timeout
            } else {
                DiscoveryError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DiscoveryError::InvalidResponse(e.to_string()))?;
        let sightings = parse_sightings(&body)?;

        debug!(url = %self.url, count = sightings.len(), "Fetched sightings");
        Ok(sightings)
    }
}
