//! Advisory over HTTP

use async_trait::async_trait;
use mybaby_host_api::{AdvisoryError, AdvisoryRequest, AdvisoryResult, AdvisoryService};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{HttpSetupError, build_client};

#[derive(Serialize)]
struct AdviceQuery<'a> {
    prompt: String,
    device: &'a AdvisoryRequest,
}

#[derive(Deserialize)]
struct AdviceBody {
    text: String,
}

/// Extract the guidance text from a response body.
///
/// Accepts `{ "text": "..." }` or a plain-text body.
pub fn parse_advice(body: &str) -> AdvisoryResult<String> {
    let text = match serde_json::from_str::<AdviceBody>(body) {
        Ok(parsed) => parsed.text,
        Err(_) => body.to_string(),
    };
    let text = text.trim();
    if text.is_empty() {
        Err(AdvisoryError::Empty)
    } else {
        Ok(text.to_string())
    }
}

/// Posts the device snapshot and prompt to a text-generation endpoint
pub struct HttpAdvisor {
    client: Client,
    url: String,
}

impl HttpAdvisor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, HttpSetupError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AdvisoryService for HttpAdvisor {
    async fn advise(&self, request: &AdvisoryRequest) -> AdvisoryResult<String> {
        debug!(url = %self.url, device = %request.device_name, "Requesting advice");

        let query = AdviceQuery {
            prompt: request.prompt(),
            device: request,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&query)
            .send()
            .await
            .map_err(|e| AdvisoryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdvisoryError::Unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AdvisoryError::Unavailable(e.to_string()))?;
        parse_advice(&body)
    }
}
