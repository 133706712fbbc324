//! Enforcement backends

use async_trait::async_trait;
use mybaby_host_api::{EnforcementBackend, EnforcementError, EnforcementPlan, EnforcementResult};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::{HttpSetupError, build_client};

/// Posts the plan as JSON to the gateway's enforcement endpoint
pub struct HttpEnforcement {
    client: Client,
    url: String,
}

impl HttpEnforcement {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, HttpSetupError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EnforcementBackend for HttpEnforcement {
    async fn apply_plan(&self, plan: &EnforcementPlan) -> EnforcementResult<()> {
        debug!(
            url = %self.url,
            devices = plan.devices.len(),
            blocked = plan.blocked_rule_count(),
            "Pushing enforcement plan"
        );

        let response = self
            .client
            .post(&self.url)
            .json(plan)
            .send()
            .await
            .map_err(|e| EnforcementError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            Err(EnforcementError::Rejected(format!("HTTP {}: {}", status, body.trim())))
        } else {
            Err(EnforcementError::Unavailable(format!("HTTP {}", status)))
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Logs each plan instead of enforcing it. Used when no backend is configured.
#[derive(Debug, Default)]
pub struct LoggingEnforcement;

#[async_trait]
impl EnforcementBackend for LoggingEnforcement {
    async fn apply_plan(&self, plan: &EnforcementPlan) -> EnforcementResult<()> {
        info!(
            enabled = plan.enabled,
            ipv6 = plan.ipv6_support,
            devices = plan.devices.len(),
            blocked = plan.blocked_rule_count(),
            "Enforcement plan (log only)"
        );
        for device in &plan.devices {
            let blocked: Vec<&str> = device.blocked_domains().collect();
            if !blocked.is_empty() {
                debug!(device_id = %device.device_id, mac = %device.mac, domains = ?blocked, "Would block");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
