//! Shared HTTP client construction

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpSetupError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Client with both request and connect timeouts set
pub fn build_client(timeout: Duration) -> Result<Client, HttpSetupError> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()?)
}
