//! HTTP adapters for the external providers.
//!
//! Every adapter classifies failures into [`ProviderError`] so the fallback
//! chains can decide whether to move on to the next provider.

pub mod flickr;
pub mod nominatim;
pub mod open_elevation;
pub mod open_meteo;
pub mod openrouteservice;
pub mod osrm;
pub mod overpass;
pub mod photon;
pub mod pinterest;
pub mod reddit;

use std::{future::Future, time::Duration};

use reqwest::StatusCode;
use thiserror::Error;

use crate::models::{ProviderAttempt, ProviderOutcome};
use crate::rate_limit::ProviderRateLimiter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider has no result")]
    NotFound,
}

impl ProviderError {
    pub fn outcome(&self) -> ProviderOutcome {
        match self {
            ProviderError::RateLimited => ProviderOutcome::RateLimited,
            ProviderError::Unavailable(_) => ProviderOutcome::Unavailable,
            ProviderError::NotFound => ProviderOutcome::NotFound,
        }
    }
}

/// Map a non-success HTTP status onto the provider taxonomy.
pub fn classify_status(status: StatusCode) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::NOT_FOUND => ProviderError::NotFound,
        other => ProviderError::Unavailable(format!("HTTP {other}")),
    }
}

pub fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::Unavailable("request timed out".into());
    }
    if let Some(status) = err.status() {
        return classify_status(status);
    }
    ProviderError::Unavailable(err.to_string())
}

pub fn attempt(provider_id: &str, priority: usize, outcome: ProviderOutcome) -> ProviderAttempt {
    ProviderAttempt {
        provider_id: provider_id.to_string(),
        priority: priority as u32,
        outcome,
    }
}

/// Wait for the provider's rate budget, then run `call` under `timeout`.
/// A timeout is reported the same way as an unavailable provider.
pub async fn guarded_call<T, F, Fut>(
    limiter: &ProviderRateLimiter,
    provider_id: &str,
    timeout: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    limiter.acquire(provider_id).await;
    match tokio::time::timeout(timeout, call()).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(provider = provider_id, ?timeout, "provider call timed out");
            Err(ProviderError::Unavailable(format!(
                "timed out after {}s",
                timeout.as_secs_f64()
            )))
        }
    }
}

/// Shared reqwest client configuration for every adapter.
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|err| ProviderError::Unavailable(format!("failed to build HTTP client: {err}")))
}

/// Send a prepared request and decode a JSON body, classifying failures.
pub async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(classify_transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(classify_status(status));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))
}
