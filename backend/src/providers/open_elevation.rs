use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{send_json, ProviderError};
use crate::elevation::ElevationProvider;
use crate::models::Coordinate;

pub const PROVIDER_ID: &str = "open-elevation";

#[derive(Debug, Serialize)]
struct LookupRequest {
    locations: Vec<Location>,
}

#[derive(Debug, Serialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: f64,
}

pub fn parse_lookup(body: &str) -> Result<Vec<f64>, ProviderError> {
    let response: LookupResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    Ok(response.results.into_iter().map(|r| r.elevation).collect())
}

pub struct OpenElevation {
    client: reqwest::Client,
    base_url: String,
}

impl OpenElevation {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ElevationProvider for OpenElevation {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn batch_size(&self) -> usize {
        100
    }

    async fn query(&self, points: &[Coordinate]) -> Result<Vec<f64>, ProviderError> {
        let body = LookupRequest {
            locations: points
                .iter()
                .map(|c| Location {
                    latitude: c.lat,
                    longitude: c.lon,
                })
                .collect(),
        };
        let url = format!("{}/api/v1/lookup", self.base_url.trim_end_matches('/'));
        let response: LookupResponse = send_json(self.client.post(url).json(&body)).await?;
        Ok(response.results.into_iter().map(|r| r.elevation).collect())
    }
}
