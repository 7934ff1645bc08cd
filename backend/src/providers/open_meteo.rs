use async_trait::async_trait;
use serde::Deserialize;

use super::{send_json, ProviderError};
use crate::elevation::ElevationProvider;
use crate::models::Coordinate;

pub const PROVIDER_ID: &str = "open-meteo";

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevation: Vec<f64>,
}

pub fn parse_elevation(body: &str) -> Result<Vec<f64>, ProviderError> {
    let response: ElevationResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    Ok(response.elevation)
}

fn join(values: impl Iterator<Item = f64>) -> String {
    values
        .map(|v| format!("{v:.6}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Secondary elevation source; the API takes up to 100 points per call.
pub struct OpenMeteo {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteo {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ElevationProvider for OpenMeteo {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn batch_size(&self) -> usize {
        100
    }

    async fn query(&self, points: &[Coordinate]) -> Result<Vec<f64>, ProviderError> {
        let url = format!("{}/v1/elevation", self.base_url.trim_end_matches('/'));
        let latitudes = join(points.iter().map(|c| c.lat));
        let longitudes = join(points.iter().map(|c| c.lon));
        let request = self
            .client
            .get(url)
            .query(&[("latitude", latitudes), ("longitude", longitudes)]);
        let response: ElevationResponse = send_json(request).await?;
        Ok(response.elevation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elevation_array() {
        let body = r#"{"elevation": [38.0, 1383.0, 2100.0]}"#;
        assert_eq!(parse_elevation(body).unwrap(), vec![38.0, 1383.0, 2100.0]);
    }

    #[test]
    fn joins_coordinates_with_commas() {
        assert_eq!(join([49.5, -123.25].into_iter()), "49.500000,-123.250000");
    }
}
