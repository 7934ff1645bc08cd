use async_trait::async_trait;
use serde::Deserialize;

use super::{send_json, ProviderError};
use crate::geocode::GeocodingProvider;
use crate::models::{Coordinate, GeocodeMatch};

pub const PROVIDER_ID: &str = "nominatim";

const RESULT_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default)]
    address: Address,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    county: Option<String>,
}

impl Place {
    fn into_match(self) -> Option<GeocodeMatch> {
        let coordinate = Coordinate::new(self.lat.parse().ok()?, self.lon.parse().ok()?);
        if !coordinate.is_valid() {
            return None;
        }
        let Address {
            country,
            state,
            region,
            county,
        } = self.address;
        Some(GeocodeMatch {
            coordinate,
            display_name: self.display_name,
            country: country.unwrap_or_default(),
            region: state.or(region).or(county),
            importance: self.importance.unwrap_or(0.0),
        })
    }
}

pub fn parse_search(body: &str) -> Result<Vec<GeocodeMatch>, ProviderError> {
    let places: Vec<Place> = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    Ok(places.into_iter().filter_map(Place::into_match).collect())
}

/// Primary geocoder. The public instance allows one request per second and
/// requires an identifying User-Agent.
pub struct Nominatim {
    client: reqwest::Client,
    base_url: String,
}

impl Nominatim {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GeocodingProvider for Nominatim {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn query(&self, name: &str) -> Result<Vec<GeocodeMatch>, ProviderError> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let request = self.client.get(url).query(&[
            ("q", name),
            ("format", "jsonv2"),
            ("addressdetails", "1"),
            ("limit", RESULT_LIMIT),
        ]);
        let places: Vec<Place> = send_json(request).await?;
        Ok(places.into_iter().filter_map(Place::into_match).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_matches_with_address_details() {
        let body = r#"[
            {"place_id": 1, "lat": "-26.65", "lon": "153.07",
             "display_name": "Sunshine Coast, Queensland, Australia",
             "importance": 0.61,
             "address": {"city": "Sunshine Coast", "state": "Queensland", "country": "Australia"}},
            {"place_id": 2, "lat": "49.6", "lon": "-123.9",
             "display_name": "Sunshine Coast, British Columbia, Canada",
             "importance": 0.45,
             "address": {"state": "British Columbia", "country": "Canada"}},
            {"place_id": 3, "lat": "bogus", "lon": "0", "display_name": "broken"}
        ]"#;
        let matches = parse_search(body).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].country, "Australia");
        assert_eq!(matches[0].region.as_deref(), Some("Queensland"));
        assert_eq!(matches[1].coordinate, Coordinate::new(49.6, -123.9));
        assert_eq!(matches[1].importance, 0.45);
    }

    #[test]
    fn empty_array_is_empty_result() {
        assert!(parse_search("[]").unwrap().is_empty());
    }
}
