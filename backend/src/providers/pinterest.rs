use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::{send_json, ProviderError};
use crate::content::ContentProvider;
use crate::models::{ContentCategory, ContentItem};

pub const PROVIDER_ID: &str = "pinterest";

/// Preferred renditions, largest first.
const IMAGE_SIZES: [&str; 3] = ["orig", "736x", "564x"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    resource_response: ResourceResponse,
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    #[serde(default)]
    data: Option<ResourceData>,
}

#[derive(Debug, Deserialize)]
struct ResourceData {
    #[serde(default)]
    results: Vec<Pin>,
}

#[derive(Debug, Deserialize)]
struct Pin {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    grid_title: Option<String>,
    #[serde(default)]
    images: Option<HashMap<String, PinImage>>,
    #[serde(default)]
    pinner: Option<Pinner>,
    #[serde(default)]
    aggregated_pin_data: Option<AggregatedPinData>,
}

#[derive(Debug, Deserialize)]
struct PinImage {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Pinner {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregatedPinData {
    #[serde(default)]
    aggregated_stats: AggregatedStats,
}

#[derive(Debug, Default, Deserialize)]
struct AggregatedStats {
    #[serde(default)]
    saves: u64,
}

impl Pin {
    /// Pins without an id or a usable rendition are skipped.
    fn into_item(self) -> Option<ContentItem> {
        let id = self.id?;
        let mut images = self.images?;
        let url = IMAGE_SIZES
            .iter()
            .find_map(|size| images.remove(*size).and_then(|image| image.url))?;
        let title = [self.title, self.grid_title]
            .into_iter()
            .flatten()
            .find(|t| !t.trim().is_empty());
        Some(ContentItem {
            id: format!("pinterest:{id}"),
            url,
            title,
            author: self.pinner.and_then(|p| p.username),
            source_url: Some(format!("https://www.pinterest.com/pin/{id}/")),
            provider_id: PROVIDER_ID.to_string(),
            category: ContentCategory::Images,
            score: self
                .aggregated_pin_data
                .map(|d| d.aggregated_stats.saves as f64)
                .unwrap_or(0.0),
        })
    }
}

fn items_from(response: SearchResponse) -> Vec<ContentItem> {
    response
        .resource_response
        .data
        .map(|data| data.results)
        .unwrap_or_default()
        .into_iter()
        .filter_map(Pin::into_item)
        .collect()
}

pub fn parse_search(body: &str) -> Result<Vec<ContentItem>, ProviderError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    Ok(items_from(response))
}

/// Pinterest's unauthenticated search resource.
pub struct Pinterest {
    client: reqwest::Client,
    resource_url: String,
}

impl Pinterest {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            resource_url: "https://www.pinterest.com/resource/BaseSearchResource/get/".into(),
        }
    }
}

#[async_trait]
impl ContentProvider for Pinterest {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch(&self, query: &str) -> Result<Vec<ContentItem>, ProviderError> {
        let data = json!({
            "options": {"query": query, "scope": "pins"},
            "context": {}
        })
        .to_string();
        let source_url = format!("/search/pins/?q={query}");
        let request = self
            .client
            .get(&self.resource_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("source_url", source_url.as_str()), ("data", data.as_str())]);
        let response: SearchResponse = send_json(request).await?;
        Ok(items_from(response))
    }
}
