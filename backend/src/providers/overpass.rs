//! Overpass API adapters: natural features inside a bounding box, POI
//! counts around a point, and named POI listings for a place.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::{send_json, ProviderError};
use crate::content::ContentProvider;
use crate::geometry::BoundingBox;
use crate::models::{
    ContentCategory, ContentItem, Coordinate, FeatureCategory, PoiCategory, RawFeature,
};
use crate::poi_density::PoiDensityProvider;
use crate::scenic::FeatureProvider;

pub const PROVIDER_ID: &str = "overpass";

/// Elements returned for a single bbox query; coastline and river ways can
/// be numerous on long routes.
const MAX_ELEMENTS: usize = 500;

const LISTING_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
    #[serde(default)]
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn coordinate(&self) -> Option<Coordinate> {
        match (self.lat, self.lon, &self.center) {
            (Some(lat), Some(lon), _) => Some(Coordinate::new(lat, lon)),
            (_, _, Some(center)) => Some(Coordinate::new(center.lat, center.lon)),
            _ => None,
        }
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    fn category(&self) -> Option<FeatureCategory> {
        if self.tag("tourism") == Some("viewpoint") {
            return Some(FeatureCategory::Viewpoint);
        }
        if self.tag("boundary") == Some("national_park") {
            return Some(FeatureCategory::NationalPark);
        }
        match (self.tag("natural"), self.tag("waterway")) {
            (Some("peak"), _) => Some(FeatureCategory::Peak),
            (Some("coastline"), _) => Some(FeatureCategory::Coastline),
            (Some("water"), _) if self.tag("water") == Some("lake") => Some(FeatureCategory::Lake),
            (_, Some("waterfall")) => Some(FeatureCategory::Waterfall),
            (_, Some("river")) => Some(FeatureCategory::River),
            _ => None,
        }
    }
}

/// Overpass answers some overload conditions with HTTP 200 and a remark.
fn check_remark(response: &OverpassResponse) -> Result<(), ProviderError> {
    match response.remark.as_deref() {
        Some(remark) if remark.contains("runtime error") => {
            Err(ProviderError::Unavailable(remark.to_string()))
        }
        _ => Ok(()),
    }
}

fn selectors(category: FeatureCategory) -> &'static [&'static str] {
    match category {
        FeatureCategory::Viewpoint => &[r#"node["tourism"="viewpoint"]"#],
        FeatureCategory::Peak => &[r#"node["natural"="peak"]["name"]"#],
        FeatureCategory::Waterfall => &[r#"node["waterway"="waterfall"]"#],
        FeatureCategory::Coastline => &[r#"way["natural"="coastline"]"#],
        FeatureCategory::River => &[r#"way["waterway"="river"]["name"]"#],
        FeatureCategory::Lake => &[
            r#"way["natural"="water"]["water"="lake"]["name"]"#,
            r#"relation["natural"="water"]["water"="lake"]["name"]"#,
        ],
        FeatureCategory::NationalPark => &[r#"relation["boundary"="national_park"]"#],
    }
}

/// A box wrapping over 180° is queried as its two halves.
pub fn feature_query(bbox: &BoundingBox, categories: &[FeatureCategory], timeout_secs: u64) -> String {
    let bounds: Vec<String> = bbox
        .split()
        .iter()
        .map(|part| {
            format!(
                "({:.5},{:.5},{:.5},{:.5})",
                part.min_lat, part.min_lon, part.max_lat, part.max_lon
            )
        })
        .collect();
    let mut query = format!("[out:json][timeout:{timeout_secs}];\n(\n");
    for category in categories {
        for selector in selectors(*category) {
            for bounds in &bounds {
                query.push_str("  ");
                query.push_str(selector);
                query.push_str(bounds);
                query.push_str(";\n");
            }
        }
    }
    query.push_str(&format!(");\nout center {MAX_ELEMENTS};\n"));
    query
}

/// Parse a feature response, keeping only elements of the requested
/// categories that carry a position.
pub fn parse_features(
    body: &str,
    categories: &[FeatureCategory],
) -> Result<Vec<RawFeature>, ProviderError> {
    let response: OverpassResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    features_from(response, categories)
}

fn features_from(
    response: OverpassResponse,
    categories: &[FeatureCategory],
) -> Result<Vec<RawFeature>, ProviderError> {
    check_remark(&response)?;
    let features = response
        .elements
        .iter()
        .filter_map(|element| {
            let category = element.category()?;
            if !categories.contains(&category) {
                return None;
            }
            let coordinate = element.coordinate().filter(Coordinate::is_valid)?;
            Some(RawFeature {
                coordinate,
                category,
                name: element.tag("name").map(str::to_string),
            })
        })
        .collect();
    Ok(features)
}

/// Natural-feature provider on the Overpass API.
pub struct OverpassFeatures {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl OverpassFeatures {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client,
            url: url.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl FeatureProvider for OverpassFeatures {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn query_bbox(
        &self,
        bbox: BoundingBox,
        categories: &[FeatureCategory],
    ) -> Result<Vec<RawFeature>, ProviderError> {
        let query = feature_query(&bbox, categories, self.timeout_secs);
        let response: OverpassResponse =
            send_json(self.client.post(&self.url).form(&[("data", query)])).await?;
        let features = features_from(response, categories)?;
        tracing::debug!(count = features.len(), "overpass returned natural features");
        Ok(features)
    }
}

fn poi_selectors(category: PoiCategory) -> &'static [&'static str] {
    match category {
        PoiCategory::Attraction => &[r#"nwr["tourism"~"^(attraction|viewpoint|theme_park|zoo)$"]"#],
        PoiCategory::Cultural => &[
            r#"nwr["tourism"~"^(museum|gallery)$"]"#,
            r#"nwr["historic"]"#,
            r#"nwr["amenity"~"^(theatre|arts_centre)$"]"#,
        ],
        PoiCategory::Food => &[r#"nwr["amenity"~"^(restaurant|cafe|pub|biergarten)$"]"#],
        PoiCategory::Activity => &[
            r#"nwr["leisure"~"^(park|nature_reserve|water_park|sports_centre)$"]"#,
            r#"nwr["tourism"="camp_site"]"#,
        ],
    }
}

pub fn density_query(
    center: Coordinate,
    radius_m: f64,
    categories: &[PoiCategory],
    timeout_secs: u64,
) -> String {
    let around = format!("(around:{:.0},{:.5},{:.5})", radius_m, center.lat, center.lon);
    let mut query = format!("[out:json][timeout:{timeout_secs}];\n(\n");
    for category in categories {
        for selector in poi_selectors(*category) {
            query.push_str("  ");
            query.push_str(selector);
            query.push_str(&around);
            query.push_str(";\n");
        }
    }
    query.push_str(");\nout count;\n");
    query
}

/// `out count` yields one element whose `total` tag holds the number.
pub fn parse_count(body: &str) -> Result<u32, ProviderError> {
    let response: OverpassResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    count_from(response)
}

fn count_from(response: OverpassResponse) -> Result<u32, ProviderError> {
    check_remark(&response)?;
    let Some(element) = response.elements.first() else {
        return Ok(0);
    };
    element
        .tag("total")
        .and_then(|total| total.parse::<u32>().ok())
        .ok_or_else(|| ProviderError::Unavailable("count element without total".into()))
}

/// POI-density provider on the Overpass API.
pub struct OverpassPoiDensity {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl OverpassPoiDensity {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client,
            url: url.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl PoiDensityProvider for OverpassPoiDensity {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn query_radius(
        &self,
        center: Coordinate,
        radius_m: f64,
        categories: &[PoiCategory],
    ) -> Result<u32, ProviderError> {
        let query = density_query(center, radius_m, categories, self.timeout_secs);
        let response: OverpassResponse =
            send_json(self.client.post(&self.url).form(&[("data", query)])).await?;
        count_from(response)
    }
}

/// Named POIs inside the area called `place`.
pub fn listing_query(place: &str, categories: &[PoiCategory], timeout_secs: u64) -> String {
    let escaped = place.replace('\\', "\\\\").replace('"', "\\\"");
    let mut query = format!(
        "[out:json][timeout:{timeout_secs}];\narea[\"name\"=\"{escaped}\"]->.place;\n(\n"
    );
    for category in categories {
        for selector in poi_selectors(*category) {
            query.push_str("  ");
            query.push_str(selector);
            query.push_str("[\"name\"](area.place);\n");
        }
    }
    query.push_str(&format!(");\nout center {LISTING_LIMIT};\n"));
    query
}

/// More descriptive tags rank higher; a Wikipedia or Wikidata link counts extra.
fn tag_richness(element: &OverpassElement) -> f64 {
    let linked = element.tags.contains_key("wikipedia") || element.tags.contains_key("wikidata");
    element.tags.len() as f64 + if linked { 5.0 } else { 0.0 }
}

fn listing_item(element: OverpassElement) -> Option<ContentItem> {
    let kind = element.kind.as_deref()?;
    let id = element.id?;
    let name = element.tag("name")?.to_string();
    let source_url = element
        .tag("website")
        .filter(|site| site.starts_with("http://") || site.starts_with("https://"))
        .map(str::to_string);
    Some(ContentItem {
        id: format!("osm:{kind}/{id}"),
        url: format!("https://www.openstreetmap.org/{kind}/{id}"),
        title: Some(name),
        author: None,
        source_url,
        provider_id: PROVIDER_ID.to_string(),
        category: ContentCategory::Pois,
        score: tag_richness(&element),
    })
}

pub fn parse_listing(body: &str) -> Result<Vec<ContentItem>, ProviderError> {
    let response: OverpassResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    listing_from(response)
}

fn listing_from(response: OverpassResponse) -> Result<Vec<ContentItem>, ProviderError> {
    check_remark(&response)?;
    Ok(response.elements.into_iter().filter_map(listing_item).collect())
}

/// POI-listing content provider on the Overpass API.
pub struct OverpassPoiListing {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl OverpassPoiListing {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client,
            url: url.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl ContentProvider for OverpassPoiListing {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn category(&self) -> ContentCategory {
        ContentCategory::Pois
    }

    async fn fetch(&self, query: &str) -> Result<Vec<ContentItem>, ProviderError> {
        let overpass_query = listing_query(query, &PoiCategory::ALL, self.timeout_secs);
        let response: OverpassResponse =
            send_json(self.client.post(&self.url).form(&[("data", overpass_query)])).await?;
        let items = listing_from(response)?;
        tracing::debug!(count = items.len(), "overpass returned POI listing");
        Ok(items)
    }
}
