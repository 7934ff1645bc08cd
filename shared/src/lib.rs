use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }

    /// True when both components are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub coordinate: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Waypoint {
    pub fn unlabeled(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            label: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStrategy {
    Fastest,
    Scenic,
    Longest,
}

impl RouteStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStrategy::Fastest => "fastest",
            RouteStrategy::Scenic => "scenic",
            RouteStrategy::Longest => "longest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Driving,
    Cycling,
    Walking,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Driving => "driving",
            TransportMode::Cycling => "cycling",
            TransportMode::Walking => "walking",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub strategy: RouteStrategy,
    #[serde(default = "default_max_detour_ratio")]
    pub max_detour_ratio: f64,
    #[serde(default)]
    pub transport_mode: TransportMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationSample {
    pub distance_from_start_m: f64,
    pub elevation_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationProfile {
    pub samples: Vec<ElevationSample>,
    pub ascent_m: f64,
    pub descent_m: f64,
    pub min_elevation_m: Option<f64>,
    pub max_elevation_m: Option<f64>,
}

/// Non-fatal conditions attached to a route result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteNotice {
    ElevationUnavailable,
    RoutingDegradedToDirect,
    WaypointsDroppedForDetour,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub geometry: Vec<Coordinate>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub waypoints_used: Vec<Waypoint>,
    /// Waypoint source for scenic/longest, routing provider for fastest.
    pub provider_id: String,
    pub routing_provider_id: String,
    pub direct_distance_meters: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_profile: Option<ElevationProfile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<RouteNotice>,
}

impl RouteResult {
    pub fn detour_ratio(&self) -> f64 {
        if self.direct_distance_meters <= 0.0 {
            return 0.0;
        }
        (self.distance_meters - self.direct_distance_meters) / self.direct_distance_meters
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    #[serde(flatten)]
    pub route: RouteResult,
    pub gpx_base64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeMatch {
    pub coordinate: Coordinate,
    pub display_name: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub importance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOutcome {
    Success,
    RateLimited,
    Unavailable,
    NotFound,
    /// Answered, but every item failed validation.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider_id: String,
    pub priority: u32,
    pub outcome: ProviderOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Images,
    Pois,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Images => "images",
            ContentCategory::Pois => "pois",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    #[default]
    FirstSuccessWins,
    ScoreAndMerge,
}

impl ResolutionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPolicy::FirstSuccessWins => "first_success_wins",
            ResolutionPolicy::ScoreAndMerge => "score_and_merge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub provider_id: String,
    pub category: ContentCategory,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentResolution {
    pub items: Vec<ContentItem>,
    /// Set when every provider failed and only default content can be shown.
    pub fallback_only: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<ProviderAttempt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<ProviderAttempt>,
}

pub fn default_max_detour_ratio() -> f64 {
    0.30
}
