use serde::{Deserialize, Serialize};

pub use trip_shared::{
    ApiError, ContentCategory, ContentItem, ContentResolution, Coordinate, ElevationProfile,
    ElevationSample, GeocodeMatch, ProviderAttempt, ProviderOutcome, ResolutionPolicy,
    RouteNotice, RouteRequest, RouteResponse, RouteResult, RouteStrategy, TransportMode,
    Waypoint,
};

/// Natural features the scenic selector knows how to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Viewpoint,
    Peak,
    Waterfall,
    Coastline,
    River,
    Lake,
    NationalPark,
}

impl FeatureCategory {
    pub const ALL: [FeatureCategory; 7] = [
        FeatureCategory::Viewpoint,
        FeatureCategory::Peak,
        FeatureCategory::Waterfall,
        FeatureCategory::Coastline,
        FeatureCategory::River,
        FeatureCategory::Lake,
        FeatureCategory::NationalPark,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureCategory::Viewpoint => "viewpoint",
            FeatureCategory::Peak => "peak",
            FeatureCategory::Waterfall => "waterfall",
            FeatureCategory::Coastline => "coastline",
            FeatureCategory::River => "river",
            FeatureCategory::Lake => "lake",
            FeatureCategory::NationalPark => "national_park",
        }
    }
}

/// Feature as returned by a natural-feature provider, before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeature {
    pub coordinate: Coordinate,
    pub category: FeatureCategory,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFeature {
    pub coordinate: Coordinate,
    pub category: FeatureCategory,
    pub name: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoiDensitySample {
    pub coordinate: Coordinate,
    pub count: u32,
}

/// POI families counted by the density provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiCategory {
    Attraction,
    Cultural,
    Food,
    Activity,
}

impl PoiCategory {
    pub const ALL: [PoiCategory; 4] = [
        PoiCategory::Attraction,
        PoiCategory::Cultural,
        PoiCategory::Food,
        PoiCategory::Activity,
    ];
}

/// Geometry and totals of a single provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteLeg {
    pub geometry: Vec<Coordinate>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
}
