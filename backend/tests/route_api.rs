use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::Request,
};
use hyper::StatusCode;
use serde_json::json;
use tower::ServiceExt;
use trip_routing::{
    cache::TieredCache,
    config::{ContentConfig, FallbackConfig, PoiDensityConfig, ScenicConfig},
    content::{ContentProvider, ContentResolver},
    create_router,
    elevation::{ElevationEnricher, ElevationProvider},
    engine::{RouteComputationEngine, RoutingProvider},
    geocode::{GeocodingProvider, GeocodingResolver},
    geometry::{approximate_distance_km, intermediate_point, BoundingBox},
    models::{
        ApiError, ContentCategory, ContentItem, ContentResolution, Coordinate, FeatureCategory,
        GeocodeMatch, PoiCategory, RawFeature, RouteLeg, RouteNotice, RouteResponse,
        TransportMode,
    },
    planner::RoutePlanner,
    poi_density::{PoiDensityProvider, PoiDensityWaypointSelector},
    providers::ProviderError,
    rate_limit::ProviderRateLimiter,
    scenic::{FeatureProvider, ScenicWaypointSelector},
    AppState,
};

const VANCOUVER: Coordinate = Coordinate {
    lat: 49.2827,
    lon: -123.1207,
};
const BANFF: Coordinate = Coordinate {
    lat: 51.1784,
    lon: -115.5708,
};

struct FixedRouter {
    fail: bool,
}

#[async_trait]
impl RoutingProvider for FixedRouter {
    fn id(&self) -> &str {
        "osrm"
    }

    async fn route(
        &self,
        waypoints: &[Coordinate],
        _mode: TransportMode,
    ) -> Result<RouteLeg, ProviderError> {
        if self.fail {
            return Err(ProviderError::Unavailable("HTTP 503".into()));
        }
        let distance_meters = approximate_distance_km(waypoints) * 1250.0;
        Ok(RouteLeg {
            geometry: waypoints.to_vec(),
            distance_meters,
            duration_seconds: distance_meters / 25.0,
        })
    }
}

struct Features;

#[async_trait]
impl FeatureProvider for Features {
    fn id(&self) -> &str {
        "overpass"
    }

    async fn query_bbox(
        &self,
        bbox: BoundingBox,
        _categories: &[FeatureCategory],
    ) -> Result<Vec<RawFeature>, ProviderError> {
        let peak = intermediate_point(VANCOUVER, BANFF, 0.4);
        Ok(vec![RawFeature {
            coordinate: Coordinate::new(peak.lat + 0.02, peak.lon),
            category: FeatureCategory::Peak,
            name: Some("Coquihalla Summit".into()),
        }]
        .into_iter()
        .filter(|f| bbox.contains(f.coordinate))
        .collect())
    }
}

struct Density;

#[async_trait]
impl PoiDensityProvider for Density {
    fn id(&self) -> &str {
        "overpass-poi"
    }

    async fn query_radius(
        &self,
        center: Coordinate,
        _radius_m: f64,
        _categories: &[PoiCategory],
    ) -> Result<u32, ProviderError> {
        Ok(center.lat.abs() as u32)
    }
}

struct Elevation;

#[async_trait]
impl ElevationProvider for Elevation {
    fn id(&self) -> &str {
        "open-elevation"
    }

    fn batch_size(&self) -> usize {
        100
    }

    async fn query(&self, points: &[Coordinate]) -> Result<Vec<f64>, ProviderError> {
        Ok(points.iter().map(|p| (p.lon + 130.0) * 100.0).collect())
    }
}

struct Geocoder;

#[async_trait]
impl GeocodingProvider for Geocoder {
    fn id(&self) -> &str {
        "nominatim"
    }

    async fn query(&self, name: &str) -> Result<Vec<GeocodeMatch>, ProviderError> {
        if !name.eq_ignore_ascii_case("sunshine coast") {
            return Ok(vec![]);
        }
        Ok(vec![
            GeocodeMatch {
                coordinate: Coordinate::new(-26.65, 153.07),
                display_name: "Sunshine Coast, Queensland, Australia".into(),
                country: "Australia".into(),
                region: Some("Queensland".into()),
                importance: 0.7,
            },
            GeocodeMatch {
                coordinate: Coordinate::new(49.63, -123.95),
                display_name: "Sunshine Coast, British Columbia, Canada".into(),
                country: "Canada".into(),
                region: Some("British Columbia".into()),
                importance: 0.5,
            },
        ])
    }
}

struct Images {
    result: Result<usize, ProviderError>,
}

#[async_trait]
impl ContentProvider for Images {
    fn id(&self) -> &str {
        "flickr"
    }

    async fn fetch(&self, _query: &str) -> Result<Vec<ContentItem>, ProviderError> {
        let count = self.result.clone()?;
        Ok((0..count)
            .map(|n| ContentItem {
                id: format!("flickr:{n}"),
                url: format!("https://live.staticflickr.com/{n}_b.jpg"),
                title: Some(format!("Lake Louise {n}")),
                author: None,
                source_url: None,
                provider_id: "flickr".into(),
                category: ContentCategory::Images,
                score: (count - n) as f64,
            })
            .collect())
    }
}

struct Setup {
    router_fails: bool,
    images: Result<usize, ProviderError>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            router_fails: false,
            images: Ok(12),
        }
    }
}

fn test_app(setup: Setup) -> axum::Router {
    let limiter = Arc::new(ProviderRateLimiter::unlimited());
    let cache = TieredCache::in_memory(64);
    let timeout = Duration::from_secs(1);

    let engine = RouteComputationEngine::new(
        vec![Arc::new(FixedRouter {
            fail: setup.router_fails,
        })],
        limiter.clone(),
        timeout,
    );
    let scenic = ScenicWaypointSelector::new(
        Arc::new(Features),
        limiter.clone(),
        ScenicConfig::default(),
        FallbackConfig::default(),
        timeout,
    );
    let poi_density = PoiDensityWaypointSelector::new(
        Arc::new(Density),
        limiter.clone(),
        PoiDensityConfig::default(),
        FallbackConfig::default(),
        timeout,
    );
    let elevation = ElevationEnricher::new(vec![Arc::new(Elevation)], limiter.clone(), timeout, 512);
    let planner = RoutePlanner::new(
        engine,
        scenic,
        poi_density,
        elevation,
        cache.clone(),
        Duration::from_secs(3600),
    );
    let geocoder = GeocodingResolver::new(
        vec![Arc::new(Geocoder)],
        limiter.clone(),
        cache.clone(),
        Duration::from_secs(3600),
        timeout,
    );
    let content = ContentResolver::new(
        vec![Arc::new(Images {
            result: setup.images,
        })],
        limiter,
        cache,
        Duration::from_secs(3600),
        timeout,
        ContentConfig::default(),
    );

    create_router(AppState {
        planner: Arc::new(planner),
        geocoder: Arc::new(geocoder),
        content: Arc::new(content),
    })
}

fn post_route(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/route")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn scenic_route_returns_gpx_payload() {
    let app = test_app(Setup::default());
    let payload = json!({
        "origin": {"lat": 49.2827, "lon": -123.1207},
        "destination": {"lat": 51.1784, "lon": -115.5708},
        "strategy": "scenic",
        "max_detour_ratio": 0.3
    });

    let response = app.oneshot(post_route(payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: RouteResponse = read_json(response).await;
    assert!(!body.gpx_base64.is_empty());
    assert_eq!(body.route.provider_id, "overpass");
    assert_eq!(body.route.waypoints_used.len(), 1);
    assert!(body.route.distance_meters >= body.route.direct_distance_meters);
    assert!(body.route.detour_ratio() <= 0.3);
    assert!(body.route.elevation_profile.is_some());
}

#[tokio::test]
async fn fastest_route_has_no_waypoints() {
    let app = test_app(Setup::default());
    let payload = json!({
        "origin": {"lat": 49.2827, "lon": -123.1207},
        "destination": {"lat": 51.1784, "lon": -115.5708},
        "strategy": "fastest"
    });

    let response = app.oneshot(post_route(payload)).await.unwrap();
    let body: RouteResponse = read_json(response).await;
    assert!(body.route.waypoints_used.is_empty());
    assert_eq!(body.route.distance_meters, body.route.direct_distance_meters);
    assert!(body.route.notices.is_empty());
}

#[tokio::test]
async fn invalid_route_request_is_bad_request() {
    let app = test_app(Setup::default());
    let payload = json!({
        "origin": {"lat": 49.2827, "lon": -123.1207},
        "destination": {"lat": 51.1784, "lon": -115.5708},
        "strategy": "longest",
        "max_detour_ratio": 5.0
    });

    let response = app.oneshot(post_route(payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiError = read_json(response).await;
    assert_eq!(body.kind, "validation_error");
}

#[tokio::test]
async fn routing_outage_is_bad_gateway_with_attempts() {
    let app = test_app(Setup {
        router_fails: true,
        ..Setup::default()
    });
    let payload = json!({
        "origin": {"lat": 49.2827, "lon": -123.1207},
        "destination": {"lat": 51.1784, "lon": -115.5708},
        "strategy": "fastest"
    });

    let response = app.oneshot(post_route(payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: ApiError = read_json(response).await;
    assert_eq!(body.kind, "route_unavailable");
    assert_eq!(body.attempts.len(), 1);
    assert_eq!(body.attempts[0].provider_id, "osrm");
}

#[tokio::test]
async fn geocode_returns_every_match() {
    let app = test_app(Setup::default());

    let response = app
        .clone()
        .oneshot(get("/api/geocode?q=Sunshine%20Coast"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let matches: Vec<GeocodeMatch> = read_json(response).await;
    assert_eq!(matches.len(), 2);
    assert_ne!(matches[0].country, matches[1].country);

    let response = app.oneshot(get("/api/geocode?q=Atlantis")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn content_endpoint_resolves_images() {
    let app = test_app(Setup::default());
    let response = app
        .oneshot(get("/api/content?q=Banff&category=images&policy=score_and_merge"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: ContentResolution = read_json(response).await;
    assert_eq!(body.items.len(), 12);
    assert!(!body.fallback_only);
    assert!(body.items.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn rate_limited_content_serves_fallback() {
    let app = test_app(Setup {
        images: Err(ProviderError::RateLimited),
        ..Setup::default()
    });
    let response = app.oneshot(get("/api/content?q=Banff")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: ContentResolution = read_json(response).await;
    assert!(body.items.is_empty());
    assert!(body.fallback_only);
}

#[tokio::test]
async fn empty_content_query_is_rejected() {
    let app = test_app(Setup::default());
    let response = app.oneshot(get("/api/content?q=%20")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_is_ok() {
    let app = test_app(Setup::default());
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
fn notices_serialize_in_snake_case() {
    assert_eq!(
        serde_json::to_value(RouteNotice::RoutingDegradedToDirect).unwrap(),
        json!("routing_degraded_to_direct")
    );
}
