pub mod cache;
pub mod config;
pub mod content;
pub mod database;
pub mod elevation;
pub mod engine;
pub mod error;
pub mod geocode;
pub mod geometry;
pub mod gpx_export;
pub mod handlers;
pub mod models;
pub mod planner;
pub mod poi_density;
pub mod providers;
pub mod rate_limit;
pub mod scenic;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::cache::TieredCache;
use crate::config::AppConfig;
use crate::content::{ContentProvider, ContentResolver};
use crate::elevation::{ElevationEnricher, ElevationProvider};
use crate::engine::{RouteComputationEngine, RoutingProvider};
use crate::geocode::{GeocodingProvider, GeocodingResolver};
use crate::planner::RoutePlanner;
use crate::poi_density::PoiDensityWaypointSelector;
use crate::providers::{
    flickr::Flickr, nominatim::Nominatim, open_elevation::OpenElevation, open_meteo::OpenMeteo,
    openrouteservice::OpenRouteService, osrm::Osrm, overpass::OverpassFeatures,
    overpass::OverpassPoiDensity, overpass::OverpassPoiListing, photon::Photon, pinterest::Pinterest, reddit::Reddit,
    ProviderError,
};
use crate::rate_limit::ProviderRateLimiter;
use crate::scenic::ScenicWaypointSelector;

#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<RoutePlanner>,
    pub geocoder: Arc<GeocodingResolver>,
    pub content: Arc<ContentResolver>,
}

impl AppState {
    /// Wire the public providers named by `config` over a shared rate
    /// limiter and `cache`. OpenRouteService joins the routing chain only
    /// when an API key is configured.
    pub fn from_config(config: &AppConfig, cache: TieredCache) -> Result<Self, ProviderError> {
        let routing = &config.routing;
        let timeouts = routing.timeouts;
        let endpoints = &config.endpoints;
        let limiter = Arc::new(ProviderRateLimiter::new(&routing.rate_limits));
        // per-call timeouts are enforced by the resolvers; this is the outer bound
        let client = providers::http_client(&config.user_agent, timeouts.feature_query())?;

        let mut routers: Vec<Arc<dyn RoutingProvider>> =
            vec![Arc::new(Osrm::new(client.clone(), &endpoints.osrm_url))];
        match &config.ors_api_key {
            Some(key) => routers.push(Arc::new(OpenRouteService::new(
                client.clone(),
                &endpoints.openrouteservice_url,
                key,
            ))),
            None => tracing::info!("ORS_API_KEY not set, OSRM is the only routing provider"),
        }
        let engine = RouteComputationEngine::new(routers, limiter.clone(), timeouts.routing());

        let scenic = ScenicWaypointSelector::new(
            Arc::new(OverpassFeatures::new(
                client.clone(),
                &endpoints.overpass_url,
                timeouts.feature_query_secs,
            )),
            limiter.clone(),
            routing.scenic.clone(),
            routing.fallback,
            timeouts.feature_query(),
        );
        let poi_density = PoiDensityWaypointSelector::new(
            Arc::new(OverpassPoiDensity::new(
                client.clone(),
                &endpoints.overpass_url,
                timeouts.feature_query_secs,
            )),
            limiter.clone(),
            routing.poi_density.clone(),
            routing.fallback,
            timeouts.feature_query(),
        );

        let elevation_providers: Vec<Arc<dyn ElevationProvider>> = vec![
            Arc::new(OpenElevation::new(client.clone(), &endpoints.open_elevation_url)),
            Arc::new(OpenMeteo::new(client.clone(), &endpoints.open_meteo_url)),
        ];
        let elevation = ElevationEnricher::new(
            elevation_providers,
            limiter.clone(),
            timeouts.elevation(),
            routing.elevation.max_samples,
        );

        let planner = RoutePlanner::new(
            engine,
            scenic,
            poi_density,
            elevation,
            cache.clone(),
            routing.cache_ttls.route(),
        );

        let geocoders: Vec<Arc<dyn GeocodingProvider>> = vec![
            Arc::new(Nominatim::new(client.clone(), &endpoints.nominatim_url)),
            Arc::new(Photon::new(client.clone(), &endpoints.photon_url)),
        ];
        let geocoder = GeocodingResolver::new(
            geocoders,
            limiter.clone(),
            cache.clone(),
            routing.cache_ttls.geocode(),
            timeouts.geocoding(),
        );

        // image scrapers first, then POI listings; each category keeps its own order
        let content_providers: Vec<Arc<dyn ContentProvider>> = vec![
            Arc::new(Reddit::new(client.clone(), limiter.clone(), timeouts.content())),
            Arc::new(Flickr::new(client.clone())),
            Arc::new(Pinterest::new(client.clone())),
            Arc::new(OverpassPoiListing::new(
                client,
                &endpoints.overpass_url,
                timeouts.feature_query_secs,
            )),
        ];
        let content = ContentResolver::new(
            content_providers,
            limiter,
            cache,
            routing.cache_ttls.content(),
            timeouts.content(),
            routing.content.clone(),
        );

        Ok(Self {
            planner: Arc::new(planner),
            geocoder: Arc::new(geocoder),
            content: Arc::new(content),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/route", post(handlers::compute_route))
        .route("/api/geocode", get(handlers::geocode))
        .route("/api/content", get(handlers::content))
        .route("/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
