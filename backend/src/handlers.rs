// Handlers for the routing, geocoding and content endpoints.
// Provider failures stay inside the resolvers; only exhausted chains reach
// the client, with the attempt list.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::content::validate_query;
use crate::error::RouteError;
use crate::gpx_export::encode_route_as_gpx;
use crate::models::{
    ApiError, ContentCategory, ContentResolution, GeocodeMatch, ResolutionPolicy, RouteRequest,
    RouteResponse,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GeocodeParams {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ContentParams {
    pub q: String,
    #[serde(default = "default_category")]
    pub category: ContentCategory,
    #[serde(default)]
    pub policy: ResolutionPolicy,
}

fn default_category() -> ContentCategory {
    ContentCategory::Images
}

/// POST /api/route - Compute a route and its GPX export
pub async fn compute_route(
    State(state): State<AppState>,
    Json(req): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, RouteError> {
    let route = match state.planner.compute_route(&req).await {
        Ok(route) => route,
        // usable route, enrichment missing; the notice tells the client
        Err(RouteError::PartialResult(route)) => *route,
        Err(err) => return Err(err),
    };
    let gpx_base64 = encode_route_as_gpx(&route)?;
    Ok(Json(RouteResponse { route, gpx_base64 }))
}

/// GET /api/geocode?q= - Every candidate match, the caller picks one
pub async fn geocode(
    State(state): State<AppState>,
    Query(params): Query<GeocodeParams>,
) -> Result<Json<Vec<GeocodeMatch>>, RouteError> {
    state.geocoder.resolve(&params.q).await.map(Json)
}

/// GET /api/content?q=&category=&policy=
pub async fn content(
    State(state): State<AppState>,
    Query(params): Query<ContentParams>,
) -> Result<Json<ContentResolution>, RouteError> {
    if validate_query(&params.q).is_none() {
        return Err(RouteError::Validation(
            "query must be 1 to 200 printable characters".into(),
        ));
    }
    let resolution = state
        .content
        .resolve_content(&params.q, params.category, params.policy)
        .await;
    Ok(Json(resolution))
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = match &self {
            RouteError::Validation(_) => StatusCode::BAD_REQUEST,
            RouteError::NotFound { .. } => StatusCode::NOT_FOUND,
            RouteError::ProviderRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RouteError::ProviderUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RouteError::RouteUnavailable { .. } => StatusCode::BAD_GATEWAY,
            RouteError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RouteError::PartialResult(route) => {
                return (StatusCode::OK, Json(route.as_ref().clone())).into_response();
            }
        };
        if status.is_server_error() {
            tracing::warn!(kind = self.kind(), "request failed: {}", self);
        }
        let body = ApiError {
            message: self.to_string(),
            kind: self.kind().to_string(),
            attempts: self.attempts().to_vec(),
        };
        (status, Json(body)).into_response()
    }
}
