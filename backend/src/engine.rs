use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::error::RouteError;
use crate::geometry::approximate_distance_km;
use crate::models::{
    Coordinate, ProviderAttempt, ProviderOutcome, RouteLeg, RouteResult, TransportMode, Waypoint,
};
use crate::providers::{attempt, guarded_call, ProviderError};
use crate::rate_limit::ProviderRateLimiter;

/// Direct mode plus up to three intermediate waypoints.
pub const MIN_POINTS: usize = 2;
pub const MAX_POINTS: usize = 5;

/// Ellipsoid vs. sphere differences; anything shorter than this share of
/// the great-circle length is a broken response.
const GREAT_CIRCLE_TOLERANCE: f64 = 0.99;

/// External road router (Dependency Inversion Principle)
///
/// Abstracts the routing backend to allow:
/// - **Fallback**: OSRM first, OpenRouteService when it fails
/// - **Testing**: deterministic in-memory routers
///
/// # Contract
/// Implementations must:
/// - Visit `waypoints` in the given order, first and last being the endpoints
/// - Return distance (m), duration (s) and geometry as reported by the backend
/// - Classify failures as [`ProviderError`] (429 → `RateLimited`, no route →
///   `NotFound`, everything else → `Unavailable`)
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn route(
        &self,
        waypoints: &[Coordinate],
        mode: TransportMode,
    ) -> Result<RouteLeg, ProviderError>;
}

/// Priority-ordered routing chain.
pub struct RouteComputationEngine {
    providers: Vec<Arc<dyn RoutingProvider>>,
    limiter: Arc<ProviderRateLimiter>,
    timeout: Duration,
}

impl RouteComputationEngine {
    pub fn new(
        providers: Vec<Arc<dyn RoutingProvider>>,
        limiter: Arc<ProviderRateLimiter>,
        timeout: Duration,
    ) -> Self {
        Self {
            providers,
            limiter,
            timeout,
        }
    }

    /// Route through `waypoints` (endpoints included) with the first
    /// provider that answers sensibly.
    ///
    /// # Errors
    /// - `Validation` for fewer than 2 or more than 5 points, or invalid
    ///   coordinates
    /// - `RouteUnavailable` once every provider has failed
    pub async fn compute(
        &self,
        waypoints: &[Coordinate],
        mode: TransportMode,
    ) -> Result<RouteResult, RouteError> {
        validate_points(waypoints)?;

        let mut attempts: Vec<ProviderAttempt> = Vec::with_capacity(self.providers.len());
        for (priority, provider) in self.providers.iter().enumerate() {
            let id = provider.id();
            let result = guarded_call(&self.limiter, id, self.timeout, || {
                provider.route(waypoints, mode)
            })
            .await
            .and_then(|leg| check_leg(leg, waypoints));

            match result {
                Ok(leg) => {
                    attempts.push(attempt(id, priority, ProviderOutcome::Success));
                    tracing::debug!(
                        provider = id,
                        points = waypoints.len(),
                        "route computed: {:.1} km",
                        leg.distance_meters / 1000.0
                    );
                    return Ok(into_result(leg, waypoints, id));
                }
                Err(err) => {
                    tracing::warn!(provider = id, "routing failed: {}", err);
                    attempts.push(attempt(id, priority, err.outcome()));
                }
            }
        }

        Err(RouteError::RouteUnavailable { attempts })
    }
}

fn validate_points(waypoints: &[Coordinate]) -> Result<(), RouteError> {
    if !(MIN_POINTS..=MAX_POINTS).contains(&waypoints.len()) {
        return Err(RouteError::Validation(format!(
            "expected {MIN_POINTS} to {MAX_POINTS} route points, got {}",
            waypoints.len()
        )));
    }
    if let Some(bad) = waypoints.iter().find(|c| !c.is_valid()) {
        return Err(RouteError::Validation(format!(
            "coordinate out of range: {}, {}",
            bad.lat, bad.lon
        )));
    }
    Ok(())
}

/// Reject responses that cannot be a real route between the requested points.
fn check_leg(leg: RouteLeg, waypoints: &[Coordinate]) -> Result<RouteLeg, ProviderError> {
    if !leg.distance_meters.is_finite() || !leg.duration_seconds.is_finite() {
        return Err(ProviderError::Unavailable("non-finite route totals".into()));
    }
    if leg.distance_meters < 0.0 || leg.duration_seconds < 0.0 {
        return Err(ProviderError::Unavailable("negative route totals".into()));
    }
    if leg.geometry.len() < 2 {
        return Err(ProviderError::Unavailable("route geometry too short".into()));
    }
    let lower_bound_m = approximate_distance_km(waypoints) * 1000.0 * GREAT_CIRCLE_TOLERANCE;
    if leg.distance_meters < lower_bound_m {
        return Err(ProviderError::Unavailable(format!(
            "route of {:.0} m is shorter than the great-circle bound {:.0} m",
            leg.distance_meters, lower_bound_m
        )));
    }
    Ok(leg)
}

fn into_result(leg: RouteLeg, waypoints: &[Coordinate], provider_id: &str) -> RouteResult {
    let intermediate = &waypoints[1..waypoints.len() - 1];
    RouteResult {
        geometry: leg.geometry,
        distance_meters: leg.distance_meters,
        duration_seconds: leg.duration_seconds,
        waypoints_used: intermediate.iter().copied().map(Waypoint::unlabeled).collect(),
        provider_id: provider_id.to_string(),
        routing_provider_id: provider_id.to_string(),
        direct_distance_meters: leg.distance_meters,
        elevation_profile: None,
        notices: Vec::new(),
    }
}
