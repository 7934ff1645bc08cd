//! Route planning entry point: strategy dispatch, detour verification,
//! elevation enrichment and result caching.

use std::time::Duration;

use crate::cache::{keys, TieredCache};
use crate::config::FallbackConfig;
use crate::elevation::ElevationEnricher;
use crate::engine::RouteComputationEngine;
use crate::error::RouteError;
use crate::geometry::{distance_to_segment_km, haversine_m};
use crate::models::{
    Coordinate, RouteNotice, RouteRequest, RouteResult, RouteStrategy, Waypoint,
};
use crate::poi_density::PoiDensityWaypointSelector;
use crate::scenic::{ScenicWaypointSelector, WaypointSelection};

pub const MAX_DETOUR_RATIO: f64 = 2.0;

/// Shrink factors applied to the geometric offset when the road detour
/// through the fallback waypoint is still too long.
const FALLBACK_SHRINK: [f64; 3] = [1.0, 0.5, 0.25];

pub fn validate_request(request: &RouteRequest) -> Result<(), RouteError> {
    for (name, point) in [("origin", request.origin), ("destination", request.destination)] {
        if !point.is_valid() {
            return Err(RouteError::Validation(format!(
                "{name} out of range: {}, {}",
                point.lat, point.lon
            )));
        }
    }
    if request.origin == request.destination {
        return Err(RouteError::Validation(
            "origin and destination are identical".into(),
        ));
    }
    if !request.max_detour_ratio.is_finite()
        || !(0.0..=MAX_DETOUR_RATIO).contains(&request.max_detour_ratio)
    {
        return Err(RouteError::Validation(format!(
            "max_detour_ratio must lie within 0..={MAX_DETOUR_RATIO}, got {}",
            request.max_detour_ratio
        )));
    }
    Ok(())
}

pub struct RoutePlanner {
    engine: RouteComputationEngine,
    scenic: ScenicWaypointSelector,
    poi_density: PoiDensityWaypointSelector,
    elevation: ElevationEnricher,
    cache: TieredCache,
    route_ttl: Duration,
}

impl RoutePlanner {
    pub fn new(
        engine: RouteComputationEngine,
        scenic: ScenicWaypointSelector,
        poi_density: PoiDensityWaypointSelector,
        elevation: ElevationEnricher,
        cache: TieredCache,
        route_ttl: Duration,
    ) -> Self {
        Self {
            engine,
            scenic,
            poi_density,
            elevation,
            cache,
            route_ttl,
        }
    }

    /// Compute a route for `request`.
    ///
    /// Only clean results are cached: degraded routes, routes shaped by a
    /// failed provider and routes without elevation are returned uncached.
    ///
    /// # Errors
    /// - `Validation` for malformed requests
    /// - `RouteUnavailable` when even the direct route cannot be computed
    /// - `PartialResult` when the route is fine but elevation lookup failed
    pub async fn compute_route(&self, request: &RouteRequest) -> Result<RouteResult, RouteError> {
        validate_request(request)?;

        let key = keys::route(request);
        if let Some(cached) = self.cache.get::<RouteResult>(&key).await {
            tracing::debug!(key, "route served from cache");
            return Ok(cached);
        }

        let (origin, destination) = (request.origin, request.destination);
        let direct = self
            .engine
            .compute(&[origin, destination], request.transport_mode)
            .await?;

        let (mut result, cacheable) = match request.strategy {
            RouteStrategy::Fastest => (direct, true),
            RouteStrategy::Scenic => {
                let circuity = circuity(&direct, origin, destination);
                let selection = self
                    .scenic
                    .select(origin, destination, request.max_detour_ratio, circuity)
                    .await;
                self.via_route(request, direct, selection).await
            }
            RouteStrategy::Longest => {
                let selection = self
                    .poi_density
                    .select(origin, destination, request.max_detour_ratio)
                    .await;
                self.via_route(request, direct, selection).await
            }
        };

        match self.elevation.annotate(&result.geometry).await {
            Ok(profile) => result.elevation_profile = Some(profile),
            Err(err) => {
                tracing::warn!("route returned without elevation: {}", err);
                result.notices.push(RouteNotice::ElevationUnavailable);
                return Err(RouteError::PartialResult(Box::new(result)));
            }
        }

        if cacheable && result.notices.is_empty() {
            self.cache.put(&key, &result, self.route_ttl).await;
        } else {
            tracing::info!(
                strategy = request.strategy.as_str(),
                notices = ?result.notices,
                "degraded route not cached"
            );
        }
        Ok(result)
    }

    /// Route through the selected waypoints, dropping them one at a time
    /// (farthest off the direct line first) while the road detour exceeds
    /// the bound, then trying ever smaller geometric offsets, and finally
    /// settling for the direct route.
    async fn via_route(
        &self,
        request: &RouteRequest,
        direct: RouteResult,
        selection: WaypointSelection,
    ) -> (RouteResult, bool) {
        let (origin, destination) = (request.origin, request.destination);
        let max_ratio = request.max_detour_ratio;

        let mut plans: Vec<(Vec<Waypoint>, String)> = Vec::new();
        let mut remaining = selection.waypoints.clone();
        while !remaining.is_empty() {
            plans.push((remaining.clone(), selection.source.clone()));
            let farthest = remaining
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    let off_a = distance_to_segment_km(a.coordinate, origin, destination);
                    let off_b = distance_to_segment_km(b.coordinate, origin, destination);
                    off_a.total_cmp(&off_b)
                })
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            remaining.remove(farthest);
        }
        let fallback = self.scenic.fallback_config();
        for shrink in FALLBACK_SHRINK {
            let config = FallbackConfig {
                offset_fraction: fallback.offset_fraction * shrink,
                side: fallback.side,
            };
            let geometric = WaypointSelection::geometric(origin, destination, max_ratio, &config);
            if !plans.iter().any(|(waypoints, _)| *waypoints == geometric.waypoints) {
                plans.push((geometric.waypoints, geometric.source));
            }
        }

        for (index, (waypoints, source)) in plans.into_iter().enumerate() {
            let points = route_points(origin, &waypoints, destination);
            let mut route = match self.engine.compute(&points, request.transport_mode).await {
                Ok(route) => route,
                Err(err) => {
                    tracing::warn!("via routing failed, degrading to direct route: {}", err);
                    return (degraded(direct, RouteNotice::RoutingDegradedToDirect), false);
                }
            };
            route.direct_distance_meters = direct.distance_meters;
            let ratio = route.detour_ratio();
            if ratio > max_ratio {
                tracing::info!(
                    source = %source,
                    waypoints = waypoints.len(),
                    "detour {:.3} exceeds {:.3}, dropping a waypoint",
                    ratio,
                    max_ratio
                );
                continue;
            }

            if index > 0 {
                route.notices.push(RouteNotice::WaypointsDroppedForDetour);
            }
            route.waypoints_used = waypoints;
            route.provider_id = source;
            return (route, selection.cacheable);
        }

        tracing::warn!("no waypoint fits the detour bound, using direct route");
        (degraded(direct, RouteNotice::WaypointsDroppedForDetour), false)
    }
}

fn circuity(direct: &RouteResult, origin: Coordinate, destination: Coordinate) -> f64 {
    let great_circle = haversine_m(origin, destination);
    if great_circle <= 0.0 {
        return 1.0;
    }
    (direct.distance_meters / great_circle).max(1.0)
}

fn route_points(origin: Coordinate, waypoints: &[Waypoint], destination: Coordinate) -> Vec<Coordinate> {
    std::iter::once(origin)
        .chain(waypoints.iter().map(|w| w.coordinate))
        .chain(std::iter::once(destination))
        .collect()
}

fn degraded(mut direct: RouteResult, notice: RouteNotice) -> RouteResult {
    direct.notices.push(notice);
    direct
}
