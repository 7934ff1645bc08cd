//! Scenic waypoint selection: score natural features near the direct line
//! and keep the best ones whose detour fits the budget.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::config::{FallbackConfig, ScenicConfig, WaypointOrdering};
use crate::geometry::{
    along_track_fraction, distance_to_segment_km, geometric_fallback_waypoint, haversine_km,
    BoundingBox,
};
use crate::models::{Coordinate, FeatureCategory, RawFeature, ScoredFeature, Waypoint};
use crate::providers::{guarded_call, ProviderError};
use crate::rate_limit::ProviderRateLimiter;

/// Waypoint source reported when no provider data could be used.
pub const GEOMETRIC_FALLBACK_ID: &str = "geometric-fallback";

#[async_trait]
pub trait FeatureProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Features of the given categories inside `bbox`.
    async fn query_bbox(
        &self,
        bbox: BoundingBox,
        categories: &[FeatureCategory],
    ) -> Result<Vec<RawFeature>, ProviderError>;
}

/// Chosen intermediate waypoints and where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointSelection {
    pub waypoints: Vec<Waypoint>,
    pub source: String,
    /// False when a provider failure shaped the selection.
    pub cacheable: bool,
}

impl WaypointSelection {
    pub fn geometric(
        origin: Coordinate,
        destination: Coordinate,
        max_ratio: f64,
        fallback: &FallbackConfig,
    ) -> Self {
        let point = geometric_fallback_waypoint(
            origin,
            destination,
            fallback.offset_fraction,
            max_ratio,
            fallback.side,
        );
        Self {
            waypoints: vec![Waypoint::unlabeled(point)],
            source: GEOMETRIC_FALLBACK_ID.to_string(),
            cacheable: false,
        }
    }

    pub fn is_geometric(&self) -> bool {
        self.source == GEOMETRIC_FALLBACK_ID
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.waypoints.iter().map(|w| w.coordinate).collect()
    }
}

/// `score = weight(category) − penalty × km off the direct segment`.
/// Unweighted categories and non-positive scores are dropped; the rest is
/// returned best first.
pub fn score_features(
    features: &[RawFeature],
    origin: Coordinate,
    destination: Coordinate,
    config: &ScenicConfig,
) -> Vec<ScoredFeature> {
    let mut scored: Vec<ScoredFeature> = features
        .iter()
        .filter_map(|feature| {
            let weight = config.category_weights.get(&feature.category)?;
            let off_route_km = distance_to_segment_km(feature.coordinate, origin, destination);
            let score = weight - config.penalty_per_km_off_route * off_route_km;
            if score <= 0.0 {
                tracing::debug!(
                    category = feature.category.as_str(),
                    off_route_km,
                    "discarding candidate with score {:.1}",
                    score
                );
                return None;
            }
            Some(ScoredFeature {
                coordinate: feature.coordinate,
                category: feature.category,
                name: feature.name.clone(),
                score,
            })
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Estimated detour of `origin → points → destination` relative to the
/// direct road distance, scaling great-circle legs by the observed circuity.
pub fn estimated_detour_ratio(
    origin: Coordinate,
    points: &[Coordinate],
    destination: Coordinate,
    direct_route_km: f64,
    circuity: f64,
) -> f64 {
    if direct_route_km <= f64::EPSILON {
        return 0.0;
    }
    let mut legs = 0.0;
    let mut previous = origin;
    for point in points.iter().chain(std::iter::once(&destination)) {
        legs += haversine_km(previous, *point);
        previous = *point;
    }
    (legs * circuity - direct_route_km) / direct_route_km
}

pub fn order_features(
    mut chosen: Vec<ScoredFeature>,
    origin: Coordinate,
    destination: Coordinate,
    ordering: WaypointOrdering,
) -> Vec<ScoredFeature> {
    match ordering {
        WaypointOrdering::AlongRoute => chosen.sort_by(|a, b| {
            along_track_fraction(a.coordinate, origin, destination)
                .total_cmp(&along_track_fraction(b.coordinate, origin, destination))
        }),
        WaypointOrdering::ByScore => chosen.sort_by(|a, b| b.score.total_cmp(&a.score)),
    }
    chosen
}

/// Greedy selection over `scored` (best first): take a candidate when it is
/// far enough from those already taken and the estimated detour of the
/// whole ordered set stays within `max_ratio`.
pub fn select_features(
    scored: &[ScoredFeature],
    origin: Coordinate,
    destination: Coordinate,
    max_ratio: f64,
    circuity: f64,
    config: &ScenicConfig,
) -> Vec<ScoredFeature> {
    let direct_route_km = haversine_km(origin, destination) * circuity;
    let mut chosen: Vec<ScoredFeature> = Vec::new();

    for candidate in scored {
        if chosen.len() >= config.max_waypoints {
            break;
        }
        let too_close = chosen.iter().any(|kept| {
            haversine_km(kept.coordinate, candidate.coordinate) < config.min_separation_km
        });
        if too_close {
            continue;
        }

        let mut tentative = chosen.clone();
        tentative.push(candidate.clone());
        let tentative = order_features(tentative, origin, destination, config.waypoint_ordering);
        let points: Vec<Coordinate> = tentative.iter().map(|f| f.coordinate).collect();
        let ratio = estimated_detour_ratio(origin, &points, destination, direct_route_km, circuity);
        if ratio <= max_ratio {
            chosen = tentative;
        } else {
            tracing::debug!(
                category = candidate.category.as_str(),
                "candidate would exceed detour budget ({:.3} > {:.3})",
                ratio,
                max_ratio
            );
        }
    }

    order_features(chosen, origin, destination, config.waypoint_ordering)
}

pub struct ScenicWaypointSelector {
    provider: Arc<dyn FeatureProvider>,
    limiter: Arc<ProviderRateLimiter>,
    config: ScenicConfig,
    fallback: FallbackConfig,
    timeout: Duration,
}

impl ScenicWaypointSelector {
    pub fn new(
        provider: Arc<dyn FeatureProvider>,
        limiter: Arc<ProviderRateLimiter>,
        config: ScenicConfig,
        fallback: FallbackConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            limiter,
            config,
            fallback,
            timeout,
        }
    }

    pub fn fallback_config(&self) -> &FallbackConfig {
        &self.fallback
    }

    /// Never fails: provider trouble or an empty candidate list yields the
    /// geometric fallback waypoint.
    pub async fn select(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        max_ratio: f64,
        circuity: f64,
    ) -> WaypointSelection {
        let bbox = BoundingBox::from_route(origin, destination, self.config.bbox_buffer_km);
        let categories: Vec<FeatureCategory> =
            self.config.category_weights.keys().copied().collect();
        let id = self.provider.id();

        let features = match guarded_call(&self.limiter, id, self.timeout, || {
            self.provider.query_bbox(bbox, &categories)
        })
        .await
        {
            Ok(features) => features,
            Err(err) => {
                tracing::warn!(
                    provider = id,
                    "feature query failed, using geometric fallback: {}",
                    err
                );
                return WaypointSelection::geometric(origin, destination, max_ratio, &self.fallback);
            }
        };

        let scored = score_features(&features, origin, destination, &self.config);
        let chosen = select_features(&scored, origin, destination, max_ratio, circuity, &self.config);
        if chosen.is_empty() {
            tracing::info!(
                provider = id,
                candidates = features.len(),
                "no usable scenic feature, using geometric fallback"
            );
            return WaypointSelection::geometric(origin, destination, max_ratio, &self.fallback);
        }

        tracing::info!(
            provider = id,
            candidates = features.len(),
            chosen = chosen.len(),
            "scenic waypoints selected"
        );
        WaypointSelection {
            waypoints: chosen
                .into_iter()
                .map(|feature| Waypoint {
                    coordinate: feature.coordinate,
                    label: feature.name,
                })
                .collect(),
            source: id.to_string(),
            cacheable: true,
        }
    }
}
