//! "Longest with experiences": route through the busiest of six sample
//! points placed either side of the direct line.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::config::{FallbackConfig, PoiDensityConfig};
use crate::geometry::{bounded_offset_point, haversine_km, OffsetSide};
use crate::models::{Coordinate, PoiCategory, PoiDensitySample, Waypoint};
use crate::providers::{guarded_call, ProviderError};
use crate::rate_limit::ProviderRateLimiter;
use crate::scenic::WaypointSelection;

#[async_trait]
pub trait PoiDensityProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Number of POIs of `categories` within `radius_m` of `center`.
    async fn query_radius(
        &self,
        center: Coordinate,
        radius_m: f64,
        categories: &[PoiCategory],
    ) -> Result<u32, ProviderError>;
}

/// Sample positions in a fixed order: for each fraction, left then right.
pub fn sample_points(
    origin: Coordinate,
    destination: Coordinate,
    max_ratio: f64,
    config: &PoiDensityConfig,
) -> Vec<Coordinate> {
    let offset_km = haversine_km(origin, destination) * config.offset_fraction.max(0.0);
    config
        .sample_fractions
        .iter()
        .flat_map(|&t| {
            [OffsetSide::Left, OffsetSide::Right].map(|side| {
                bounded_offset_point(origin, destination, t, offset_km, max_ratio, side)
            })
        })
        .collect()
}

/// Densest sample; ties keep the earlier one. `None` when nothing beats zero.
pub fn densest(samples: &[PoiDensitySample]) -> Option<PoiDensitySample> {
    samples
        .iter()
        .fold(None::<PoiDensitySample>, |best, sample| match best {
            Some(best) if best.count >= sample.count => Some(best),
            _ => Some(*sample),
        })
        .filter(|best| best.count > 0)
}

pub struct PoiDensityWaypointSelector {
    provider: Arc<dyn PoiDensityProvider>,
    limiter: Arc<ProviderRateLimiter>,
    config: PoiDensityConfig,
    fallback: FallbackConfig,
    timeout: Duration,
}

impl PoiDensityWaypointSelector {
    pub fn new(
        provider: Arc<dyn PoiDensityProvider>,
        limiter: Arc<ProviderRateLimiter>,
        config: PoiDensityConfig,
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

    /// Query every sample concurrently. Failed samples are skipped; the
    /// result is in sample order.
    pub async fn measure(&self, points: &[Coordinate]) -> Vec<PoiDensitySample> {
        let mut queries = JoinSet::new();
        for (index, &point) in points.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let limiter = Arc::clone(&self.limiter);
            let radius_m = self.config.radius_m;
            let timeout = self.timeout;
            queries.spawn(async move {
                let id = provider.id().to_string();
                let count = guarded_call(&limiter, &id, timeout, || {
                    provider.query_radius(point, radius_m, &PoiCategory::ALL)
                })
                .await;
                (index, point, count)
            });
        }

        let mut samples: Vec<(usize, PoiDensitySample)> = Vec::with_capacity(points.len());
        while let Some(joined) = queries.join_next().await {
            match joined {
                Ok((index, coordinate, Ok(count))) => {
                    samples.push((index, PoiDensitySample { coordinate, count }));
                }
                Ok((index, _, Err(err))) => {
                    tracing::warn!(sample = index, "POI density query failed: {}", err);
                }
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "POI density task panicked");
                }
            }
        }
        samples.sort_by_key(|(index, _)| *index);
        samples.into_iter().map(|(_, sample)| sample).collect()
    }

    /// Never fails: no successful sample, or only empty ones, yields the
    /// geometric fallback waypoint.
    pub async fn select(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        max_ratio: f64,
    ) -> WaypointSelection {
        let points = sample_points(origin, destination, max_ratio, &self.config);
        let samples = self.measure(&points).await;

        match densest(&samples) {
            Some(best) => {
                tracing::info!(
                    provider = self.provider.id(),
                    count = best.count,
                    answered = samples.len(),
                    "densest POI sample selected"
                );
                WaypointSelection {
                    waypoints: vec![Waypoint::unlabeled(best.coordinate)],
                    source: self.provider.id().to_string(),
                    cacheable: samples.len() == points.len(),
                }
            }
            None => {
                tracing::info!(
                    answered = samples.len(),
                    "no POI density data, using geometric fallback"
                );
                WaypointSelection::geometric(origin, destination, max_ratio, &self.fallback)
            }
        }
    }
}
