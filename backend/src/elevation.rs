use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::geometry::haversine_m;
use crate::models::{Coordinate, ElevationProfile, ElevationSample};
use crate::providers::{guarded_call, ProviderError};
use crate::rate_limit::ProviderRateLimiter;

#[async_trait]
pub trait ElevationProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Largest number of points accepted by one `query`.
    fn batch_size(&self) -> usize;

    /// One elevation (m) per point, in order.
    async fn query(&self, points: &[Coordinate]) -> Result<Vec<f64>, ProviderError>;
}

/// Keep at most `max_samples` evenly spread points, always including both
/// endpoints.
pub fn downsample(geometry: &[Coordinate], max_samples: usize) -> Vec<Coordinate> {
    let max_samples = max_samples.max(2);
    if geometry.len() <= max_samples {
        return geometry.to_vec();
    }
    let last = geometry.len() - 1;
    let step = last as f64 / (max_samples - 1) as f64;
    (0..max_samples)
        .map(|i| geometry[((i as f64 * step).round() as usize).min(last)])
        .collect()
}

/// Pair elevations with cumulative distance and compute the summary figures.
pub fn build_profile(points: &[Coordinate], elevations: &[f64]) -> ElevationProfile {
    let mut distance = 0.0;
    let samples: Vec<ElevationSample> = points
        .iter()
        .zip(elevations)
        .enumerate()
        .map(|(idx, (point, &elevation_m))| {
            if idx > 0 {
                distance += haversine_m(points[idx - 1], *point);
            }
            ElevationSample {
                distance_from_start_m: distance,
                elevation_m,
            }
        })
        .collect();

    let min_elevation = elevations.iter().copied().fold(f64::INFINITY, f64::min);
    let max_elevation = elevations.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut ascent_m = 0.0;
    let mut descent_m = 0.0;
    for window in elevations.windows(2) {
        let diff = window[1] - window[0];
        if diff > 0.0 {
            ascent_m += diff;
        } else {
            descent_m += diff.abs();
        }
    }

    ElevationProfile {
        samples,
        ascent_m,
        descent_m,
        min_elevation_m: min_elevation.is_finite().then_some(min_elevation),
        max_elevation_m: max_elevation.is_finite().then_some(max_elevation),
    }
}

/// Elevation enrichment over a priority-ordered provider chain.
pub struct ElevationEnricher {
    providers: Vec<Arc<dyn ElevationProvider>>,
    limiter: Arc<ProviderRateLimiter>,
    timeout: Duration,
    max_samples: usize,
}

impl ElevationEnricher {
    pub fn new(
        providers: Vec<Arc<dyn ElevationProvider>>,
        limiter: Arc<ProviderRateLimiter>,
        timeout: Duration,
        max_samples: usize,
    ) -> Self {
        Self {
            providers,
            limiter,
            timeout,
            max_samples,
        }
    }

    /// Build the elevation profile of `geometry`.
    ///
    /// # Errors
    /// The last provider error when every provider failed or returned a
    /// different number of values than requested.
    pub async fn annotate(
        &self,
        geometry: &[Coordinate],
    ) -> Result<ElevationProfile, ProviderError> {
        let points = downsample(geometry, self.max_samples);
        if points.is_empty() {
            return Ok(build_profile(&[], &[]));
        }

        let mut last_error = ProviderError::Unavailable("no elevation provider configured".into());
        for provider in &self.providers {
            match self.query_all(provider.as_ref(), &points).await {
                Ok(elevations) => {
                    tracing::debug!(
                        provider = provider.id(),
                        samples = points.len(),
                        "elevation profile built"
                    );
                    return Ok(build_profile(&points, &elevations));
                }
                Err(err) => {
                    tracing::warn!(provider = provider.id(), "elevation lookup failed: {}", err);
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    async fn query_all(
        &self,
        provider: &dyn ElevationProvider,
        points: &[Coordinate],
    ) -> Result<Vec<f64>, ProviderError> {
        let id = provider.id();
        let mut elevations = Vec::with_capacity(points.len());
        for batch in points.chunks(provider.batch_size().max(1)) {
            let values =
                guarded_call(&self.limiter, id, self.timeout, || provider.query(batch)).await?;
            if values.len() != batch.len() {
                return Err(ProviderError::Unavailable(format!(
                    "expected {} elevations, got {}",
                    batch.len(),
                    values.len()
                )));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(ProviderError::Unavailable("non-finite elevation".into()));
            }
            elevations.extend(values);
        }
        Ok(elevations)
    }
}
