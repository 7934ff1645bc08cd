//! In-memory providers shared by the unit tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::content::ContentProvider;
use crate::elevation::ElevationProvider;
use crate::engine::RoutingProvider;
use crate::geometry::{approximate_distance_km, intermediate_point, BoundingBox, haversine_km};
use crate::models::{
    ContentCategory, ContentItem, Coordinate, FeatureCategory, PoiCategory, RawFeature, RouteLeg,
    TransportMode,
};
use crate::poi_density::PoiDensityProvider;
use crate::providers::ProviderError;
use crate::scenic::FeatureProvider;

pub const VANCOUVER: Coordinate = Coordinate {
    lat: 49.2827,
    lon: -123.1207,
};

pub const BANFF: Coordinate = Coordinate {
    lat: 51.1784,
    lon: -115.5708,
};

/// Road distance = great-circle distance × `circuity`.
pub struct FakeRouter {
    id: &'static str,
    circuity: f64,
    failure: Option<ProviderError>,
    delay: Option<Duration>,
    direct_only: bool,
    pub calls: AtomicUsize,
}

impl FakeRouter {
    fn build(id: &'static str, circuity: f64) -> Self {
        Self {
            id,
            circuity,
            failure: None,
            delay: None,
            direct_only: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn new(id: &'static str, circuity: f64) -> Arc<Self> {
        Arc::new(Self::build(id, circuity))
    }

    pub fn failing(id: &'static str, failure: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(failure),
            ..Self::build(id, 1.2)
        })
    }

    pub fn slow(id: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::build(id, 1.2)
        })
    }

    /// Answers two-point requests only; via routes are unavailable.
    pub fn direct_only(id: &'static str, circuity: f64) -> Arc<Self> {
        Arc::new(Self {
            direct_only: true,
            ..Self::build(id, circuity)
        })
    }

    pub fn leg_for(&self, points: &[Coordinate]) -> RouteLeg {
        let mut geometry = Vec::new();
        for pair in points.windows(2) {
            for step in 0..4 {
                geometry.push(intermediate_point(pair[0], pair[1], step as f64 / 4.0));
            }
        }
        if let Some(last) = points.last() {
            geometry.push(*last);
        }
        let distance_meters = approximate_distance_km(points) * 1000.0 * self.circuity;
        RouteLeg {
            geometry,
            distance_meters,
            duration_seconds: distance_meters / 25.0,
        }
    }
}

#[async_trait]
impl RoutingProvider for FakeRouter {
    fn id(&self) -> &str {
        self.id
    }

    async fn route(
        &self,
        waypoints: &[Coordinate],
        _mode: TransportMode,
    ) -> Result<RouteLeg, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        if self.direct_only && waypoints.len() > 2 {
            return Err(ProviderError::Unavailable("via routing disabled".into()));
        }
        Ok(self.leg_for(waypoints))
    }
}

pub struct FakeFeatures {
    id: &'static str,
    result: Result<Vec<RawFeature>, ProviderError>,
    pub calls: AtomicUsize,
}

impl FakeFeatures {
    pub fn new(id: &'static str, result: Result<Vec<RawFeature>, ProviderError>) -> Arc<Self> {
        Arc::new(Self {
            id,
            result,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl FeatureProvider for FakeFeatures {
    fn id(&self) -> &str {
        self.id
    }

    async fn query_bbox(
        &self,
        bbox: BoundingBox,
        categories: &[FeatureCategory],
    ) -> Result<Vec<RawFeature>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map(|features| {
            features
                .into_iter()
                .filter(|f| bbox.contains(f.coordinate) && categories.contains(&f.category))
                .collect()
        })
    }
}

pub fn feature(category: FeatureCategory, lat: f64, lon: f64, name: &str) -> RawFeature {
    RawFeature {
        coordinate: Coordinate::new(lat, lon),
        category,
        name: Some(name.to_string()),
    }
}

type DensityFn = dyn Fn(Coordinate) -> Result<u32, ProviderError> + Send + Sync;

/// Density as a function of the sample position.
pub struct FakeDensity {
    count: Box<DensityFn>,
    pub calls: AtomicUsize,
}

impl FakeDensity {
    pub fn new(
        count: impl Fn(Coordinate) -> Result<u32, ProviderError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            count: Box::new(count),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PoiDensityProvider for FakeDensity {
    fn id(&self) -> &str {
        "fake-density"
    }

    async fn query_radius(
        &self,
        center: Coordinate,
        _radius_m: f64,
        _categories: &[PoiCategory],
    ) -> Result<u32, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.count)(center)
    }
}

/// Elevation in metres equals the distance in km from 125°W along the
/// parallel, so profiles are deterministic.
pub struct FakeElevation {
    id: &'static str,
    batch_size: usize,
    failure: Option<ProviderError>,
    short_by: usize,
    pub calls: AtomicUsize,
    pub largest_batch: AtomicUsize,
}

impl FakeElevation {
    fn build(id: &'static str, batch_size: usize) -> Self {
        Self {
            id,
            batch_size,
            failure: None,
            short_by: 0,
            calls: AtomicUsize::new(0),
            largest_batch: AtomicUsize::new(0),
        }
    }

    pub fn new(id: &'static str, batch_size: usize) -> Arc<Self> {
        Arc::new(Self::build(id, batch_size))
    }

    pub fn failing(id: &'static str, failure: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(failure),
            ..Self::build(id, 100)
        })
    }

    /// Returns `short_by` fewer values than requested.
    pub fn truncating(id: &'static str, short_by: usize) -> Arc<Self> {
        Arc::new(Self {
            short_by,
            ..Self::build(id, 100)
        })
    }

    pub fn elevation_at(point: Coordinate) -> f64 {
        haversine_km(Coordinate::new(point.lat, -125.0), point)
    }
}

#[async_trait]
impl ElevationProvider for FakeElevation {
    fn id(&self) -> &str {
        self.id
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn query(&self, points: &[Coordinate]) -> Result<Vec<f64>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.largest_batch.fetch_max(points.len(), Ordering::SeqCst);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let keep = points.len().saturating_sub(self.short_by);
        Ok(points[..keep].iter().map(|p| Self::elevation_at(*p)).collect())
    }
}

pub struct FakeContent {
    id: &'static str,
    category: ContentCategory,
    result: Result<Vec<ContentItem>, ProviderError>,
    pub calls: AtomicUsize,
}

impl FakeContent {
    pub fn new(id: &'static str, result: Result<Vec<ContentItem>, ProviderError>) -> Arc<Self> {
        Arc::new(Self {
            id,
            category: ContentCategory::Images,
            result,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn pois(id: &'static str, result: Result<Vec<ContentItem>, ProviderError>) -> Arc<Self> {
        Arc::new(Self {
            id,
            category: ContentCategory::Pois,
            result,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ContentProvider for FakeContent {
    fn id(&self) -> &str {
        self.id
    }

    fn category(&self) -> ContentCategory {
        self.category
    }

    async fn fetch(&self, _query: &str) -> Result<Vec<ContentItem>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

pub fn image(provider_id: &str, n: usize, score: f64) -> ContentItem {
    ContentItem {
        id: format!("{provider_id}:{n}"),
        url: format!("https://images.example.com/{provider_id}/{n}.jpg"),
        title: Some(format!("Mountain view {n}")),
        author: None,
        source_url: None,
        provider_id: provider_id.to_string(),
        category: ContentCategory::Images,
        score,
    }
}
