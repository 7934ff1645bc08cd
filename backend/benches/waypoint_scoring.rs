use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trip_routing::config::{PoiDensityConfig, ScenicConfig};
use trip_routing::geometry::{geometric_fallback_waypoint, intermediate_point, OffsetSide};
use trip_routing::models::{Coordinate, FeatureCategory, RawFeature};
use trip_routing::poi_density::sample_points;
use trip_routing::scenic::{score_features, select_features};

const VANCOUVER: Coordinate = Coordinate { lat: 49.2827, lon: -123.1207 };
const BANFF: Coordinate = Coordinate { lat: 51.1784, lon: -115.5708 };

/// Deterministic candidates scattered around the direct line.
fn candidates(count: usize) -> Vec<RawFeature> {
    (0..count)
        .map(|i| {
            let on_line = intermediate_point(VANCOUVER, BANFF, (i as f64 + 0.5) / count as f64);
            let jitter = ((i * 7919) % 200) as f64 / 100.0 - 1.0;
            RawFeature {
                coordinate: Coordinate::new(on_line.lat + jitter * 0.3, on_line.lon - jitter * 0.2),
                category: FeatureCategory::ALL[i % FeatureCategory::ALL.len()],
                name: None,
            }
        })
        .collect()
}

fn benchmark_scoring(c: &mut Criterion) {
    let config = ScenicConfig::default();
    let mut group = c.benchmark_group("scenic_scoring");

    // Overpass answers are capped at 500 elements
    for count in [50usize, 200, 500] {
        let features = candidates(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &features, |b, features| {
            b.iter(|| {
                let scored = score_features(black_box(features), VANCOUVER, BANFF, &config);
                select_features(&scored, VANCOUVER, BANFF, 0.3, 1.25, &config)
            });
        });
    }

    group.finish();
}

fn benchmark_sampling(c: &mut Criterion) {
    let config = PoiDensityConfig::default();

    c.bench_function("poi_sample_points", |b| {
        b.iter(|| sample_points(black_box(VANCOUVER), black_box(BANFF), 0.3, &config))
    });

    c.bench_function("geometric_fallback", |b| {
        b.iter(|| {
            geometric_fallback_waypoint(black_box(VANCOUVER), black_box(BANFF), 0.2, 0.3, OffsetSide::Left)
        })
    });
}

criterion_group!(benches, benchmark_scoring, benchmark_sampling);
criterion_main!(benches);
