use std::{collections::BTreeMap, env, fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::geometry::OffsetSide;
use crate::models::FeatureCategory;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_USER_AGENT: &str = "trip-routing/0.1 (+https://github.com/trip-routing)";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid config file {path:?}: {source}")]
    Parse {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Visit order when more than one scenic waypoint is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointOrdering {
    /// Sorted by their projection along origin → destination.
    #[default]
    AlongRoute,
    /// In descending score order, as selected.
    ByScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenicConfig {
    pub category_weights: BTreeMap<FeatureCategory, f64>,
    pub penalty_per_km_off_route: f64,
    pub bbox_buffer_km: f64,
    pub max_waypoints: usize,
    pub min_separation_km: f64,
    pub waypoint_ordering: WaypointOrdering,
}

impl Default for ScenicConfig {
    fn default() -> Self {
        let category_weights = BTreeMap::from([
            (FeatureCategory::Viewpoint, 100.0),
            (FeatureCategory::Peak, 90.0),
            (FeatureCategory::Waterfall, 85.0),
            (FeatureCategory::Coastline, 85.0),
            (FeatureCategory::NationalPark, 80.0),
            (FeatureCategory::Lake, 75.0),
            (FeatureCategory::River, 70.0),
        ]);
        Self {
            category_weights,
            penalty_per_km_off_route: 2.0,
            bbox_buffer_km: 20.0,
            max_waypoints: 3,
            min_separation_km: 5.0,
            waypoint_ordering: WaypointOrdering::AlongRoute,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiDensityConfig {
    pub radius_m: f64,
    /// Fractions along the route where samples are taken, on both sides.
    pub sample_fractions: Vec<f64>,
    /// Sideways offset of each sample as a fraction of the route length.
    pub offset_fraction: f64,
}

impl Default for PoiDensityConfig {
    fn default() -> Self {
        Self {
            radius_m: 10_000.0,
            sample_fractions: vec![0.3, 0.5, 0.7],
            offset_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub offset_fraction: f64,
    pub side: OffsetSide,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            offset_fraction: 0.2,
            side: OffsetSide::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    pub route_secs: u64,
    pub geocode_secs: u64,
    pub content_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            route_secs: 30 * 24 * 3600,
            geocode_secs: 365 * 24 * 3600,
            content_secs: 7 * 24 * 3600,
        }
    }
}

impl CacheTtls {
    pub fn route(&self) -> Duration {
        Duration::from_secs(self.route_secs)
    }

    pub fn geocode(&self) -> Duration {
        Duration::from_secs(self.geocode_secs)
    }

    pub fn content(&self) -> Duration {
        Duration::from_secs(self.content_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub feature_query_secs: u64,
    pub routing_secs: u64,
    pub geocoding_secs: u64,
    pub elevation_secs: u64,
    pub content_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            feature_query_secs: 25,
            routing_secs: 10,
            geocoding_secs: 10,
            elevation_secs: 10,
            content_secs: 10,
        }
    }
}

impl Timeouts {
    pub fn feature_query(&self) -> Duration {
        Duration::from_secs(self.feature_query_secs)
    }

    pub fn routing(&self) -> Duration {
        Duration::from_secs(self.routing_secs)
    }

    pub fn geocoding(&self) -> Duration {
        Duration::from_secs(self.geocoding_secs)
    }

    pub fn elevation(&self) -> Duration {
        Duration::from_secs(self.elevation_secs)
    }

    pub fn content(&self) -> Duration {
        Duration::from_secs(self.content_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateQuota {
    pub requests_per_second: u32,
    pub burst: u32,
}

impl Default for RateQuota {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            burst: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub default_quota: RateQuota,
    pub providers: BTreeMap<String, RateQuota>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Public usage policies: Nominatim 1 req/s, Overpass ~2 slots.
        let providers = BTreeMap::from([
            ("nominatim".to_string(), RateQuota { requests_per_second: 1, burst: 1 }),
            ("photon".to_string(), RateQuota { requests_per_second: 2, burst: 4 }),
            ("overpass".to_string(), RateQuota { requests_per_second: 1, burst: 2 }),
            ("osrm".to_string(), RateQuota { requests_per_second: 1, burst: 3 }),
            ("openrouteservice".to_string(), RateQuota { requests_per_second: 1, burst: 2 }),
            ("open-elevation".to_string(), RateQuota { requests_per_second: 1, burst: 2 }),
            ("open-meteo".to_string(), RateQuota { requests_per_second: 5, burst: 10 }),
            ("reddit".to_string(), RateQuota { requests_per_second: 1, burst: 2 }),
            ("flickr".to_string(), RateQuota { requests_per_second: 2, burst: 4 }),
            ("pinterest".to_string(), RateQuota { requests_per_second: 1, burst: 1 }),
        ]);
        Self {
            default_quota: RateQuota::default(),
            providers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub max_items: usize,
    pub excluded_title_keywords: Vec<String>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_items: 30,
            excluded_title_keywords: ["meme", "funny", "joke", "selfie", "my face"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    pub max_samples: usize,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self { max_samples: 512 }
    }
}

/// Tunables loaded from the optional `ROUTING_CONFIG` JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub scenic: ScenicConfig,
    pub poi_density: PoiDensityConfig,
    pub fallback: FallbackConfig,
    pub cache_ttls: CacheTtls,
    pub timeouts: Timeouts,
    pub rate_limits: RateLimitConfig,
    pub content: ContentConfig,
    pub elevation: ElevationConfig,
}

impl RoutingConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.into(),
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            source,
            path: path.into(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.scenic.max_waypoints) {
            return Err(ConfigError::Invalid(format!(
                "scenic.max_waypoints must be between 1 and 3, got {}",
                self.scenic.max_waypoints
            )));
        }
        if self.scenic.penalty_per_km_off_route < 0.0 || self.scenic.bbox_buffer_km < 0.0 {
            return Err(ConfigError::Invalid(
                "scenic penalty and buffer must be non-negative".into(),
            ));
        }
        if self.poi_density.radius_m <= 0.0 {
            return Err(ConfigError::Invalid("poi_density.radius_m must be positive".into()));
        }
        if self
            .poi_density
            .sample_fractions
            .iter()
            .any(|t| !(0.0..=1.0).contains(t))
        {
            return Err(ConfigError::Invalid(
                "poi_density.sample_fractions must lie within 0..=1".into(),
            ));
        }
        let quotas = std::iter::once(&self.rate_limits.default_quota)
            .chain(self.rate_limits.providers.values());
        for quota in quotas {
            if quota.requests_per_second == 0 || quota.burst == 0 {
                return Err(ConfigError::Invalid(
                    "rate quotas need non-zero requests_per_second and burst".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Endpoints of the external providers.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub nominatim_url: String,
    pub photon_url: String,
    pub overpass_url: String,
    pub osrm_url: String,
    pub openrouteservice_url: String,
    pub open_elevation_url: String,
    pub open_meteo_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            nominatim_url: "https://nominatim.openstreetmap.org".into(),
            photon_url: "https://photon.komoot.io".into(),
            overpass_url: "https://overpass-api.de/api/interpreter".into(),
            osrm_url: "https://router.project-osrm.org".into(),
            openrouteservice_url: "https://api.openrouteservice.org".into(),
            open_elevation_url: "https://api.open-elevation.com".into(),
            open_meteo_url: "https://api.open-meteo.com".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub cache_capacity: usize,
    pub ors_api_key: Option<String>,
    pub user_agent: String,
    pub endpoints: ProviderEndpoints,
    pub routing: RoutingConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let routing = match env::var("ROUTING_CONFIG") {
            Ok(path) => RoutingConfig::from_file(path)?,
            Err(_) => RoutingConfig::default(),
        };

        let cache_capacity = match env::var("CACHE_CAPACITY") {
            Ok(value) => value
                .parse::<usize>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or(ConfigError::InvalidEnv {
                    name: "CACHE_CAPACITY",
                    value,
                })?,
            Err(_) => 10_000,
        };

        let defaults = ProviderEndpoints::default();
        let endpoints = ProviderEndpoints {
            nominatim_url: env_or("NOMINATIM_URL", defaults.nominatim_url),
            photon_url: env_or("PHOTON_URL", defaults.photon_url),
            overpass_url: env_or("OVERPASS_URL", defaults.overpass_url),
            osrm_url: env_or("OSRM_URL", defaults.osrm_url),
            openrouteservice_url: env_or("ORS_URL", defaults.openrouteservice_url),
            open_elevation_url: env_or("OPEN_ELEVATION_URL", defaults.open_elevation_url),
            open_meteo_url: env_or("OPEN_METEO_URL", defaults.open_meteo_url),
        };

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR.to_string()),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            cache_dir: env::var("CACHE_DIR").ok().map(PathBuf::from),
            cache_capacity,
            ors_api_key: env::var("ORS_API_KEY").ok().filter(|key| !key.is_empty()),
            user_agent: env_or("USER_AGENT", DEFAULT_USER_AGENT.to_string()),
            endpoints,
            routing,
        })
    }
}

fn env_or(name: &str, default: String) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_weights_follow_scenic_table() {
        let scenic = ScenicConfig::default();
        assert_eq!(scenic.category_weights[&FeatureCategory::Viewpoint], 100.0);
        assert_eq!(scenic.category_weights[&FeatureCategory::Peak], 90.0);
        assert_eq!(scenic.category_weights[&FeatureCategory::Coastline], 85.0);
        assert_eq!(scenic.category_weights[&FeatureCategory::NationalPark], 80.0);
        assert_eq!(scenic.category_weights[&FeatureCategory::Lake], 75.0);
        assert_eq!(scenic.category_weights[&FeatureCategory::River], 70.0);
        assert_eq!(scenic.penalty_per_km_off_route, 2.0);
    }

    #[test]
    fn default_routing_config_is_valid() {
        assert!(RoutingConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"scenic": {{"category_weights": {{"lake": 120.0}}, "max_waypoints": 2}},
                "fallback": {{"side": "right"}}}}"#
        )
        .unwrap();

        let config = RoutingConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scenic.max_waypoints, 2);
        assert_eq!(config.scenic.category_weights.len(), 1);
        assert_eq!(config.scenic.category_weights[&FeatureCategory::Lake], 120.0);
        assert_eq!(config.scenic.penalty_per_km_off_route, 2.0);
        assert_eq!(config.fallback.side, OffsetSide::Right);
        assert_eq!(config.fallback.offset_fraction, 0.2);
        assert_eq!(config.cache_ttls.route_secs, 30 * 24 * 3600);
    }

    #[test]
    fn rejects_too_many_waypoints() {
        let mut config = RoutingConfig::default();
        config.scenic.max_waypoints = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_quota() {
        let mut config = RoutingConfig::default();
        config
            .rate_limits
            .providers
            .insert("osrm".into(), RateQuota { requests_per_second: 0, burst: 1 });
        assert!(config.validate().is_err());
    }
}
