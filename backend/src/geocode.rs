//! Place name → coordinate candidates, through a priority-ordered chain of
//! free geocoders. Every match is returned; the caller picks one.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::cache::{keys, TieredCache};
use crate::error::RouteError;
use crate::geometry::haversine_km;
use crate::models::{GeocodeMatch, ProviderOutcome};
use crate::providers::{attempt, guarded_call, ProviderError};
use crate::rate_limit::ProviderRateLimiter;

const MAX_NAME_CHARS: usize = 200;

/// Matches this close together with the same display name are duplicates.
const DUPLICATE_RADIUS_KM: f64 = 0.1;

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    fn id(&self) -> &str;
    async fn query(&self, name: &str) -> Result<Vec<GeocodeMatch>, ProviderError>;
}

pub fn validate_name(name: &str) -> Result<&str, RouteError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RouteError::Validation("place name is empty".into()));
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(RouteError::Validation(format!(
            "place name longer than {MAX_NAME_CHARS} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(RouteError::Validation(
            "place name contains control characters".into(),
        ));
    }
    Ok(trimmed)
}

/// Importance descending, later near-duplicates dropped.
pub fn rank_matches(mut matches: Vec<GeocodeMatch>) -> Vec<GeocodeMatch> {
    matches.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    let mut ranked: Vec<GeocodeMatch> = Vec::with_capacity(matches.len());
    for candidate in matches {
        let duplicate = ranked.iter().any(|kept| {
            kept.display_name == candidate.display_name
                && haversine_km(kept.coordinate, candidate.coordinate) <= DUPLICATE_RADIUS_KM
        });
        if !duplicate {
            ranked.push(candidate);
        }
    }
    ranked
}

pub struct GeocodingResolver {
    providers: Vec<Arc<dyn GeocodingProvider>>,
    limiter: Arc<ProviderRateLimiter>,
    cache: TieredCache,
    ttl: Duration,
    timeout: Duration,
}

impl GeocodingResolver {
    /// `providers` are tried in the given order.
    pub fn new(
        providers: Vec<Arc<dyn GeocodingProvider>>,
        limiter: Arc<ProviderRateLimiter>,
        cache: TieredCache,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            providers,
            limiter,
            cache,
            ttl,
            timeout,
        }
    }

    /// All candidate matches for `name`, most important first.
    ///
    /// Empty results and provider failures are never cached.
    pub async fn resolve(&self, name: &str) -> Result<Vec<GeocodeMatch>, RouteError> {
        let name = validate_name(name)?;
        let key = keys::geocode(name);
        self.cache
            .get_or_compute(&key, self.ttl, || self.query_chain(name))
            .await
    }

    async fn query_chain(&self, name: &str) -> Result<Vec<GeocodeMatch>, RouteError> {
        let mut attempts = Vec::with_capacity(self.providers.len());
        for (priority, provider) in self.providers.iter().enumerate() {
            let id = provider.id();
            let result = guarded_call(&self.limiter, id, self.timeout, || provider.query(name)).await;
            match result {
                Ok(matches) if !matches.is_empty() => {
                    attempts.push(attempt(id, priority, ProviderOutcome::Success));
                    tracing::info!(provider = id, count = matches.len(), "geocoded {:?}", name);
                    return Ok(rank_matches(matches));
                }
                Ok(_) | Err(ProviderError::NotFound) => {
                    tracing::debug!(provider = id, "no geocode match for {:?}", name);
                    attempts.push(attempt(id, priority, ProviderOutcome::NotFound));
                }
                Err(err) => {
                    tracing::warn!(provider = id, "geocoding failed: {}", err);
                    attempts.push(attempt(id, priority, err.outcome()));
                }
            }
        }

        if attempts
            .iter()
            .all(|attempt| attempt.outcome == ProviderOutcome::NotFound)
        {
            return Err(RouteError::NotFound {
                query: name.to_string(),
                attempts,
            });
        }
        Err(RouteError::exhausted(attempts))
    }
}
