use std::{
    collections::HashMap,
    num::NonZeroU32,
    sync::{Arc, Mutex},
    time::Duration,
};

use governor::{
    clock::{Clock, DefaultClock},
    DefaultDirectRateLimiter, Quota, RateLimiter,
};

use crate::config::{RateLimitConfig, RateQuota};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate budget for {provider_id} exhausted, retry in {retry_after:?}")]
pub struct WouldExceed {
    pub provider_id: String,
    pub retry_after: Duration,
}

/// Leaky-bucket (GCRA) limiter with one bucket per provider id.
///
/// Constructed explicitly and shared through an `Arc`, so each test or
/// planner can own an isolated instance.
pub struct ProviderRateLimiter {
    default_quota: Option<Quota>,
    quotas: HashMap<String, Quota>,
    limiters: Mutex<HashMap<String, Arc<DefaultDirectRateLimiter>>>,
}

impl ProviderRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let quotas = config
            .providers
            .iter()
            .map(|(id, quota)| (id.clone(), to_quota(*quota)))
            .collect();
        Self {
            default_quota: Some(to_quota(config.default_quota)),
            quotas,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter that never delays; used by tests and local mirrors.
    pub fn unlimited() -> Self {
        Self {
            default_quota: None,
            quotas: HashMap::new(),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until `provider_id` has budget for one more request.
    pub async fn acquire(&self, provider_id: &str) {
        if let Some(limiter) = self.limiter_for(provider_id) {
            limiter.until_ready().await;
        }
    }

    /// Non-blocking variant: take one unit of budget or report when to retry.
    pub fn try_acquire(&self, provider_id: &str) -> Result<(), WouldExceed> {
        let Some(limiter) = self.limiter_for(provider_id) else {
            return Ok(());
        };
        limiter.check().map_err(|not_until| WouldExceed {
            provider_id: provider_id.to_string(),
            retry_after: not_until.wait_time_from(DefaultClock::default().now()),
        })
    }

    fn limiter_for(&self, provider_id: &str) -> Option<Arc<DefaultDirectRateLimiter>> {
        let quota = self
            .quotas
            .get(provider_id)
            .copied()
            .or(self.default_quota)?;
        let mut limiters = self
            .limiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let limiter = limiters
            .entry(provider_id.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(quota)));
        Some(Arc::clone(limiter))
    }
}

fn to_quota(quota: RateQuota) -> Quota {
    let per_second = NonZeroU32::new(quota.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(quota.burst).unwrap_or(NonZeroU32::MIN);
    Quota::per_second(per_second).allow_burst(burst)
}
