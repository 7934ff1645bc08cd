use thiserror::Error;

use crate::models::{ProviderAttempt, ProviderOutcome, RouteResult};

/// Errors surfaced to callers once every fallback has been exhausted.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("no match found for {query:?}")]
    NotFound {
        query: String,
        attempts: Vec<ProviderAttempt>,
    },
    #[error("every provider rate limited the request")]
    ProviderRateLimited { attempts: Vec<ProviderAttempt> },
    #[error("no provider was available")]
    ProviderUnavailable { attempts: Vec<ProviderAttempt> },
    #[error("all routing providers failed")]
    RouteUnavailable { attempts: Vec<ProviderAttempt> },
    #[error("failed to export GPX: {0}")]
    Export(#[from] gpx::errors::GpxError),
    /// The route is usable but an enrichment step failed.
    #[error("route computed without enrichment")]
    PartialResult(Box<RouteResult>),
}

impl RouteError {
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::Validation(_) => "validation_error",
            RouteError::NotFound { .. } => "not_found",
            RouteError::ProviderRateLimited { .. } => "provider_rate_limited",
            RouteError::ProviderUnavailable { .. } => "provider_unavailable",
            RouteError::RouteUnavailable { .. } => "route_unavailable",
            RouteError::Export(_) => "export_error",
            RouteError::PartialResult(_) => "partial_result",
        }
    }

    pub fn attempts(&self) -> &[ProviderAttempt] {
        match self {
            RouteError::NotFound { attempts, .. }
            | RouteError::ProviderRateLimited { attempts }
            | RouteError::ProviderUnavailable { attempts }
            | RouteError::RouteUnavailable { attempts } => attempts,
            RouteError::Validation(_) | RouteError::Export(_) | RouteError::PartialResult(_) => &[],
        }
    }

    /// Typed error for an exhausted non-routing chain: rate limited only when
    /// every failing provider said so, otherwise unavailable. Providers that
    /// answered "no result" are not failures and are ignored here.
    pub fn exhausted(attempts: Vec<ProviderAttempt>) -> Self {
        let mut failures = attempts
            .iter()
            .filter(|attempt| attempt.outcome != ProviderOutcome::NotFound)
            .peekable();
        let all_rate_limited = failures.peek().is_some()
            && failures.all(|attempt| attempt.outcome == ProviderOutcome::RateLimited);
        if all_rate_limited {
            RouteError::ProviderRateLimited { attempts }
        } else {
            RouteError::ProviderUnavailable { attempts }
        }
    }
}
