//! Multi-source content resolution (destination images and the like).
//!
//! Providers are free scrapers that fail often. Resolution never errors:
//! when every provider fails the caller gets an empty list flagged
//! `fallback_only`, and that outcome is never cached.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Url;
use tokio::task::JoinSet;

use crate::cache::{keys, TieredCache};
use crate::config::ContentConfig;
use crate::models::{
    ContentCategory, ContentItem, ContentResolution, ProviderAttempt, ProviderOutcome,
    ResolutionPolicy,
};
use crate::providers::{attempt, guarded_call, ProviderError};
use crate::rate_limit::ProviderRateLimiter;

const MAX_URL_LEN: usize = 2048;
const MAX_TITLE_CHARS: usize = 300;
const MAX_ID_CHARS: usize = 512;
const MAX_QUERY_CHARS: usize = 200;

#[async_trait]
pub trait ContentProvider: Send + Sync {
    fn id(&self) -> &str;

    fn category(&self) -> ContentCategory {
        ContentCategory::Images
    }

    /// True when `fetch` issues several upstream requests and takes a rate
    /// token and a timeout for each one itself.
    fn paces_requests(&self) -> bool {
        false
    }

    async fn fetch(&self, query: &str) -> Result<Vec<ContentItem>, ProviderError>;
}

/// Lower-cased scheme and host, no query, fragment or trailing slash.
pub fn normalize_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let mut normalized = format!("{}://{}", url.scheme(), url.host_str()?.to_lowercase());
    if let Some(port) = url.port() {
        normalized.push_str(&format!(":{port}"));
    }
    normalized.push_str(url.path().trim_end_matches('/'));
    Some(normalized)
}

fn has_control(text: &str) -> bool {
    text.chars().any(char::is_control)
}

fn is_http_url(raw: &str) -> bool {
    raw.len() <= MAX_URL_LEN
        && !has_control(raw)
        && Url::parse(raw)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
            .unwrap_or(false)
}

pub fn validate_query(query: &str) -> Option<&str> {
    let trimmed = query.trim();
    (!trimmed.is_empty() && trimmed.chars().count() <= MAX_QUERY_CHARS && !has_control(trimmed))
        .then_some(trimmed)
}

/// Why an item was rejected, for debug logging.
pub fn reject_reason(
    item: &ContentItem,
    category: ContentCategory,
    excluded_keywords: &[String],
) -> Option<&'static str> {
    if item.category != category {
        return Some("wrong category");
    }
    if item.id.trim().is_empty() || item.id.chars().count() > MAX_ID_CHARS || has_control(&item.id)
    {
        return Some("invalid id");
    }
    if !is_http_url(&item.url) {
        return Some("invalid url");
    }
    if let Some(source_url) = &item.source_url {
        if !is_http_url(source_url) {
            return Some("invalid source url");
        }
    }
    if let Some(title) = &item.title {
        if title.chars().count() > MAX_TITLE_CHARS || has_control(title) {
            return Some("invalid title");
        }
        let lower = title.to_lowercase();
        if excluded_keywords
            .iter()
            .any(|keyword| lower.contains(&keyword.to_lowercase()))
        {
            return Some("excluded title keyword");
        }
    }
    if item.author.as_deref().is_some_and(has_control) {
        return Some("invalid author");
    }
    if !item.score.is_finite() {
        return Some("non-finite score");
    }
    None
}

/// Keep the highest-scored item per normalised URL, then order by score.
/// Earlier items win ties, so callers pass them in priority order.
pub fn merge_items(items: Vec<ContentItem>) -> Vec<ContentItem> {
    let mut best: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ContentItem> = Vec::with_capacity(items.len());
    for item in items {
        let key = normalize_url(&item.url).unwrap_or_else(|| item.id.to_lowercase());
        match best.get(&key) {
            Some(&slot) if merged[slot].score >= item.score => {}
            Some(&slot) => merged[slot] = item,
            None => {
                best.insert(key, merged.len());
                merged.push(item);
            }
        }
    }
    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged
}

async fn fetch_guarded(
    limiter: &ProviderRateLimiter,
    timeout: Duration,
    provider: &dyn ContentProvider,
    query: &str,
) -> Result<Vec<ContentItem>, ProviderError> {
    if provider.paces_requests() {
        return provider.fetch(query).await;
    }
    guarded_call(limiter, provider.id(), timeout, || provider.fetch(query)).await
}

/// An empty answer is `NotFound`; an answer whose items were all dropped is
/// `Rejected` and says nothing about whether content exists.
fn answered(raw_len: usize, kept_len: usize) -> ProviderOutcome {
    match (raw_len, kept_len) {
        (0, _) => ProviderOutcome::NotFound,
        (_, 0) => ProviderOutcome::Rejected,
        _ => ProviderOutcome::Success,
    }
}

pub struct ContentResolver {
    providers: Vec<Arc<dyn ContentProvider>>,
    limiter: Arc<ProviderRateLimiter>,
    cache: TieredCache,
    ttl: Duration,
    timeout: Duration,
    config: ContentConfig,
}

impl ContentResolver {
    /// `providers` are in priority order, highest first.
    pub fn new(
        providers: Vec<Arc<dyn ContentProvider>>,
        limiter: Arc<ProviderRateLimiter>,
        cache: TieredCache,
        ttl: Duration,
        timeout: Duration,
        config: ContentConfig,
    ) -> Self {
        Self {
            providers,
            limiter,
            cache,
            ttl,
            timeout,
            config,
        }
    }

    pub async fn resolve_content(
        &self,
        query: &str,
        category: ContentCategory,
        policy: ResolutionPolicy,
    ) -> ContentResolution {
        let Some(query) = validate_query(query) else {
            tracing::debug!("rejecting invalid content query");
            return ContentResolution {
                items: Vec::new(),
                fallback_only: true,
                attempts: Vec::new(),
            };
        };

        let key = keys::content(query, category, policy);
        if let Some(cached) = self.cache.get::<ContentResolution>(&key).await {
            return cached;
        }

        let providers: Vec<(usize, Arc<dyn ContentProvider>)> = self
            .providers
            .iter()
            .filter(|provider| provider.category() == category)
            .cloned()
            .enumerate()
            .collect();

        let (items, attempts) = match policy {
            ResolutionPolicy::FirstSuccessWins => self.first_success(query, category, &providers).await,
            ResolutionPolicy::ScoreAndMerge => self.score_and_merge(query, category, &providers).await,
        };

        let verified_empty = !attempts.is_empty()
            && attempts
                .iter()
                .all(|attempt| attempt.outcome == ProviderOutcome::NotFound);
        let resolution = ContentResolution {
            fallback_only: items.is_empty(),
            items,
            attempts,
        };

        if !resolution.items.is_empty() || verified_empty {
            self.cache.put(&key, &resolution, self.ttl).await;
        } else {
            tracing::warn!(
                query,
                category = category.as_str(),
                "every content provider failed, serving fallback"
            );
        }
        resolution
    }

    fn clean(&self, items: Vec<ContentItem>, category: ContentCategory) -> Vec<ContentItem> {
        items
            .into_iter()
            .filter(|item| {
                match reject_reason(item, category, &self.config.excluded_title_keywords) {
                    Some(reason) => {
                        tracing::debug!(id = %item.id, provider = %item.provider_id, "dropping item: {}", reason);
                        false
                    }
                    None => true,
                }
            })
            .collect()
    }

    async fn first_success(
        &self,
        query: &str,
        category: ContentCategory,
        providers: &[(usize, Arc<dyn ContentProvider>)],
    ) -> (Vec<ContentItem>, Vec<ProviderAttempt>) {
        let mut attempts = Vec::with_capacity(providers.len());
        for (priority, provider) in providers {
            let id = provider.id();
            match fetch_guarded(&self.limiter, self.timeout, provider.as_ref(), query).await {
                Ok(items) => {
                    let raw_len = items.len();
                    let mut items = merge_items(self.clean(items, category));
                    if items.is_empty() {
                        attempts.push(attempt(id, *priority, answered(raw_len, 0)));
                        continue;
                    }
                    attempts.push(attempt(id, *priority, ProviderOutcome::Success));
                    items.truncate(self.config.max_items);
                    tracing::info!(provider = id, count = items.len(), "content resolved");
                    return (items, attempts);
                }
                Err(err) => {
                    tracing::warn!(provider = id, "content provider failed: {}", err);
                    attempts.push(attempt(id, *priority, err.outcome()));
                }
            }
        }
        (Vec::new(), attempts)
    }

    async fn score_and_merge(
        &self,
        query: &str,
        category: ContentCategory,
        providers: &[(usize, Arc<dyn ContentProvider>)],
    ) -> (Vec<ContentItem>, Vec<ProviderAttempt>) {
        let mut fetches = JoinSet::new();
        for (priority, provider) in providers {
            let provider = Arc::clone(provider);
            let limiter = Arc::clone(&self.limiter);
            let query = query.to_string();
            let timeout = self.timeout;
            let priority = *priority;
            fetches.spawn(async move {
                let id = provider.id().to_string();
                let result = fetch_guarded(&limiter, timeout, provider.as_ref(), &query).await;
                (priority, id, result)
            });
        }

        let mut answers = Vec::with_capacity(providers.len());
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok(answer) => answers.push(answer),
                Err(join_err) => tracing::warn!(error = %join_err, "content task panicked"),
            }
        }
        answers.sort_by_key(|(priority, _, _)| *priority);

        let mut attempts = Vec::with_capacity(answers.len());
        let mut collected = Vec::new();
        for (priority, id, result) in answers {
            match result {
                Ok(items) => {
                    let raw_len = items.len();
                    let items = self.clean(items, category);
                    attempts.push(attempt(&id, priority, answered(raw_len, items.len())));
                    collected.extend(items);
                }
                Err(err) => {
                    tracing::warn!(provider = %id, "content provider failed: {}", err);
                    attempts.push(attempt(&id, priority, err.outcome()));
                }
            }
        }

        let mut items = merge_items(collected);
        items.truncate(self.config.max_items);
        (items, attempts)
    }
}
