use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;

use super::{classify_status, classify_transport, guarded_call, ProviderError};
use crate::content::ContentProvider;
use crate::models::{ContentCategory, ContentItem};
use crate::rate_limit::ProviderRateLimiter;

pub const PROVIDER_ID: &str = "reddit";

const SEARCH_LIMIT: &str = "25";

pub const DEFAULT_SUBREDDITS: [&str; 6] = [
    "itookapicture",
    "travelphotography",
    "earthporn",
    "cityporn",
    "villageporn",
    "architectureporn",
];

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    over_18: bool,
}

fn is_image_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    [".jpg", ".jpeg", ".png", ".gif", ".webp"]
        .iter()
        .any(|ext| lower.ends_with(ext))
        || lower.contains("i.redd.it")
        || lower.contains("i.imgur.com")
}

fn items_from(listing: Listing) -> Vec<ContentItem> {
    listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| !post.over_18 && is_image_url(&post.url))
        .map(|post| ContentItem {
            id: format!("reddit:{}", post.id),
            url: post.url,
            title: post.title,
            author: post.author,
            source_url: post
                .permalink
                .map(|permalink| format!("https://www.reddit.com{permalink}")),
            provider_id: PROVIDER_ID.to_string(),
            category: ContentCategory::Images,
            score: post.score.max(0) as f64,
        })
        .collect()
}

pub fn parse_listing(body: &str) -> Result<Vec<ContentItem>, ProviderError> {
    let listing: Listing = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    Ok(items_from(listing))
}

/// Image posts from Reddit's public search JSON over photography subreddits.
///
/// One search per subreddit, each under its own rate token and timeout.
pub struct Reddit {
    client: reqwest::Client,
    limiter: Arc<ProviderRateLimiter>,
    request_timeout: Duration,
    base_url: String,
    subreddits: Vec<String>,
}

impl Reddit {
    pub fn new(
        client: reqwest::Client,
        limiter: Arc<ProviderRateLimiter>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            limiter,
            request_timeout,
            base_url: "https://www.reddit.com".into(),
            subreddits: DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search(&self, subreddit: &str, query: &str) -> Result<Vec<ContentItem>, ProviderError> {
        let url = format!("{}/r/{subreddit}/search.json", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[
                ("q", query),
                ("restrict_sr", "1"),
                ("sort", "top"),
                ("limit", SEARCH_LIMIT),
            ])
            .send()
            .await
            .map_err(classify_transport)?;
        if !response.status().is_success() {
            return Err(classify_status(response.status()));
        }
        let body = response.text().await.map_err(classify_transport)?;
        parse_listing(&body)
    }
}

#[async_trait]
impl ContentProvider for Reddit {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn paces_requests(&self) -> bool {
        true
    }

    /// Searches each subreddit in turn. A 429 stops the loop and keeps what
    /// was already collected; other failures only skip that subreddit.
    async fn fetch(&self, query: &str) -> Result<Vec<ContentItem>, ProviderError> {
        let mut items = Vec::new();
        let mut last_error = None;
        let mut answered = 0;
        for subreddit in &self.subreddits {
            let searched = guarded_call(&self.limiter, PROVIDER_ID, self.request_timeout, || {
                self.search(subreddit, query)
            })
            .await;
            match searched {
                Ok(found) => {
                    answered += 1;
                    items.extend(found);
                }
                Err(ProviderError::RateLimited) => {
                    tracing::warn!(subreddit, answered, "reddit rate limited, stopping search");
                    last_error = Some(ProviderError::RateLimited);
                    break;
                }
                Err(err) => {
                    tracing::debug!(subreddit, "reddit search failed: {}", err);
                    last_error = Some(err);
                }
            }
        }
        // an empty result is only reported as such when every search answered
        match last_error {
            Some(err) if items.is_empty() => Err(err),
            _ => Ok(items),
        }
    }
}
