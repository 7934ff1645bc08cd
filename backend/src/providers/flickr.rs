use async_trait::async_trait;
use serde::Deserialize;

use super::{send_json, ProviderError};
use crate::content::ContentProvider;
use crate::models::{ContentCategory, ContentItem};

pub const PROVIDER_ID: &str = "flickr";

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    title: Option<String>,
    link: String,
    media: Media,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(default)]
    m: String,
}

/// `nobody@flickr.com ("someone")` → `someone`
fn author_name(raw: &str) -> Option<String> {
    let start = raw.find('(')?;
    let end = raw.rfind(')')?;
    let name = raw.get(start + 1..end)?.trim().trim_matches('"').trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// The feed links the medium size; `_b` is the large rendition.
fn large_image(url: &str) -> String {
    url.replace("_m.jpg", "_b.jpg")
}

/// Feed order is the only ranking signal, so earlier items score higher.
fn items_from(feed: Feed) -> Vec<ContentItem> {
    let total = feed.items.len();
    feed.items
        .into_iter()
        .enumerate()
        .filter(|(_, item)| !item.media.m.is_empty())
        .map(|(position, item)| ContentItem {
            id: item.link.clone(),
            url: large_image(&item.media.m),
            title: item.title.filter(|t| !t.trim().is_empty()),
            author: item.author.as_deref().and_then(author_name),
            source_url: Some(item.link),
            provider_id: PROVIDER_ID.to_string(),
            category: ContentCategory::Images,
            score: (total - position) as f64,
        })
        .collect()
}

pub fn parse_feed(body: &str) -> Result<Vec<ContentItem>, ProviderError> {
    let feed: Feed = serde_json::from_str(body)
        .map_err(|err| ProviderError::Unavailable(format!("malformed response: {err}")))?;
    Ok(items_from(feed))
}

/// Flickr public photo feed, searched by tags.
pub struct Flickr {
    client: reqwest::Client,
    feed_url: String,
}

impl Flickr {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            feed_url: "https://www.flickr.com/services/feeds/photos_public.gne".into(),
        }
    }
}

#[async_trait]
impl ContentProvider for Flickr {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch(&self, query: &str) -> Result<Vec<ContentItem>, ProviderError> {
        let tags = query.split_whitespace().collect::<Vec<_>>().join(",");
        let request = self.client.get(&self.feed_url).query(&[
            ("tags", tags.as_str()),
            ("tagmode", "all"),
            ("format", "json"),
            ("nojsoncallback", "1"),
        ]);
        let feed: Feed = send_json(request).await?;
        Ok(items_from(feed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feed_with_large_images_and_authors() {
        let body = r#"{"title": "Recent Uploads tagged banff", "items": [
            {"title": "Lake Louise", "link": "https://www.flickr.com/photos/x/1/",
             "media": {"m": "https://live.staticflickr.com/1/1_abc_m.jpg"},
             "author": "nobody@flickr.com (\"alpine_shots\")"},
            {"title": "", "link": "https://www.flickr.com/photos/y/2/",
             "media": {"m": "https://live.staticflickr.com/2/2_def_m.jpg"},
             "author": "nobody@flickr.com"}
        ]}"#;
        let items = parse_feed(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://live.staticflickr.com/1/1_abc_b.jpg");
        assert_eq!(items[0].author.as_deref(), Some("alpine_shots"));
        assert_eq!(items[0].score, 2.0);
        assert_eq!(items[1].title, None);
        assert_eq!(items[1].author, None);
        assert_eq!(items[1].score, 1.0);
    }
}
