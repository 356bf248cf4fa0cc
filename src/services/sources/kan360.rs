//! 360kan search adapter (HTML-scraped aggregator)
//!
//! Result cards carry the full title in the anchor's `title` attribute;
//! extraction tolerates missing blocks and yields fewer candidates instead of
//! failing.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client as HttpClient;
use scraper::{Html, Selector};

use crate::{
    error::{AppError, AppResult},
    models::{parse_popularity_text, Candidate, Provider},
    services::sources::{normalize_link, strip_tags, VideoSource},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_URL: &str = "https://www.360kan.com/s";
const BASE_URL: &str = "https://www.360kan.com";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

pub struct Kan360Source {
    http_client: HttpClient,
}

impl Default for Kan360Source {
    fn default() -> Self {
        Self::new()
    }
}

impl Kan360Source {
    pub fn new() -> Self {
        Self {
            http_client: HttpClient::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn fetch(&self, keywords: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        let response = self
            .http_client
            .get(SEARCH_URL)
            .query(&[("q", keywords), ("from", "video")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "360kan returned status {}",
                status
            )));
        }

        let html = response.text().await?;
        Ok(parse_results(&html, limit))
    }
}

fn parse_results(html: &str, limit: usize) -> Vec<Candidate> {
    let document = Html::parse_document(html);

    let (Ok(item_selector), Ok(link_selector), Ok(desc_selector), Ok(hot_selector)) = (
        Selector::parse(".s-b-list .item, .video-list .item"),
        Selector::parse("a[title]"),
        Selector::parse(".desc, .item-desc"),
        Selector::parse(".hot, .play-times"),
    ) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for element in document.select(&item_selector) {
        if candidates.len() >= limit {
            break;
        }

        let Some(anchor) = element.select(&link_selector).next() else {
            continue;
        };
        let title = anchor
            .value()
            .attr("title")
            .map(strip_tags)
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let Some(url) = anchor.value().attr("href").and_then(|h| normalize_link(BASE_URL, h))
        else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let description = element
            .select(&desc_selector)
            .next()
            .map(|d| strip_tags(&d.text().collect::<String>()))
            .unwrap_or_default();
        let popularity = element
            .select(&hot_selector)
            .next()
            .map(|h| parse_popularity_text(h.text().collect::<String>().trim()))
            .unwrap_or(0);

        candidates.push(Candidate::new(
            title,
            &description,
            None,
            popularity,
            String::new(),
            url,
            Provider::Kan360,
        ));
    }

    candidates
}

#[async_trait::async_trait]
impl VideoSource for Kan360Source {
    fn name(&self) -> &'static str {
        "360kan"
    }

    async fn search(&self, keywords: &str, limit: usize) -> Vec<Candidate> {
        match self.fetch(keywords, limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(source = self.name(), error = %e, "Video search failed");
                Vec::new()
            }
        }
    }
}
