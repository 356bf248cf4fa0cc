//! Sogou video search adapter (HTML-scraped aggregator)
//!
//! No public API; extraction is selector-based over the result markup, with a
//! looser fallback selector set because the page layout shifts between
//! rollouts. Garbled or partial markup simply yields fewer candidates.

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
const SEARCH_URL: &str = "https://v.sogou.com/v";
const BASE_URL: &str = "https://v.sogou.com";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

pub struct SogouSource {
    http_client: HttpClient,
}

impl Default for SogouSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SogouSource {
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
            .query(&[("query", keywords)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "Sogou video returned status {}",
                status
            )));
        }

        let html = response.text().await?;
        Ok(parse_results(&html, limit))
    }
}

fn parse_results(html: &str, limit: usize) -> Vec<Candidate> {
    let document = Html::parse_document(html);

    // Current layout first, then the older list layout
    let selector_sets = [
        (".video-item", "a.video-link", ".video-title", ".video-duration", ".play-num"),
        (".result-list li", "a", ".title", ".duration", ".play-count"),
    ];

    let mut candidates = Vec::new();

    for (item_sel, link_sel, title_sel, duration_sel, play_sel) in selector_sets {
        let (Ok(item), Ok(link), Ok(title), Ok(duration), Ok(play)) = (
            Selector::parse(item_sel),
            Selector::parse(link_sel),
            Selector::parse(title_sel),
            Selector::parse(duration_sel),
            Selector::parse(play_sel),
        ) else {
            continue;
        };

        let mut seen = HashSet::new();

        for element in document.select(&item) {
            if candidates.len() >= limit {
                break;
            }

            let Some(anchor) = element.select(&link).next() else {
                continue;
            };
            let Some(url) =
                anchor.value().attr("href").and_then(|h| normalize_link(BASE_URL, h))
            else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }

            let title_text = element
                .select(&title)
                .next()
                .map(|t| strip_tags(&t.text().collect::<String>()))
                .unwrap_or_else(|| strip_tags(&anchor.text().collect::<String>()));
            if title_text.is_empty() {
                continue;
            }

            let duration_text = element
                .select(&duration)
                .next()
                .map(|d| d.text().collect::<String>().trim().to_string())
                .filter(|d| !d.is_empty());
            let popularity = element
                .select(&play)
                .next()
                .map(|p| parse_popularity_text(&p.text().collect::<String>()))
                .unwrap_or(0);

            candidates.push(Candidate::new(
                title_text,
                "",
                duration_text,
                popularity,
                String::new(),
                url,
                Provider::Sogou,
            ));
        }

        if !candidates.is_empty() {
            break;
        }
    }

    candidates
}

#[async_trait::async_trait]
impl VideoSource for SogouSource {
    fn name(&self) -> &'static str {
        "sogou"
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
