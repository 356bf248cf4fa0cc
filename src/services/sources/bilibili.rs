//! Bilibili video search adapter
//!
//! Tries the structured search API first; when that call fails (the endpoint
//! intermittently rejects keyless clients), falls back to scraping the search
//! results page. Both attempts share the adapter's timeout budget
//! independently and both feed the same normalization path.

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{parse_popularity, Candidate, Provider},
    services::sources::{normalize_link, strip_tags, VideoSource},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const API_URL: &str = "https://api.bilibili.com/x/web-interface/search/type";
const SEARCH_PAGE_URL: &str = "https://search.bilibili.com/all";
const BASE_URL: &str = "https://www.bilibili.com";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

/// Raw API row; every field defaulted because the endpoint omits fields freely
#[derive(Debug, Clone, Deserialize)]
struct BiliVideoRow {
    #[serde(default)]
    bvid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    duration: String,
    /// Arrives as an integer or a display string like "12.3万"
    #[serde(default)]
    play: serde_json::Value,
    #[serde(default)]
    author: String,
    #[serde(default)]
    arcurl: String,
}

#[derive(Debug, Deserialize)]
struct BiliSearchData {
    #[serde(default)]
    result: Vec<BiliVideoRow>,
}

#[derive(Debug, Deserialize)]
struct BiliSearchResponse {
    #[serde(default)]
    code: i64,
    data: Option<BiliSearchData>,
}

pub struct BilibiliSource {
    http_client: HttpClient,
}

impl Default for BilibiliSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BilibiliSource {
    pub fn new() -> Self {
        Self {
            http_client: HttpClient::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn fetch_api(&self, keywords: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        let response = self
            .http_client
            .get(API_URL)
            .query(&[
                ("search_type", "video"),
                ("keyword", keywords),
                ("page", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "Bilibili API returned status {}",
                status
            )));
        }

        let body: BiliSearchResponse = response.json().await?;
        if body.code != 0 {
            return Err(AppError::ExternalApi(format!(
                "Bilibili API returned code {}",
                body.code
            )));
        }

        let rows = body.data.map(|d| d.result).unwrap_or_default();
        Ok(convert_rows(rows, limit))
    }

    async fn fetch_scrape(&self, keywords: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        let response = self
            .http_client
            .get(SEARCH_PAGE_URL)
            .query(&[("keyword", keywords)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "Bilibili search page returned status {}",
                status
            )));
        }

        let html = response.text().await?;
        Ok(scrape_results(&html, limit))
    }
}

fn convert_rows(rows: Vec<BiliVideoRow>, limit: usize) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for row in rows {
        if candidates.len() >= limit {
            break;
        }
        // No stable id means no usable candidate
        if row.bvid.is_empty() || !seen.insert(row.bvid.clone()) {
            continue;
        }

        let title = strip_tags(&row.title);
        if title.is_empty() {
            continue;
        }

        let url = normalize_link(BASE_URL, &row.arcurl)
            .unwrap_or_else(|| format!("{}/video/{}", BASE_URL, row.bvid));

        candidates.push(Candidate::new(
            title,
            &strip_tags(&row.description),
            (!row.duration.is_empty()).then(|| row.duration.clone()),
            parse_popularity(&row.play),
            row.author,
            url,
            Provider::Bilibili,
        ));
    }

    candidates
}

/// Pattern-based extraction over the search page markup; tolerates partial or
/// garbled markup by yielding fewer candidates.
fn scrape_results(html: &str, limit: usize) -> Vec<Candidate> {
    let bvid_re = match Regex::new(r"/video/(BV[0-9A-Za-z]{10})") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let document = scraper::Html::parse_document(html);
    let link_selector = match scraper::Selector::parse(r#"a[href*="/video/BV"]"#) {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for element in document.select(&link_selector) {
        if candidates.len() >= limit {
            break;
        }

        let href = element.value().attr("href").unwrap_or("");
        let Some(bvid) = bvid_re
            .captures(href)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };
        if !seen.insert(bvid.clone()) {
            continue;
        }

        // Card markup carries the full title in the attribute; the anchor
        // text is often truncated with an ellipsis.
        let title = element
            .value()
            .attr("title")
            .map(strip_tags)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| strip_tags(&element.text().collect::<String>()));
        if title.is_empty() {
            continue;
        }

        let Some(url) = normalize_link(BASE_URL, href) else {
            continue;
        };

        candidates.push(Candidate::new(
            title,
            "",
            None,
            0,
            String::new(),
            url,
            Provider::Bilibili,
        ));
    }

    candidates
}

#[async_trait::async_trait]
impl VideoSource for BilibiliSource {
    fn name(&self) -> &'static str {
        "bilibili"
    }

    async fn search(&self, keywords: &str, limit: usize) -> Vec<Candidate> {
        match self.fetch_api(keywords, limit).await {
            Ok(candidates) if !candidates.is_empty() => return candidates,
            Ok(_) => {
                tracing::debug!(source = self.name(), "API returned no rows, trying page scrape");
            }
            Err(e) => {
                tracing::warn!(source = self.name(), error = %e, "API search failed, trying page scrape");
            }
        }

        match self.fetch_scrape(keywords, limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(source = self.name(), error = %e, "Page scrape failed");
                Vec::new()
            }
        }
    }
}
