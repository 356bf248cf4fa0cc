//! DuckDuckGo video search adapter
//!
//! Two-step flow: fetch the search page to extract the `vqd` request token,
//! then call the `v.js` JSON endpoint with it. The response schema is loose,
//! so fields are pulled tolerantly out of `serde_json::Value`.

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use reqwest::Client as HttpClient;

use crate::{
    error::{AppError, AppResult},
    models::{parse_popularity, Candidate, Provider},
    services::sources::VideoSource,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SEARCH_URL: &str = "https://duckduckgo.com/";
const VIDEOS_URL: &str = "https://duckduckgo.com/v.js";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

pub struct DdgVideosSource {
    http_client: HttpClient,
}

impl Default for DdgVideosSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DdgVideosSource {
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
        let vqd = self.fetch_vqd(keywords).await?;

        let response = self
            .http_client
            .get(VIDEOS_URL)
            .query(&[
                ("l", "cn-zh"),
                ("o", "json"),
                ("q", keywords),
                ("vqd", vqd.as_str()),
                ("p", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "DuckDuckGo videos returned status {}",
                status
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        Ok(parse_video_results(&payload, limit))
    }

    async fn fetch_vqd(&self, keywords: &str) -> AppResult<String> {
        let response = self
            .http_client
            .get(SEARCH_URL)
            .query(&[("q", keywords), ("iax", "videos"), ("ia", "videos")])
            .send()
            .await?;

        let html = response.text().await?;
        extract_vqd(&html).ok_or_else(|| {
            AppError::ExternalApi("DuckDuckGo page carried no vqd token".to_string())
        })
    }
}

/// The token is embedded in inline script, quoted or not
fn extract_vqd(html: &str) -> Option<String> {
    let re = Regex::new(r#"vqd=["']?([0-9-]+)"#).ok()?;
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_video_results(payload: &serde_json::Value, limit: usize) -> Vec<Candidate> {
    let Some(results) = payload.get("results").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for row in results {
        if candidates.len() >= limit {
            break;
        }

        // `content` is the watch-page link and the only stable identifier
        let url = row
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if url.is_empty() || !url.starts_with("http") || !seen.insert(url.clone()) {
            continue;
        }

        let title = row
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if title.is_empty() {
            continue;
        }

        let description = row
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let duration = row
            .get("duration")
            .and_then(|v| v.as_str())
            .filter(|d| !d.is_empty())
            .map(ToString::to_string);
        let popularity = row
            .get("statistics")
            .and_then(|s| s.get("viewCount"))
            .map(parse_popularity)
            .unwrap_or(0);
        let author = row
            .get("uploader")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        candidates.push(Candidate::new(
            title,
            description,
            duration,
            popularity,
            author,
            url,
            Provider::DdgVideos,
        ));
    }

    candidates
}

#[async_trait::async_trait]
impl VideoSource for DdgVideosSource {
    fn name(&self) -> &'static str {
        "ddg_videos"
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
