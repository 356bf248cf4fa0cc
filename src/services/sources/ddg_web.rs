//! Generic web-search fallback over the DuckDuckGo HTML endpoint
//!
//! Lowest-priority source: every hit is shaped into a candidate with unknown
//! duration and zero popularity. Result links are redirect wrappers carrying
//! the target in the `uddg` query parameter.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client as HttpClient;
use scraper::{Html, Selector};

use crate::{
    error::{AppError, AppResult},
    models::{Candidate, Provider},
    services::sources::{strip_tags, VideoSource},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

pub struct DdgWebSource {
    http_client: HttpClient,
}

impl Default for DdgWebSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DdgWebSource {
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
            .query(&[("q", keywords), ("kl", "cn-zh")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "DuckDuckGo returned status {}",
                status
            )));
        }

        let html = response.text().await?;
        Ok(parse_results(&html, limit))
    }
}

/// Unwraps DuckDuckGo's `/l/?uddg=<encoded>` redirect links; absolute links
/// pass through, protocol-relative ones are upgraded to https.
fn resolve_result_link(href: &str) -> Option<String> {
    let absolute = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        href.to_string()
    };

    let parsed = url::Url::parse(&absolute).ok()?;
    if parsed.path().starts_with("/l/") {
        let target = parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())?;
        return target.starts_with("http").then_some(target);
    }

    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}

fn parse_results(html: &str, limit: usize) -> Vec<Candidate> {
    let document = Html::parse_document(html);

    let (Ok(result_selector), Ok(title_selector), Ok(snippet_selector)) = (
        Selector::parse(".result"),
        Selector::parse(".result__title a, .result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for result in document.select(&result_selector) {
        if candidates.len() >= limit {
            break;
        }

        let Some(anchor) = result.select(&title_selector).next() else {
            continue;
        };
        let title = strip_tags(&anchor.text().collect::<String>());
        if title.is_empty() {
            continue;
        }

        let Some(url) = anchor.value().attr("href").and_then(resolve_result_link) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let snippet = result
            .select(&snippet_selector)
            .next()
            .map(|s| strip_tags(&s.text().collect::<String>()))
            .unwrap_or_default();

        candidates.push(Candidate::new(
            title,
            &snippet,
            None,
            0,
            String::new(),
            url,
            Provider::DdgWeb,
        ));
    }

    candidates
}

#[async_trait::async_trait]
impl VideoSource for DdgWebSource {
    fn name(&self) -> &'static str {
        "ddg_web"
    }

    async fn search(&self, keywords: &str, limit: usize) -> Vec<Candidate> {
        match self.fetch(keywords, limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(source = self.name(), error = %e, "Web search failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_result_link_unwraps_redirect() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.bilibili.com%2Fvideo%2FBV1xx411c7mD&rut=abc";
        assert_eq!(
            resolve_result_link(href),
            Some("https://www.bilibili.com/video/BV1xx411c7mD".to_string())
        );
    }

    #[test]
    fn test_resolve_result_link_absolute_passthrough() {
        assert_eq!(
            resolve_result_link("https://example.com/page"),
            Some("https://example.com/page".to_string())
        );
    }

    #[test]
    fn test_resolve_result_link_rejects_junk() {
        assert_eq!(resolve_result_link("javascript:void(0)"), None);
        assert_eq!(resolve_result_link("//duckduckgo.com/l/?rut=no-target"), None);
    }

    #[test]
    fn test_parse_results() {
        let html = r#"
            <div class="result">
              <h2 class="result__title">
                <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.bilibili.com%2Fvideo%2FBV1xx411c7mD">
                  Python 入门教程（完整版）
                </a>
              </h2>
              <a class="result__snippet">适合零基础的 Python 课程，共 30 集。</a>
            </div>
            <div class="result">
              <a class="result__a" href="https://example.com/python">Python course</a>
            </div>
            <div class="result">
              <a class="result__a" href="javascript:void(0)">广告位</a>
            </div>
        "#;
        let candidates = parse_results(html, 5);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Python 入门教程（完整版）");
        assert_eq!(
            candidates[0].url,
            "https://www.bilibili.com/video/BV1xx411c7mD"
        );
        assert_eq!(candidates[0].description, "适合零基础的 Python 课程，共 30 集。");
        assert_eq!(candidates[0].duration, "unknown");
        assert_eq!(candidates[0].popularity, 0);
        assert_eq!(candidates[0].provider, Provider::DdgWeb);
    }

    #[test]
    fn test_parse_results_garbled_markup() {
        assert!(parse_results("<div class=\"result\"><p>半截", 5).is_empty());
    }
}
