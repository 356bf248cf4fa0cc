use crate::models::Candidate;

/// Video/content source abstraction
///
/// One implementation per external provider. Each adapter owns its own HTTP
/// client with a short per-request timeout, its own schema normalization, and
/// its own failure handling: `search` never fails past the adapter boundary —
/// network, timeout, and parse errors are logged and degrade to an empty
/// result so one broken provider cannot stall or poison the pipeline.
pub mod bilibili;
pub mod ddg_videos;
pub mod ddg_web;
pub mod kan360;
pub mod sogou;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VideoSource: Send + Sync {
    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;

    /// Searches the provider for up to `limit` normalized candidates.
    ///
    /// Returns an empty Vec on any provider failure.
    async fn search(&self, keywords: &str, limit: usize) -> Vec<Candidate>;
}

/// Removes markup tags from scraped or highlighted text fields
/// (e.g. bilibili wraps matched keywords in `<em class="keyword">`).
pub(crate) fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_entities(out.trim())
}

/// Decodes the handful of HTML entities these providers actually emit
pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Reconstructs a link scraped from provider markup into an absolute https
/// URL. Protocol-relative and host-relative hrefs are resolved against the
/// provider's base; anything that does not resolve to http(s) is rejected.
pub(crate) fn normalize_link(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let absolute = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else {
        href.to_string()
    };

    let parsed = url::Url::parse(&absolute).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}
