use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of characters of the latest feedback folded into search keywords
/// and the cache signature. Text beyond the prefix does not affect the key.
pub const FEEDBACK_PREFIX_CHARS: usize = 10;

/// Candidate descriptions are truncated to this many characters before any
/// downstream use (prompt digests, logging).
pub const DESCRIPTION_MAX_CHARS: usize = 150;

/// Self-assessed proficiency level for a study topic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    /// Stable identifier used as the cache key component
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }

    /// Display label folded into search keywords and rationale text
    pub fn display_label(&self) -> &'static str {
        match self {
            Level::Beginner => "入门",
            Level::Intermediate => "进阶",
            Level::Advanced => "精通",
        }
    }

    pub fn parse(s: &str) -> Option<Level> {
        match s {
            "beginner" => Some(Level::Beginner),
            "intermediate" => Some(Level::Intermediate),
            "advanced" => Some(Level::Advanced),
            _ => None,
        }
    }
}

/// A study topic as provided by the surrounding tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    pub level: Level,
    #[serde(default)]
    pub description: String,
}

/// The most recent study session feedback for a topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningLog {
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

/// Origin adapter of a candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Bilibili,
    DdgVideos,
    Sogou,
    Kan360,
    DdgWeb,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Bilibili => "bilibili",
            Provider::DdgVideos => "ddg_videos",
            Provider::Sogou => "sogou",
            Provider::Kan360 => "360kan",
            Provider::DdgWeb => "ddg_web",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized search result, scoped to a single pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub description: String,
    /// Free-form duration text, "unknown" when the source has none
    pub duration: String,
    /// Best-effort view/engagement count, zero when unavailable
    pub popularity: u64,
    pub author: String,
    pub url: String,
    pub provider: Provider,
}

impl Candidate {
    /// Builds a candidate, truncating the description to its fixed maximum.
    ///
    /// Adapters are responsible for only constructing candidates with
    /// non-empty titles and absolute urls; downstream stages rely on that.
    pub fn new(
        title: String,
        description: &str,
        duration: Option<String>,
        popularity: u64,
        author: String,
        url: String,
        provider: Provider,
    ) -> Self {
        Self {
            title,
            description: truncate_chars(description, DESCRIPTION_MAX_CHARS),
            duration: duration.unwrap_or_else(|| "unknown".to_string()),
            popularity,
            author,
            url,
            provider,
        }
    }
}

/// The pipeline's output contract: a complete triple or nothing at all
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub title: String,
    pub url: String,
    pub reason: String,
    #[serde(default)]
    pub duration: Option<String>,
}

/// Deterministic cache/dedup key derived from topic title, level label and a
/// short prefix of the latest feedback.
///
/// The key is deliberately shared across users so that identical queries are
/// searched once; feedback beyond the prefix is ignored as a precision/cost
/// trade-off.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchSignature(String);

impl SearchSignature {
    pub fn derive(topic: &Topic, last_feedback: Option<&str>) -> Self {
        let mut keywords = format!("{} {} 教程", topic.title, topic.level.display_label());
        if let Some(feedback) = last_feedback {
            let snippet = truncate_chars(feedback, FEEDBACK_PREFIX_CHARS);
            if !snippet.is_empty() {
                keywords.push(' ');
                keywords.push_str(&snippet);
            }
        }
        Self(keywords)
    }

    /// The signature doubles as the search keyword string, so the cache key
    /// and the executed search always agree.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SearchSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One persisted cache row; created once per successful miss, never mutated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub id: Uuid,
    pub signature: String,
    pub level: Level,
    pub video_title: String,
    pub video_url: String,
    pub video_duration: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn from_recommendation(
        signature: &SearchSignature,
        level: Level,
        rec: &Recommendation,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            signature: signature.as_str().to_string(),
            level,
            video_title: rec.title.clone(),
            video_url: rec.url.clone(),
            video_duration: rec.duration.clone(),
            reason: rec.reason.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn to_recommendation(&self) -> Recommendation {
        Recommendation {
            title: self.video_title.clone(),
            url: self.video_url.clone(),
            reason: self.reason.clone(),
            duration: self.video_duration.clone(),
        }
    }
}

/// Char-boundary-safe truncation; feedback and descriptions are routinely CJK
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Normalizes a best-effort popularity field that may arrive as an integer,
/// a digit string with separators, or a Chinese count like "12.3万".
///
/// Returns zero on any non-numeric input; the rule-based fallback relies on
/// this being total.
pub fn parse_popularity(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => parse_popularity_text(s),
        _ => 0,
    }
}

pub fn parse_popularity_text(raw: &str) -> u64 {
    let text = raw.trim();
    if text.is_empty() {
        return 0;
    }

    let (body, multiplier) = if let Some(stripped) = text.strip_suffix('亿') {
        (stripped, 100_000_000f64)
    } else if let Some(stripped) = text.strip_suffix('万') {
        (stripped, 10_000f64)
    } else {
        (text, 1f64)
    };

    let cleaned: String = body.chars().filter(|c| *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => (n * multiplier) as u64,
        _ => 0,
    }
}
