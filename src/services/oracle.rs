use std::time::Duration;

use reqwest::Client as HttpClient;
use serde_json::json;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{Candidate, Topic},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Candidates beyond this many are dropped from the ranked prompt to bound
/// token cost.
pub const PROMPT_CANDIDATE_LIMIT: usize = 8;

/// Ranked-mode result: which candidate to pick and why
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub index: usize,
    pub reason: String,
}

/// Blind-mode result when no candidates exist at all
#[derive(Debug, Clone, PartialEq)]
pub struct BlindSuggestion {
    pub advice: String,
    pub search_query: String,
}

/// The external ranking/generation service
///
/// Both operations report unavailability (missing credential, bad status,
/// timeout, malformed reply, out-of-range selection) as `None` — callers
/// treat every kind of oracle trouble the same way and fall back.
#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    async fn select_video(
        &self,
        topic: &Topic,
        last_feedback: Option<&str>,
        candidates: &[Candidate],
    ) -> Option<Selection>;

    async fn blind_suggestion(
        &self,
        topic: &Topic,
        last_feedback: Option<&str>,
    ) -> Option<BlindSuggestion>;
}

/// OpenAI-compatible chat-completions client
///
/// Single attempt per call, no retries; a failed attempt is unavailability.
pub struct ChatCompletionsClient {
    http_client: HttpClient,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            http_client: HttpClient::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
            model,
            api_key,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.oracle_base_url.clone(),
            config.oracle_model.clone(),
            config.oracle_api_key.clone(),
        )
    }

    async fn complete(&self, system: &str, user: &str) -> AppResult<String> {
        let Some(api_key) = &self.api_key else {
            return Err(AppError::InvalidInput(
                "No oracle credential configured".to_string(),
            ));
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": 0.2
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Oracle returned status {}: {}",
                status, body
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| AppError::ExternalApi("Oracle reply carried no content".to_string()))
    }
}

#[async_trait::async_trait]
impl Oracle for ChatCompletionsClient {
    async fn select_video(
        &self,
        topic: &Topic,
        last_feedback: Option<&str>,
        candidates: &[Candidate],
    ) -> Option<Selection> {
        if self.api_key.is_none() {
            tracing::debug!("Oracle disabled: no credential configured");
            return None;
        }
        if candidates.is_empty() {
            return None;
        }

        let user = ranked_prompt(topic, last_feedback, candidates);
        match self.complete(RANKED_SYSTEM_PROMPT, &user).await {
            Ok(content) => {
                let selection = parse_selection(&content, candidates.len());
                if selection.is_none() {
                    tracing::warn!(reply = %content, "Oracle reply rejected by validation");
                }
                selection
            }
            Err(e) => {
                tracing::warn!(error = %e, "Oracle selection failed");
                None
            }
        }
    }

    async fn blind_suggestion(
        &self,
        topic: &Topic,
        last_feedback: Option<&str>,
    ) -> Option<BlindSuggestion> {
        if self.api_key.is_none() {
            tracing::debug!("Oracle disabled: no credential configured");
            return None;
        }

        let user = blind_prompt(topic, last_feedback);
        match self.complete(BLIND_SYSTEM_PROMPT, &user).await {
            Ok(content) => {
                let suggestion = parse_blind(&content);
                if suggestion.is_none() {
                    tracing::warn!(reply = %content, "Oracle blind reply rejected by validation");
                }
                suggestion
            }
            Err(e) => {
                tracing::warn!(error = %e, "Oracle blind suggestion failed");
                None
            }
        }
    }
}

const RANKED_SYSTEM_PROMPT: &str = "你是一个学习视频推荐助手。用户会给你一份候选视频清单，\
请结合学习主题、当前水平和上次学习反馈，选出最合适的一个。\
只返回一个 JSON 对象：{\"selected_id\": <候选编号>, \"reason\": \"<一句话推荐理由>\"}，不要输出其他内容。";

const BLIND_SYSTEM_PROMPT: &str = "你是一个学习规划助手。没有找到任何候选视频，\
请给出一句学习建议和一个更容易搜到教学视频的搜索词。\
只返回一个 JSON 对象：{\"advice\": \"<学习建议>\", \"search_query\": \"<搜索词>\"}，不要输出其他内容。";

fn study_context(topic: &Topic, last_feedback: Option<&str>) -> String {
    let mut context = format!(
        "学习主题：{}\n当前水平：{}",
        topic.title,
        topic.level.display_label()
    );
    if !topic.description.trim().is_empty() {
        context.push_str(&format!("\n具体目标：{}", topic.description.trim()));
    }
    if let Some(feedback) = last_feedback {
        context.push_str(&format!("\n上次学习反馈：{}", feedback));
    }
    context
}

/// Builds the ranked prompt from a bounded, simplified candidate digest
fn ranked_prompt(topic: &Topic, last_feedback: Option<&str>, candidates: &[Candidate]) -> String {
    let digest = candidates
        .iter()
        .take(PROMPT_CANDIDATE_LIMIT)
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}. 标题: {} | 简介: {} | 时长: {} | 热度: {} | 来源: {}",
                i, c.title, c.description, c.duration, c.popularity, c.provider
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n候选视频：\n{}",
        study_context(topic, last_feedback),
        digest
    )
}

fn blind_prompt(topic: &Topic, last_feedback: Option<&str>) -> String {
    study_context(topic, last_feedback)
}

/// Strips markdown code-fence wrapping some models insist on adding
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Validates a ranked-mode reply: parseable JSON with an in-range integer
/// index. Anything else is "no selection".
fn parse_selection(content: &str, candidate_count: usize) -> Option<Selection> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(content)).ok()?;
    let selected = value.get("selected_id")?.as_i64()?;
    if selected < 0 || selected as usize >= candidate_count {
        return None;
    }

    let reason = value
        .get("reason")
        .and_then(|r| r.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    Some(Selection {
        index: selected as usize,
        reason,
    })
}

fn parse_blind(content: &str) -> Option<BlindSuggestion> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(content)).ok()?;
    let search_query = value.get("search_query")?.as_str()?.trim().to_string();
    if search_query.is_empty() {
        return None;
    }

    let advice = value
        .get("advice")
        .and_then(|a| a.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    Some(BlindSuggestion {
        advice,
        search_query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Level, Provider};

    fn topic() -> Topic {
        Topic {
            title: "Python".to_string(),
            level: Level::Beginner,
            description: "想写爬虫".to_string(),
        }
    }

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| {
                Candidate::new(
                    format!("候选 {}", i),
                    "简介",
                    Some("10:00".to_string()),
                    100 * i as u64,
                    "UP主".to_string(),
                    format!("https://example.com/v/{}", i),
                    Provider::Bilibili,
                )
            })
            .collect()
    }

    #[test]
    fn test_parse_selection_plain_json() {
        let sel = parse_selection(r#"{"selected_id": 1, "reason": "讲得最系统"}"#, 3).unwrap();
        assert_eq!(sel.index, 1);
        assert_eq!(sel.reason, "讲得最系统");
    }

    #[test]
    fn test_parse_selection_fenced_json_matches_unfenced() {
        let unfenced = r#"{"selected_id": 2, "reason": "时长合适"}"#;
        let fenced = "```json\n{\"selected_id\": 2, \"reason\": \"时长合适\"}\n```";
        assert_eq!(parse_selection(fenced, 3), parse_selection(unfenced, 3));
    }

    #[test]
    fn test_parse_selection_bare_fence() {
        let fenced = "```\n{\"selected_id\": 0, \"reason\": \"ok\"}\n```";
        assert_eq!(parse_selection(fenced, 1).unwrap().index, 0);
    }

    #[test]
    fn test_parse_selection_negative_index_rejected() {
        assert_eq!(parse_selection(r#"{"selected_id": -1, "reason": "x"}"#, 3), None);
    }

    #[test]
    fn test_parse_selection_out_of_range_index_rejected() {
        assert_eq!(parse_selection(r#"{"selected_id": 99, "reason": "x"}"#, 3), None);
    }

    #[test]
    fn test_parse_selection_malformed_json_rejected() {
        assert_eq!(parse_selection("第一条看起来不错", 3), None);
        assert_eq!(parse_selection(r#"{"selected_id": "one"}"#, 3), None);
    }

    #[test]
    fn test_parse_blind() {
        let s = parse_blind(r#"{"advice": "先打好语法基础", "search_query": "Python 入门 完整教程"}"#)
            .unwrap();
        assert_eq!(s.advice, "先打好语法基础");
        assert_eq!(s.search_query, "Python 入门 完整教程");
    }

    #[test]
    fn test_parse_blind_requires_search_query() {
        assert_eq!(parse_blind(r#"{"advice": "加油"}"#), None);
        assert_eq!(parse_blind(r#"{"advice": "加油", "search_query": "  "}"#), None);
    }

    #[test]
    fn test_ranked_prompt_bounds_candidate_digest() {
        let prompt = ranked_prompt(&topic(), Some("循环没学明白"), &candidates(12));
        assert!(prompt.contains("0. 标题: 候选 0"));
        assert!(prompt.contains("7. 标题: 候选 7"));
        assert!(!prompt.contains("8. 标题: 候选 8"));
        assert!(prompt.contains("循环没学明白"));
        assert!(!prompt.contains("example.com"), "urls must stay out of the prompt");
    }

    #[tokio::test]
    async fn test_oracle_unavailable_without_credential() {
        let client = ChatCompletionsClient::new(
            "https://api.openai.com/v1".to_string(),
            "gpt-4o-mini".to_string(),
            None,
        );
        // No network call is made; both modes are simply unavailable.
        assert!(client
            .select_video(&topic(), None, &candidates(3))
            .await
            .is_none());
        assert!(client.blind_suggestion(&topic(), None).await.is_none());
    }

    #[tokio::test]
    async fn test_select_video_empty_candidates_is_no_selection() {
        let client = ChatCompletionsClient::new(
            "https://api.openai.com/v1".to_string(),
            "gpt-4o-mini".to_string(),
            Some("sk-test".to_string()),
        );
        assert!(client.select_video(&topic(), None, &[]).await.is_none());
    }
}
