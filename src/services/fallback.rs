use crate::{
    models::{truncate_chars, Candidate, Recommendation, Topic, FEEDBACK_PREFIX_CHARS},
    services::oracle::BlindSuggestion,
};

/// Curated static catalog consulted when every source comes back empty.
///
/// Keys are matched case-insensitively by containment against the topic
/// title; iteration order is significant — the first match wins — so this
/// stays an ordered slice, never a map.
const CURATED_CATALOG: &[(&str, &str, &str)] = &[
    (
        "python",
        "Python 全套入门教程（零基础）",
        "https://www.bilibili.com/video/BV1ex411x7Em",
    ),
    (
        "javascript",
        "JavaScript 从入门到精通",
        "https://www.bilibili.com/video/BV1Sy4y1C7ha",
    ),
    (
        "rust",
        "Rust 编程语言入门教程",
        "https://www.bilibili.com/video/BV1hp4y1k7SV",
    ),
    (
        "java",
        "Java 零基础小白自学教程",
        "https://www.bilibili.com/video/BV1Kb411W75N",
    ),
    (
        "英语",
        "英语语法精讲合集",
        "https://www.bilibili.com/video/BV1XY411J7aG",
    ),
    (
        "吉他",
        "吉他入门零基础教学",
        "https://www.bilibili.com/video/BV1KJ411q7NH",
    ),
    (
        "咖啡",
        "咖啡拉花入门教学",
        "https://www.bilibili.com/video/BV1aW411V7x9",
    ),
];

/// Rationale prefix built the way the original tracker phrased it
pub fn context_reason(topic: &Topic, last_feedback: Option<&str>) -> String {
    let mut reason = format!(
        "根据你正在学习的'{}' ({})",
        topic.title,
        topic.level.display_label()
    );
    if let Some(feedback) = last_feedback {
        let snippet = truncate_chars(feedback, FEEDBACK_PREFIX_CHARS);
        if !snippet.is_empty() {
            reason.push_str(&format!("，以及你上次提到的'{}...'", snippet));
        }
    }
    reason.push_str("，为你推荐以下视频：");
    reason
}

/// First curated entry whose key appears in the topic title, if any
pub fn curated_pick(topic: &Topic) -> Option<Recommendation> {
    let title_lower = topic.title.to_lowercase();
    CURATED_CATALOG
        .iter()
        .find(|(key, _, _)| title_lower.contains(key))
        .map(|(_, video_title, url)| Recommendation {
            title: video_title.to_string(),
            url: url.to_string(),
            reason: format!(
                "{}这是一份口碑较好的精选课程。",
                context_reason(topic, None)
            ),
            duration: None,
        })
}

/// Rule-based degradation when candidates exist but the oracle made no
/// selection: the first candidate in aggregation order wins, which is
/// implicitly the highest-priority provider's first hit.
pub fn rule_based_pick(
    topic: &Topic,
    last_feedback: Option<&str>,
    candidates: &[Candidate],
) -> Option<Recommendation> {
    let first = candidates.first()?;
    Some(Recommendation {
        title: first.title.clone(),
        url: first.url.clone(),
        reason: format!(
            "{}该视频在搜索结果中排名靠前、播放量较高。",
            context_reason(topic, last_feedback)
        ),
        duration: (first.duration != "unknown").then(|| first.duration.clone()),
    })
}

/// Search-results link used when no direct video link could be found
pub fn bilibili_search_link(query: &str) -> String {
    format!(
        "https://search.bilibili.com/all?keyword={}",
        urlencoding::encode(query)
    )
}

/// Packages a blind oracle suggestion as a synthetic recommendation whose url
/// points at a constructed search-results page
pub fn package_blind(topic: &Topic, suggestion: &BlindSuggestion) -> Recommendation {
    let advice = if suggestion.advice.is_empty() {
        String::new()
    } else {
        format!("{} ", suggestion.advice)
    };
    Recommendation {
        title: format!("搜索：{}", suggestion.search_query),
        url: bilibili_search_link(&suggestion.search_query),
        reason: format!(
            "暂时没有找到'{}'的直接视频链接。{}可以先从这个搜索入口开始。",
            topic.title, advice
        ),
        duration: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Level, Provider};

    fn topic(title: &str) -> Topic {
        Topic {
            title: title.to_string(),
            level: Level::Beginner,
            description: String::new(),
        }
    }

    #[test]
    fn test_curated_pick_case_insensitive_containment() {
        let rec = curated_pick(&topic("Python 基础")).unwrap();
        assert_eq!(rec.url, "https://www.bilibili.com/video/BV1ex411x7Em");
        assert!(!rec.title.is_empty());
        assert!(rec.url.starts_with("https://"));
    }

    #[test]
    fn test_curated_pick_first_match_wins() {
        // Title matching two keys resolves to the earlier catalog entry.
        let rec = curated_pick(&topic("python 还是 java")).unwrap();
        assert_eq!(rec.url, "https://www.bilibili.com/video/BV1ex411x7Em");
    }

    #[test]
    fn test_curated_pick_no_match() {
        assert!(curated_pick(&topic("冷门的手工主题")).is_none());
    }

    #[test]
    fn test_rule_based_pick_takes_first_candidate() {
        let candidates = vec![
            Candidate::new(
                "第一个".to_string(),
                "",
                Some("20:00".to_string()),
                10,
                String::new(),
                "https://example.com/v/1".to_string(),
                Provider::Bilibili,
            ),
            Candidate::new(
                "第二个".to_string(),
                "",
                None,
                10_000,
                String::new(),
                "https://example.com/v/2".to_string(),
                Provider::Sogou,
            ),
        ];
        let rec = rule_based_pick(&topic("Python"), Some("上次讲到循环"), &candidates).unwrap();
        assert_eq!(rec.title, "第一个");
        assert_eq!(rec.duration, Some("20:00".to_string()));
        assert!(rec.reason.contains("Python"));
        assert!(rec.reason.contains("上次讲到循环"));
    }

    #[test]
    fn test_rule_based_pick_empty_candidates() {
        assert!(rule_based_pick(&topic("Python"), None, &[]).is_none());
    }

    #[test]
    fn test_context_reason_with_feedback_prefix() {
        let reason = context_reason(&topic("Python"), Some("装饰器那部分还是没弄明白"));
        assert_eq!(
            reason,
            "根据你正在学习的'Python' (入门)，以及你上次提到的'装饰器那部分还是没弄'，为你推荐以下视频："
        );
    }

    #[test]
    fn test_package_blind_builds_search_url() {
        let rec = package_blind(
            &topic("冷门主题"),
            &BlindSuggestion {
                advice: "先从基础概念入手".to_string(),
                search_query: "冷门主题 入门".to_string(),
            },
        );
        assert_eq!(
            rec.url,
            format!(
                "https://search.bilibili.com/all?keyword={}",
                urlencoding::encode("冷门主题 入门")
            )
        );
        assert!(rec.reason.contains("先从基础概念入手"));
        assert!(rec.reason.contains("冷门主题"));
        assert_eq!(rec.duration, None);
    }
}
