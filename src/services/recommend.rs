use std::sync::Arc;

use crate::{
    db::RecommendationStore,
    models::{CacheEntry, LearningLog, Recommendation, SearchSignature, Topic},
    services::{aggregator::CandidateAggregator, fallback, oracle::Oracle},
};

/// The recommendation pipeline
///
/// Control flow per invocation: cache lookup → (hit: return) → source
/// aggregation → oracle selection → fallback chain → non-fatal cache store →
/// result. No stage failure is fatal; the only empty outcome is when no
/// source, no curated entry, and no blind suggestion produced anything.
pub struct Recommender {
    store: Arc<dyn RecommendationStore>,
    aggregator: CandidateAggregator,
    oracle: Arc<dyn Oracle>,
}

impl Recommender {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        aggregator: CandidateAggregator,
        oracle: Arc<dyn Oracle>,
    ) -> Self {
        Self {
            store,
            aggregator,
            oracle,
        }
    }

    /// Produces the single best video recommendation for the topic, or `None`
    /// when every strategy came up empty.
    pub async fn recommend(
        &self,
        topic: &Topic,
        last_log: Option<&LearningLog>,
    ) -> Option<Recommendation> {
        let feedback = last_log
            .map(|log| log.feedback.as_str())
            .filter(|f| !f.trim().is_empty());
        let signature = SearchSignature::derive(topic, feedback);

        // Read-through cache; a lookup error is just a miss.
        match self.store.latest(signature.as_str(), topic.level).await {
            Ok(Some(entry)) => {
                tracing::info!(signature = %signature, "Cache hit");
                return Some(entry.to_recommendation());
            }
            Ok(None) => {
                tracing::debug!(signature = %signature, "Cache miss");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup failed, treating as miss");
            }
        }

        let candidates = self.aggregator.collect(signature.as_str()).await;
        tracing::info!(
            signature = %signature,
            candidates = candidates.len(),
            "Candidate aggregation completed"
        );

        let recommendation = if candidates.is_empty() {
            self.recommend_without_candidates(topic, feedback).await
        } else {
            match self.oracle.select_video(topic, feedback, &candidates).await {
                Some(selection) => match candidates.get(selection.index) {
                    Some(chosen) => {
                        tracing::info!(
                            strategy = "oracle",
                            index = selection.index,
                            provider = %chosen.provider,
                            "Oracle selected a candidate"
                        );
                        let reason = if selection.reason.is_empty() {
                            format!(
                                "{}该视频由智能排序选出。",
                                fallback::context_reason(topic, feedback)
                            )
                        } else {
                            format!(
                                "{}{}",
                                fallback::context_reason(topic, feedback),
                                selection.reason
                            )
                        };
                        Some(Recommendation {
                            title: chosen.title.clone(),
                            url: chosen.url.clone(),
                            reason,
                            duration: (chosen.duration != "unknown")
                                .then(|| chosen.duration.clone()),
                        })
                    }
                    None => {
                        tracing::warn!(index = selection.index, "Oracle index no longer valid");
                        fallback::rule_based_pick(topic, feedback, &candidates)
                    }
                },
                None => {
                    tracing::info!(strategy = "rule", "No oracle selection, using first candidate");
                    fallback::rule_based_pick(topic, feedback, &candidates)
                }
            }
        };

        if let Some(rec) = &recommendation {
            let entry = CacheEntry::from_recommendation(&signature, topic.level, rec);
            // Cache-store failure is logged and swallowed; the computed
            // recommendation is still returned.
            if let Err(e) = self.store.append(&entry).await {
                tracing::warn!(error = %e, "Failed to store recommendation in cache");
            }
        } else {
            tracing::warn!(signature = %signature, "No recommendation available");
        }

        recommendation
    }

    async fn recommend_without_candidates(
        &self,
        topic: &Topic,
        feedback: Option<&str>,
    ) -> Option<Recommendation> {
        if let Some(rec) = fallback::curated_pick(topic) {
            tracing::info!(strategy = "curated", "Using curated catalog entry");
            return Some(rec);
        }

        match self.oracle.blind_suggestion(topic, feedback).await {
            Some(suggestion) => {
                tracing::info!(
                    strategy = "blind",
                    query = %suggestion.search_query,
                    "Using blind oracle suggestion"
                );
                Some(fallback::package_blind(topic, &suggestion))
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use mockall::predicate::eq;
    use uuid::Uuid;

    use crate::{
        db::MockRecommendationStore,
        error::AppError,
        models::{Candidate, Level, Provider},
        services::{
            oracle::{BlindSuggestion, Selection},
            sources::{MockVideoSource, VideoSource},
        },
    };

    fn topic(title: &str) -> Topic {
        Topic {
            title: title.to_string(),
            level: Level::Beginner,
            description: String::new(),
        }
    }

    fn candidate(n: usize) -> Candidate {
        Candidate::new(
            format!("候选 {}", n),
            "简介",
            Some("15:00".to_string()),
            n as u64,
            "UP主".to_string(),
            format!("https://example.com/v/{}", n),
            Provider::Bilibili,
        )
    }

    /// Deterministic oracle double tracking how often each mode is invoked
    #[derive(Default)]
    struct StubOracle {
        selection: Option<Selection>,
        blind: Option<BlindSuggestion>,
        select_calls: AtomicUsize,
        blind_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Oracle for StubOracle {
        async fn select_video(
            &self,
            _topic: &Topic,
            _last_feedback: Option<&str>,
            _candidates: &[Candidate],
        ) -> Option<Selection> {
            self.select_calls.fetch_add(1, Ordering::SeqCst);
            self.selection.clone()
        }

        async fn blind_suggestion(
            &self,
            _topic: &Topic,
            _last_feedback: Option<&str>,
        ) -> Option<BlindSuggestion> {
            self.blind_calls.fetch_add(1, Ordering::SeqCst);
            self.blind.clone()
        }
    }

    fn source_with(candidates: Vec<Candidate>, expected_calls: usize) -> Arc<dyn VideoSource> {
        let mut mock = MockVideoSource::new();
        mock.expect_name().return_const("stub");
        mock.expect_search()
            .times(expected_calls)
            .returning(move |_, _| candidates.clone());
        Arc::new(mock)
    }

    fn store_with_miss_and_append(expected_appends: usize) -> Arc<MockRecommendationStore> {
        let mut store = MockRecommendationStore::new();
        store.expect_latest().returning(|_, _| Ok(None));
        store
            .expect_append()
            .times(expected_appends)
            .returning(|_| Ok(()));
        Arc::new(store)
    }

    fn recommender(
        store: Arc<MockRecommendationStore>,
        sources: Vec<Arc<dyn VideoSource>>,
        oracle: Arc<StubOracle>,
    ) -> Recommender {
        Recommender::new(store, CandidateAggregator::new(sources, 3), oracle)
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits_sources_and_oracle() {
        let entry = CacheEntry {
            id: Uuid::new_v4(),
            signature: "Python 入门 教程".to_string(),
            level: Level::Beginner,
            video_title: "缓存命中的视频".to_string(),
            video_url: "https://www.bilibili.com/video/BVcached".to_string(),
            video_duration: None,
            reason: "缓存理由".to_string(),
            created_at: Utc::now(),
        };

        let mut store = MockRecommendationStore::new();
        let returned = entry.clone();
        store
            .expect_latest()
            .with(eq("Python 入门 教程"), eq(Level::Beginner))
            .times(1)
            .returning(move |_, _| Ok(Some(returned.clone())));
        store.expect_append().times(0);

        let oracle = Arc::new(StubOracle::default());
        let service = recommender(
            Arc::new(store),
            vec![source_with(vec![candidate(0)], 0)],
            oracle.clone(),
        );

        let rec = service.recommend(&topic("Python"), None).await.unwrap();
        assert_eq!(rec, entry.to_recommendation());
        assert_eq!(oracle.select_calls.load(Ordering::SeqCst), 0);
        assert_eq!(oracle.blind_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oracle_selection_used_and_stored() {
        let oracle = Arc::new(StubOracle {
            selection: Some(Selection {
                index: 1,
                reason: "更系统".to_string(),
            }),
            ..Default::default()
        });
        let service = recommender(
            store_with_miss_and_append(1),
            vec![source_with(vec![candidate(0), candidate(1), candidate(2)], 1)],
            oracle,
        );

        let rec = service.recommend(&topic("Python"), None).await.unwrap();
        assert_eq!(rec.title, "候选 1");
        assert_eq!(rec.url, "https://example.com/v/1");
        assert!(rec.reason.contains("更系统"));
        assert!(rec.reason.contains("Python"));
    }

    #[tokio::test]
    async fn test_no_oracle_selection_falls_back_to_first_candidate() {
        let service = recommender(
            store_with_miss_and_append(1),
            vec![source_with(vec![candidate(0), candidate(1)], 1)],
            Arc::new(StubOracle::default()),
        );

        let rec = service.recommend(&topic("Python"), None).await.unwrap();
        assert_eq!(rec.title, "候选 0");
    }

    #[tokio::test]
    async fn test_zero_candidates_curated_entry_wins_without_blind_call() {
        let oracle = Arc::new(StubOracle {
            blind: Some(BlindSuggestion {
                advice: "不该被用到".to_string(),
                search_query: "不该被用到".to_string(),
            }),
            ..Default::default()
        });
        let service = recommender(
            store_with_miss_and_append(1),
            vec![source_with(vec![], 1)],
            oracle.clone(),
        );

        let rec = service.recommend(&topic("Python 基础"), None).await.unwrap();
        assert_eq!(rec.url, "https://www.bilibili.com/video/BV1ex411x7Em");
        assert_eq!(oracle.blind_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_candidates_blind_suggestion_packaged() {
        let oracle = Arc::new(StubOracle {
            blind: Some(BlindSuggestion {
                advice: "从基础概念入手".to_string(),
                search_query: "篆刻 入门 教学".to_string(),
            }),
            ..Default::default()
        });
        let service = recommender(
            store_with_miss_and_append(1),
            vec![source_with(vec![], 1)],
            oracle,
        );

        let rec = service.recommend(&topic("篆刻"), None).await.unwrap();
        assert!(rec.url.starts_with("https://search.bilibili.com/all?keyword="));
        assert!(rec.reason.contains("从基础概念入手"));
    }

    #[tokio::test]
    async fn test_total_failure_yields_absence_and_no_store() {
        let service = recommender(
            store_with_miss_and_append(0),
            vec![source_with(vec![], 1)],
            Arc::new(StubOracle::default()),
        );

        assert!(service.recommend(&topic("篆刻"), None).await.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_lose_recommendation() {
        let mut store = MockRecommendationStore::new();
        store.expect_latest().returning(|_, _| Ok(None));
        store
            .expect_append()
            .times(1)
            .returning(|_| Err(AppError::Internal("disk full".to_string())));

        let service = recommender(
            Arc::new(store),
            vec![source_with(vec![candidate(0)], 1)],
            Arc::new(StubOracle::default()),
        );

        let rec = service.recommend(&topic("Python"), None).await;
        assert!(rec.is_some());
    }

    #[tokio::test]
    async fn test_cache_lookup_error_treated_as_miss() {
        let mut store = MockRecommendationStore::new();
        store
            .expect_latest()
            .returning(|_, _| Err(AppError::Internal("cache offline".to_string())));
        store.expect_append().returning(|_| Ok(()));

        let service = recommender(
            Arc::new(store),
            vec![source_with(vec![candidate(0)], 1)],
            Arc::new(StubOracle::default()),
        );

        assert!(service.recommend(&topic("Python"), None).await.is_some());
    }

    #[tokio::test]
    async fn test_blank_feedback_keeps_signature_of_no_feedback() {
        let mut store = MockRecommendationStore::new();
        store
            .expect_latest()
            .with(eq("Python 入门 教程"), eq(Level::Beginner))
            .times(1)
            .returning(|_, _| Ok(None));
        store.expect_append().returning(|_| Ok(()));

        let service = recommender(
            Arc::new(store),
            vec![source_with(vec![candidate(0)], 1)],
            Arc::new(StubOracle::default()),
        );

        let log = LearningLog {
            feedback: "   ".to_string(),
            created_at: Utc::now(),
        };
        assert!(service.recommend(&topic("Python"), Some(&log)).await.is_some());
    }
}
