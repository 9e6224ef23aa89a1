use futures_util::future::join3;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::bank_store::{BankError, BankStore};
use crate::errors::FetchError;
use crate::models::{Candidate, SourceErrorInfo, SourceName, SubtopicAllowlist};
use crate::question_cache::{ClassCacheKey, ClassQuestionCache};
use crate::retry::RetryPolicy;
use crate::subtopic_filter;
use crate::{log_performance, log_source_fetch};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcePolicies {
    pub class: RetryPolicy,
    pub personal: RetryPolicy,
    pub shared: RetryPolicy,
}

impl Default for SourcePolicies {
    fn default() -> Self {
        Self {
            class: RetryPolicy::class_source(),
            personal: RetryPolicy::secondary_source(),
            shared: RetryPolicy::secondary_source(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchRequest<'a> {
    pub topic: &'a str,
    pub grade: u8,
    pub user_id: Option<&'a str>,
    pub class_id: Option<&'a str>,
    pub excluded_ids: &'a [String],
    pub app_id: Option<&'a str>,
    pub subtopic_allowlist: Option<&'a SubtopicAllowlist>,
}

/// Raw outcome of one bank collection.
#[derive(Debug, Clone, Default)]
pub struct SourceResult {
    pub questions: Vec<Candidate>,
    pub error: Option<SourceErrorInfo>,
}

impl SourceResult {
    fn failed(err: &BankError) -> Self {
        Self {
            questions: Vec::new(),
            error: Some(SourceErrorInfo {
                kind: err.kind,
                message: err.message.clone(),
            }),
        }
    }
}

/// Bank candidates merged across sources, plus whatever went wrong on the way.
#[derive(Debug, Clone, Default)]
pub struct MergedResult {
    pub questions: Vec<Candidate>,
    pub errors: HashMap<SourceName, SourceErrorInfo>,
}

#[derive(Clone)]
pub struct SourceFetcher {
    class_store: Arc<dyn BankStore>,
    personal_store: Arc<dyn BankStore>,
    shared_store: Arc<dyn BankStore>,
    cache: ClassQuestionCache,
    policies: SourcePolicies,
}

impl SourceFetcher {
    pub fn new(
        class_store: Arc<dyn BankStore>,
        personal_store: Arc<dyn BankStore>,
        shared_store: Arc<dyn BankStore>,
        cache: ClassQuestionCache,
    ) -> Self {
        Self {
            class_store,
            personal_store,
            shared_store,
            cache,
            policies: SourcePolicies::default(),
        }
    }

    pub fn with_policies(mut self, policies: SourcePolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn cache(&self) -> &ClassQuestionCache {
        &self.cache
    }

    /// Query all applicable sources concurrently and merge the results.
    pub async fn fetch(&self, request: &FetchRequest<'_>) -> Result<MergedResult, FetchError> {
        let started = Instant::now();

        let (class, personal, shared) = join3(
            self.fetch_class(request),
            self.fetch_personal(request),
            self.fetch_shared(request),
        )
        .await;

        let merged = merge(
            [
                (SourceName::ClassQuestions, class),
                (SourceName::PersonalQuestions, personal),
                (SourceName::SharedQuestions, shared),
            ],
            request,
        );

        log_performance!("fetch_bank_questions", duration_ms = started.elapsed().as_millis() as u64, count = merged.questions.len());

        if merged.questions.is_empty() && !merged.errors.is_empty() {
            return Err(FetchError::escalate(merged.errors));
        }

        Ok(merged)
    }

    async fn fetch_class(&self, request: &FetchRequest<'_>) -> Option<SourceResult> {
        let class_id = request.class_id?;
        let key = ClassCacheKey::new(class_id, request.topic, request.grade, request.app_id);

        if let Some(cached) = self.cache.get(&key).await {
            log_source_fetch!(cache_hit, class_id = class_id, topic = request.topic, count = cached.len());
            return Some(SourceResult {
                questions: cached,
                error: None,
            });
        }
        log_source_fetch!(cache_miss, class_id = class_id, topic = request.topic);

        let result = self
            .query_source(
                SourceName::ClassQuestions,
                self.class_store.as_ref(),
                &self.policies.class,
                Some(class_id),
                request,
            )
            .await;

        // Cached before filtering so restriction changes never require a refetch.
        if result.error.is_none() {
            self.cache.insert(key, result.questions.clone()).await;
        }

        Some(result)
    }

    async fn fetch_personal(&self, request: &FetchRequest<'_>) -> Option<SourceResult> {
        let user_id = request.user_id?;
        Some(
            self.query_source(
                SourceName::PersonalQuestions,
                self.personal_store.as_ref(),
                &self.policies.personal,
                Some(user_id),
                request,
            )
            .await,
        )
    }

    async fn fetch_shared(&self, request: &FetchRequest<'_>) -> Option<SourceResult> {
        Some(
            self.query_source(
                SourceName::SharedQuestions,
                self.shared_store.as_ref(),
                &self.policies.shared,
                None,
                request,
            )
            .await,
        )
    }

    async fn query_source(
        &self,
        source: SourceName,
        store: &dyn BankStore,
        policy: &RetryPolicy,
        owner: Option<&str>,
        request: &FetchRequest<'_>,
    ) -> SourceResult {
        log_source_fetch!(start, source = source, topic = request.topic, grade = request.grade);
        let started = Instant::now();

        let outcome = policy
            .run(source.as_str(), || store.query(owner, request.topic, request.grade))
            .await;

        match outcome {
            Ok(mut questions) => {
                let tag = source.source_tag();
                for question in &mut questions {
                    question.source = tag;
                }
                log_source_fetch!(success, source = source, count = questions.len(), duration_ms = started.elapsed().as_millis() as u64);
                SourceResult {
                    questions,
                    error: None,
                }
            }
            Err(err) => {
                log_source_fetch!(failure, source = source, kind = err.kind, error = err);
                SourceResult::failed(&err)
            }
        }
    }
}

/// Concatenate in priority order, first `question_id` wins, then apply the
/// exclusion set and the subtopic allow-list.
fn merge(results: [(SourceName, Option<SourceResult>); 3], request: &FetchRequest<'_>) -> MergedResult {
    let excluded: HashSet<&str> = request.excluded_ids.iter().map(String::as_str).collect();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut merged = MergedResult::default();

    for (source, result) in results {
        let Some(result) = result else {
            continue;
        };

        if let Some(error) = result.error {
            merged.errors.insert(source, error);
        }

        for question in result.questions {
            if let Some(id) = question.question_id.as_deref() {
                if excluded.contains(id) || !seen_ids.insert(id.to_string()) {
                    continue;
                }
            }
            if !subtopic_filter::allowed(&question, request.topic, request.subtopic_allowlist) {
                continue;
            }
            merged.questions.push(question);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionSource;

    fn bank(id: &str, subtopic: &str) -> Candidate {
        let mut candidate = Candidate::generated("fractions", format!("Question {}", id), "1".to_string());
        candidate.question_id = Some(id.to_string());
        candidate.subtopic = Some(subtopic.to_string());
        candidate.source = QuestionSource::QuestionBank;
        candidate
    }

    fn ok(questions: Vec<Candidate>) -> Option<SourceResult> {
        Some(SourceResult { questions, error: None })
    }

    #[test]
    fn test_merge_dedupes_by_id_in_priority_order() {
        let mut shared_copy = bank("q1", "fractions-addition");
        shared_copy.question = "Shared wording".to_string();
        let request = FetchRequest {
            topic: "fractions",
            ..Default::default()
        };

        let merged = merge(
            [
                (SourceName::ClassQuestions, ok(vec![bank("q1", "fractions-addition")])),
                (SourceName::PersonalQuestions, None),
                (SourceName::SharedQuestions, ok(vec![shared_copy, bank("q2", "fractions-addition")])),
            ],
            &request,
        );

        assert_eq!(merged.questions.len(), 2);
        assert_eq!(merged.questions[0].question, "Question q1");
        assert!(merged.errors.is_empty());
    }

    #[test]
    fn test_merge_applies_exclusions_and_allowlist() {
        let excluded = vec!["q1".to_string()];
        let mut allowlist = SubtopicAllowlist::new();
        allowlist.insert("fractions".to_string(), vec!["fractions-addition".to_string()]);
        let request = FetchRequest {
            topic: "fractions",
            excluded_ids: &excluded,
            subtopic_allowlist: Some(&allowlist),
            ..Default::default()
        };

        let merged = merge(
            [
                (
                    SourceName::ClassQuestions,
                    ok(vec![
                        bank("q1", "fractions-addition"),
                        bank("q2", "fractions-comparison"),
                        bank("q3", "fractions-addition"),
                    ]),
                ),
                (SourceName::PersonalQuestions, None),
                (SourceName::SharedQuestions, ok(vec![])),
            ],
            &request,
        );

        let ids: Vec<_> = merged.questions.iter().filter_map(|q| q.question_id.as_deref()).collect();
        assert_eq!(ids, vec!["q3"]);
    }
}
