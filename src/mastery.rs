use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::models::{AdaptedRecord, AnsweredRecord, MasteryEntry, TargetMode, TargetRequest, TopicComplexity};
use crate::signature::record_signature;

const NEUTRAL_TARGET: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct MasteryParams {
    pub correctness_weight: f64,
    pub latency_weight: f64,
    pub error_history_weight: f64,
    /// Latency norm used when a topic has no usable response times.
    pub default_latency_secs: f64,
    /// Weight multiplier per step back in a question's attempt history.
    pub error_decay: f64,
    /// Topic-wide error rate counts for less than errors on the exact question.
    pub topic_error_discount: f64,
    /// How far a fresh seed moves from neutral per unit of topic struggle.
    pub seed_spread: f64,
    pub target_step: f64,
    pub target_window: usize,
    pub high_accuracy: f64,
    pub low_accuracy: f64,
}

impl Default for MasteryParams {
    fn default() -> Self {
        Self {
            correctness_weight: 0.55,
            latency_weight: 0.2,
            error_history_weight: 0.25,
            default_latency_secs: 30.0,
            error_decay: 0.5,
            topic_error_discount: 0.5,
            seed_spread: 0.5,
            target_step: 0.1,
            target_window: 10,
            high_accuracy: 0.8,
            low_accuracy: 0.5,
        }
    }
}

/// Turns raw answer history into complexity signals and the next difficulty target.
///
/// Every method is a pure function of its arguments, so the same history always
/// replays to the same scores.
#[derive(Debug, Clone, Default)]
pub struct MasteryModel {
    params: MasteryParams,
}

impl MasteryModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: MasteryParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MasteryParams {
        &self.params
    }

    /// Score every well-formed record. Output keeps the input order.
    pub fn adapt(&self, history: &[AnsweredRecord], user_id: Option<&str>) -> Vec<AdaptedRecord> {
        let usable: Vec<(usize, &AnsweredRecord)> = history
            .iter()
            .enumerate()
            .filter(|(_, record)| is_usable(record))
            .collect();

        if usable.is_empty() {
            return Vec::new();
        }

        let latency_norms = topic_latency_norms(usable.iter().map(|(_, r)| *r));

        // Attempts are replayed oldest first so error repetition only looks backwards.
        let mut chronological: Vec<(usize, Option<DateTime<Utc>>)> = usable
            .iter()
            .map(|(i, record)| (*i, record.answered_at()))
            .collect();
        chronological.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

        let mut question_errors: HashMap<String, Vec<bool>> = HashMap::new();
        let mut topic_errors: HashMap<&str, Vec<bool>> = HashMap::new();
        let mut scores: HashMap<usize, f64> = HashMap::with_capacity(usable.len());

        for (index, _) in chronological {
            let record = &history[index];
            let sig = record_signature(record);

            let error_history = match question_errors.get(&sig) {
                Some(prior) if !prior.is_empty() => self.decayed_error_rate(prior),
                _ => topic_errors
                    .get(record.topic.as_str())
                    .filter(|prior| !prior.is_empty())
                    .map(|prior| self.decayed_error_rate(prior) * self.params.topic_error_discount)
                    .unwrap_or(0.0),
            };

            let norm = latency_norms
                .get(record.topic.as_str())
                .copied()
                .unwrap_or(self.params.default_latency_secs);
            let latency = latency_penalty(record.time_taken_seconds, norm);
            let correctness = if record.is_correct { 0.0 } else { 1.0 };

            let score = self.params.correctness_weight * correctness
                + self.params.latency_weight * latency
                + self.params.error_history_weight * error_history;
            scores.insert(index, clamp_unit(score));

            question_errors.entry(sig).or_default().push(!record.is_correct);
            topic_errors.entry(record.topic.as_str()).or_default().push(!record.is_correct);
        }

        debug!(
            user_id = ?user_id,
            records = history.len(),
            adapted = scores.len(),
            "Adapted answer history"
        );

        usable
            .into_iter()
            .map(|(index, record)| AdaptedRecord {
                record: record.clone(),
                complexity_score: scores.get(&index).copied().unwrap_or(0.0),
            })
            .collect()
    }

    /// Highest complexity first; ties go to the most recent answer.
    pub fn rank(&self, mut adapted: Vec<AdaptedRecord>) -> Vec<AdaptedRecord> {
        adapted.sort_by(|a, b| {
            b.complexity_score
                .total_cmp(&a.complexity_score)
                .then_with(|| b.record.answered_at().cmp(&a.record.answered_at()))
        });
        adapted
    }

    pub fn per_topic_complexity(&self, adapted: &[AdaptedRecord]) -> Vec<TopicComplexity> {
        let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for item in adapted {
            let entry = totals.entry(item.record.topic.as_str()).or_insert((0.0, 0));
            entry.0 += item.complexity_score;
            entry.1 += 1;
        }

        totals
            .into_iter()
            .map(|(topic, (sum, count))| TopicComplexity {
                topic: topic.to_string(),
                avg: sum / count as f64,
            })
            .collect()
    }

    /// Aggregate ranked records into per-signature need totals.
    pub fn mastery_index(&self, ranked: &[AdaptedRecord]) -> HashMap<String, MasteryEntry> {
        let mut index: HashMap<String, MasteryEntry> = HashMap::new();
        for item in ranked {
            let entry = index.entry(record_signature(&item.record)).or_default();
            entry.total_complexity += item.complexity_score;
            entry.count += 1;
        }
        index
    }

    pub fn most_complex_recent(&self, history: &[AnsweredRecord], limit: usize) -> Vec<AdaptedRecord> {
        let mut ranked = self.rank(self.adapt(history, None));
        ranked.truncate(limit);
        ranked
    }

    /// Fraction correct over the last `target_window` answers on the topic.
    pub fn recent_accuracy(&self, history: &[AnsweredRecord], topic: &str) -> Option<f64> {
        let mut on_topic: Vec<(usize, Option<DateTime<Utc>>, bool)> = history
            .iter()
            .enumerate()
            .filter(|(_, record)| record.topic == topic && is_usable(record))
            .map(|(i, record)| (i, record.answered_at(), record.is_correct))
            .collect();

        if on_topic.is_empty() || self.params.target_window == 0 {
            return None;
        }

        on_topic.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        let recent = &on_topic[on_topic.len().saturating_sub(self.params.target_window)..];
        let correct = recent.iter().filter(|(_, _, is_correct)| *is_correct).count();
        Some(correct as f64 / recent.len() as f64)
    }

    /// Recommended complexity for the next question on `request.topic`.
    pub fn next_target(&self, request: TargetRequest<'_>) -> f64 {
        let last_asked = request
            .last_asked_complexity
            .filter(|value| value.is_finite())
            .map(clamp_unit);

        let base = last_asked.unwrap_or_else(|| self.seed_target(request.history, request.topic));

        let target = match request.mode {
            TargetMode::Steady => base,
            TargetMode::Progressive => match self.recent_accuracy(request.history, request.topic) {
                Some(accuracy) => base + self.params.target_step * self.accuracy_signal(accuracy),
                None => base,
            },
        };

        clamp_unit(target)
    }

    /// Starting point when nothing was asked yet. Struggle on the topic pulls it
    /// below neutral and ease pushes it above, so it never rises as accuracy falls.
    fn seed_target(&self, history: &[AnsweredRecord], topic: &str) -> f64 {
        let adapted = self.adapt(history, None);
        self.per_topic_complexity(&adapted)
            .into_iter()
            .find(|entry| entry.topic == topic)
            .map(|entry| {
                clamp_unit(NEUTRAL_TARGET + self.params.seed_spread.max(0.0) * (NEUTRAL_TARGET - entry.avg))
            })
            .unwrap_or(NEUTRAL_TARGET)
    }

    /// Maps accuracy onto [-1, 1]: full step down at or below `low_accuracy`,
    /// full step up at or above `high_accuracy`, linear in between.
    fn accuracy_signal(&self, accuracy: f64) -> f64 {
        let low = self.params.low_accuracy;
        let high = self.params.high_accuracy;
        if high <= low {
            return if accuracy >= high { 1.0 } else { -1.0 };
        }
        let mid = (high + low) / 2.0;
        let half = (high - low) / 2.0;
        ((accuracy - mid) / half).clamp(-1.0, 1.0)
    }

    fn decayed_error_rate(&self, attempts: &[bool]) -> f64 {
        let mut weight = 1.0;
        let mut weighted_errors = 0.0;
        let mut total_weight = 0.0;
        for was_error in attempts.iter().rev() {
            if *was_error {
                weighted_errors += weight;
            }
            total_weight += weight;
            weight *= self.params.error_decay;
        }
        if total_weight > 0.0 {
            weighted_errors / total_weight
        } else {
            0.0
        }
    }
}

fn is_usable(record: &AnsweredRecord) -> bool {
    !record.question.trim().is_empty() && !record.topic.trim().is_empty()
}

fn topic_latency_norms<'a>(records: impl Iterator<Item = &'a AnsweredRecord>) -> HashMap<&'a str, f64> {
    let mut times: HashMap<&str, Vec<f64>> = HashMap::new();
    for record in records {
        if record.time_taken_seconds.is_finite() && record.time_taken_seconds > 0.0 {
            times.entry(record.topic.as_str()).or_default().push(record.time_taken_seconds);
        }
    }

    times
        .into_iter()
        .map(|(topic, mut values)| {
            values.sort_by(f64::total_cmp);
            let mid = values.len() / 2;
            let median = if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            };
            (topic, median)
        })
        .collect()
}

/// 0 at or below the norm, 1 at three times the norm.
fn latency_penalty(seconds: f64, norm: f64) -> f64 {
    if !seconds.is_finite() || seconds <= 0.0 || norm <= 0.0 {
        return 0.0;
    }
    ((seconds / norm - 1.0) / 2.0).clamp(0.0, 1.0)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(question: &str, is_correct: bool, timestamp: &str, seconds: f64) -> AnsweredRecord {
        AnsweredRecord {
            topic: "fractions".to_string(),
            question: question.to_string(),
            correct_answer: "1/2".to_string(),
            is_correct,
            timestamp: timestamp.to_string(),
            time_taken_seconds: seconds,
            subtopic: None,
        }
    }

    #[test]
    fn test_incorrect_scores_higher_than_correct() {
        let model = MasteryModel::new();
        let history = vec![
            record("a", true, "2024-01-01T10:00:00Z", 20.0),
            record("b", false, "2024-01-01T10:01:00Z", 20.0),
        ];

        let adapted = model.adapt(&history, Some("user-1"));
        assert_eq!(adapted.len(), 2);
        assert!(adapted[1].complexity_score > adapted[0].complexity_score);
    }

    #[test]
    fn test_slow_answers_score_higher() {
        let model = MasteryModel::new();
        let history = vec![
            record("a", true, "2024-01-01T10:00:00Z", 10.0),
            record("b", true, "2024-01-01T10:01:00Z", 10.0),
            record("c", true, "2024-01-01T10:02:00Z", 60.0),
        ];

        let adapted = model.adapt(&history, None);
        assert_eq!(adapted[0].complexity_score, 0.0);
        assert!(adapted[2].complexity_score > adapted[0].complexity_score);
    }

    #[test]
    fn test_repeated_errors_raise_score() {
        let model = MasteryModel::new();
        let history = vec![
            record("a", false, "2024-01-01T10:00:00Z", 20.0),
            record("a", false, "2024-01-02T10:00:00Z", 20.0),
        ];

        let adapted = model.adapt(&history, None);
        assert!(adapted[1].complexity_score > adapted[0].complexity_score);
        assert!(adapted[1].complexity_score <= 1.0);
    }

    #[test]
    fn test_error_history_uses_chronological_order() {
        let model = MasteryModel::new();
        // Stored newest first; the later attempt should still see the earlier error.
        let history = vec![
            record("a", true, "2024-01-02T10:00:00Z", 20.0),
            record("a", false, "2024-01-01T10:00:00Z", 20.0),
        ];

        let adapted = model.adapt(&history, None);
        assert!(adapted[0].complexity_score > 0.0);
    }

    #[test]
    fn test_scores_are_bounded() {
        let model = MasteryModel::new();
        let history: Vec<AnsweredRecord> = (0..20)
            .map(|i| record("a", false, &format!("2024-01-01T10:{:02}:00Z", i), 10_000.0))
            .collect();

        for item in model.adapt(&history, None) {
            assert!((0.0..=1.0).contains(&item.complexity_score));
        }
    }

    #[test]
    fn test_malformed_records_are_ignored() {
        let model = MasteryModel::new();
        let history = vec![
            record("", false, "not a date", f64::NAN),
            record("a", true, "garbage", -3.0),
        ];

        let adapted = model.adapt(&history, None);
        assert_eq!(adapted.len(), 1);
        assert_eq!(adapted[0].complexity_score, 0.0);
    }

    #[test]
    fn test_rank_breaks_ties_by_recency() {
        let model = MasteryModel::new();
        let adapted = vec![
            AdaptedRecord { record: record("old", true, "2024-01-01T10:00:00Z", 20.0), complexity_score: 0.3 },
            AdaptedRecord { record: record("new", true, "2024-02-01T10:00:00Z", 20.0), complexity_score: 0.3 },
            AdaptedRecord { record: record("hard", false, "2023-12-01T10:00:00Z", 20.0), complexity_score: 0.9 },
        ];

        let ranked = model.rank(adapted);
        let order: Vec<&str> = ranked.iter().map(|r| r.record.question.as_str()).collect();
        assert_eq!(order, vec!["hard", "new", "old"]);
    }

    #[test]
    fn test_per_topic_complexity_average() {
        let model = MasteryModel::new();
        let adapted = vec![
            AdaptedRecord { record: record("a", true, "2024-01-01T10:00:00Z", 1.0), complexity_score: 0.2 },
            AdaptedRecord { record: record("b", true, "2024-01-01T10:00:00Z", 1.0), complexity_score: 0.6 },
        ];

        let topics = model.per_topic_complexity(&adapted);
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic, "fractions");
        assert!((topics[0].avg - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_mastery_index_aggregates_by_signature() {
        let model = MasteryModel::new();
        let ranked = vec![
            AdaptedRecord { record: record("a", true, "2024-01-01T10:00:00Z", 1.0), complexity_score: 0.2 },
            AdaptedRecord { record: record("a", false, "2024-01-02T10:00:00Z", 1.0), complexity_score: 0.8 },
        ];

        let index = model.mastery_index(&ranked);
        let entry = index.get("a|||1/2").unwrap();
        assert_eq!(entry.count, 2);
        assert!((entry.total_complexity - 1.0).abs() < 1e-9);
        assert!((entry.need() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_next_target_defaults_to_neutral() {
        let model = MasteryModel::new();
        let target = model.next_target(TargetRequest {
            history: &[],
            topic: "fractions",
            mode: TargetMode::Progressive,
            last_asked_complexity: None,
        });
        assert_eq!(target, 0.5);
    }

    #[test]
    fn test_next_target_moves_with_accuracy() {
        let model = MasteryModel::new();
        let strong: Vec<AnsweredRecord> = (0..10)
            .map(|i| record(&format!("q{}", i), true, &format!("2024-01-01T10:{:02}:00Z", i), 20.0))
            .collect();
        let weak: Vec<AnsweredRecord> = (0..10)
            .map(|i| record(&format!("q{}", i), false, &format!("2024-01-01T10:{:02}:00Z", i), 20.0))
            .collect();

        let up = model.next_target(TargetRequest {
            history: &strong,
            topic: "fractions",
            mode: TargetMode::Progressive,
            last_asked_complexity: Some(0.5),
        });
        let down = model.next_target(TargetRequest {
            history: &weak,
            topic: "fractions",
            mode: TargetMode::Progressive,
            last_asked_complexity: Some(0.5),
        });

        assert!((up - 0.6).abs() < 1e-9);
        assert!((down - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_next_target_is_clamped() {
        let model = MasteryModel::new();
        let strong = vec![record("q", true, "2024-01-01T10:00:00Z", 20.0)];

        let target = model.next_target(TargetRequest {
            history: &strong,
            topic: "fractions",
            mode: TargetMode::Progressive,
            last_asked_complexity: Some(0.97),
        });
        assert_eq!(target, 1.0);

        let target = model.next_target(TargetRequest {
            history: &strong,
            topic: "fractions",
            mode: TargetMode::Progressive,
            last_asked_complexity: Some(f64::NAN),
        });
        assert!((0.0..=1.0).contains(&target));
    }

    #[test]
    fn test_steady_mode_keeps_last_value() {
        let model = MasteryModel::new();
        let strong = vec![record("q", true, "2024-01-01T10:00:00Z", 20.0)];

        let target = model.next_target(TargetRequest {
            history: &strong,
            topic: "fractions",
            mode: TargetMode::Steady,
            last_asked_complexity: Some(0.3),
        });
        assert_eq!(target, 0.3);
    }

    #[test]
    fn test_seed_inverts_topic_average() {
        let model = MasteryModel::new();
        let history = vec![record("q", false, "2024-01-01T10:00:00Z", 20.0)];
        let avg = model.per_topic_complexity(&model.adapt(&history, None))[0].avg;

        let target = model.next_target(TargetRequest {
            history: &history,
            topic: "fractions",
            mode: TargetMode::Steady,
            last_asked_complexity: None,
        });
        assert!((target - (0.5 + 0.5 * (0.5 - avg))).abs() < 1e-9);
        assert!(target < 0.5);
    }

    #[test]
    fn test_unseeded_target_rises_with_accuracy() {
        let model = MasteryModel::new();
        let history = |correct: usize| -> Vec<AnsweredRecord> {
            (0..10)
                .map(|i| record(&format!("q{}", i), i < correct, &format!("2024-01-01T10:{:02}:00Z", i), 20.0))
                .collect()
        };
        let target = |history: &[AnsweredRecord]| {
            model.next_target(TargetRequest {
                history,
                topic: "fractions",
                mode: TargetMode::Progressive,
                last_asked_complexity: None,
            })
        };

        let weak = target(&history(0));
        let strong = target(&history(10));

        assert!(weak < 0.5, "weak learner target {} should sit below neutral", weak);
        assert!(strong > 0.5, "strong learner target {} should sit above neutral", strong);
        // All correct: zero complexity seeds at 0.75, then one full step up.
        assert!((strong - 0.85).abs() < 1e-9);
    }
}
