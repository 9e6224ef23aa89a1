use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Subtopic allow-list keyed by topic, as configured on an enrollment.
pub type SubtopicAllowlist = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweredRecord {
    pub topic: String,
    pub question: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub timestamp: String, // ISO-8601, kept raw since stored history can be malformed
    pub time_taken_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
}

impl AnsweredRecord {
    pub fn answered_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptedRecord {
    #[serde(flatten)]
    pub record: AnsweredRecord,
    pub complexity_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryEntry {
    pub total_complexity: f64,
    pub count: u32,
}

impl MasteryEntry {
    /// Average complexity for the signature, capped at 1.
    pub fn need(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.total_complexity / self.count as f64).min(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicComplexity {
    pub topic: String,
    pub avg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionSource {
    #[serde(rename = "generated")]
    Generated,
    #[serde(rename = "questionBank")]
    QuestionBank,
    #[serde(rename = "sharedQuestionBank")]
    SharedQuestionBank,
}

impl QuestionSource {
    pub fn is_bank(&self) -> bool {
        !matches!(self, QuestionSource::Generated)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub question: String,
    #[serde(default)]
    pub options: Option<Vec<String>>, // None for numeric fill-in-the-blank
    pub correct_answer: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    pub source: QuestionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<f64>,
}

impl Candidate {
    pub fn generated(topic: &str, question: String, correct_answer: String) -> Self {
        Self {
            question,
            options: None,
            correct_answer,
            topic: topic.to_string(),
            concept: None,
            subtopic: None,
            question_id: None,
            source: QuestionSource::Generated,
            difficulty: None,
        }
    }

    /// A candidate with no prompt or no answer cannot be asked or graded.
    pub fn is_well_formed(&self) -> bool {
        if self.question.trim().is_empty() || self.correct_answer.trim().is_empty() {
            return false;
        }
        match &self.options {
            Some(options) => !options.is_empty(),
            None => true,
        }
    }
}

/// The three remote bank collections, in merge priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceName {
    #[serde(rename = "classQuestions")]
    ClassQuestions,
    #[serde(rename = "personalQuestions")]
    PersonalQuestions,
    #[serde(rename = "sharedQuestions")]
    SharedQuestions,
}

impl SourceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::ClassQuestions => "classQuestions",
            SourceName::PersonalQuestions => "personalQuestions",
            SourceName::SharedQuestions => "sharedQuestions",
        }
    }

    pub fn source_tag(&self) -> QuestionSource {
        match self {
            SourceName::ClassQuestions | SourceName::PersonalQuestions => QuestionSource::QuestionBank,
            SourceName::SharedQuestions => QuestionSource::SharedQuestionBank,
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    #[default]
    Progressive,
    Steady,
}

#[derive(Debug, Clone, Copy)]
pub struct TargetRequest<'a> {
    pub history: &'a [AnsweredRecord],
    pub topic: &'a str,
    pub mode: TargetMode,
    pub last_asked_complexity: Option<f64>,
}

/// Everything the assembler needs for one quiz.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyRequest {
    pub topic: String,
    pub daily_goal: u32,
    #[serde(default)]
    pub history: Vec<AnsweredRecord>,
    pub target_difficulty: f64,
    pub grade: u8,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub excluded_ids: Vec<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    pub bank_probability: f64,
    #[serde(default)]
    pub subtopic_allowlist: Option<SubtopicAllowlist>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortfallWarning {
    pub requested: usize,
    pub achieved: usize,
    pub attempts_used: usize,
    pub max_attempts: usize,
    pub attempt_cap_hit: bool,
    pub early_exit: bool,
    pub subtopic_filtered: usize,
    pub zero_results_under_restriction: bool,
    pub generator_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AssemblyWarning {
    Shortfall(ShortfallWarning),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceErrorInfo {
    pub kind: crate::bank_store::SourceErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledQuiz {
    pub quiz_id: Uuid,
    pub topic: String,
    pub target_difficulty: f64,
    pub questions: Vec<Candidate>,
    pub warnings: Vec<AssemblyWarning>,
    pub source_errors: HashMap<SourceName, SourceErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartQuizRequest {
    pub user_id: String,
    pub topic: String,
    pub grade: u8,
    pub daily_goal: u32,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub mode: TargetMode,
    #[serde(default)]
    pub last_asked_complexity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryReport {
    pub user_id: String,
    pub per_topic: Vec<TopicComplexity>,
    pub most_complex_recent: Vec<AdaptedRecord>,
}
