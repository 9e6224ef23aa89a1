use async_trait::async_trait;
use rand::rngs::StdRng;
use serde::Deserialize;
use tracing::{debug, warn};

use super::QuestionGenerator;
use crate::llm_providers::{JsonResponseParser, LLMProvider};
use crate::models::Candidate;

const SYSTEM_MESSAGE: &str =
    "You write math practice questions for school students. Always respond with a single valid JSON object.";

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    question: String,
    #[serde(default)]
    options: Option<Vec<String>>,
    correct_answer: String,
    #[serde(default)]
    subtopic: Option<String>,
}

/// Generator backed by a chat completion model.
///
/// Provider and parse failures yield `None`; the assembler treats that like any
/// other malformed candidate.
#[derive(Debug, Clone)]
pub struct LlmQuestionGenerator {
    provider: LLMProvider,
    parser: JsonResponseParser,
    topic: String,
    grade: u8,
}

impl LlmQuestionGenerator {
    pub fn new(provider: LLMProvider, topic: &str, grade: u8) -> Self {
        Self {
            provider,
            parser: JsonResponseParser,
            topic: topic.to_string(),
            grade,
        }
    }

    pub fn build_prompt(&self, difficulty: f64, allowed_subtopics: Option<&[String]>) -> String {
        let subtopic_line = match allowed_subtopics {
            Some(subtopics) if !subtopics.is_empty() => format!(
                "The question MUST belong to one of these subtopics: {}. Put the chosen subtopic in \"subtopic\".",
                subtopics.join(", ")
            ),
            _ => "Choose any subtopic and put it in \"subtopic\".".to_string(),
        };

        format!(
            r#"Write one {topic} practice question for a grade {grade} student.
Target difficulty: {difficulty:.2} on a scale from 0 (very easy) to 1 (very hard).
{subtopic_line}

Respond with JSON in exactly this format:
{{
    "question": "Question text",
    "options": ["Option 1", "Option 2", "Option 3", "Option 4"] or null for a numeric answer,
    "correct_answer": "The correct answer, matching one option exactly when options are given",
    "subtopic": "subtopic name"
}}"#,
            topic = self.topic,
            grade = self.grade,
            difficulty = difficulty.clamp(0.0, 1.0),
            subtopic_line = subtopic_line,
        )
    }

    fn into_candidate(&self, generated: GeneratedQuestion, difficulty: f64) -> Candidate {
        let mut candidate = Candidate::generated(&self.topic, generated.question, generated.correct_answer);
        candidate.options = generated.options.filter(|options| !options.is_empty());
        candidate.subtopic = generated.subtopic;
        candidate.difficulty = Some(difficulty.clamp(0.0, 1.0));
        candidate
    }
}

#[async_trait]
impl QuestionGenerator for LlmQuestionGenerator {
    async fn generate_question(
        &self,
        difficulty: f64,
        allowed_subtopics: Option<&[String]>,
        _rng: &mut StdRng,
    ) -> Option<Candidate> {
        let prompt = self.build_prompt(difficulty, allowed_subtopics);

        let response = match self.provider.make_request(Some(SYSTEM_MESSAGE), &prompt, 0.8).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    provider = self.provider.provider_name(),
                    topic = %self.topic,
                    error = %e,
                    "LLM question generation failed"
                );
                return None;
            }
        };

        match self.parser.parse_json_response::<GeneratedQuestion>(&response) {
            Ok(generated) => Some(self.into_candidate(generated, difficulty)),
            Err(e) => {
                debug!(topic = %self.topic, error = %e, response = %response, "Discarding unparseable LLM question");
                None
            }
        }
    }
}
