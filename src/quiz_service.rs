use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::assembler::QuizAssembler;
use crate::bank_store::{EnrollmentService, HistoryStore};
use crate::errors::AssemblyError;
use crate::models::*;

const MOST_COMPLEX_LIMIT: usize = 5;

/// Starts quizzes by pulling learner context from the external stores and
/// handing it to the assembler.
#[derive(Clone)]
pub struct QuizService {
    assembler: QuizAssembler,
    history: Arc<dyn HistoryStore>,
    enrollment: Arc<dyn EnrollmentService>,
    default_bank_probability: f64,
}

impl QuizService {
    pub fn new(
        assembler: QuizAssembler,
        history: Arc<dyn HistoryStore>,
        enrollment: Arc<dyn EnrollmentService>,
        default_bank_probability: f64,
    ) -> Self {
        Self {
            assembler,
            history,
            enrollment,
            default_bank_probability: default_bank_probability.clamp(0.0, 1.0),
        }
    }

    pub fn assembler(&self) -> &QuizAssembler {
        &self.assembler
    }

    pub async fn start_quiz(&self, request: StartQuizRequest) -> Result<AssembledQuiz, AssemblyError> {
        let mut rng = StdRng::from_os_rng();
        self.start_quiz_with_rng(request, &mut rng).await
    }

    pub async fn start_quiz_with_rng(
        &self,
        request: StartQuizRequest,
        rng: &mut StdRng,
    ) -> Result<AssembledQuiz, AssemblyError> {
        let history = match self.history.load_answered_history(&request.user_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(user_id = %request.user_id, error = %e, "Failed to load answer history, continuing with none");
                Vec::new()
            }
        };

        let excluded_ids = match self.history.load_answered_bank_ids(&request.user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(user_id = %request.user_id, error = %e, "Failed to load answered bank ids");
                Vec::new()
            }
        };

        let subtopic_allowlist = match self.enrollment.subtopic_allowlist_for(&request.user_id).await {
            Ok(allowlist) if !allowlist.is_empty() => Some(allowlist),
            Ok(_) => None,
            Err(e) => {
                warn!(user_id = %request.user_id, error = %e, "Failed to load subtopic allowlist");
                None
            }
        };

        let bank_probability = self.bank_probability_for(request.class_id.as_deref()).await;

        let target_difficulty = self.assembler.mastery().next_target(TargetRequest {
            history: &history,
            topic: &request.topic,
            mode: request.mode,
            last_asked_complexity: request.last_asked_complexity,
        });

        debug!(
            user_id = %request.user_id,
            topic = %request.topic,
            grade = request.grade,
            history_len = history.len(),
            excluded = excluded_ids.len(),
            target_difficulty = target_difficulty,
            bank_probability = bank_probability,
            "Starting quiz assembly"
        );

        let assembly = AssemblyRequest {
            topic: request.topic,
            daily_goal: request.daily_goal,
            history,
            target_difficulty,
            grade: request.grade,
            user_id: Some(request.user_id),
            class_id: request.class_id,
            excluded_ids,
            app_id: request.app_id,
            bank_probability,
            subtopic_allowlist,
        };

        self.assembler.assemble(&assembly, rng).await
    }

    pub(crate) async fn bank_probability_for(&self, class_id: Option<&str>) -> f64 {
        let Some(class_id) = class_id else {
            return self.default_bank_probability;
        };

        match self.enrollment.bank_sample_probability_for(class_id).await {
            Ok(Some(probability)) if probability.is_finite() => probability.clamp(0.0, 1.0),
            Ok(_) => self.default_bank_probability,
            Err(e) => {
                warn!(class_id = %class_id, error = %e, "Failed to load bank probability, using default");
                self.default_bank_probability
            }
        }
    }

    pub async fn mastery_report(&self, user_id: &str) -> Result<MasteryReport> {
        let history = self.history.load_answered_history(user_id).await?;
        let mastery = self.assembler.mastery();
        let adapted = mastery.adapt(&history, Some(user_id));

        Ok(MasteryReport {
            user_id: user_id.to_string(),
            per_topic: mastery.per_topic_complexity(&adapted),
            most_complex_recent: mastery.most_complex_recent(&history, MOST_COMPLEX_LIMIT),
        })
    }
}
