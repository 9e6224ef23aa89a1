use rand::Rng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

use crate::errors::AssemblyError;
use crate::generators::GeneratorRegistry;
use crate::mastery::MasteryModel;
use crate::models::{AssembledQuiz, AssemblyRequest, AssemblyWarning, Candidate, MasteryEntry, ShortfallWarning};
use crate::signature::candidate_signature;
use crate::source_fetcher::{FetchRequest, SourceFetcher};
use crate::subtopic_filter;
use crate::log_assembly;

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblerSettings {
    /// Acceptance rate for generated questions the learner has never seen.
    pub unseen_accept_probability: f64,
    /// Acceptance rate for fully mastered questions.
    pub accept_floor: f64,
    pub attempts_per_question: usize,
    pub restricted_attempts_per_question: usize,
    pub max_consecutive_filtered: usize,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            unseen_accept_probability: 0.7,
            accept_floor: 0.1,
            attempts_per_question: 10,
            restricted_attempts_per_question: 30,
            max_consecutive_filtered: 50,
        }
    }
}

/// Builds a quiz from bank questions and topic generators.
#[derive(Clone)]
pub struct QuizAssembler {
    fetcher: SourceFetcher,
    generators: GeneratorRegistry,
    mastery: MasteryModel,
    settings: AssemblerSettings,
}

#[derive(Debug, Default)]
struct LoopState {
    accepted: Vec<Candidate>,
    accepted_signatures: HashSet<String>,
    attempts: usize,
    subtopic_filtered: usize,
    consecutive_filtered: usize,
    early_exit: bool,
}

impl QuizAssembler {
    pub fn new(fetcher: SourceFetcher, generators: GeneratorRegistry, mastery: MasteryModel) -> Self {
        Self {
            fetcher,
            generators,
            mastery,
            settings: AssemblerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AssemblerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn mastery(&self) -> &MasteryModel {
        &self.mastery
    }

    pub fn fetcher(&self) -> &SourceFetcher {
        &self.fetcher
    }

    /// Probability of keeping a generated candidate given its mastery entry.
    pub fn acceptance_probability(&self, entry: Option<&MasteryEntry>) -> f64 {
        match entry {
            None => self.settings.unseen_accept_probability,
            Some(entry) => self.settings.accept_floor + (1.0 - self.settings.accept_floor) * entry.need(),
        }
    }

    pub fn accept_generated(&self, entry: Option<&MasteryEntry>, rng: &mut StdRng) -> bool {
        rng.random::<f64>() <= self.acceptance_probability(entry)
    }

    /// Assemble up to `max(1, daily_goal)` unique questions.
    ///
    /// A short quiz is returned with a shortfall warning. The only error is an
    /// escalated fetch failure: no bank questions at all and at least one
    /// source failed.
    pub async fn assemble(&self, request: &AssemblyRequest, rng: &mut StdRng) -> Result<AssembledQuiz, AssemblyError> {
        let started = Instant::now();
        let quiz_id = Uuid::new_v4();
        let num_questions = request.daily_goal.max(1) as usize;
        let topic_allowlist = subtopic_filter::allowlist_for(&request.topic, request.subtopic_allowlist.as_ref());
        // Any configured restriction widens the budget, even one scoped to another topic.
        let has_restrictions = request
            .subtopic_allowlist
            .as_ref()
            .is_some_and(|allowlist| !allowlist.is_empty());
        let max_attempts = num_questions
            * if has_restrictions {
                self.settings.restricted_attempts_per_question
            } else {
                self.settings.attempts_per_question
            };

        log_assembly!(start, quiz_id = quiz_id, topic = request.topic, requested = num_questions, max_attempts = max_attempts);

        let ranked = self
            .mastery
            .rank(self.mastery.adapt(&request.history, request.user_id.as_deref()));
        let mastery_index = self.mastery.mastery_index(&ranked);

        let merged = self
            .fetcher
            .fetch(&FetchRequest {
                topic: &request.topic,
                grade: request.grade,
                user_id: request.user_id.as_deref(),
                class_id: request.class_id.as_deref(),
                excluded_ids: &request.excluded_ids,
                app_id: request.app_id.as_deref(),
                subtopic_allowlist: request.subtopic_allowlist.as_ref(),
            })
            .await?;

        let generator = self.generators.get(request.grade, &request.topic);
        let pool = merged.questions;
        let mut cursor = 0;
        let mut state = LoopState::default();

        while state.accepted.len() < num_questions && state.attempts < max_attempts {
            if state.consecutive_filtered >= self.settings.max_consecutive_filtered {
                state.early_exit = true;
                log_assembly!(early_exit, quiz_id = quiz_id, consecutive = state.consecutive_filtered);
                break;
            }

            let bank_available = cursor < pool.len();
            if !bank_available && generator.is_none() {
                break;
            }
            state.attempts += 1;

            // Without a generator the bank is the only source, so skip the draw.
            let take_bank = bank_available
                && (generator.is_none() || rng.random::<f64>() < request.bank_probability);

            let candidate = if take_bank {
                cursor += 1;
                Some(pool[cursor - 1].clone())
            } else {
                match &generator {
                    Some(generator) => {
                        generator
                            .generate_question(request.target_difficulty, topic_allowlist, rng)
                            .await
                    }
                    None => None,
                }
            };

            let Some(candidate) = candidate.filter(Candidate::is_well_formed) else {
                continue;
            };

            if !subtopic_filter::allowed(&candidate, &request.topic, request.subtopic_allowlist.as_ref()) {
                state.subtopic_filtered += 1;
                state.consecutive_filtered += 1;
                continue;
            }
            state.consecutive_filtered = 0;

            let sig = candidate_signature(&candidate);
            if state.accepted_signatures.contains(&sig) {
                continue;
            }

            // Bank questions are curated, so only generated ones are sampled.
            if !candidate.source.is_bank() && !self.accept_generated(mastery_index.get(&sig), rng) {
                continue;
            }

            state.accepted_signatures.insert(sig);
            state.accepted.push(candidate);
        }

        let warnings = self.shortfall_warnings(&state, num_questions, max_attempts, has_restrictions, generator.is_some());
        let achieved = state.accepted.len();

        if warnings.is_empty() {
            log_assembly!(complete, quiz_id = quiz_id, achieved = achieved, attempts = state.attempts, duration_ms = started.elapsed().as_millis() as u64);
        } else {
            log_assembly!(shortfall, quiz_id = quiz_id, requested = num_questions, achieved = achieved, filtered = state.subtopic_filtered);
        }

        Ok(AssembledQuiz {
            quiz_id,
            topic: request.topic.clone(),
            target_difficulty: request.target_difficulty,
            questions: state.accepted,
            warnings,
            source_errors: merged.errors,
        })
    }

    fn shortfall_warnings(
        &self,
        state: &LoopState,
        requested: usize,
        max_attempts: usize,
        has_restrictions: bool,
        generator_available: bool,
    ) -> Vec<AssemblyWarning> {
        let achieved = state.accepted.len();
        if achieved >= requested {
            return Vec::new();
        }

        vec![AssemblyWarning::Shortfall(ShortfallWarning {
            requested,
            achieved,
            attempts_used: state.attempts,
            max_attempts,
            attempt_cap_hit: state.attempts >= max_attempts,
            early_exit: state.early_exit,
            subtopic_filtered: state.subtopic_filtered,
            zero_results_under_restriction: achieved == 0 && has_restrictions,
            generator_available,
        })]
    }
}
