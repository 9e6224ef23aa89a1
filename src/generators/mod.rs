pub mod arithmetic;
pub mod fractions;
pub mod llm;

use async_trait::async_trait;
use rand::rngs::StdRng;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::models::Candidate;

pub use arithmetic::ArithmeticGenerator;
pub use fractions::FractionGenerator;
pub use llm::LlmQuestionGenerator;

/// Synthesizes one question for a topic at a requested difficulty.
///
/// Returning `None` means no valid question could be produced, typically
/// because none of the allowed subtopics are supported.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate_question(
        &self,
        difficulty: f64,
        allowed_subtopics: Option<&[String]>,
        rng: &mut StdRng,
    ) -> Option<Candidate>;
}

/// Normalized registry key for a topic name: lowercase, runs of anything
/// that is not a letter or digit collapsed to `_`.
pub fn topic_key(topic: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let pattern = NON_WORD.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static pattern"));
    pattern
        .replace_all(&topic.trim().to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Generators keyed by (grade, topic key), populated once at startup.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<(u8, String), Arc<dyn QuestionGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arithmetic and fraction generators for grades 1 through 8.
    pub fn with_builtin_generators() -> Self {
        let mut registry = Self::new();
        let arithmetic: Arc<dyn QuestionGenerator> = Arc::new(ArithmeticGenerator::new());
        let fractions: Arc<dyn QuestionGenerator> = Arc::new(FractionGenerator::new());

        for grade in 1..=8 {
            registry.register_shared(grade, "arithmetic", arithmetic.clone());
            registry.register_shared(grade, "fractions", fractions.clone());
        }
        registry
    }

    pub fn register<G>(&mut self, grade: u8, topic: &str, generator: G)
    where
        G: QuestionGenerator + 'static,
    {
        self.register_shared(grade, topic, Arc::new(generator));
    }

    pub fn register_shared(&mut self, grade: u8, topic: &str, generator: Arc<dyn QuestionGenerator>) {
        self.generators.insert((grade, topic_key(topic)), generator);
    }

    pub fn get(&self, grade: u8, topic: &str) -> Option<Arc<dyn QuestionGenerator>> {
        self.generators.get(&(grade, topic_key(topic))).cloned()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

/// Supported subtopics that are also allowed; all supported when unrestricted.
pub(crate) fn usable_subtopics<'a>(supported: &[&'a str], allowed: Option<&[String]>) -> Vec<&'a str> {
    match allowed {
        None => supported.to_vec(),
        Some(allowed) => supported
            .iter()
            .copied()
            .filter(|subtopic| allowed.iter().any(|a| a == subtopic))
            .collect(),
    }
}
