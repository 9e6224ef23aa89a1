use async_trait::async_trait;
use rand::Rng;
use rand::rngs::StdRng;

use super::{QuestionGenerator, usable_subtopics};
use crate::models::Candidate;

const TOPIC: &str = "arithmetic";
const SUBTOPICS: &[&str] = &["addition", "subtraction", "multiplication", "division"];

/// Whole-number arithmetic with operand size growing with difficulty.
#[derive(Debug, Clone, Default)]
pub struct ArithmeticGenerator;

impl ArithmeticGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Largest addend: 10, 100 or 1000.
    fn addend_limit(difficulty: f64) -> u32 {
        10u32.pow(1 + (difficulty.clamp(0.0, 1.0) * 2.0).round() as u32)
    }

    /// Largest factor for products and quotients: 5 through 12.
    fn factor_limit(difficulty: f64) -> u32 {
        5 + (difficulty.clamp(0.0, 1.0) * 7.0).round() as u32
    }

    fn build(subtopic: &str, difficulty: f64, rng: &mut StdRng) -> (String, String) {
        match subtopic {
            "addition" => {
                let limit = Self::addend_limit(difficulty);
                let a = rng.random_range(1..limit);
                let b = rng.random_range(1..limit);
                (format!("What is {} + {}?", a, b), (a + b).to_string())
            }
            "subtraction" => {
                let limit = Self::addend_limit(difficulty);
                let a = rng.random_range(1..limit);
                let b = rng.random_range(1..limit);
                let (big, small) = if a >= b { (a, b) } else { (b, a) };
                (format!("What is {} - {}?", big, small), (big - small).to_string())
            }
            "multiplication" => {
                let limit = Self::factor_limit(difficulty);
                let a = rng.random_range(2..=limit);
                let b = rng.random_range(2..=limit);
                (format!("What is {} × {}?", a, b), (a * b).to_string())
            }
            _ => {
                let limit = Self::factor_limit(difficulty);
                let divisor = rng.random_range(2..=limit);
                let quotient = rng.random_range(1..=limit);
                (
                    format!("What is {} ÷ {}?", divisor * quotient, divisor),
                    quotient.to_string(),
                )
            }
        }
    }
}

#[async_trait]
impl QuestionGenerator for ArithmeticGenerator {
    async fn generate_question(
        &self,
        difficulty: f64,
        allowed_subtopics: Option<&[String]>,
        rng: &mut StdRng,
    ) -> Option<Candidate> {
        let usable = usable_subtopics(SUBTOPICS, allowed_subtopics);
        if usable.is_empty() {
            return None;
        }
        let subtopic = usable[rng.random_range(0..usable.len())];
        let (question, answer) = Self::build(subtopic, difficulty, rng);

        let mut candidate = Candidate::generated(TOPIC, question, answer);
        candidate.subtopic = Some(subtopic.to_string());
        candidate.difficulty = Some(difficulty.clamp(0.0, 1.0));
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[tokio::test]
    async fn test_answers_are_correct() {
        let generator = ArithmeticGenerator::new();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let candidate = generator.generate_question(0.7, None, &mut rng).await.unwrap();
            let body = candidate
                .question
                .trim_start_matches("What is ")
                .trim_end_matches('?')
                .to_string();
            let parts: Vec<&str> = body.split(' ').collect();
            let a: i64 = parts[0].parse().unwrap();
            let b: i64 = parts[2].parse().unwrap();
            let expected = match parts[1] {
                "+" => a + b,
                "-" => a - b,
                "×" => a * b,
                "÷" => a / b,
                other => panic!("unexpected operator {}", other),
            };
            assert_eq!(candidate.correct_answer, expected.to_string());
            assert!(expected >= 0);
            assert!(candidate.options.is_none());
        }
    }

    #[tokio::test]
    async fn test_respects_allowed_subtopics() {
        let generator = ArithmeticGenerator::new();
        let mut rng = StdRng::seed_from_u64(7);
        let allowed = vec!["division".to_string()];

        for _ in 0..20 {
            let candidate = generator.generate_question(0.2, Some(&allowed), &mut rng).await.unwrap();
            assert_eq!(candidate.subtopic.as_deref(), Some("division"));
        }

        let unsupported = vec!["fractions-addition".to_string()];
        assert!(generator.generate_question(0.2, Some(&unsupported), &mut rng).await.is_none());
    }

    #[test]
    fn test_operand_limits_grow_with_difficulty() {
        assert_eq!(ArithmeticGenerator::addend_limit(0.0), 10);
        assert_eq!(ArithmeticGenerator::addend_limit(0.5), 100);
        assert_eq!(ArithmeticGenerator::addend_limit(1.0), 1000);
        assert_eq!(ArithmeticGenerator::factor_limit(0.0), 5);
        assert_eq!(ArithmeticGenerator::factor_limit(1.0), 12);
    }
}
