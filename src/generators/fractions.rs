use async_trait::async_trait;
use rand::Rng;
use rand::rngs::StdRng;
use std::cmp::Ordering;

use super::{QuestionGenerator, usable_subtopics};
use crate::models::Candidate;

const TOPIC: &str = "fractions";
const SUBTOPICS: &[&str] = &["fractions-addition", "fractions-comparison"];
const EQUAL_OPTION: &str = "They are equal";

#[derive(Debug, Clone, Default)]
pub struct FractionGenerator;

impl FractionGenerator {
    pub fn new() -> Self {
        Self
    }

    fn denominator_limit(difficulty: f64) -> u32 {
        4 + (difficulty.clamp(0.0, 1.0) * 8.0).round() as u32
    }

    fn addition(difficulty: f64, rng: &mut StdRng) -> Candidate {
        let limit = Self::denominator_limit(difficulty);
        let d1 = rng.random_range(2..=limit);
        // Unlike denominators only show up on the harder half.
        let d2 = if difficulty >= 0.5 { rng.random_range(2..=limit) } else { d1 };
        let n1 = rng.random_range(1..d1);
        let n2 = rng.random_range(1..d2);

        let numerator = n1 * d2 + n2 * d1;
        let denominator = d1 * d2;
        let mut candidate = Candidate::generated(
            TOPIC,
            format!("What is {}/{} + {}/{}? Give your answer in simplest form.", n1, d1, n2, d2),
            simplify(numerator, denominator),
        );
        candidate.subtopic = Some("fractions-addition".to_string());
        candidate
    }

    fn comparison(difficulty: f64, rng: &mut StdRng) -> Candidate {
        let limit = Self::denominator_limit(difficulty);
        let d1 = rng.random_range(2..=limit);
        let d2 = rng.random_range(2..=limit);
        let n1 = rng.random_range(1..d1);
        let n2 = rng.random_range(1..d2);

        let left = format!("{}/{}", n1, d1);
        let right = format!("{}/{}", n2, d2);
        let answer = match (n1 * d2).cmp(&(n2 * d1)) {
            Ordering::Greater => left.clone(),
            Ordering::Less => right.clone(),
            Ordering::Equal => EQUAL_OPTION.to_string(),
        };

        let mut candidate = Candidate::generated(
            TOPIC,
            format!("Which fraction is larger: {} or {}?", left, right),
            answer,
        );
        candidate.options = Some(vec![left, right, EQUAL_OPTION.to_string()]);
        candidate.subtopic = Some("fractions-comparison".to_string());
        candidate
    }
}

#[async_trait]
impl QuestionGenerator for FractionGenerator {
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

        let mut candidate = match usable[rng.random_range(0..usable.len())] {
            "fractions-addition" => Self::addition(difficulty, rng),
            _ => Self::comparison(difficulty, rng),
        };
        candidate.difficulty = Some(difficulty.clamp(0.0, 1.0));
        Some(candidate)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn simplify(numerator: u32, denominator: u32) -> String {
    let divisor = gcd(numerator, denominator).max(1);
    let (n, d) = (numerator / divisor, denominator / divisor);
    if d == 1 {
        n.to_string()
    } else {
        format!("{}/{}", n, d)
    }
}
