use crate::models::{AnsweredRecord, Candidate};

const SEPARATOR: &str = "|||";

/// Dedup and mastery-lookup identity of a question: prompt text plus correct answer.
pub fn signature(question: &str, correct_answer: &str) -> String {
    let mut sig = String::with_capacity(question.len() + SEPARATOR.len() + correct_answer.len());
    sig.push_str(question);
    sig.push_str(SEPARATOR);
    sig.push_str(correct_answer);
    sig
}

pub fn candidate_signature(candidate: &Candidate) -> String {
    signature(&candidate.question, &candidate.correct_answer)
}

pub fn record_signature(record: &AnsweredRecord) -> String {
    signature(&record.question, &record.correct_answer)
}
