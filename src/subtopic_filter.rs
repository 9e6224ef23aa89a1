use crate::models::{Candidate, SubtopicAllowlist};

/// Allowed subtopics for `topic`, or `None` when the topic is unrestricted.
///
/// An entry with an empty list counts as unconfigured.
pub fn allowlist_for<'a>(topic: &str, allowlist: Option<&'a SubtopicAllowlist>) -> Option<&'a [String]> {
    allowlist?
        .get(topic)
        .map(Vec::as_slice)
        .filter(|subtopics| !subtopics.is_empty())
}

/// Whether `candidate` may appear in a quiz on `topic`.
pub fn allowed(candidate: &Candidate, topic: &str, allowlist: Option<&SubtopicAllowlist>) -> bool {
    let Some(subtopics) = allowlist_for(topic, allowlist) else {
        return true;
    };

    // Generators without subtopics tag candidates at concept or topic level.
    let tag = candidate
        .subtopic
        .as_deref()
        .or(candidate.concept.as_deref())
        .unwrap_or(candidate.topic.as_str());

    subtopics.iter().any(|allowed| allowed == tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn candidate(subtopic: Option<&str>) -> Candidate {
        let mut candidate = Candidate::generated("fractions", "1/2 + 1/4 = ?".to_string(), "3/4".to_string());
        candidate.subtopic = subtopic.map(str::to_string);
        candidate
    }

    fn allowlist(entries: &[(&str, &[&str])]) -> SubtopicAllowlist {
        entries
            .iter()
            .map(|(topic, subs)| (topic.to_string(), subs.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_no_allowlist_allows_everything() {
        assert!(allowed(&candidate(Some("fractions-comparison")), "fractions", None));
        assert!(allowed(&candidate(None), "fractions", Some(&HashMap::new())));
    }

    #[test]
    fn test_other_topic_restrictions_do_not_apply() {
        let list = allowlist(&[("decimals", &["decimals-rounding"])]);
        assert!(allowed(&candidate(Some("fractions-comparison")), "fractions", Some(&list)));
    }

    #[test]
    fn test_subtopic_must_be_listed() {
        let list = allowlist(&[("fractions", &["fractions-addition"])]);
        assert!(allowed(&candidate(Some("fractions-addition")), "fractions", Some(&list)));
        assert!(!allowed(&candidate(Some("fractions-comparison")), "fractions", Some(&list)));
    }

    #[test]
    fn test_untagged_candidate_falls_back_to_concept_then_topic() {
        let list = allowlist(&[("fractions", &["fractions"])]);
        assert!(allowed(&candidate(None), "fractions", Some(&list)));

        let mut with_concept = candidate(None);
        with_concept.concept = Some("equivalence".to_string());
        assert!(!allowed(&with_concept, "fractions", Some(&list)));
    }

    #[test]
    fn test_empty_entry_is_unrestricted() {
        let list = allowlist(&[("fractions", &[])]);
        assert!(allowlist_for("fractions", Some(&list)).is_none());
        assert!(allowed(&candidate(Some("anything")), "fractions", Some(&list)));
    }
}
