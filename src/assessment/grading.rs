use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::questions::{Question, QuestionKind};

/// How a submission is turned into a 0..=100 score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// per-question comparison with the answer key
    #[default]
    Graded,
    /// 25 points per answered question plus a random bonus, answers are not checked
    Legacy,
}

const PASSED: &str = "Excellent work! You've mastered this topic.";
const SUGGEST_TUTOR: &str =
    "You've made multiple attempts. Consider requesting a tutor for personalized help.";
const RETRY: &str = "Keep practicing! Review the material and try again.";

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn is_correct(question: &Question, answer: &str) -> bool {
    let answer = normalize(answer);
    if answer.is_empty() {
        return false;
    }
    let expected = normalize(&question.correct_answer);
    match question.kind {
        QuestionKind::MultipleChoice => answer == expected,
        QuestionKind::ShortAnswer => {
            // a fragment of the reference must cover at least half of it
            answer.contains(&expected)
                || (expected.contains(&answer)
                    && answer.chars().count() * 2 >= expected.chars().count())
        }
    }
}

pub fn graded_score(questions: &[Question], answers: &BTreeMap<String, String>) -> i64 {
    if questions.is_empty() {
        return 0;
    }
    let correct = questions
        .iter()
        .filter(|q| answers.get(&q.id).is_some_and(|a| is_correct(q, a)))
        .count();
    (100.0 * correct as f64 / questions.len() as f64).round() as i64
}

pub fn legacy_score(answered: usize, bonus: i64) -> i64 {
    let base = (answered as i64 * 25).min(100);
    (base + bonus).clamp(0, 100)
}

pub fn score(
    policy: ScoringPolicy,
    questions: &[Question],
    answers: &BTreeMap<String, String>,
) -> i64 {
    match policy {
        ScoringPolicy::Graded => graded_score(questions, answers),
        ScoringPolicy::Legacy => {
            let answered = answers.values().filter(|a| !a.trim().is_empty()).count();
            legacy_score(answered, rand::rng().random_range(0..=20))
        }
    }
}

/// `attempts` is the count after this submission
pub fn feedback(passed: bool, attempts: i64, attempt_limit: i64) -> &'static str {
    if passed {
        PASSED
    } else if attempts >= attempt_limit {
        SUGGEST_TUTOR
    } else {
        RETRY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, kind: QuestionKind, correct: &str) -> Question {
        Question {
            id: id.to_string(),
            kind,
            prompt: format!("question {id}"),
            options: vec![],
            correct_answer: correct.to_string(),
            explanation: None,
        }
    }

    fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn multiple_choice_needs_exact_option() {
        let q = question("q1", QuestionKind::MultipleChoice, "Borrow  Checker");
        assert!(is_correct(&q, "borrow checker"));
        assert!(is_correct(&q, "  BORROW checker "));
        assert!(!is_correct(&q, "borrow"));
        assert!(!is_correct(&q, ""));
    }

    #[test]
    fn short_answer_accepts_containment() {
        let q = question("q1", QuestionKind::ShortAnswer, "a reference");
        assert!(is_correct(&q, "It is a reference to a value"));
        assert!(is_correct(&q, "reference"));
        assert!(!is_correct(&q, "a copy"));
        assert!(!is_correct(&q, "   "));
    }

    #[test]
    fn short_fragments_are_not_credited() {
        let q = question("q1", QuestionKind::ShortAnswer, "ownership transfer");
        assert!(!is_correct(&q, "e"));
        assert!(!is_correct(&q, "own"));
        assert!(is_correct(&q, "ownership"));
        assert!(is_correct(&q, "Ownership  Transfer"));
    }

    #[test]
    fn graded_score_is_rounded_percentage() {
        let questions = vec![
            question("q1", QuestionKind::MultipleChoice, "a"),
            question("q2", QuestionKind::MultipleChoice, "b"),
            question("q3", QuestionKind::ShortAnswer, "heap"),
        ];
        assert_eq!(graded_score(&questions, &answers(&[])), 0);
        assert_eq!(graded_score(&questions, &answers(&[("q1", "a")])), 33);
        assert_eq!(
            graded_score(&questions, &answers(&[("q1", "a"), ("q2", "b")])),
            67
        );
        // answers to unknown ids are ignored
        assert_eq!(
            graded_score(&questions, &answers(&[("q1", "a"), ("q2", "b"), ("q3", "the heap"), ("q9", "x")])),
            100
        );
        assert_eq!(graded_score(&[], &answers(&[("q1", "a")])), 0);
    }

    #[test]
    fn legacy_formula() {
        assert_eq!(legacy_score(0, 0), 0);
        assert_eq!(legacy_score(2, 15), 65);
        assert_eq!(legacy_score(3, 20), 95);
        assert_eq!(legacy_score(4, 20), 100);
        assert_eq!(legacy_score(9, 0), 100);
    }

    #[test]
    fn legacy_score_is_a_nondeterministic_placeholder() {
        // ignores correctness entirely and adds a random 0..=20 bonus
        let questions = vec![question("q1", QuestionKind::MultipleChoice, "a")];
        let submitted = answers(&[("q1", "wrong"), ("q2", "also wrong")]);
        for _ in 0..50 {
            let s = score(ScoringPolicy::Legacy, &questions, &submitted);
            assert!((50..=70).contains(&s), "score {s}");
        }
        assert_eq!(score(ScoringPolicy::Graded, &questions, &submitted), 0);
    }

    #[test]
    fn feedback_templates() {
        assert_eq!(feedback(true, 5, 3), PASSED);
        assert_eq!(feedback(false, 3, 3), SUGGEST_TUTOR);
        assert_eq!(feedback(false, 1, 3), RETRY);
        assert!(feedback(false, 3, 3).contains("tutor"));
    }
}
