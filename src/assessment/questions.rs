use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    ai_utils::{AiCollaborator, ContentSource, Generated, UseCase},
    roadmap::Step,
};

const SYSTEM_PROMPT: &str = "You are an experienced teacher writing short assessments. \
    Questions test understanding of the step's material, not trivia.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum QuestionKind {
    MultipleChoice,
    #[default]
    ShortAnswer,
}

impl From<String> for QuestionKind {
    fn from(value: String) -> Self {
        let value: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match value.as_str() {
            "multiplechoice" | "mcq" | "choice" => QuestionKind::MultipleChoice,
            _ => QuestionKind::ShortAnswer,
        }
    }
}

/// An assessment question including its answer key
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct Question {
    /// Unique id within the assessment, e.g. "q1"
    #[serde(default)]
    pub id: String,
    /// multiple_choice or short_answer
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: QuestionKind,
    /// The question text
    #[serde(alias = "question")]
    pub prompt: String,
    /// Answer options for multiple choice questions
    #[serde(default)]
    pub options: Vec<String>,
    /// For multiple choice, the exact text of the correct option
    #[serde(default, alias = "correctAnswer")]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// What the learner sees: no answer key
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionView {
    pub id: String,
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            kind: q.kind,
            prompt: q.prompt.clone(),
            options: q.options.clone(),
        }
    }
}

/// The question set persisted for a step
#[derive(Debug, Clone, Serialize)]
pub struct QuestionSet {
    pub step_id: i64,
    pub questions: Vec<Question>,
    pub source: ContentSource,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Questions for one roadmap step
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct QuestionBatch {
    questions: Vec<Question>,
}

pub fn build_prompt(step: &Step, count: usize) -> String {
    format!(
        "Write {count} assessment questions for the learning step '{}'.\n\
        Step description: {}\nDifficulty: {}\n\n\
        Mix multiple_choice questions (4 options, correct_answer is the exact text of the right option) \
        and short_answer questions (correct_answer is a short reference answer). \
        Give every question a unique id such as q1, q2.",
        step.title,
        step.description,
        step.difficulty.as_str()
    )
}

/// Cleans up AI questions; drops the ones that cannot be graded
fn normalize(questions: Vec<Question>, count: usize) -> Vec<Question> {
    questions
        .into_iter()
        .filter(|q| !q.prompt.trim().is_empty())
        .filter_map(|mut q| {
            q.options.retain(|o| !o.trim().is_empty());
            if !q.options.is_empty() {
                q.kind = QuestionKind::MultipleChoice;
            }
            if q.kind == QuestionKind::MultipleChoice {
                // answer given as option letter, e.g. "B"
                let answer = q.correct_answer.trim();
                if answer.len() == 1 {
                    let idx = answer.to_ascii_uppercase().as_bytes()[0].wrapping_sub(b'A') as usize;
                    if let Some(option) = q.options.get(idx) {
                        q.correct_answer = option.clone();
                    }
                }
                let known = q
                    .options
                    .iter()
                    .any(|o| o.trim().eq_ignore_ascii_case(q.correct_answer.trim()));
                if !known {
                    return None;
                }
            } else if q.correct_answer.trim().is_empty() {
                // nothing to grade against
                return None;
            }
            Some(q)
        })
        .take(count)
        .enumerate()
        .map(|(idx, mut q)| {
            if q.id.trim().is_empty() {
                q.id = format!("q{}", idx + 1);
            }
            q
        })
        .collect()
}

pub async fn generate_questions(
    ai: &AiCollaborator,
    step: &Step,
    count: usize,
) -> Generated<Vec<Question>> {
    match ai
        .generate_structured::<QuestionBatch>(
            UseCase::AssessmentGeneration,
            SYSTEM_PROMPT,
            build_prompt(step, count),
        )
        .await
    {
        Ok(batch) => {
            let questions = normalize(batch.questions, count);
            let mut ids: Vec<&str> = questions.iter().map(|q| q.id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            if questions.is_empty() || ids.len() != questions.len() {
                warn!("AI questions for step {} unusable, using fallback", step.id);
                return Generated::fallback(fallback_questions(step));
            }
            info!("generated {} questions for step {}", questions.len(), step.id);
            Generated::ai(questions)
        }
        Err(e) => {
            warn!("question generation for step {} failed, using fallback: {}", step.id, e);
            Generated::fallback(fallback_questions(step))
        }
    }
}

/// Two fixed questions so an assessment is always available
pub fn fallback_questions(step: &Step) -> Vec<Question> {
    let title = step.title.as_str();
    let correct = format!("Understanding the core ideas of {title}");
    vec![
        Question {
            id: "q1".to_string(),
            kind: QuestionKind::MultipleChoice,
            prompt: format!("Which statement best describes the goal of '{title}'?"),
            options: vec![
                correct.clone(),
                "Memorizing unrelated facts".to_string(),
                "Skipping the fundamentals".to_string(),
                "None of the above".to_string(),
            ],
            correct_answer: correct,
            explanation: Some(format!(
                "'{title}' is about understanding its core ideas well enough to apply them."
            )),
        },
        Question {
            id: "q2".to_string(),
            kind: QuestionKind::ShortAnswer,
            prompt: format!("In your own words, explain one key idea from '{title}'."),
            options: vec![],
            // any non-empty explanation is accepted
            correct_answer: String::new(),
            explanation: None,
        },
    ]
}
