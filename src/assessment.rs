//! Assessments: a fixed question set per step, graded submissions, and the
//! progression decision that follows each submission.

pub mod grading;
pub mod questions;

use std::collections::BTreeMap;

use questions::{QuestionSet, QuestionView};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    ai_utils::{AiCollaborator, ContentSource},
    config::{AssessmentConfig, ProgressionConfig},
    error::{Error, Result},
    progress::{self, StepStatus},
    roadmap::{self, Step},
    store::{Store, SubmissionRecord},
};

/// One immutable submission record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssessmentAttempt {
    pub id: i64,
    pub user_id: i64,
    pub step_id: i64,
    pub score: i64,
    pub passed: bool,
    /// question id -> answer, as submitted
    pub answers: BTreeMap<String, String>,
    pub time_spent_secs: Option<i64>,
    /// 1-based, increases by one per submission
    pub attempt_number: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssessmentView {
    pub step_id: i64,
    pub source: ContentSource,
    pub mastery_threshold: i64,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct Submission {
    /// question id -> answer
    pub answers: BTreeMap<String, String>,
    #[serde(default, alias = "timeSpent")]
    pub time_spent_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmissionResult {
    pub score: i64,
    pub passed: bool,
    pub feedback: String,
    pub attempt_number: i64,
    /// the step's status after this submission
    pub status: StepStatus,
    /// steps that became available
    pub unlocked_steps: Vec<i64>,
    pub roadmap_completed: bool,
}

/// Returns the step's persisted question set, generating and storing one on first use
pub async fn fetch_or_generate(
    store: &Store,
    ai: &AiCollaborator,
    config: &AssessmentConfig,
    step: &Step,
) -> Result<QuestionSet> {
    if let Some(set) = store.get_question_set(step.id).await? {
        return Ok(set);
    }
    let generated = questions::generate_questions(ai, step, config.question_count).await;
    // a concurrent first fetch may have stored its set already; that one wins
    store
        .save_question_set(step.id, &generated.value, generated.source)
        .await
}

pub async fn get_assessment(
    store: &Store,
    ai: &AiCollaborator,
    config: &AssessmentConfig,
    user_id: i64,
    step_id: i64,
) -> Result<AssessmentView> {
    let (_, step) = roadmap::load_owned_step(store, user_id, step_id).await?;
    if step.status == StepStatus::Locked {
        return Err(Error::InvalidTransition {
            step_id: step.id,
            status: step.status,
            action: "take the assessment for",
        });
    }
    let set = fetch_or_generate(store, ai, config, &step).await?;
    Ok(AssessmentView {
        step_id: step.id,
        source: set.source,
        mastery_threshold: step.mastery_threshold,
        questions: set.questions.iter().map(QuestionView::from).collect(),
    })
}

pub async fn submit(
    store: &Store,
    ai: &AiCollaborator,
    assessment: &AssessmentConfig,
    progression: &ProgressionConfig,
    user_id: i64,
    step_id: i64,
    submission: Submission,
) -> Result<SubmissionResult> {
    let (roadmap, step) = roadmap::load_owned_step(store, user_id, step_id).await?;
    progress::ensure_submittable(&step)?;
    let set = fetch_or_generate(store, ai, assessment, &step).await?;

    let score = grading::score(assessment.scoring, &set.questions, &submission.answers);
    let evaluation = progress::evaluate_submission(&step, score, progression.attempt_limit)?;
    let unlock = if evaluation.status == StepStatus::Completed {
        progress::unlockable(&store.list_steps(roadmap.id).await?, step.id)
    } else {
        Vec::new()
    };

    let write = store
        .record_submission(SubmissionRecord {
            user_id,
            step_id: step.id,
            roadmap_id: roadmap.id,
            expected_attempts: step.attempts,
            expected_status: step.status,
            score,
            passed: evaluation.passed,
            answers: &submission.answers,
            time_spent_secs: submission.time_spent_secs,
            status: evaluation.status,
            unlock: &unlock,
        })
        .await?;

    info!(
        "user {} scored {} on step {} (attempt {}), status {} -> {}",
        user_id, score, step.id, evaluation.attempts, step.status, evaluation.status
    );
    if write.roadmap_completed {
        info!("roadmap {} completed by user {}", roadmap.id, user_id);
    }
    Ok(SubmissionResult {
        score,
        passed: evaluation.passed,
        feedback: grading::feedback(
            evaluation.passed,
            evaluation.attempts,
            progression.attempt_limit,
        )
        .to_string(),
        attempt_number: write.attempt.attempt_number,
        status: evaluation.status,
        unlocked_steps: write.unlocked,
        roadmap_completed: write.roadmap_completed,
    })
}

/// The learner's attempts on a step, oldest first
pub async fn list_attempts(
    store: &Store,
    user_id: i64,
    step_id: i64,
) -> Result<Vec<AssessmentAttempt>> {
    let (_, step) = roadmap::load_owned_step(store, user_id, step_id).await?;
    store.list_attempts(user_id, step.id).await
}
