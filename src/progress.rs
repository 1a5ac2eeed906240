//! Step progression: how a step's status moves between LOCKED, AVAILABLE,
//! IN_PROGRESS, COMPLETED, NEEDS_REVIEW and TUTOR_REQUIRED.
//!
//! The functions here are pure; persistence applies their decisions with
//! compare-and-swap updates so a concurrent change is detected, not overwritten.

mod status;

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

pub use status::StepStatus;

use crate::{
    error::{Error, Result},
    roadmap::{self, Step},
    store::Store,
};

/// Outcome of grading one submission against a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub passed: bool,
    /// attempt count after this submission
    pub attempts: i64,
    pub status: StepStatus,
}

/// The first step starts available, every other step locked
pub fn initial_status(order: i64) -> StepStatus {
    if order == 1 {
        StepStatus::Available
    } else {
        StepStatus::Locked
    }
}

/// Keeps only earlier steps as prerequisites; a non-first step without any
/// depends on the step right before it.
pub fn normalize_prerequisites(order: i64, declared: &[i64]) -> BTreeSet<i64> {
    let mut prerequisites: BTreeSet<i64> = declared
        .iter()
        .copied()
        .filter(|p| *p >= 1 && *p < order)
        .collect();
    if prerequisites.is_empty() && order > 1 {
        prerequisites.insert(order - 1);
    }
    prerequisites
}

/// Learner opens a step. Returns the new status if it changes.
pub fn open(step: &Step) -> Result<Option<StepStatus>> {
    match step.status {
        StepStatus::Locked => Err(Error::InvalidTransition {
            step_id: step.id,
            status: step.status,
            action: "open",
        }),
        StepStatus::Available => Ok(Some(StepStatus::InProgress)),
        _ => Ok(None),
    }
}

/// Locked steps and steps waiting on a tutor take no submissions
pub fn ensure_submittable(step: &Step) -> Result<()> {
    match step.status {
        StepStatus::Locked | StepStatus::TutorRequired => Err(Error::InvalidTransition {
            step_id: step.id,
            status: step.status,
            action: "submit an assessment for",
        }),
        _ => Ok(()),
    }
}

pub fn evaluate_submission(step: &Step, score: i64, attempt_limit: i64) -> Result<Evaluation> {
    ensure_submittable(step)?;
    let passed = score >= step.mastery_threshold;
    let attempts = step.attempts + 1;
    let status = match step.status {
        // retakes are recorded but never demote a mastered step
        StepStatus::Completed => StepStatus::Completed,
        _ if passed => StepStatus::Completed,
        _ if attempts >= attempt_limit => StepStatus::NeedsReview,
        current => current,
    };
    Ok(Evaluation {
        passed,
        attempts,
        status,
    })
}

/// Locked steps that become available once `completed_step` is completed:
/// those depending on it whose whole prerequisite set is completed.
pub fn unlockable(steps: &[Step], completed_step: i64) -> Vec<i64> {
    let statuses: BTreeMap<i64, StepStatus> = steps
        .iter()
        .map(|s| {
            let status = if s.id == completed_step {
                StepStatus::Completed
            } else {
                s.status
            };
            (s.id, status)
        })
        .collect();
    steps
        .iter()
        .filter(|s| s.status == StepStatus::Locked && s.prerequisites.contains(&completed_step))
        .filter(|s| {
            s.prerequisites
                .iter()
                .all(|p| statuses.get(p) == Some(&StepStatus::Completed))
        })
        .map(|s| s.id)
        .collect()
}

/// Learner asks for a human tutor on a step they are stuck on
pub fn request_tutor(step: &Step) -> Result<StepStatus> {
    match step.status {
        StepStatus::Available | StepStatus::InProgress | StepStatus::NeedsReview => {
            Ok(StepStatus::TutorRequired)
        }
        status => Err(Error::InvalidTransition {
            step_id: step.id,
            status,
            action: "request a tutor for",
        }),
    }
}

/// A tutor finished working with the learner; the step reopens for another attempt
pub fn tutor_session_completed(status: StepStatus) -> Option<StepStatus> {
    match status {
        StepStatus::TutorRequired => Some(StepStatus::Available),
        _ => None,
    }
}

pub fn roadmap_finished(steps: &[Step]) -> bool {
    !steps.is_empty() && steps.iter().all(|s| s.status == StepStatus::Completed)
}

/// AVAILABLE -> IN_PROGRESS for the owner of the step
pub async fn open_step(store: &Store, user_id: i64, step_id: i64) -> Result<Step> {
    let (_, step) = roadmap::load_owned_step(store, user_id, step_id).await?;
    let Some(next) = open(&step)? else {
        return Ok(step);
    };
    if !store.transition_step(step.id, step.status, next).await? {
        return Err(Error::Conflict(format!(
            "step {} changed while opening it",
            step.id
        )));
    }
    info!("step {} opened by user {}", step.id, user_id);
    store
        .get_step(step.id)
        .await?
        .ok_or(Error::not_found("step", step.id))
}
