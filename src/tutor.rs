use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{Error, Result},
    progress,
    roadmap,
    store::{StatusChange, Store},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i64)]
pub enum AssignmentStatus {
    Assigned = 0,
    InProgress = 1,
    Completed = 2,
}

impl TryFrom<i64> for AssignmentStatus {
    type Error = anyhow::Error;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => AssignmentStatus::Assigned,
            1 => AssignmentStatus::InProgress,
            2 => AssignmentStatus::Completed,
            _ => anyhow::bail!("unknown assignment status {}", value),
        })
    }
}

/// A learner routed to human help for blocked steps
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TutorAssignment {
    pub id: i64,
    pub student_id: i64,
    /// set once a tutor picks the assignment up
    pub tutor_id: Option<i64>,
    pub roadmap_id: i64,
    pub step_ids: BTreeSet<i64>,
    pub reason: String,
    pub status: AssignmentStatus,
    pub session_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorRequest {
    /// the blocked step
    pub node_id: i64,
    pub roadmap_id: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AssignmentFilter {
    pub status: Option<AssignmentStatus>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompletedAssignment {
    pub assignment: TutorAssignment,
    /// steps reopened for the learner
    pub released_steps: Vec<i64>,
}

/// Escalates a step to a human tutor and blocks it until the tutor is done
pub async fn request_tutor(
    store: &Store,
    student_id: i64,
    req: TutorRequest,
) -> Result<TutorAssignment> {
    let (roadmap, step) = roadmap::load_owned_step(store, student_id, req.node_id).await?;
    if roadmap.id != req.roadmap_id {
        return Err(Error::not_found("step", req.node_id));
    }
    let to = progress::request_tutor(&step)?;
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "Struggling with '{}' after {} attempt(s)",
                step.title, step.attempts
            )
        });
    let assignment = store
        .create_tutor_assignment(
            student_id,
            roadmap.id,
            StatusChange {
                step_id: step.id,
                from: step.status,
                to,
            },
            &reason,
        )
        .await?;
    info!(
        "tutor assignment {} created for student {} on step {}",
        assignment.id, student_id, step.id
    );
    Ok(assignment)
}

pub async fn list_assignments(
    store: &Store,
    status: Option<AssignmentStatus>,
) -> Result<Vec<TutorAssignment>> {
    store.list_assignments(status).await
}

pub async fn list_student_assignments(
    store: &Store,
    student_id: i64,
) -> Result<Vec<TutorAssignment>> {
    store.list_student_assignments(student_id).await
}

async fn load_open_assignment(store: &Store, id: i64) -> Result<TutorAssignment> {
    let assignment = store
        .get_assignment(id)
        .await?
        .ok_or(Error::not_found("tutor assignment", id))?;
    if assignment.status == AssignmentStatus::Completed {
        return Err(Error::Conflict(format!(
            "tutor assignment {} is already completed",
            id
        )));
    }
    Ok(assignment)
}

/// A tutor held a session: claims the assignment and counts the session
pub async fn record_session(store: &Store, tutor_id: i64, id: i64) -> Result<TutorAssignment> {
    let assignment = load_open_assignment(store, id).await?;
    if !store
        .record_tutor_session(id, tutor_id, assignment.status)
        .await?
    {
        return Err(Error::Conflict(format!(
            "tutor assignment {} changed while recording a session",
            id
        )));
    }
    store
        .get_assignment(id)
        .await?
        .ok_or(Error::not_found("tutor assignment", id))
}

/// Terminal: marks the assignment completed and reopens its blocked steps
pub async fn complete_assignment(
    store: &Store,
    tutor_id: i64,
    id: i64,
) -> Result<CompletedAssignment> {
    let assignment = load_open_assignment(store, id).await?;
    let mut releases = Vec::new();
    for step_id in &assignment.step_ids {
        let Some(step) = store.get_step(*step_id).await? else {
            continue;
        };
        if let Some(to) = progress::tutor_session_completed(step.status) {
            releases.push(StatusChange {
                step_id: step.id,
                from: step.status,
                to,
            });
        }
    }
    let released_steps = store
        .complete_tutor_assignment(id, tutor_id, assignment.status, &releases)
        .await?;
    info!(
        "tutor {} completed assignment {}, reopened steps {:?}",
        tutor_id, id, released_steps
    );
    let assignment = store
        .get_assignment(id)
        .await?
        .ok_or(Error::not_found("tutor assignment", id))?;
    Ok(CompletedAssignment {
        assignment,
        released_steps,
    })
}
