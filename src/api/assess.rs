use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use super::Identity;
use crate::{
    assessment::{self, AssessmentAttempt, AssessmentView, Submission, SubmissionResult},
    error::Result,
    server::AppState,
};

#[utoipa::path(
    context_path = "/api/assess",
    path = "/{step_id}",
    method(get),
    params(("step_id" = i64, Path, description = "Step id")),
    responses(
        (status = 200, description = "Questions without answers", body = AssessmentView),
        (status = 404, description = "No such step for this user"),
        (status = 409, description = "Step is locked")
    )
)]
pub async fn get_assessment(
    State(state): State<AppState>,
    identity: Identity,
    Path(step_id): Path<i64>,
) -> Result<Json<AssessmentView>> {
    let view = assessment::get_assessment(
        &state.store,
        &state.ai,
        &state.config.assessment,
        identity.user_id,
        step_id,
    )
    .await?;
    Ok(Json(view))
}

/// Grades the answers and advances the step
#[utoipa::path(
    context_path = "/api/assess",
    path = "/{step_id}",
    method(post),
    params(("step_id" = i64, Path, description = "Step id")),
    request_body = Submission,
    responses(
        (status = 200, description = "Score, pass flag and feedback", body = SubmissionResult),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such step for this user"),
        (status = 409, description = "Step does not take submissions, or a concurrent submission won")
    )
)]
pub async fn submit_assessment(
    State(state): State<AppState>,
    identity: Identity,
    Path(step_id): Path<i64>,
    Json(submission): Json<Submission>,
) -> Result<Json<SubmissionResult>> {
    let result = assessment::submit(
        &state.store,
        &state.ai,
        &state.config.assessment,
        &state.config.progression,
        identity.user_id,
        step_id,
        submission,
    )
    .await?;
    Ok(Json(result))
}

#[utoipa::path(
    context_path = "/api/assess",
    path = "/{step_id}/attempts",
    method(get),
    params(("step_id" = i64, Path, description = "Step id")),
    responses(
        (status = 200, description = "Attempts, oldest first", body = Vec<AssessmentAttempt>),
        (status = 404, description = "No such step for this user")
    )
)]
pub async fn list_attempts(
    State(state): State<AppState>,
    identity: Identity,
    Path(step_id): Path<i64>,
) -> Result<Json<Vec<AssessmentAttempt>>> {
    Ok(Json(
        assessment::list_attempts(&state.store, identity.user_id, step_id).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/assess",
        Router::new()
            .route("/{step_id}", get(get_assessment).post(submit_assessment))
            .route("/{step_id}/attempts", get(list_attempts)),
    )
}
