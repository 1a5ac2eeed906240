use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};

use super::Identity;
use crate::{
    error::Result,
    server::AppState,
    tutor::{self, AssignmentFilter, CompletedAssignment, TutorAssignment, TutorRequest},
};

/// Learner asks for human help with a step
#[utoipa::path(
    context_path = "/api/tutor",
    path = "/request",
    method(post),
    request_body = TutorRequest,
    responses(
        (status = 200, description = "Assignment created, step blocked", body = TutorAssignment),
        (status = 404, description = "No such step for this user"),
        (status = 409, description = "Step cannot be escalated or already is")
    )
)]
pub async fn request_tutor(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<TutorRequest>,
) -> Result<Json<TutorAssignment>> {
    Ok(Json(
        tutor::request_tutor(&state.store, identity.user_id, req).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/tutor",
    path = "/requests",
    method(get),
    responses(
        (status = 200, description = "The learner's own assignments", body = Vec<TutorAssignment>)
    )
)]
pub async fn my_requests(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<TutorAssignment>>> {
    Ok(Json(
        tutor::list_student_assignments(&state.store, identity.user_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/tutor",
    path = "/assignments",
    method(get),
    params(AssignmentFilter),
    responses(
        (status = 200, description = "Assignments", body = Vec<TutorAssignment>),
        (status = 403, description = "Not a tutor")
    )
)]
pub async fn list_assignments(
    State(state): State<AppState>,
    identity: Identity,
    Query(filter): Query<AssignmentFilter>,
) -> Result<Json<Vec<TutorAssignment>>> {
    identity.require_tutor()?;
    Ok(Json(
        tutor::list_assignments(&state.store, filter.status).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/tutor",
    path = "/assignments/{id}/session",
    method(post),
    params(("id" = i64, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Session recorded", body = TutorAssignment),
        (status = 403, description = "Not a tutor"),
        (status = 409, description = "Assignment already completed")
    )
)]
pub async fn record_session(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<TutorAssignment>> {
    identity.require_tutor()?;
    Ok(Json(
        tutor::record_session(&state.store, identity.user_id, id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/tutor",
    path = "/assignments/{id}/complete",
    method(post),
    params(("id" = i64, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment completed, steps reopened", body = CompletedAssignment),
        (status = 403, description = "Not a tutor"),
        (status = 409, description = "Assignment already completed")
    )
)]
pub async fn complete_assignment(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<CompletedAssignment>> {
    identity.require_tutor()?;
    Ok(Json(
        tutor::complete_assignment(&state.store, identity.user_id, id).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/tutor",
        Router::new()
            .route("/request", post(request_tutor))
            .route("/requests", get(my_requests))
            .route("/assignments", get(list_assignments))
            .route("/assignments/{id}/session", post(record_session))
            .route("/assignments/{id}/complete", post(complete_assignment)),
    )
}
