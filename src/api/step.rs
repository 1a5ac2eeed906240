use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use super::Identity;
use crate::{
    content::{self, Lesson},
    error::Result,
    progress,
    roadmap::Step,
    server::AppState,
};

#[utoipa::path(
    context_path = "/api/steps",
    path = "/{id}/open",
    method(post),
    params(("id" = i64, Path, description = "Step id")),
    responses(
        (status = 200, description = "Step, in progress unless already further", body = Step),
        (status = 404, description = "No such step for this user"),
        (status = 409, description = "Step is locked")
    )
)]
pub async fn open_step(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<Step>> {
    Ok(Json(
        progress::open_step(&state.store, identity.user_id, id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/steps",
    path = "/{id}/content",
    method(get),
    params(("id" = i64, Path, description = "Step id")),
    responses(
        (status = 200, description = "Lesson for the step", body = Lesson),
        (status = 404, description = "No such step for this user")
    )
)]
pub async fn step_content(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<Lesson>> {
    let lesson = content::get_lesson(
        &state.store,
        &state.ai,
        &state.lessons,
        identity.user_id,
        id,
    )
    .await?;
    Ok(Json(lesson))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/steps",
        Router::new()
            .route("/{id}/open", post(open_step))
            .route("/{id}/content", get(step_content)),
    )
}
