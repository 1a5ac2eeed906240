use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use super::Identity;
use crate::{
    error::Result,
    roadmap::{self, CreateRoadmapRequest, CreatedRoadmap, Roadmap, RoadmapDetail},
    server::AppState,
};

/// Generates a roadmap with the AI, or uses the steps given in the request
#[utoipa::path(
    context_path = "/api/roadmaps",
    path = "/create",
    method(post),
    request_body = CreateRoadmapRequest,
    responses(
        (status = 200, description = "Roadmap created", body = CreatedRoadmap),
        (status = 400, description = "Empty subject"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn create_roadmap(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CreateRoadmapRequest>,
) -> Result<Json<CreatedRoadmap>> {
    let created = roadmap::create_roadmap(
        &state.store,
        &state.ai,
        &state.config.progression,
        identity.user_id,
        req,
    )
    .await?;
    Ok(Json(created))
}

#[utoipa::path(
    context_path = "/api/roadmaps",
    path = "",
    method(get),
    responses(
        (status = 200, description = "The user's roadmaps", body = Vec<Roadmap>),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_roadmaps(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<Roadmap>>> {
    Ok(Json(
        roadmap::list_roadmaps(&state.store, identity.user_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/roadmaps",
    path = "/{id}",
    method(get),
    params(("id" = i64, Path, description = "Roadmap id")),
    responses(
        (status = 200, description = "Roadmap with its steps", body = RoadmapDetail),
        (status = 404, description = "No such roadmap for this user")
    )
)]
pub async fn get_roadmap(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<RoadmapDetail>> {
    Ok(Json(
        roadmap::get_roadmap_detail(&state.store, identity.user_id, id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/roadmaps",
    path = "/{id}/archive",
    method(post),
    params(("id" = i64, Path, description = "Roadmap id")),
    responses(
        (status = 200, description = "Roadmap archived", body = Roadmap),
        (status = 404, description = "No such roadmap for this user")
    )
)]
pub async fn archive_roadmap(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<Roadmap>> {
    Ok(Json(
        roadmap::archive_roadmap(&state.store, identity.user_id, id).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/roadmaps",
        Router::new()
            .route("/", get(list_roadmaps))
            .route("/create", post(create_roadmap))
            .route("/{id}", get(get_roadmap))
            .route("/{id}/archive", post(archive_roadmap)),
    )
}
