use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use utoipa::ToSchema;

use super::{Identity, ROLE_KEY, USER_ID_KEY};
use crate::{
    error::Result,
    server::AppState,
    user::{self, Role, UserInfo},
};

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Self registration always creates a learner account
#[utoipa::path(
    context_path = "/api/user",
    path = "/create_user",
    method(post),
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = UserInfo),
        (status = 400, description = "Missing fields"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<UserInfo>> {
    let CreateUserRequest {
        name,
        email,
        password,
    } = req;
    let id = user::create_user(&state.store, name, email, password, Role::Learner).await?;
    Ok(Json(user::get_user_info(&state.store, id).await?))
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/login",
    method(post),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = UserInfo),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserInfo>> {
    let info = user::login(&state.store, &req.email, &req.password).await?;
    session.cycle_id().await.map_err(anyhow::Error::from)?;
    session
        .insert(USER_ID_KEY, info.id)
        .await
        .map_err(anyhow::Error::from)?;
    session
        .insert(ROLE_KEY, info.role)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(info))
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/logout",
    method(post),
    responses(
        (status = 200, description = "Logout successful")
    )
)]
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.flush().await;
    Json("Logout successful")
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/user_info",
    method(get),
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn user_info(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<UserInfo>> {
    Ok(Json(
        user::get_user_info(&state.store, identity.user_id).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/user",
        Router::new()
            .route("/create_user", post(create_user))
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/user_info", get(user_info)),
    )
}
