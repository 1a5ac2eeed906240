pub mod assess;
pub mod roadmap;
pub mod step;
pub mod tutor;
pub mod user;

use axum::{Router, extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use utoipa::OpenApi;

use crate::{
    error::{Error, Result},
    server::AppState,
    user::Role,
};

pub const USER_ID_KEY: &str = "user_id";
pub const ROLE_KEY: &str = "role";

/// The logged in user, read from the session
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    pub fn require_tutor(&self) -> Result<()> {
        if self.role.can_tutor() {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| anyhow::anyhow!(msg))?;
        let user_id = session
            .get::<i64>(USER_ID_KEY)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or(Error::Unauthorized)?;
        let role = session
            .get::<Role>(ROLE_KEY)
            .await
            .map_err(anyhow::Error::from)?
            .unwrap_or(Role::Learner);
        Ok(Identity { user_id, role })
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        user::create_user,
        user::login,
        user::logout,
        user::user_info,
        roadmap::create_roadmap,
        roadmap::list_roadmaps,
        roadmap::get_roadmap,
        roadmap::archive_roadmap,
        step::open_step,
        step::step_content,
        assess::get_assessment,
        assess::submit_assessment,
        assess::list_attempts,
        tutor::request_tutor,
        tutor::my_requests,
        tutor::list_assignments,
        tutor::record_session,
        tutor::complete_assignment,
    ),
    info(title = "Roadmap Tutor API")
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(user::router())
        .merge(roadmap::router())
        .merge(step::router())
        .merge(assess::router())
        .merge(tutor::router())
}
