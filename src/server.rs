use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    ai_utils::AiCollaborator,
    api::{self, ApiDoc},
    config::Config,
    content::{self, LessonCache},
    store::Store,
};

/// Shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub ai: AiCollaborator,
    pub config: Arc<Config>,
    pub lessons: LessonCache,
}

impl AppState {
    pub fn new(store: Store, ai: AiCollaborator, config: Config) -> Self {
        Self {
            store,
            ai,
            config: Arc::new(config),
            lessons: content::lesson_cache(),
        }
    }
}

/// Sessions live in the application database
pub async fn session_store(store: &Store) -> anyhow::Result<SqliteStore> {
    let sessions = SqliteStore::new(store.database.clone());
    sessions.migrate().await?;
    Ok(sessions)
}

pub fn build_app(state: AppState, sessions: SqliteStore) -> Router {
    let server = &state.config.server;
    let session_layer = SessionManagerLayer::new(sessions)
        .with_secure(server.tls_enabled())
        .with_expiry(Expiry::OnInactivity(time::Duration::days(
            server.session_ttl_days,
        )));
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    let timeout = Duration::from_secs(server.request_timeout_secs);

    Router::new()
        .nest("/api", api::router())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(session_layer)
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
