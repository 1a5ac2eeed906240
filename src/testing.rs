//! Fakes and fixtures shared by unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use sqlx::sqlite::SqlitePoolOptions;

use crate::{
    ai_utils::{AiCollaborator, Completer, CompletionRequest},
    config::AiConfig,
    store::Store,
    user::{self, Role},
};

/// Replies with the scripted responses in order, then fails.
pub struct ScriptedCompleter {
    responses: Mutex<VecDeque<String>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedCompleter {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Completer for ScriptedCompleter {
    fn complete(&self, _request: CompletionRequest) -> BoxFuture<'_, anyhow::Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        Box::pin(async move { next.ok_or(anyhow::anyhow!("script exhausted")) })
    }
}

/// Always fails, like an unreachable provider.
pub struct FailingCompleter;

impl Completer for FailingCompleter {
    fn complete(&self, _request: CompletionRequest) -> BoxFuture<'_, anyhow::Result<String>> {
        Box::pin(async { Err(anyhow::anyhow!("provider unavailable")) })
    }
}

pub fn failing_ai() -> AiCollaborator {
    AiCollaborator::new(Arc::new(FailingCompleter), &AiConfig::default())
}

pub fn scripted_ai<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> AiCollaborator {
    AiCollaborator::new(
        Arc::new(ScriptedCompleter::new(responses)),
        &AiConfig::default(),
    )
}

/// In-memory store; one connection so every query sees the same database.
pub async fn memory_store() -> Store {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Store::new(pool);
    store.init_schema().await.unwrap();
    store
}

pub async fn learner(store: &Store, email: &str) -> i64 {
    user::create_user(store, "Learner".into(), email.into(), "secret".into(), Role::Learner)
        .await
        .unwrap()
}

pub async fn tutor(store: &Store, email: &str) -> i64 {
    user::create_user(store, "Tutor".into(), email.into(), "secret".into(), Role::Tutor)
        .await
        .unwrap()
}
