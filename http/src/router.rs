use crate::status::handler;
use axum::{
    routing::get,
    Router,
};
use stats_pusher_collector::PushHealth;

#[derive(Clone)]
pub struct AppState {
    pub health: PushHealth,
    pub stale_after_minutes: u64,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "Hello!"
}
