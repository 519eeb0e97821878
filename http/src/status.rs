use crate::router::AppState;
use axum::{
    extract::State,
    Json,
};
use chrono::Utc;
use stats_pusher_collector::PushStatus;

pub async fn handler(State(state): State<AppState>) -> Json<PushStatus> {
    let status = state.health.status(Utc::now(), state.stale_after_minutes);
    if !status.result {
        warn!(minutes = status.diff_complete_minutes, "Stats have not been pushed for a while");
    }
    Json(status)
}
