//! WebAPI - HTTP intakes
//!
//! ## Responsibilities
//!
//! - Unlock request / poll endpoints
//! - Motion and photo intake
//! - Event stream endpoint
//! - Health, upload listing and photo history

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Liveness probe
pub async fn root(State(_state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: uptime,
        subscribers: state.bus.subscriber_count().await,
        mailboxes: state.commands.mailbox_count().await,
        db_connected: state.config.database_url.is_some(),
    };

    Json(response)
}
