use axum::{extract::State, http::StatusCode, response::Json};
use sea_orm::{ConnectionTrait, Statement};
use serde_json::{json, Value};

use crate::AppState;

pub async fn status() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
    }))
}

/// Liveness plus a database ping.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let backend = state.db.get_database_backend();
    let ping = state
        .db
        .execute(Statement::from_string(backend, "SELECT 1".to_string()))
        .await;

    match ping {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "healthy" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "error": e.to_string() })),
        ),
    }
}
