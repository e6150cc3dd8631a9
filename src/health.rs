use std::{collections::BTreeMap, sync::Arc};

use axum::{
    debug_handler,
    extract::{FromRef, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::{
    db::Store,
    reconcile::{Cycle, LastCycle, Status},
    AppResult,
};

#[derive(Clone, FromRef)]
pub struct HealthState {
    pub store: Arc<dyn Store>,
    pub status: Status,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(running))
        .route("/db-test", get(db_test))
        .route("/status", get(status))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[debug_handler]
async fn running() -> &'static str {
    "running"
}

#[debug_handler(state = HealthState)]
async fn db_test(State(store): State<Arc<dyn Store>>) -> AppResult<Json<Value>> {
    store.ping().await?;
    Ok(Json(json!({ "ok": true })))
}

#[debug_handler(state = HealthState)]
async fn status(State(status): State<Status>) -> Json<BTreeMap<Cycle, LastCycle>> {
    Json(status.snapshot().await)
}
