pub mod accounts;
pub mod health;

use crate::orchestration::ReportBoard;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

/// Read-only view over the reports the monitor publishes.
#[derive(Clone)]
pub struct AppState {
    pub reports: ReportBoard,
}

impl AppState {
    pub fn new(reports: ReportBoard) -> Self {
        Self { reports }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/accounts", get(accounts::list_accounts))
        .route("/v1/accounts/:label", get(accounts::get_account))
        .layer(cors)
        .with_state(state)
}
