use axum::extract::State;
use axum::Json;

use crate::api::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the monitor has committed at least one tick.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let accounts = state.reports.read().await.len();
    if accounts == 0 {
        return Err(AppError::Unavailable("no tick committed yet".into()));
    }
    Ok(Json(serde_json::json!({"status": "ready", "accounts": accounts})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountLabel;
    use crate::engine::AccountLedgerState;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn test_health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_requires_published_report() {
        let state = AppState::new(Arc::new(RwLock::new(BTreeMap::new())));
        assert!(ready(State(state.clone())).await.is_err());

        let label = AccountLabel::new("okx_1");
        state
            .reports
            .write()
            .await
            .insert(label.clone(), AccountLedgerState::default().report(label, 1.0));
        let Json(body) = ready(State(state)).await.unwrap();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["accounts"], 1);
    }
}
