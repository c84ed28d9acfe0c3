use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::AppState;
use crate::domain::AccountLabel;
use crate::engine::ReturnsReport;
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsResponse {
    pub account_count: usize,
    pub accounts: Vec<ReturnsReport>,
}

pub async fn list_accounts(State(state): State<AppState>) -> Json<AccountsResponse> {
    let accounts: Vec<ReturnsReport> = state.reports.read().await.values().cloned().collect();
    Json(AccountsResponse {
        account_count: accounts.len(),
        accounts,
    })
}

pub async fn get_account(
    Path(label): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ReturnsReport>, AppError> {
    let label = AccountLabel::new(&label);
    state
        .reports
        .read()
        .await
        .get(&label)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("account {}", label)))
}
