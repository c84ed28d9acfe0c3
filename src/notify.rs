//! Outbound notifications: applied funding events and period snapshots.
//!
//! Delivery is at-most-once. A failed send is logged and dropped; there is no
//! retry queue beyond the short in-call backoff.

use crate::domain::{AccountLabel, Currency, Decimal, Direction, FundingEvent, TimeMs};
use crate::engine::ReturnsReport;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Notice emitted for every funding event applied to a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingNotice {
    pub account: AccountLabel,
    pub event_id: String,
    pub direction: Direction,
    pub currency: Currency,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valuation: Option<f64>,
    pub status: String,
    pub timestamp: TimeMs,
}

impl FundingNotice {
    pub fn from_event(account: &AccountLabel, event: &FundingEvent) -> Self {
        Self {
            account: account.clone(),
            event_id: event.id.clone(),
            direction: event.direction,
            currency: event.currency.clone(),
            amount: event.amount,
            valuation: event.valuation,
            status: event.status.clone(),
            timestamp: event.timestamp,
        }
    }
}

/// One-time notice after the first committed tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupNotice {
    pub values: BTreeMap<AccountLabel, f64>,
    pub total_value: f64,
}

impl StartupNotice {
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (AccountLabel, f64)>,
    {
        let values: BTreeMap<AccountLabel, f64> = values.into_iter().collect();
        let total_value = values.values().sum();
        Self {
            values,
            total_value,
        }
    }
}

/// Sum of account values across a period snapshot.
pub fn portfolio_total(reports: &[ReturnsReport]) -> f64 {
    reports.iter().map(|r| r.value).sum()
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected with HTTP {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn started(&self, notice: &StartupNotice) -> Result<(), NotifyError>;

    async fn funding_applied(&self, notice: &FundingNotice) -> Result<(), NotifyError>;

    async fn period_closed(&self, reports: &[ReturnsReport]) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn started(&self, notice: &StartupNotice) -> Result<(), NotifyError> {
        for (account, value) in &notice.values {
            info!(%account, value, "account online");
        }
        info!(
            accounts = notice.values.len(),
            total_value = notice.total_value,
            "monitor online"
        );
        Ok(())
    }

    async fn funding_applied(&self, notice: &FundingNotice) -> Result<(), NotifyError> {
        info!(
            account = %notice.account,
            event_id = %notice.event_id,
            direction = %notice.direction,
            currency = %notice.currency,
            amount = %notice.amount,
            valuation = ?notice.valuation,
            status = %notice.status,
            "funding event applied"
        );
        Ok(())
    }

    async fn period_closed(&self, reports: &[ReturnsReport]) -> Result<(), NotifyError> {
        for r in reports {
            info!(
                account = %r.account,
                value = r.value,
                start_value = ?r.start_value,
                net_flows = r.net_flows,
                twr_pct = r.twr * 100.0,
                money_weighted_pct = ?r.money_weighted_return.map(|m| m * 100.0),
                "period closed"
            );
        }
        info!(
            accounts = reports.len(),
            total_value = portfolio_total(reports),
            "period closed: portfolio total"
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
enum WebhookBody<'a> {
    Started(&'a StartupNotice),
    FundingApplied(&'a FundingNotice),
    PeriodClosed(PeriodPayload<'a>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PeriodPayload<'a> {
    reports: &'a [ReturnsReport],
    total_value: f64,
}

/// POSTs notifications as JSON to an operator-supplied URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    async fn post(&self, body: &WebhookBody<'_>) -> Result<(), NotifyError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(10)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&self.url)
                .json(body)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(NotifyError::Transport(e.to_string())))?;

            let status = response.status();
            if status == 429 || status.is_server_error() {
                return Err(backoff::Error::transient(NotifyError::Rejected(
                    status.as_u16(),
                )));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(NotifyError::Rejected(
                    status.as_u16(),
                )));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn started(&self, notice: &StartupNotice) -> Result<(), NotifyError> {
        self.post(&WebhookBody::Started(notice)).await
    }

    async fn funding_applied(&self, notice: &FundingNotice) -> Result<(), NotifyError> {
        self.post(&WebhookBody::FundingApplied(notice)).await
    }

    async fn period_closed(&self, reports: &[ReturnsReport]) -> Result<(), NotifyError> {
        self.post(&WebhookBody::PeriodClosed(PeriodPayload {
            reports,
            total_value: portfolio_total(reports),
        }))
        .await
    }
}
