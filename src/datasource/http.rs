//! HTTP JSON adapters for funding feeds and account valuations.
//!
//! Venues and their API revisions disagree on field names and envelope shapes.
//! Rows are located under a handful of known envelopes and each field is read
//! from the first alias that is present.

use super::{DataSourceError, EventFeed, ValuationSource};
use crate::domain::{AccountLabel, Currency, Decimal, Direction, FundingRecord, TimeMs};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const ENVELOPE_KEYS: &[&str] = &["rows", "list", "data", "result"];
const NESTED_KEYS: &[&str] = &["rows", "list", "data"];
const ID_KEYS: &[&str] = &["id", "txId", "txID", "txid", "wdId", "withdrawId"];
const TIME_KEYS: &[&str] = &[
    "timestamp",
    "insertTime",
    "applyTime",
    "successAt",
    "ts",
    "updatedTime",
    "updateTime",
    "createdTime",
    "createTime",
];
const CURRENCY_KEYS: &[&str] = &["currency", "coin", "ccy"];
const AMOUNT_KEYS: &[&str] = &["amount", "qty", "amt", "size"];
const STATUS_KEYS: &[&str] = &["status", "state"];
const DIRECTION_KEYS: &[&str] = &["type", "direction"];
const VALUE_KEYS: &[&str] = &["total", "value", "equity"];

/// GET a JSON document with exponential backoff on transient failures.
async fn get_json(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<Value, DataSourceError> {
    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..Default::default()
    };

    retry(backoff, || async {
        let response = client.get(url).query(query).send().await.map_err(|e| {
            backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
        })?;

        let status = response.status();
        if status == 429 {
            return Err(backoff::Error::transient(DataSourceError::RateLimited));
        }
        if status.is_server_error() {
            return Err(backoff::Error::transient(DataSourceError::HttpError {
                status: status.as_u16(),
                message: "Server error".to_string(),
            }));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(DataSourceError::HttpError {
                status: status.as_u16(),
                message: "Client error".to_string(),
            }));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
    })
    .await
}

/// Funding feed served as JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEventFeed {
    name: String,
    client: Client,
    url: String,
}

impl HttpEventFeed {
    pub fn new(name: String, url: String) -> Self {
        Self {
            name,
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl EventFeed for HttpEventFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_events(
        &self,
        account: &AccountLabel,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<FundingRecord>, DataSourceError> {
        debug!(
            feed = %self.name,
            %account,
            from_ms,
            to_ms,
            "fetching funding records"
        );

        let query = [
            ("account", account.to_string()),
            ("startTime", from_ms.to_string()),
            ("endTime", to_ms.to_string()),
        ];
        let body = get_json(&self.client, &self.url, &query).await?;
        Ok(parse_records(&body, from_ms, to_ms, &self.name))
    }
}

/// Account valuations served as JSON over HTTP, one URL per account.
#[derive(Debug, Clone)]
pub struct HttpValuationSource {
    client: Client,
    urls: HashMap<AccountLabel, String>,
}

impl HttpValuationSource {
    pub fn new(urls: HashMap<AccountLabel, String>) -> Self {
        Self {
            client: Client::new(),
            urls,
        }
    }
}

#[async_trait]
impl ValuationSource for HttpValuationSource {
    async fn total_value(&self, account: &AccountLabel) -> Result<f64, DataSourceError> {
        let url = self
            .urls
            .get(account)
            .ok_or_else(|| DataSourceError::NotConfigured(format!("valuation for {}", account)))?;
        let body = get_json(&self.client, url, &[]).await?;
        parse_total_value(&body)
    }
}

/// Extract records from a feed response, dropping rows outside `[from_ms, to_ms]`.
pub fn parse_records(body: &Value, from_ms: i64, to_ms: i64, feed: &str) -> Vec<FundingRecord> {
    let mut records = Vec::new();
    for row in extract_rows(body) {
        match parse_record(row) {
            Ok(record) => {
                let ts = record.timestamp.as_ms();
                if ts >= from_ms && ts <= to_ms {
                    records.push(record);
                }
            }
            Err(e) => warn!(feed, "Failed to parse funding row: {}", e),
        }
    }
    records
}

fn extract_rows(body: &Value) -> &[Value] {
    if let Some(rows) = body.as_array() {
        return rows;
    }
    for key in ENVELOPE_KEYS {
        match body.get(*key) {
            Some(Value::Array(rows)) => return rows,
            Some(nested @ Value::Object(_)) => {
                for inner in NESTED_KEYS {
                    if let Some(Value::Array(rows)) = nested.get(*inner) {
                        return rows;
                    }
                }
            }
            _ => {}
        }
    }
    &[]
}

fn parse_record(row: &Value) -> Result<FundingRecord, DataSourceError> {
    let timestamp = TIME_KEYS
        .iter()
        .find_map(|k| row.get(*k).and_then(parse_timestamp))
        .ok_or_else(|| DataSourceError::ParseError("Missing timestamp field".to_string()))?;

    let currency = first_string(row, CURRENCY_KEYS)
        .map(|s| Currency::new(&s))
        .filter(|c| !c.is_empty())
        .ok_or_else(|| DataSourceError::ParseError("Missing currency field".to_string()))?;

    let amount = AMOUNT_KEYS
        .iter()
        .find_map(|k| row.get(*k))
        .ok_or_else(|| DataSourceError::ParseError("Missing amount field".to_string()))
        .and_then(parse_decimal)?
        .abs();

    let direction = first_string(row, DIRECTION_KEYS).and_then(|s| Direction::parse_loose(&s));

    Ok(FundingRecord::new(
        first_string(row, ID_KEYS),
        direction,
        timestamp,
        currency,
        amount,
        first_string(row, STATUS_KEYS),
    ))
}

/// First alias holding a string or number, rendered as a string.
fn first_string(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match row.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_timestamp(value: &Value) -> Option<TimeMs> {
    match value {
        Value::Number(n) => n.as_f64().and_then(TimeMs::from_epoch_any),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(raw) = s.parse::<f64>() {
                return TimeMs::from_epoch_any(raw);
            }
            // Binance withdraw history uses "YYYY-MM-DD HH:MM:SS" in UTC.
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| TimeMs::new(dt.and_utc().timestamp_millis()))
        }
        _ => None,
    }
}

fn parse_decimal(value: &Value) -> Result<Decimal, DataSourceError> {
    match value {
        Value::String(s) => Decimal::from_str_canonical(s)
            .map_err(|e| DataSourceError::ParseError(format!("Invalid amount: {}", e))),
        Value::Number(n) => n
            .as_f64()
            .and_then(Decimal::from_f64)
            .ok_or_else(|| DataSourceError::ParseError(format!("Invalid amount: {}", n))),
        other => Err(DataSourceError::ParseError(format!(
            "Invalid amount: {}",
            other
        ))),
    }
}

fn parse_total_value(body: &Value) -> Result<f64, DataSourceError> {
    let raw = match body {
        Value::Number(_) | Value::String(_) => Some(body),
        _ => VALUE_KEYS.iter().find_map(|k| body.get(*k)),
    }
    .ok_or_else(|| DataSourceError::ParseError("Missing total value".to_string()))?;

    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| DataSourceError::ParseError(format!("Invalid total value: {}", raw)))?;

    if !value.is_finite() {
        return Err(DataSourceError::ParseError(format!(
            "Invalid total value: {}",
            value
        )));
    }
    Ok(value)
}
