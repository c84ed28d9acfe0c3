use crate::domain::{AccountLabel, Currency, Venue};
use chrono_tz::Tz;
use std::collections::HashMap;
use thiserror::Error;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub state_path: String,
    pub accounts: Vec<AccountConfig>,
    pub poll_seconds: u64,
    pub lookback_ms: i64,
    pub extra_final_statuses: Vec<String>,
    pub trust_nonfinal: bool,
    pub quote_ccy: Currency,
    pub period_close_tz: Tz,
    pub period_close_hour: u32,
    pub notify_webhook_url: Option<String>,
    pub send_startup_ok: bool,
    pub prices: HashMap<Currency, f64>,
}

/// One monitored account and where its data comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountConfig {
    pub label: AccountLabel,
    pub venue: Venue,
    /// Feed URLs in priority order (helper feed first, raw feed after).
    pub feed_urls: Vec<String>,
    pub value_url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let state_path = env_map
            .get("STATE_PATH")
            .cloned()
            .unwrap_or_else(|| ".monitor_state.json".to_string());

        let accounts = parse_accounts(&env_map)?;

        let poll_seconds = parse_or(&env_map, "POLL_SECONDS", 60u64, "must be a valid u64")?;
        if poll_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "POLL_SECONDS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let lookback_days = parse_or(&env_map, "FLOW_LOOKBACK_DAYS", 14i64, "must be a valid i64")?;
        if lookback_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "FLOW_LOOKBACK_DAYS".to_string(),
                "must be positive".to_string(),
            ));
        }
        let lookback_ms = lookback_days.checked_mul(DAY_MS).ok_or_else(|| {
            ConfigError::InvalidValue("FLOW_LOOKBACK_DAYS".to_string(), "too large".to_string())
        })?;

        let extra_final_statuses = env_map
            .get("EXTRA_FINAL_STATUSES")
            .map(|s| split_list(s))
            .unwrap_or_default();

        let trust_nonfinal = parse_bool(&env_map, "FLOW_TRUST_NONFINAL", false)?;

        let quote_ccy = Currency::new(
            env_map
                .get("QUOTE_CCY")
                .map(|s| s.as_str())
                .unwrap_or("USDT"),
        );

        let period_close_tz = env_map
            .get("PERIOD_CLOSE_TZ")
            .map(|s| s.as_str())
            .unwrap_or("America/New_York")
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidValue("PERIOD_CLOSE_TZ".to_string(), e.to_string()))?;

        let period_close_hour =
            parse_or(&env_map, "PERIOD_CLOSE_HOUR", 16u32, "must be an hour 0-23")?;
        if period_close_hour > 23 {
            return Err(ConfigError::InvalidValue(
                "PERIOD_CLOSE_HOUR".to_string(),
                "must be an hour 0-23".to_string(),
            ));
        }

        let notify_webhook_url = env_map
            .get("NOTIFY_WEBHOOK_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let send_startup_ok = parse_bool(&env_map, "SEND_STARTUP_OK", true)?;

        let prices = parse_prices(&env_map)?;

        Ok(Config {
            port,
            state_path,
            accounts,
            poll_seconds,
            lookback_ms,
            extra_final_statuses,
            trust_nonfinal,
            quote_ccy,
            period_close_tz,
            period_close_hour,
            notify_webhook_url,
            send_startup_ok,
            prices,
        })
    }

    pub fn venues(&self) -> Vec<Venue> {
        let mut venues: Vec<Venue> = self.accounts.iter().map(|a| a.venue).collect();
        venues.sort();
        venues.dedup();
        venues
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    hint: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), hint.to_string())),
    }
}

fn parse_bool(
    env_map: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be a boolean, got {}", other),
            )),
        },
    }
}

fn parse_accounts(env_map: &HashMap<String, String>) -> Result<Vec<AccountConfig>, ConfigError> {
    let raw = env_map
        .get("ACCOUNTS")
        .ok_or_else(|| ConfigError::MissingEnv("ACCOUNTS".to_string()))?;

    let mut accounts: Vec<AccountConfig> = Vec::new();
    for name in split_list(raw) {
        let label = AccountLabel::new(&name);
        if accounts.iter().any(|a| a.label == label) {
            return Err(ConfigError::InvalidValue(
                "ACCOUNTS".to_string(),
                format!("duplicate account {}", label),
            ));
        }
        let venue = label
            .venue_prefix()
            .parse::<Venue>()
            .map_err(|e| ConfigError::InvalidValue("ACCOUNTS".to_string(), e.to_string()))?;

        let feed_urls = env_map
            .get(&format!("{}_FEED_URLS", label))
            .map(|s| split_list(s))
            .unwrap_or_default();
        let value_key = format!("{}_VALUE_URL", label);
        let value_url = env_map
            .get(&value_key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingEnv(value_key))?;

        accounts.push(AccountConfig {
            label,
            venue,
            feed_urls,
            value_url,
        });
    }

    if accounts.is_empty() {
        return Err(ConfigError::InvalidValue(
            "ACCOUNTS".to_string(),
            "must list at least one account".to_string(),
        ));
    }
    Ok(accounts)
}

fn parse_prices(env_map: &HashMap<String, String>) -> Result<HashMap<Currency, f64>, ConfigError> {
    let mut prices = HashMap::new();
    let Some(raw) = env_map.get("PRICES") else {
        return Ok(prices);
    };
    for pair in split_list(raw) {
        let (ccy, px) = pair.split_once('=').ok_or_else(|| {
            ConfigError::InvalidValue("PRICES".to_string(), format!("expected CCY=PRICE, got {}", pair))
        })?;
        let px = px
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| {
                ConfigError::InvalidValue("PRICES".to_string(), format!("invalid price for {}", ccy))
            })?;
        prices.insert(Currency::new(ccy), px);
    }
    Ok(prices)
}
