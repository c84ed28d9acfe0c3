//! Domain primitives: TimeMs, AccountLabel, Currency, Venue, Direction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Threshold below which a venue timestamp is interpreted as seconds.
const SECONDS_CUTOFF: i64 = 1_000_000_000_000;

/// Time in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Normalize a venue timestamp that may be expressed in seconds or milliseconds.
    ///
    /// Venues mix both units across API revisions; values below 10^12 are seconds.
    pub fn from_epoch_any(raw: f64) -> Option<Self> {
        if !raw.is_finite() {
            return None;
        }
        let scaled = if raw.abs() < SECONDS_CUTOFF as f64 {
            raw * 1000.0
        } else {
            raw
        };
        Some(TimeMs(scaled as i64))
    }

    /// Subtract a duration in milliseconds, saturating at the i64 bounds.
    pub fn saturating_sub_ms(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_sub(ms))
    }
}

impl fmt::Display for TimeMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operator-facing account label, e.g. `BINANCE_01`.
///
/// Labels are upper-cased on construction so that config, state files and
/// API lookups agree regardless of how the operator typed them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct AccountLabel(String);

impl From<String> for AccountLabel {
    fn from(label: String) -> Self {
        AccountLabel::new(&label)
    }
}

impl AccountLabel {
    pub fn new(label: &str) -> Self {
        AccountLabel(label.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Venue prefix of the label (`binance_01` -> `binance`).
    pub fn venue_prefix(&self) -> String {
        self.0
            .split('_')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }
}

impl fmt::Display for AccountLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Currency/asset ticker (e.g., "BTC", "USDT").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    pub fn new(ticker: &str) -> Self {
        Currency(ticker.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported trading venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Bybit,
    Okx,
}

impl Venue {
    pub const ALL: [Venue; 3] = [Venue::Binance, Venue::Bybit, Venue::Okx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Bybit => "bybit",
            Venue::Okx => "okx",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported venue '{0}'")]
pub struct UnknownVenue(pub String);

impl FromStr for Venue {
    type Err = UnknownVenue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "bybit" => Ok(Venue::Bybit),
            "okx" => Ok(Venue::Okx),
            other => Err(UnknownVenue(other.to_string())),
        }
    }
}

/// Direction of a funding flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Deposit,
    Withdrawal,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Deposit, Direction::Withdrawal];

    /// Signed multiplier applied to net flows (+1 deposit, -1 withdrawal).
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Deposit => 1.0,
            Direction::Withdrawal => -1.0,
        }
    }

    /// Parse the loose direction labels venues emit; `None` when unrecognised.
    pub fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Some(Direction::Deposit),
            "withdraw" | "withdrawal" => Some(Direction::Withdrawal),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Deposit => write!(f, "deposit"),
            Direction::Withdrawal => write!(f, "withdrawal"),
        }
    }
}
