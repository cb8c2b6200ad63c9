use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// One observed minute bar, as written by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPricePoint {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub trade_count: u64,
    pub vwap: f64,
}

impl RawPricePoint {
    pub fn is_minute_aligned(&self) -> bool {
        self.timestamp.second() == 0 && self.timestamp.nanosecond() == 0
    }
}

/// One minute of the dense, reconciled series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedPricePoint {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub trade_count: u64,
    pub vwap: f64,
    pub imputed: bool,
    /// Set when the engine first synthesized this row.
    pub created_at: Option<DateTime<Utc>>,
}

impl ExpandedPricePoint {
    /// Copy an observed bar verbatim.
    pub fn observed(raw: &RawPricePoint) -> Self {
        Self {
            ticker: raw.ticker.clone(),
            timestamp: raw.timestamp,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
            trade_count: raw.trade_count,
            vwap: raw.vwap,
            imputed: false,
            created_at: None,
        }
    }

    /// Flat no-trade bar carrying `fill` on every price field.
    pub fn synthesized(
        ticker: &str,
        timestamp: DateTime<Utc>,
        fill: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticker: ticker.to_string(),
            timestamp,
            open: fill,
            high: fill,
            low: fill,
            close: fill,
            volume: 0,
            trade_count: 0,
            vwap: 0.0,
            imputed: true,
            created_at: Some(created_at),
        }
    }
}
