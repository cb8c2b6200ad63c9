pub mod sqlite;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::model::{ExpandedPricePoint, RawPricePoint};

pub use sqlite::SqliteStore;

/// Backing store for the raw and expanded minute datasets.
///
/// Both datasets are unique on (timestamp, ticker). Expanded writes go
/// through [`PriceStore::upsert_expanded`] only, so reruns converge.
pub trait PriceStore {
    fn ensure_indexes(&self) -> Result<()>;

    fn distinct_tickers(&self) -> Result<Vec<String>>;

    /// Distinct UTC days with at least one raw bar, ascending.
    fn trading_days(&self, ticker: &str) -> Result<Vec<NaiveDate>>;

    /// Raw bars with `start <= timestamp <= end`, ascending.
    fn raw_between(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawPricePoint>>;

    /// Close of the latest raw bar strictly before `at`.
    fn last_close_before(&self, ticker: &str, at: DateTime<Utc>) -> Result<Option<f64>>;

    /// Existing expanded rows in range, keyed by timestamp, valued by `imputed`.
    fn expanded_flags_between(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<DateTime<Utc>, bool>>;

    /// Insert or update in place. Observed rows always win; synthesized rows
    /// only refresh rows that are still imputed.
    fn upsert_expanded(&self, rows: &[ExpandedPricePoint]) -> Result<()>;

    fn expanded_between(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExpandedPricePoint>>;

    fn count_expanded(&self, ticker: &str) -> Result<u64>;
}
