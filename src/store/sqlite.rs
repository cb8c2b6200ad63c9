use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{ExpansionError, Result};
use crate::model::{ExpandedPricePoint, RawPricePoint};
use crate::store::PriceStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS raw_prices (
    ticker TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    trade_count INTEGER NOT NULL,
    vwap REAL NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS raw_prices_timestamp_ticker
    ON raw_prices (timestamp_ms, ticker);

CREATE TABLE IF NOT EXISTS expanded_prices (
    ticker TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    trade_count INTEGER NOT NULL,
    vwap REAL NOT NULL,
    imputed INTEGER NOT NULL,
    created_at_ms INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS expanded_prices_timestamp_ticker
    ON expanded_prices (timestamp_ms, ticker);
"#;

const UPSERT_OBSERVED: &str = r#"
INSERT INTO expanded_prices (
    ticker, timestamp_ms, open, high, low, close, volume, trade_count, vwap, imputed, created_at_ms
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
ON CONFLICT(timestamp_ms, ticker) DO UPDATE SET
    open = excluded.open,
    high = excluded.high,
    low = excluded.low,
    close = excluded.close,
    volume = excluded.volume,
    trade_count = excluded.trade_count,
    vwap = excluded.vwap,
    imputed = 0
"#;

const UPSERT_SYNTHESIZED: &str = r#"
INSERT INTO expanded_prices (
    ticker, timestamp_ms, open, high, low, close, volume, trade_count, vwap, imputed, created_at_ms
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)
ON CONFLICT(timestamp_ms, ticker) DO UPDATE SET
    open = excluded.open,
    high = excluded.high,
    low = excluded.low,
    close = excluded.close,
    volume = excluded.volume,
    trade_count = excluded.trade_count,
    vwap = excluded.vwap
WHERE expanded_prices.imputed = 1
"#;

/// File-backed sqlite store. Every call opens its own connection, so clones
/// can be handed to parallel workers.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(5_000),
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Append observed bars. Plain inserts: a duplicate (ticker, timestamp)
    /// fails the whole batch with `DataIntegrityViolation`.
    pub fn insert_raw(&self, points: &[RawPricePoint]) -> Result<usize> {
        let mut conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO raw_prices (
                    ticker, timestamp_ms, open, high, low, close, volume, trade_count, vwap
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for p in points {
                stmt.execute(params![
                    p.ticker,
                    p.timestamp.timestamp_millis(),
                    p.open,
                    p.high,
                    p.low,
                    p.close,
                    p.volume as i64,
                    p.trade_count as i64,
                    p.vwap,
                ])?;
            }
        }
        tx.commit()?;
        Ok(points.len())
    }
}

fn to_utc(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawPricePoint> {
    Ok(RawPricePoint {
        ticker: row.get(0)?,
        timestamp: to_utc(1, row.get(1)?)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get::<_, i64>(6)? as u64,
        trade_count: row.get::<_, i64>(7)? as u64,
        vwap: row.get(8)?,
    })
}

fn expanded_from_row(row: &Row<'_>) -> rusqlite::Result<ExpandedPricePoint> {
    let created_at = match row.get::<_, Option<i64>>(10)? {
        Some(ms) => Some(to_utc(10, ms)?),
        None => None,
    };
    Ok(ExpandedPricePoint {
        ticker: row.get(0)?,
        timestamp: to_utc(1, row.get(1)?)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get::<_, i64>(6)? as u64,
        trade_count: row.get::<_, i64>(7)? as u64,
        vwap: row.get(8)?,
        imputed: row.get::<_, i64>(9)? != 0,
        created_at,
    })
}

impl PriceStore for SqliteStore {
    fn ensure_indexes(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn distinct_tickers(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT DISTINCT ticker FROM raw_prices ORDER BY ticker ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut tickers = Vec::new();
        for row in rows {
            tickers.push(row?);
        }
        Ok(tickers)
    }

    fn trading_days(&self, ticker: &str) -> Result<Vec<NaiveDate>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT strftime('%Y-%m-%d', timestamp_ms / 1000, 'unixepoch') AS day
            FROM raw_prices
            WHERE ticker = ?1
            ORDER BY day ASC
            "#,
        )?;
        let rows = stmt.query_map([ticker], |row| row.get::<_, String>(0))?;
        let mut days = Vec::new();
        for row in rows {
            let label = row?;
            let day = NaiveDate::parse_from_str(&label, "%Y-%m-%d").map_err(|e| {
                ExpansionError::StoreUnavailable(format!("unparseable day '{}': {}", label, e))
            })?;
            days.push(day);
        }
        Ok(days)
    }

    fn raw_between(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawPricePoint>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT ticker, timestamp_ms, open, high, low, close, volume, trade_count, vwap
            FROM raw_prices
            WHERE ticker = ?1 AND timestamp_ms >= ?2 AND timestamp_ms <= ?3
            ORDER BY timestamp_ms ASC
            "#,
        )?;
        let rows = stmt.query_map(
            params![ticker, start.timestamp_millis(), end.timestamp_millis()],
            raw_from_row,
        )?;
        let mut points = Vec::new();
        for row in rows {
            points.push(row?);
        }
        Ok(points)
    }

    fn last_close_before(&self, ticker: &str, at: DateTime<Utc>) -> Result<Option<f64>> {
        let conn = self.connect()?;
        let close = conn
            .query_row(
                r#"
                SELECT close
                FROM raw_prices
                WHERE ticker = ?1 AND timestamp_ms < ?2
                ORDER BY timestamp_ms DESC
                LIMIT 1
                "#,
                params![ticker, at.timestamp_millis()],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(close)
    }

    fn expanded_flags_between(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<DateTime<Utc>, bool>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT timestamp_ms, imputed
            FROM expanded_prices
            WHERE ticker = ?1 AND timestamp_ms >= ?2 AND timestamp_ms <= ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![ticker, start.timestamp_millis(), end.timestamp_millis()],
            |row| Ok((to_utc(0, row.get(0)?)?, row.get::<_, i64>(1)? != 0)),
        )?;
        let mut flags = HashMap::new();
        for row in rows {
            let (ts, imputed) = row?;
            flags.insert(ts, imputed);
        }
        Ok(flags)
    }

    fn upsert_expanded(&self, rows: &[ExpandedPricePoint]) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut observed = tx.prepare_cached(UPSERT_OBSERVED)?;
            let mut synthesized = tx.prepare_cached(UPSERT_SYNTHESIZED)?;
            for r in rows {
                let stmt = if r.imputed {
                    &mut synthesized
                } else {
                    &mut observed
                };
                stmt.execute(params![
                    r.ticker,
                    r.timestamp.timestamp_millis(),
                    r.open,
                    r.high,
                    r.low,
                    r.close,
                    r.volume as i64,
                    r.trade_count as i64,
                    r.vwap,
                    r.created_at.map(|t| t.timestamp_millis()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn expanded_between(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExpandedPricePoint>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT ticker, timestamp_ms, open, high, low, close, volume, trade_count, vwap,
                   imputed, created_at_ms
            FROM expanded_prices
            WHERE ticker = ?1 AND timestamp_ms >= ?2 AND timestamp_ms <= ?3
            ORDER BY timestamp_ms ASC
            "#,
        )?;
        let rows = stmt.query_map(
            params![ticker, start.timestamp_millis(), end.timestamp_millis()],
            expanded_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn count_expanded(&self, ticker: &str) -> Result<u64> {
        let conn = self.connect()?;
        let n = conn.query_row(
            "SELECT COUNT(*) FROM expanded_prices WHERE ticker = ?1",
            [ticker],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(n as u64)
    }
}
