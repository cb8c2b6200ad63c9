use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ErrorKind, ExpansionError};
use crate::scope::ScopeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayOutcome {
    pub day: NaiveDate,
    /// Minutes copied from observed bars.
    pub real: usize,
    /// Minutes synthesized by forward fill.
    pub imputed: usize,
    /// Rows that did not exist before this run.
    pub inserted: usize,
    /// Rows flipped from imputed to observed.
    pub corrected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerOutcome {
    pub ticker: String,
    pub days: Vec<DayOutcome>,
}

impl TickerOutcome {
    pub fn inserted(&self) -> usize {
        self.days.iter().map(|d| d.inserted).sum()
    }

    pub fn corrected(&self) -> usize {
        self.days.iter().map(|d| d.corrected).sum()
    }

    pub fn minutes(&self) -> usize {
        self.days.iter().map(|d| d.real + d.imputed).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl SkippedTicker {
    pub fn new(ticker: &str, err: &ExpansionError) -> Self {
        Self {
            ticker: ticker.to_string(),
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one reconciliation run. Failures stay per ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpansionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scope_source: ScopeSource,
    pub processed: Vec<TickerOutcome>,
    pub skipped: Vec<SkippedTicker>,
}

impl ExpansionReport {
    pub fn total_inserted(&self) -> usize {
        self.processed.iter().map(TickerOutcome::inserted).sum()
    }

    pub fn total_corrected(&self) -> usize {
        self.processed.iter().map(TickerOutcome::corrected).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn outcome(&self, ticker: &str) -> Option<&TickerOutcome> {
        self.processed.iter().find(|o| o.ticker == ticker)
    }

    pub fn integrity_violations(&self) -> impl Iterator<Item = &SkippedTicker> {
        self.skipped
            .iter()
            .filter(|s| s.error_kind == ErrorKind::DataIntegrityViolation)
    }
}
