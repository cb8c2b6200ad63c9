use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::{ExpansionError, Result};
use crate::reconcile::reconcile_day;
use crate::report::{DayOutcome, ExpansionReport, SkippedTicker, TickerOutcome};
use crate::scope::ResolvedScope;
use crate::store::PriceStore;
use crate::window::TradingWindow;

/// Expands raw minute bars into the dense series, one ticker at a time.
pub struct Reconciler<S: PriceStore> {
    store: Arc<S>,
    window: TradingWindow,
}

impl<S: PriceStore> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            window: self.window,
        }
    }
}

impl<S: PriceStore> Reconciler<S> {
    pub fn new(store: S, window: TradingWindow) -> Self {
        Self {
            store: Arc::new(store),
            window,
        }
    }

    pub fn expand_day(
        &self,
        ticker: &str,
        day: NaiveDate,
        run_at: DateTime<Utc>,
    ) -> Result<DayOutcome> {
        let (start, end) = self.window.bounds(day);
        let raw = self.store.raw_between(ticker, start, end)?;
        let off_grid = raw.iter().filter(|p| !p.is_minute_aligned()).count();
        if off_grid > 0 {
            tracing::debug!(ticker, day = %day, off_grid, "Raw bars off the minute grid");
        }
        let prior_close = self.store.last_close_before(ticker, start)?;
        let rows = reconcile_day(ticker, day, &self.window, prior_close, &raw, run_at);
        let existing = self.store.expanded_flags_between(ticker, start, end)?;

        let mut outcome = DayOutcome {
            day,
            real: 0,
            imputed: 0,
            inserted: 0,
            corrected: 0,
        };
        for row in &rows {
            if row.imputed {
                outcome.imputed += 1;
            } else {
                outcome.real += 1;
            }
            match existing.get(&row.timestamp) {
                None => outcome.inserted += 1,
                Some(true) if !row.imputed => outcome.corrected += 1,
                Some(_) => {}
            }
        }

        self.store.upsert_expanded(&rows)?;

        tracing::debug!(
            ticker,
            day = %day,
            real = outcome.real,
            imputed = outcome.imputed,
            inserted = outcome.inserted,
            corrected = outcome.corrected,
            "Expanded trading day"
        );
        Ok(outcome)
    }

    pub fn expand_ticker(&self, ticker: &str, run_at: DateTime<Utc>) -> Result<TickerOutcome> {
        let days = self.store.trading_days(ticker)?;
        let mut outcomes = Vec::with_capacity(days.len());
        for day in days {
            outcomes.push(self.expand_day(ticker, day, run_at)?);
        }
        let outcome = TickerOutcome {
            ticker: ticker.to_string(),
            days: outcomes,
        };
        tracing::info!(
            ticker,
            days = outcome.days.len(),
            inserted = outcome.inserted(),
            corrected = outcome.corrected(),
            "Expanded ticker"
        );
        Ok(outcome)
    }

    /// Sequential run over `scope`. Never fails: per-ticker errors are
    /// logged and reported as skipped.
    pub fn run(&self, scope: &ResolvedScope) -> ExpansionReport {
        let started_at = Utc::now();
        let mut report = self.empty_report(scope, started_at);

        if let Err(e) = self.store.ensure_indexes() {
            tracing::error!(error = %e, "Failed to prepare store, skipping every ticker");
            report.skipped = skip_all(scope, &e);
            report.finished_at = Utc::now();
            return report;
        }

        for ticker in &scope.tickers {
            record(&mut report, ticker, self.expand_ticker(ticker, started_at));
        }
        report.finished_at = Utc::now();
        report
    }

    fn empty_report(&self, scope: &ResolvedScope, started_at: DateTime<Utc>) -> ExpansionReport {
        ExpansionReport {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: started_at,
            scope_source: scope.source.clone(),
            processed: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<S> Reconciler<S>
where
    S: PriceStore + Send + Sync + 'static,
{
    /// Run tickers on blocking worker tasks, at most `max_workers` at once.
    /// Tickers are reported in scope order.
    pub async fn run_parallel(&self, scope: &ResolvedScope, max_workers: usize) -> ExpansionReport {
        let started_at = Utc::now();
        let mut report = self.empty_report(scope, started_at);

        let store = Arc::clone(&self.store);
        let prepared = tokio::task::spawn_blocking(move || store.ensure_indexes())
            .await
            .map_err(|e| ExpansionError::Worker(e.to_string()))
            .and_then(|r| r);
        if let Err(e) = prepared {
            tracing::error!(error = %e, "Failed to prepare store, skipping every ticker");
            report.skipped = skip_all(scope, &e);
            report.finished_at = Utc::now();
            return report;
        }

        let permits = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut handles = Vec::with_capacity(scope.tickers.len());
        for ticker in &scope.tickers {
            let permits = Arc::clone(&permits);
            let worker = self.clone();
            let ticker = ticker.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ExpansionError::Worker(e.to_string()))?;
                tokio::task::spawn_blocking(move || worker.expand_ticker(&ticker, started_at))
                    .await
                    .map_err(|e| ExpansionError::Worker(e.to_string()))?
            }));
        }

        for (ticker, handle) in scope.tickers.iter().zip(handles) {
            let result = handle
                .await
                .map_err(|e| ExpansionError::Worker(e.to_string()))
                .and_then(|r| r);
            record(&mut report, ticker, result);
        }
        report.finished_at = Utc::now();
        report
    }
}

fn record(report: &mut ExpansionReport, ticker: &str, result: Result<TickerOutcome>) {
    match result {
        Ok(outcome) => report.processed.push(outcome),
        Err(e) => {
            tracing::warn!(ticker, error = %e, "Skipping ticker");
            report.skipped.push(SkippedTicker::new(ticker, &e));
        }
    }
}

fn skip_all(scope: &ResolvedScope, err: &ExpansionError) -> Vec<SkippedTicker> {
    scope
        .tickers
        .iter()
        .map(|t| SkippedTicker::new(t, err))
        .collect()
}
