use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};

use minute_expansion::model::{ExpandedPricePoint, RawPricePoint};
use minute_expansion::{PriceStore, Reconciler, ResolvedScope, SqliteStore, TradingWindow};

fn temp_store(test_name: &str) -> SqliteStore {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be monotonic")
        .as_nanos();
    SqliteStore::new(std::env::temp_dir().join(format!("mx-{}-{}.sqlite", test_name, ts)))
}

fn bar(ticker: &str, ts: DateTime<Utc>, close: f64) -> RawPricePoint {
    RawPricePoint {
        ticker: ticker.to_string(),
        timestamp: ts,
        open: close - 0.5,
        high: close + 0.5,
        low: close - 1.0,
        close,
        volume: 300,
        trade_count: 12,
        vwap: close - 0.1,
    }
}

fn minute(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn expanded_day(store: &SqliteStore, ticker: &str, d: u32) -> Vec<ExpandedPricePoint> {
    let (start, end) = TradingWindow::default().bounds(day(d));
    store.expanded_between(ticker, start, end).unwrap()
}

fn find(rows: &[ExpandedPricePoint], h: u32, m: u32) -> &ExpandedPricePoint {
    rows.iter()
        .find(|r| r.timestamp.hour() == h && r.timestamp.minute() == m)
        .expect("minute should be expanded")
}

#[test]
/// Verifies completeness: every active (ticker, day) gets exactly one row per
/// minute from 04:00 to 20:00 inclusive.
fn every_active_day_has_961_minutes() {
    let store = temp_store("completeness");
    store
        .insert_raw(&[
            bar("AAPL", minute(4, 9, 30), 100.0),
            bar("AAPL", minute(5, 15, 0), 101.0),
            bar("MSFT", minute(4, 4, 0), 50.0),
        ])
        .unwrap();

    let reconciler = Reconciler::new(store.clone(), TradingWindow::default());
    let report = reconciler.run(&ResolvedScope::explicit(["AAPL", "MSFT"]));

    assert!(report.is_clean());
    assert_eq!(expanded_day(&store, "AAPL", 4).len(), 961);
    assert_eq!(expanded_day(&store, "AAPL", 5).len(), 961);
    assert_eq!(expanded_day(&store, "MSFT", 4).len(), 961);
    assert_eq!(store.count_expanded("AAPL").unwrap(), 2 * 961);
    assert_eq!(store.count_expanded("MSFT").unwrap(), 961);
    assert_eq!(report.total_inserted(), 3 * 961);
}

#[test]
/// Verifies fill correctness: gaps carry the previous close on all price
/// fields with zero activity, both between and after observed bars.
fn gaps_forward_fill_previous_close() {
    let store = temp_store("fill");
    store
        .insert_raw(&[
            bar("AAPL", minute(4, 9, 30), 100.0),
            bar("AAPL", minute(4, 9, 35), 105.0),
        ])
        .unwrap();

    let reconciler = Reconciler::new(store.clone(), TradingWindow::default());
    reconciler.run(&ResolvedScope::explicit(["AAPL"]));
    let rows = expanded_day(&store, "AAPL", 4);

    let gap = find(&rows, 9, 32);
    assert!(gap.imputed);
    for v in [gap.open, gap.high, gap.low, gap.close] {
        assert!((v - 100.0).abs() < f64::EPSILON);
    }
    assert_eq!(gap.volume, 0);
    assert_eq!(gap.trade_count, 0);
    assert!((gap.vwap - 0.0).abs() < f64::EPSILON);
    assert!(gap.created_at.is_some());

    let tail = find(&rows, 9, 40);
    assert!(tail.imputed);
    assert!((tail.close - 105.0).abs() < f64::EPSILON);

    let real = find(&rows, 9, 35);
    assert!(!real.imputed);
    assert_eq!(real.volume, 300);
    assert!((real.open - 104.5).abs() < f64::EPSILON);
    assert!((real.vwap - 104.9).abs() < 1e-9);
}

#[test]
/// Verifies the no-data default: minutes before the first bar in a ticker's
/// history are zero, while the next day starts from the previous day's close.
fn first_day_defaults_to_zero_and_next_day_carries_over() {
    let store = temp_store("no-data");
    store
        .insert_raw(&[
            bar("TSLA", minute(4, 10, 0), 200.0),
            bar("TSLA", minute(4, 19, 0), 210.0),
            bar("TSLA", minute(5, 12, 0), 220.0),
        ])
        .unwrap();

    let reconciler = Reconciler::new(store.clone(), TradingWindow::default());
    reconciler.run(&ResolvedScope::explicit(["TSLA"]));

    let first = expanded_day(&store, "TSLA", 4);
    let before = first
        .iter()
        .filter(|r| r.timestamp < minute(4, 10, 0))
        .collect::<Vec<_>>();
    assert_eq!(before.len(), 6 * 60);
    assert!(before
        .iter()
        .all(|r| r.imputed && r.open == 0.0 && r.high == 0.0 && r.low == 0.0 && r.close == 0.0));

    let second = expanded_day(&store, "TSLA", 5);
    assert!((find(&second, 4, 0).close - 210.0).abs() < f64::EPSILON);
    assert!((find(&second, 13, 0).close - 220.0).abs() < f64::EPSILON);
}

#[test]
/// Verifies day skipping: calendar days without raw bars produce no rows.
fn inactive_days_are_not_expanded() {
    let store = temp_store("skip-days");
    store
        .insert_raw(&[
            bar("AAPL", minute(4, 9, 30), 100.0),
            bar("AAPL", minute(6, 9, 30), 102.0),
        ])
        .unwrap();

    let reconciler = Reconciler::new(store.clone(), TradingWindow::default());
    let report = reconciler.run(&ResolvedScope::explicit(["AAPL"]));

    assert!(expanded_day(&store, "AAPL", 5).is_empty());
    assert_eq!(store.count_expanded("AAPL").unwrap(), 2 * 961);
    let days: Vec<_> = report
        .outcome("AAPL")
        .expect("AAPL should be processed")
        .days
        .iter()
        .map(|d| d.day)
        .collect();
    assert_eq!(days, vec![day(4), day(6)]);
}

#[test]
/// Verifies idempotence: a second run over the same scope inserts nothing and
/// leaves the row count unchanged.
fn rerun_is_idempotent() {
    let store = temp_store("idempotent");
    store
        .insert_raw(&[
            bar("AAPL", minute(4, 9, 30), 100.0),
            bar("AAPL", minute(4, 16, 0), 99.0),
        ])
        .unwrap();

    let reconciler = Reconciler::new(store.clone(), TradingWindow::default());
    let scope = ResolvedScope::explicit(["AAPL"]);
    let first = reconciler.run(&scope);
    let before = store.count_expanded("AAPL").unwrap();
    let snapshot = expanded_day(&store, "AAPL", 4);

    let second = reconciler.run(&scope);
    assert_eq!(first.total_inserted(), 961);
    assert_eq!(second.total_inserted(), 0);
    assert_eq!(second.total_corrected(), 0);
    assert_eq!(store.count_expanded("AAPL").unwrap(), before);

    let again = expanded_day(&store, "AAPL", 4);
    assert_eq!(again.len(), snapshot.len());
    for (a, b) in snapshot.iter().zip(again.iter()) {
        assert_eq!(a.imputed, b.imputed);
        assert_eq!(a.created_at, b.created_at);
        assert!((a.close - b.close).abs() < f64::EPSILON);
    }
}

#[test]
/// Verifies correction-on-backfill: a minute first imputed is updated in place
/// to the observed bar once raw data lands, and later fills follow it.
fn backfilled_minute_is_corrected_in_place() {
    let store = temp_store("backfill");
    store
        .insert_raw(&[bar("AAPL", minute(4, 9, 30), 100.0)])
        .unwrap();

    let reconciler = Reconciler::new(store.clone(), TradingWindow::default());
    let scope = ResolvedScope::explicit(["AAPL"]);
    reconciler.run(&scope);

    let rows = expanded_day(&store, "AAPL", 4);
    let original = find(&rows, 9, 45).clone();
    assert!(original.imputed);
    assert!((original.close - 100.0).abs() < f64::EPSILON);

    store
        .insert_raw(&[bar("AAPL", minute(4, 9, 45), 111.0)])
        .unwrap();
    let report = reconciler.run(&scope);

    assert_eq!(report.total_inserted(), 0);
    assert_eq!(report.total_corrected(), 1);
    assert_eq!(store.count_expanded("AAPL").unwrap(), 961);

    let rows = expanded_day(&store, "AAPL", 4);
    let corrected = find(&rows, 9, 45);
    assert!(!corrected.imputed);
    assert!((corrected.close - 111.0).abs() < f64::EPSILON);
    assert_eq!(corrected.volume, 300);
    assert_eq!(corrected.created_at, original.created_at);
    assert!((find(&rows, 9, 46).close - 111.0).abs() < f64::EPSILON);
    assert!(find(&rows, 9, 46).imputed);
}

#[test]
/// Verifies a ticker without raw bars is processed with no days and no rows.
fn ticker_without_raw_data_produces_nothing() {
    let store = temp_store("empty-ticker");
    store
        .insert_raw(&[bar("AAPL", minute(4, 9, 30), 100.0)])
        .unwrap();

    let reconciler = Reconciler::new(store.clone(), TradingWindow::default());
    let report = reconciler.run(&ResolvedScope::explicit(["NVDA"]));

    assert!(report.is_clean());
    assert!(report.outcome("NVDA").expect("NVDA processed").days.is_empty());
    assert_eq!(store.count_expanded("NVDA").unwrap(), 0);
}

#[test]
/// Verifies a narrower configured window bounds the grid.
fn custom_window_limits_the_grid() {
    let store = temp_store("custom-window");
    store
        .insert_raw(&[bar("AAPL", minute(4, 9, 31), 100.0)])
        .unwrap();

    let window = TradingWindow::parse("09:30", "16:00").unwrap();
    let reconciler = Reconciler::new(store.clone(), window);
    reconciler.run(&ResolvedScope::explicit(["AAPL"]));

    assert_eq!(store.count_expanded("AAPL").unwrap(), 391);
}

#[test]
/// Verifies a bar off the minute grid never matches a grid minute, still
/// feeds later fills, and leaves the day complete.
fn off_grid_bar_feeds_later_fills_only() {
    let store = temp_store("off-grid");
    store
        .insert_raw(&[
            bar("AAPL", minute(4, 9, 30), 100.0),
            bar("AAPL", minute(4, 9, 31) + chrono::Duration::seconds(20), 101.0),
        ])
        .unwrap();

    let reconciler = Reconciler::new(store.clone(), TradingWindow::default());
    let report = reconciler.run(&ResolvedScope::explicit(["AAPL"]));
    assert!(report.is_clean());

    let rows = expanded_day(&store, "AAPL", 4);
    assert_eq!(rows.len(), 961);
    assert!(rows.iter().all(|r| r.timestamp.second() == 0));
    let at_off_grid = find(&rows, 9, 31);
    assert!(at_off_grid.imputed);
    assert!((at_off_grid.close - 100.0).abs() < f64::EPSILON);
    assert!((find(&rows, 9, 32).close - 101.0).abs() < f64::EPSILON);
}
