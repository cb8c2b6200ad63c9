//! Gap resolution for one (ticker, day).
//!
//! Every minute of the trading window is resolved against the observed bars:
//! an exact timestamp match is copied verbatim, anything else becomes a flat
//! bar carrying the close of the latest observation strictly before it. With
//! no earlier observation at all the fill value is `0.0`.

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{ExpandedPricePoint, RawPricePoint};
use crate::window::TradingWindow;

/// Fill value used when a ticker has no observation before a missing minute.
pub const NO_PRIOR_CLOSE_FILL: f64 = 0.0;

/// Build the dense series for `day`.
///
/// `raw` holds the ticker's observed bars inside the window (any order).
/// `prior_close` is the close of the latest bar strictly before the window
/// start, possibly from an earlier day.
pub fn reconcile_day(
    ticker: &str,
    day: NaiveDate,
    window: &TradingWindow,
    prior_close: Option<f64>,
    raw: &[RawPricePoint],
    run_at: DateTime<Utc>,
) -> Vec<ExpandedPricePoint> {
    let mut observed: Vec<&RawPricePoint> = raw.iter().collect();
    observed.sort_by_key(|p| p.timestamp);

    let mut out = Vec::with_capacity(window.minutes_per_day());
    let mut last_close = prior_close;
    let mut cursor = 0;

    for minute in window.minutes(day) {
        // Fold in everything strictly before this minute, including
        // bars that are off the minute grid.
        while cursor < observed.len() && observed[cursor].timestamp < minute {
            last_close = Some(observed[cursor].close);
            cursor += 1;
        }

        match observed.get(cursor).filter(|p| p.timestamp == minute) {
            Some(hit) => out.push(ExpandedPricePoint::observed(hit)),
            None => out.push(ExpandedPricePoint::synthesized(
                ticker,
                minute,
                last_close.unwrap_or(NO_PRIOR_CLOSE_FILL),
                run_at,
            )),
        }
    }

    out
}
