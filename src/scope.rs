use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ExpansionError, Result};
use crate::store::PriceStore;

#[derive(Debug, Deserialize)]
struct ControlDocument {
    #[serde(default)]
    expansion: Vec<String>,
}

/// How the ticker list for a run was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ScopeSource {
    /// Non-empty list from the control document or the caller.
    Requested,
    /// Every ticker present in raw data.
    Default { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedScope {
    pub tickers: Vec<String>,
    pub source: ScopeSource,
}

impl ResolvedScope {
    pub fn explicit<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tickers: normalize_tickers(tickers),
            source: ScopeSource::Requested,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self.source, ScopeSource::Default { .. })
    }
}

/// Trim and de-duplicate, keeping case and first-seen order.
pub fn normalize_tickers<I, S>(tickers: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for t in tickers {
        let t = t.as_ref().trim().to_string();
        if !t.is_empty() && !out.iter().any(|v| v == &t) {
            out.push(t);
        }
    }
    out
}

/// Read the `expansion` list from the control document.
pub fn load_control_tickers(path: &Path) -> Result<Vec<String>> {
    let payload = std::fs::read_to_string(path).map_err(|e| {
        ExpansionError::Configuration(format!("failed to read {}: {}", path.display(), e))
    })?;
    let doc: ControlDocument = serde_json::from_str(&payload).map_err(|e| {
        ExpansionError::Configuration(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok(normalize_tickers(doc.expansion))
}

/// Pick the tickers for a run. Control document problems never abort:
/// they are logged and the run falls back to every ticker in raw data.
pub fn resolve_scope<S: PriceStore + ?Sized>(
    control_path: Option<&Path>,
    store: &S,
) -> Result<ResolvedScope> {
    let reason = match control_path {
        None => "no control document configured".to_string(),
        Some(path) => match load_control_tickers(path) {
            Ok(tickers) if !tickers.is_empty() => {
                tracing::info!(
                    path = %path.display(),
                    count = tickers.len(),
                    "Using requested expansion scope"
                );
                return Ok(ResolvedScope {
                    tickers,
                    source: ScopeSource::Requested,
                });
            }
            Ok(_) => format!("{} lists no tickers", path.display()),
            Err(e) => {
                tracing::warn!(error = %e, "Control document unusable, expanding every ticker");
                e.to_string()
            }
        },
    };

    // A fresh store has no tables yet; that is an empty scope, not a failure.
    store.ensure_indexes()?;
    let tickers = store.distinct_tickers()?;
    tracing::info!(count = tickers.len(), reason = %reason, "Using default expansion scope");
    Ok(ResolvedScope {
        tickers,
        source: ScopeSource::Default { reason },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_dedups_keeping_case() {
        assert_eq!(
            normalize_tickers(["aapl", " MSFT ", "AAPL", "  ", "aapl"]),
            vec!["aapl".to_string(), "MSFT".to_string(), "AAPL".to_string()]
        );
    }

    #[test]
    fn explicit_scope_is_requested() {
        let scope = ResolvedScope::explicit(vec![" BRK.b ".to_string()]);
        assert_eq!(scope.tickers, vec!["BRK.b".to_string()]);
        assert!(!scope.is_default());
    }

    #[test]
    fn missing_control_document_is_configuration_error() {
        let path = std::env::temp_dir().join("mx-scope-definitely-missing.json");
        let err = load_control_tickers(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
