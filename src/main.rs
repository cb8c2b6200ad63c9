use anyhow::Result;

use minute_expansion::config::{Config, LoggingConfig};
use minute_expansion::scope::normalize_tickers;
use minute_expansion::{resolve_scope, Reconciler, ResolvedScope, ScopeSource};

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        logging
            .level
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.with_ansi(false).json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set EXPANSION_CONFIG_PATH or create config/default.toml");
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);

    let window = config.trading_window()?;
    let store = config.store.open();
    tracing::info!(
        store = %store.path().display(),
        window_start = %window.start(),
        window_end = %window.end(),
        max_workers = config.runtime.max_workers,
        "Starting minute expansion"
    );

    // Tickers on the command line take precedence over the control document.
    let cli_tickers = normalize_tickers(std::env::args().skip(1));
    let scope = if !cli_tickers.is_empty() {
        ResolvedScope::explicit(cli_tickers)
    } else {
        match resolve_scope(config.scope.control_path.as_deref(), &store) {
            Ok(scope) => scope,
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve scope, nothing to expand");
                ResolvedScope {
                    tickers: Vec::new(),
                    source: ScopeSource::Default {
                        reason: e.to_string(),
                    },
                }
            }
        }
    };

    let reconciler = Reconciler::new(store, window);
    let report = if config.runtime.max_workers > 1 {
        reconciler
            .run_parallel(&scope, config.runtime.max_workers)
            .await
    } else {
        let worker = reconciler.clone();
        tokio::task::spawn_blocking(move || worker.run(&scope)).await?
    };

    tracing::info!(
        run_id = %report.run_id,
        processed = report.processed.len(),
        skipped = report.skipped.len(),
        inserted = report.total_inserted(),
        corrected = report.total_corrected(),
        "Minute expansion finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
