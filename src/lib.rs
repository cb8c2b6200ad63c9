pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod report;
pub mod scope;
pub mod store;
pub mod window;

pub use engine::Reconciler;
pub use error::{ErrorKind, ExpansionError};
pub use report::ExpansionReport;
pub use scope::{resolve_scope, ResolvedScope, ScopeSource};
pub use store::{PriceStore, SqliteStore};
pub use window::TradingWindow;
