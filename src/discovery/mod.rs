//! Discovery: the query catalog, per-query yield, and adaptive selection.

pub mod catalog;
pub mod selector;
pub mod yield_tracker;

pub use catalog::{DiscoveryQuery, QueryCatalog, QueryPool};
pub use selector::{PoolDebug, ScoredQuery, Selection, SelectionDebug, SelectionMode, select};
pub use yield_tracker::{QueryYield, compute_yield};
