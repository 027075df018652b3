//! Role matching — embedding-based candidate ranking and best-effort
//! index maintenance.

pub mod engine;
pub mod indexer;

pub use engine::{MIN_RELEVANCE, MatchRequest, RoleMatchingEngine};
pub use indexer::{IndexJob, IndexerConfig, RoleIndexer};
