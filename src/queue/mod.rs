//! Daily outreach queue.

mod builder;

pub use builder::{Pick, QueuePolicy, UNCATEGORIZED, build, exploration_rank};
