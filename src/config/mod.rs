//! Configuration system for Scoutr.
//!
//! Two layers:
//! 1. Global config (~/.config/scoutr/scoutr.yml or .scoutr.yml), read once at startup
//! 2. Operator settings row in the database, overlaid per run (see `settings`)
//!
//! Secrets never live in the file; it only names the environment variables
//! that hold them.

pub use self::global::{
    ForumConfig, GlobalConfig, LlmConfig, OAuthConfig, QueriesConfig, SocialConfig, StorageConfig, WorkerConfig,
    secret,
};

mod global;
