//! Scoutr - a periodic, budget-limited outreach worker
//!
//! Each run spends a capped number of platform reads across fixed-priority
//! phases: answering inbound replies, sending queued outreach, discovering
//! and scoring new candidates, and building the next day's queue. Every
//! side-effecting action passes through a persistent reservation ledger so
//! it happens at most once.

pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod http;
pub mod id;
pub mod llm;
pub mod orchestrator;
pub mod platforms;
pub mod queue;
pub mod settings;
pub mod store;

pub use error::{Result, ScoutrError};
