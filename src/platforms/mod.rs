//! External platforms the worker reads from and acts on.
//!
//! The orchestrator only sees the traits; the HTTP adapters wrap a
//! `RateLimitedClient` each, and the mocks back tests.

pub mod forum;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod social;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Profile, Sample};
use crate::error::Result;

pub use forum::ForumClient;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockForum, MockSocial};
pub use social::SocialClient;

/// A post returned by a search, with its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
    pub author: Profile,
}

/// A direct message or inbox item addressed to us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Platform account id of the sender
    pub sender_id: String,
    pub text: String,
}

/// Result of a write call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sent {
    /// Platform id of whatever was created, when the platform returns one
    pub id: Option<String>,
}

/// Social search and messaging API.
#[async_trait]
pub trait SocialPlatform: Send + Sync {
    /// Recent DM events sent to us, newest first.
    async fn list_dm_events(&self, max: u32) -> Result<Vec<InboundMessage>>;

    async fn send_dm(&self, recipient_id: &str, text: &str) -> Result<Sent>;

    async fn search_posts(&self, query: &str, max: u32) -> Result<Vec<Post>>;

    async fn lookup_user(&self, user_id: &str) -> Result<Profile>;

    async fn recent_posts(&self, user_id: &str, max: u32) -> Result<Vec<Sample>>;

    async fn create_post(&self, text: &str) -> Result<Sent>;
}

/// Forum inbox and search API.
#[async_trait]
pub trait ForumPlatform: Send + Sync {
    async fn list_inbox(&self, max: u32) -> Result<Vec<InboundMessage>>;

    async fn reply(&self, message_id: &str, text: &str) -> Result<Sent>;

    async fn search_posts(&self, query: &str, max: u32) -> Result<Vec<Post>>;

    async fn lookup_user(&self, username: &str) -> Result<Profile>;

    async fn recent_posts(&self, username: &str, max: u32) -> Result<Vec<Sample>>;
}
