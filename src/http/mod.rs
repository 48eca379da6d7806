//! Rate-limit-aware HTTP plumbing shared by the platform adapters.

pub mod backoff;
pub mod client;
pub mod token;

pub use backoff::ResetStyle;
pub use client::{ClientConfig, RateLimitInfo, RateLimitedClient};
pub use token::{RefreshTokenSource, StaticToken, TokenSource};

/// Response bodies in errors are cut to this many characters.
pub const MAX_ERROR_BODY_CHARS: usize = 300;
