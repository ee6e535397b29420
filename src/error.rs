//! Error types shared by every component of the crate.
//!
//! All core components are fail-closed: an operation either returns a fully
//! correct value or one of these conditions, never a partial result.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the rate limiters, the comment tree builder, result
/// cursors, lazy references and the authenticated client.
#[derive(Error, Debug)]
pub enum Error {
    /// A limiter's budget for the current window is spent.
    ///
    /// Recoverable: retry after `remaining`.
    #[error("ratelimited, please try again in {:.1}s", remaining.as_secs_f64())]
    RateLimited { remaining: Duration },

    /// Cursor navigation outside `1..=total_pages`. Never clamped.
    #[error("page {requested} is out of range, pick a page between 1 and {total_pages}")]
    OutOfRange { requested: u32, total_pages: u32 },

    /// A reply with no eligible parent earlier in the sequence.
    #[error("comment {id} at position {position} has depth {depth} but no parent to attach to")]
    MalformedComment {
        id: u64,
        depth: u8,
        position: usize,
    },

    /// The target of a token-gated write is gone from its page.
    #[error("comment or review {id} no longer exists on {url}")]
    StaleReference { id: u64, url: String },

    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote service answered without the documented success phrase.
    #[error("{action} was rejected: {message}")]
    ActionRejected {
        action: &'static str,
        message: String,
    },

    /// The remote service flagged the request as an error.
    #[error("moddb error: {0}")]
    Remote(String),

    #[error("{url} is still awaiting authorisation and cannot be parsed")]
    AwaitingAuthorisation { url: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Whether waiting and retrying may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network(_))
    }

    /// Time to wait before retrying, if the error carries one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { remaining } => Some(*remaining),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
