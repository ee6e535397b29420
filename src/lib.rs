//! `moddb` - typed access to the ModDB content site
//!
//! # Features
//!
//! - **Rate limiting**: fixed-window budgets that block or fail fast, shared by
//!   every request a session sends
//! - **Threaded comments**: flat comment pages rebuilt into reply trees
//! - **Result cursors**: immutable, re-sortable pages of a filtered listing
//! - **Lazy references**: thumbnails resolved into full pages on demand
//! - **Write actions**: follow, vote, comment, review, friend, tag and
//!   private message actions with their success confirmed against the
//!   site's reply
//! - **Inbox**: followed-page updates, friend requests and message threads
//!
//! # Example
//!
//! ```rust,no_run
//! use moddb::{Client, ClientConfig, QueryParams};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::from_config(&ClientConfig::load()?)?;
//!     let mods = client
//!         .browse("https://www.moddb.com/mods", QueryParams::new().with("kw", Some("portal")))
//!         .await?;
//!     for thumbnail in mods.iter() {
//!         println!("{thumbnail}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod comments;
pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod form;
pub mod http_client;
pub mod messages;
pub mod pagination;
pub mod ratelimit;
pub mod thumbnail;
pub mod transport;

pub use auth::Credentials;
pub use client::{Client, PageRef, ReviewDraft, ReviewRef, TagRef};
pub use comments::{build_tree, Comment, CommentRecord, Score};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use http_client::Session;
pub use messages::{FriendRequest, Thread, ThreadQuery, ThreadThumbnail, Update, WatchType};
pub use pagination::{Page, PageFetcher, ResultList, SortDirection};
pub use ratelimit::{LimitMode, Limiters, RateLimiter};
pub use thumbnail::{Thumbnail, ThumbnailType};
pub use transport::{Document, FormData, QueryParams, Transport};

/// Version of moddb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
