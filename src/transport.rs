//! The document-provider seam.
//!
//! Everything that talks to the site goes through [`Transport`]: result
//! cursors fetch pages with it, thumbnails resolve through it, and the client
//! issues its writes on it. [`crate::http_client::Session`] is the real
//! implementation; tests script one.

use std::collections::BTreeMap;

use async_trait::async_trait;
use scraper::Html;

use crate::error::Result;

/// A fetched HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    url: String,
    html: String,
}

impl Document {
    #[must_use]
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// The URL the page was fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Parse into a DOM for selector queries.
    ///
    /// `Html` is not `Send`; parse after the last `.await` that needs it.
    #[must_use]
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Query parameters for a page request.
///
/// Keys set without a value are left out entirely, so optional filters can be
/// passed straight through. Ordered by key for stable URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: BTreeMap<String, String>,
}

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, or remove it when `value` is `None`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) {
        let key = key.into();
        match value {
            Some(v) => {
                self.pairs.insert(key, v.into());
            }
            None => {
                self.pairs.remove(&key);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Encode as `a=1&b=2`.
    #[must_use]
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Form fields for a POST, in submission order.
pub type FormData = Vec<(String, String)>;

/// Fetches pages and submits forms on behalf of the core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` with `params`.
    ///
    /// Fails with [`crate::Error::NotFound`] for missing pages,
    /// [`crate::Error::Http`] for other error statuses and
    /// [`crate::Error::Network`] when the request never completed.
    async fn get(&self, url: &str, params: &QueryParams) -> Result<Document>;

    /// POST `form` to `url` and return the response body.
    async fn post(&self, url: &str, form: &FormData) -> Result<String>;
}
