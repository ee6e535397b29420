//! Resumable, re-sortable result cursors.
//!
//! Listing pages (search results, a mod's files, a page's comments) are split
//! into numbered pages. A [`ResultList`] is an immutable snapshot of one of
//! them together with the URL and filters that produced it; moving to another
//! page or changing the sort order fetches a new snapshot with the same
//! filters.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use moddb::pagination::{ListingFetcher, ResultList, SortDirection};
//! use moddb::transport::QueryParams;
//! use moddb::{extract, Session, Thumbnail};
//!
//! # async fn example() -> moddb::Result<()> {
//! let session = Arc::new(Session::new()?);
//! let fetcher = Arc::new(ListingFetcher::new(session, extract::parse_results));
//! let params = QueryParams::new().with("filter", Some("t")).with("kw", Some("portal"));
//!
//! let mods: ResultList<Thumbnail> = ResultList::first(fetcher, "https://www.moddb.com/mods", params).await?;
//! let newest = mods.resort("dateup", SortDirection::Desc).await?;
//! let page_two = newest.next_page().await?;
//! println!("{}/{}", page_two.current_page(), page_two.total_pages());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::transport::{Document, QueryParams, Transport};

/// Query parameter holding `"{key}-{direction}"`.
pub const SORT_PARAM: &str = "sort";

/// One page of results as returned by a fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based.
    pub current_page: u32,
    /// 0 for an empty result set.
    pub total_pages: u32,
    pub total_results: u64,
}

impl<T> Page<T> {
    /// A page holding every result of a query that fits on one page.
    #[must_use]
    pub fn single(items: Vec<T>) -> Self {
        let total_results = items.len() as u64;
        Self {
            items,
            current_page: 1,
            total_pages: u32::from(total_results > 0),
            total_results,
        }
    }
}

/// Fetches page `page` of the listing at `url`.
#[async_trait]
pub trait PageFetcher<T: Send + 'static>: Send + Sync {
    async fn fetch_page(&self, url: &str, page: u32, params: &QueryParams) -> Result<Page<T>>;
}

/// Parser from a fetched listing page; receives the configured page size.
pub type ListingParser<T> = fn(&Document, u32) -> Result<Page<T>>;

/// [`PageFetcher`] over a [`Transport`], using the site's
/// `"{url}/page/{n}"` convention.
pub struct ListingFetcher<T> {
    transport: Arc<dyn Transport>,
    parse: ListingParser<T>,
    per_page: u32,
}

impl<T> ListingFetcher<T> {
    pub fn new(transport: Arc<dyn Transport>, parse: ListingParser<T>) -> Self {
        Self {
            transport,
            parse,
            per_page: 30,
        }
    }

    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }
}

/// Page URL for page `page` of the listing at `url`.
pub fn page_url(url: &str, page: u32) -> String {
    format!("{}/page/{page}", url.trim_end_matches('/'))
}

#[async_trait]
impl<T: Send + 'static> PageFetcher<T> for ListingFetcher<T> {
    async fn fetch_page(&self, url: &str, page: u32, params: &QueryParams) -> Result<Page<T>> {
        let document = self.transport.get(&page_url(url, page), params).await?;
        (self.parse)(&document, self.per_page)
    }
}

/// Sort order for [`ResultList::resort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Value of the sort parameter for `key` in `direction`, e.g. `dateup-desc`.
pub fn sort_value(key: &str, direction: SortDirection) -> String {
    format!("{key}-{direction}")
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of a filtered, sorted query.
///
/// Never mutated: every navigation method fetches exactly one page and
/// returns a new cursor carrying the same base URL and (except for
/// [`ResultList::resort`]) the same parameters.
pub struct ResultList<T: Send + 'static> {
    page: Page<T>,
    base_url: String,
    params: QueryParams,
    fetcher: Arc<dyn PageFetcher<T>>,
}

impl<T: Send + 'static> ResultList<T> {
    pub fn new(
        page: Page<T>,
        base_url: impl Into<String>,
        params: QueryParams,
        fetcher: Arc<dyn PageFetcher<T>>,
    ) -> Self {
        Self {
            page,
            base_url: base_url.into(),
            params,
            fetcher,
        }
    }

    /// Run a query and return its first page.
    pub async fn first(
        fetcher: Arc<dyn PageFetcher<T>>,
        base_url: impl Into<String>,
        params: QueryParams,
    ) -> Result<Self> {
        Self::at(fetcher, base_url, params, 1).await
    }

    /// Run a query and return page `page` with a single fetch.
    ///
    /// The page count is unknown until something was fetched, so only page 0
    /// is refused up front.
    pub async fn at(
        fetcher: Arc<dyn PageFetcher<T>>,
        base_url: impl Into<String>,
        params: QueryParams,
        page: u32,
    ) -> Result<Self> {
        if page == 0 {
            return Err(Error::OutOfRange {
                requested: 0,
                total_pages: 0,
            });
        }
        let base_url = base_url.into();
        let fetched = fetcher.fetch_page(&base_url, page, &params).await?;
        Ok(Self::new(fetched, base_url, params, fetcher))
    }

    pub fn items(&self) -> &[T] {
        &self.page.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.page.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.page.items.iter()
    }

    pub fn len(&self) -> usize {
        self.page.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.page.items.is_empty()
    }

    pub fn current_page(&self) -> u32 {
        self.page.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.page.total_pages
    }

    pub fn total_results(&self) -> u64 {
        self.page.total_results
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    pub fn has_next(&self) -> bool {
        self.page.current_page < self.page.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page.current_page > 1
    }

    /// The following page.
    pub async fn next_page(&self) -> Result<Self> {
        if !self.has_next() {
            return Err(Error::OutOfRange {
                requested: self.page.current_page.saturating_add(1),
                total_pages: self.page.total_pages,
            });
        }
        self.fetch(self.page.current_page + 1, self.params.clone())
            .await
    }

    /// The preceding page.
    pub async fn previous_page(&self) -> Result<Self> {
        if !self.has_previous() {
            return Err(Error::OutOfRange {
                requested: self.page.current_page.saturating_sub(1),
                total_pages: self.page.total_pages,
            });
        }
        self.fetch(self.page.current_page - 1, self.params.clone())
            .await
    }

    /// Any page in `1..=total_pages`.
    pub async fn jump_to(&self, page: u32) -> Result<Self> {
        if page < 1 || page > self.page.total_pages {
            return Err(Error::OutOfRange {
                requested: page,
                total_pages: self.page.total_pages,
            });
        }
        self.fetch(page, self.params.clone()).await
    }

    /// The same query sorted by `key`, starting over at page 1.
    ///
    /// Every other filter is carried over unchanged.
    pub async fn resort(&self, key: &str, direction: SortDirection) -> Result<Self> {
        let params = self
            .params
            .clone()
            .with(SORT_PARAM, Some(sort_value(key, direction)));
        self.fetch(1, params).await
    }

    /// Every result of the query, walking from page 1 to the last page.
    ///
    /// Results can shift between pages while walking; duplicates are dropped
    /// by `key`, keeping the first occurrence. Costs one fetch per page.
    #[instrument(skip_all, fields(url = %self.base_url))]
    pub async fn all_results<K, F>(&self, key: F) -> Result<Vec<T>>
    where
        K: Eq + Hash,
        F: Fn(&T) -> K,
    {
        if self.page.total_pages == 0 {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let mut cursor = self.jump_to(1).await?;
        loop {
            for item in std::mem::take(&mut cursor.page.items) {
                if seen.insert(key(&item)) {
                    results.push(item);
                }
            }
            info!(
                page = cursor.current_page(),
                total = cursor.total_pages(),
                "collected page"
            );
            if !cursor.has_next() {
                break;
            }
            cursor = cursor.next_page().await?;
        }
        Ok(results)
    }

    async fn fetch(&self, page: u32, params: QueryParams) -> Result<Self> {
        debug!(url = %self.base_url, page, params = %params.encode(), "fetching result page");
        let fetched = self
            .fetcher
            .fetch_page(&self.base_url, page, &params)
            .await?;
        Ok(Self {
            page: fetched,
            base_url: self.base_url.clone(),
            params,
            fetcher: Arc::clone(&self.fetcher),
        })
    }
}

impl<T: Send + Clone + 'static> Clone for ResultList<T> {
    fn clone(&self) -> Self {
        Self {
            page: self.page.clone(),
            base_url: self.base_url.clone(),
            params: self.params.clone(),
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<T: Send + fmt::Debug + 'static> fmt::Debug for ResultList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultList")
            .field("current_page", &self.page.current_page)
            .field("total_pages", &self.page.total_pages)
            .field("total_results", &self.page.total_results)
            .field("base_url", &self.base_url)
            .field("params", &self.params)
            .field("items", &self.page.items)
            .finish_non_exhaustive()
    }
}

impl<'a, T: Send + 'static> IntoIterator for &'a ResultList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
