use anyhow::{bail, Result};

use moddb::pagination::{sort_value, SORT_PARAM};
use moddb::{QueryParams, SortDirection, Thumbnail};

use super::output::{print_json, print_thumbnail, print_thumbnails};
use crate::OutputFormat;

pub struct BrowseQuery {
    pub keyword: Option<String>,
    pub filters: Vec<String>,
    pub sort: Option<String>,
    pub desc: bool,
    pub page: u32,
    pub all: bool,
}

/// Parse `key=value` filter arguments into query parameters.
fn parse_filters(keyword: Option<String>, filters: &[String]) -> Result<QueryParams> {
    let mut params = QueryParams::new().with("kw", keyword);
    if !filters.is_empty() {
        params.set("filter", Some("t"));
    }
    for arg in filters {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("Invalid filter format: '{arg}'. Expected 'key=value'");
        };
        params.set(key, Some(value));
    }
    Ok(params)
}

impl BrowseQuery {
    /// Keyword, filters and sort order as one set of query parameters.
    fn params(&self) -> Result<QueryParams> {
        let mut params = parse_filters(self.keyword.clone(), &self.filters)?;
        if let Some(key) = &self.sort {
            let direction = if self.desc {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            };
            params.set(SORT_PARAM, Some(sort_value(key, direction)));
        }
        Ok(params)
    }
}

pub async fn cmd_browse(url: &str, query: BrowseQuery, format: OutputFormat) -> Result<()> {
    let client = super::client()?;
    let params = query.params()?;
    let page = if query.all { 1 } else { query.page };

    let list = client.browse_page(url, params, page).await?;

    if query.all {
        let items = list
            .all_results(|thumbnail: &Thumbnail| thumbnail.url.clone())
            .await?;
        if format == OutputFormat::Json {
            return print_json(1, list.total_pages(), items.len() as u64, &items);
        }
        for thumbnail in &items {
            print_thumbnail(thumbnail);
        }
        println!("\n({} results)", items.len());
        return Ok(());
    }

    print_thumbnails(&list, format)
}
