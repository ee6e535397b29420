//! The slice of page extraction the core needs.
//!
//! Reads listing statistics, result rows, comment rows and delete tokens out
//! of fetched pages. Everything else about a page's layout is left to callers.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, info};

use crate::comments::{build_tree, Comment, CommentRecord, Score};
use crate::error::{Error, Result};
use crate::pagination::{page_url, Page};
use crate::thumbnail::{Thumbnail, ThumbnailType};
use crate::transport::Document;

/// "(31 - 60 of 1,234)" in a listing heading.
#[allow(clippy::expect_used)]
static LIST_STATS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([0-9,]+) - ([0-9,]+) of ([0-9,]+)\)").expect("list stats regex is valid")
});

#[allow(clippy::expect_used)]
static SIGNED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+-]?[0-9][0-9,]*").expect("number regex is valid"));

#[allow(clippy::expect_used)]
static HASH_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"hash=([^&]+)").expect("hash regex is valid"));

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("selector {css:?}: {e:?}")))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first<'a>(element: ElementRef<'a>, sel: &Selector) -> Option<ElementRef<'a>> {
    element.select(sel).next()
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Resolve a possibly relative link against the page it appeared on.
pub fn join(base: &str, href: &str) -> Result<String> {
    let base = url::Url::parse(base)?;
    Ok(base.join(href)?.to_string())
}

/// Parse the site's timestamps: full RFC 3339, `YYYY-MM-DD` or `YYYY-MM`.
/// Date-only values land on midnight UTC.
pub fn parse_date(value: &str) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date);
    }

    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d"))
        .map_err(|_| Error::Parse(format!("unrecognised date {value:?}")))?;

    let midnight: NaiveDateTime = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::Parse(format!("unrecognised date {value:?}")))?;
    Ok(midnight.and_utc().fixed_offset())
}

fn parse_number(value: &str) -> Option<u64> {
    value.replace(',', "").parse().ok()
}

/// Current page, total pages and total results from a listing heading.
///
/// Returns `None` when the heading has no "(a - b of n)" suffix, which the
/// site omits when everything fits on one page.
pub fn list_stats(heading: &str, per_page: u32) -> Option<(u32, u32, u64)> {
    let caps = LIST_STATS.captures(heading)?;
    let last_shown = parse_number(&caps[2])?;
    let total_results = parse_number(&caps[3])?;
    let per_page = u64::from(per_page.max(1));

    let total_pages = u32::try_from(total_results.div_ceil(per_page)).ok()?;
    let current_page = u32::try_from(last_shown.div_ceil(per_page)).ok()?;
    Some((current_page.max(1), total_pages, total_results))
}

fn box_stats(container: ElementRef<'_>, per_page: u32, shown: usize) -> Result<(u32, u32, u64)> {
    let heading_sel = selector("div.normalcorner div.title span.heading")?;
    let heading = first(container, &heading_sel).map(text_of).unwrap_or_default();
    Ok(list_stats(&heading, per_page).unwrap_or_else(|| {
        let shown = shown as u64;
        (1, u32::from(shown > 0), shown)
    }))
}

/// Parse a browse/search listing into thumbnails.
///
/// Pages without a result box are an empty result set.
pub fn parse_results(document: &Document, per_page: u32) -> Result<Page<Thumbnail>> {
    let html = document.parse();
    let box_sel = selector("div.normalbox.browsebox")?;
    let row_sel = selector("div.inner div.table div.rowcontent")?;
    let link_sel = selector("a[href]")?;
    let img_sel = selector("img")?;
    let time_sel = selector("time")?;
    let summary_sel = selector("p")?;

    let Some(result_box) = html.select(&box_sel).next() else {
        debug!(url = document.url(), "no result box");
        return Ok(Page::single(Vec::new()));
    };

    let mut items = Vec::new();
    for row in result_box.select(&row_sel) {
        let Some(link) = first(row, &link_sel) else {
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default();
        let url = join(document.url(), href)?;
        let name = link
            .value()
            .attr("title")
            .map_or_else(|| text_of(link), str::to_string);

        let image = first(link, &img_sel)
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);
        let summary = first(row, &summary_sel).map(text_of).filter(|s| !s.is_empty());
        let date = first(row, &time_sel)
            .filter(|t| text_of(*t) != "TBD")
            .and_then(|t| t.value().attr("datetime"))
            .and_then(|d| parse_date(d).ok());

        let kind = ThumbnailType::from_url(&url)?;
        items.push(
            Thumbnail::new(name, url, kind)
                .with_image(image)
                .with_summary(summary)
                .with_date(date),
        );
    }

    let (current_page, total_pages, total_results) =
        box_stats(result_box, per_page, items.len())?;
    Ok(Page {
        items,
        current_page,
        total_pages,
        total_results,
    })
}

/// The canonical URL of the page a comment section belongs to.
fn canonical_url(html: &Html, document: &Document) -> Result<String> {
    let og_sel = selector(r#"meta[property="og:url"]"#)?;
    let main_sel = selector(r#"a[itemprop="mainEntityOfPage"]"#)?;

    if let Some(content) = html
        .select(&og_sel)
        .next()
        .and_then(|m| m.value().attr("content"))
    {
        return Ok(content.to_string());
    }
    if let Some(href) = html
        .select(&main_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
    {
        return join(document.url(), href);
    }
    Ok(strip_page_suffix(document.url()).to_string())
}

/// Drop a trailing `/page/{n}` so the URL names the page itself.
pub(crate) fn strip_page_suffix(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    let Some((rest, number)) = trimmed.rsplit_once('/') else {
        return url;
    };
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return url;
    }
    rest.strip_suffix("/page").unwrap_or(url)
}

fn parse_comment_row(
    row: ElementRef<'_>,
    position: usize,
    document: &Document,
    source_url: &str,
) -> Result<CommentRecord> {
    let avatar_sel = selector("a.avatar")?;
    let img_sel = selector("img")?;
    let time_sel = selector("time")?;
    let body_sel = selector("div.comment")?;
    let actions_sel = selector("span.actions")?;
    let span_sel = selector("span")?;
    let link_sel = selector("a")?;
    let iframe_sel = selector("iframe")?;
    let related_sel = selector("a.related")?;
    let token_sel = selector(r#"a[title="Delete"], a[title="Undelete"]"#)?;
    let developer_sel = selector("span.developer")?;
    let staff_sel = selector("span.staff")?;
    let subscriber_sel = selector("span.subscriber")?;

    let id: u64 = row
        .value()
        .attr("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| Error::Parse(format!("comment row {position} has no numeric id")))?;

    let depth = if has_class(row, "reply2") {
        2
    } else if has_class(row, "reply1") {
        1
    } else {
        0
    };

    let avatar = first(row, &avatar_sel)
        .ok_or_else(|| Error::Parse(format!("comment {id} has no author")))?;
    let author_url = join(document.url(), avatar.value().attr("href").unwrap_or_default())?;
    let author_name = avatar.value().attr("title").unwrap_or_default().to_string();
    let author_image = first(avatar, &img_sel)
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);
    let guest = author_name.eq_ignore_ascii_case("guest");
    let author = Thumbnail::new(author_name, author_url, ThumbnailType::Member).with_image(author_image);

    let date = first(row, &time_sel)
        .and_then(|t| t.value().attr("datetime"))
        .ok_or_else(|| Error::Parse(format!("comment {id} has no timestamp")))
        .and_then(parse_date)?;

    let content = first(row, &body_sel).map(text_of);
    if content.is_none() {
        info!(id, "comment has no content, likely embed");
    }

    // Karma and vote links only render for approved comments.
    let (score, upvote, downvote, approved) = match first(row, &actions_sel) {
        Some(actions) => {
            let net = first(actions, &span_sel)
                .map(text_of)
                .and_then(|karma| {
                    SIGNED_NUMBER
                        .find(&karma)
                        .and_then(|m| m.as_str().replace(',', "").parse::<i64>().ok())
                })
                .unwrap_or(0);
            let links: Vec<_> = actions.select(&link_sel).collect();
            let vote = |i: usize| -> Result<Option<String>> {
                links
                    .get(i)
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| join(document.url(), href))
                    .transpose()
            };
            let score = Score {
                net,
                ..Score::default()
            };
            (score, vote(1)?, vote(2)?, true)
        }
        None => (Score::default(), None, None, false),
    };

    let embeds = row
        .select(&iframe_sel)
        .filter_map(|f| f.value().attr("src"))
        .map(str::to_string)
        .collect();

    let location = match first(row, &related_sel) {
        Some(link) => {
            let url = join(document.url(), link.value().attr("href").unwrap_or_default())?;
            let kind = ThumbnailType::from_url(&url)?;
            Some(Thumbnail::new(text_of(link), url, kind))
        }
        None => None,
    };

    let delete_token = first(row, &token_sel)
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| href.rsplit('=').next())
        .filter(|hash| !hash.is_empty())
        .map(str::to_string);

    Ok(CommentRecord {
        id,
        author,
        content,
        date,
        score,
        depth,
        position,
        approved,
        developer: first(row, &developer_sel).is_some(),
        staff: first(row, &staff_sel).is_some(),
        subscriber: first(row, &subscriber_sel).is_some(),
        guest,
        embeds,
        upvote,
        downvote,
        delete_token,
        source_url: Some(source_url.to_string()),
        location,
    })
}

/// Read the flat comment sequence of a page, with its list statistics.
pub fn parse_comment_records(
    document: &Document,
    per_page: u32,
) -> Result<Page<CommentRecord>> {
    let html = document.parse();
    let box_sel = selector("div#comments")?;
    let row_sel = selector("div.tablecomments > div.row")?;

    let Some(comment_box) = html.select(&box_sel).next() else {
        return Ok(Page::single(Vec::new()));
    };

    let rows: Vec<_> = comment_box.select(&row_sel).collect();
    let (current_page, total_pages, total_results) = box_stats(comment_box, per_page, rows.len())?;
    let source_url = page_url(&canonical_url(&html, document)?, current_page);

    let items = rows
        .into_iter()
        .enumerate()
        .map(|(position, row)| parse_comment_row(row, position, document, &source_url))
        .collect::<Result<Vec<_>>>()?;

    Ok(Page {
        items,
        current_page,
        total_pages,
        total_results,
    })
}

/// Read a page's comments as a reply tree.
pub fn parse_comments(document: &Document, per_page: u32) -> Result<Page<Comment>> {
    let page = parse_comment_records(document, per_page)?;
    Ok(Page {
        items: build_tree(page.items)?,
        current_page: page.current_page,
        total_pages: page.total_pages,
        total_results: page.total_results,
    })
}

/// Headline facts about any page, read from its Open Graph tags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub kind: ThumbnailType,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Summarize a fetched page of type `kind`.
pub fn page_summary(document: &Document, kind: ThumbnailType) -> Result<PageSummary> {
    let html = document.parse();
    let meta = |property: &str| -> Result<Option<String>> {
        let sel = selector(&format!(r#"meta[property="{property}"]"#))?;
        Ok(html
            .select(&sel)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()))
    };

    let title = match meta("og:title")? {
        Some(title) => title,
        None => {
            let title_sel = selector("title")?;
            html.select(&title_sel)
                .next()
                .map(text_of)
                .ok_or_else(|| Error::Parse(format!("{} has no title", document.url())))?
        }
    };

    Ok(PageSummary {
        kind,
        url: canonical_url(&html, document)?,
        title,
        description: meta("og:description")?,
        image: meta("og:image")?,
    })
}

/// The delete hash of review `review_id` on a fetched review listing.
///
/// Review rows carry `?...siteareaid={id}&hash={token}&...` on their delete
/// link; only the review's author (or staff) sees that link.
pub fn review_delete_token(document: &Document, review_id: u64) -> Result<Option<String>> {
    let html = document.parse();
    let delete_sel = selector(r#"a[title="Delete"]"#)?;
    let needle = format!("siteareaid={review_id}");

    Ok(html
        .select(&delete_sel)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| {
            href.split(['?', '&'])
                .any(|pair| pair == needle)
        })
        .find_map(|href| HASH_PARAM.captures(href).map(|c| c[1].to_string())))
}
