//! The member inbox: followed-page updates, friend requests and private
//! message threads.
//!
//! Everything here comes from pages only a logged-in member can see. The
//! accept, decline, clear and unfollow links are read off those pages and
//! posted back as rendered.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::extract::{join, parse_date, selector};
use crate::pagination::{sort_value, SortDirection, SORT_PARAM};
use crate::thumbnail::{Thumbnail, ThumbnailType};
use crate::transport::{Document, QueryParams};

/// "Subject (3 messages)" in a thread heading.
#[allow(clippy::expect_used)]
static THREAD_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*) \(([0-9]+) messages?\)$").expect("thread heading regex is valid")
});

/// Categories of followed pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchType {
    Mod,
    Game,
    Engine,
    Group,
    Member,
}

impl WatchType {
    pub const ALL: [Self; 5] = [Self::Mod, Self::Game, Self::Engine, Self::Group, Self::Member];

    /// Plural collection name used in inbox URLs (`mods`, `games`, ...).
    pub fn collection(self) -> &'static str {
        match self {
            Self::Mod => "mods",
            Self::Game => "games",
            Self::Engine => "engines",
            Self::Group => "groups",
            Self::Member => "members",
        }
    }

    /// Heading of this category's box on the updates page.
    fn heading(self) -> &'static str {
        match self {
            Self::Mod => "Mods Watch",
            Self::Game => "Games Watch",
            Self::Engine => "Engines Watch",
            Self::Group => "Groups Watch",
            Self::Member => "Members Watch",
        }
    }
}

/// New content posted on a followed page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    pub category: WatchType,
    /// The followed page.
    pub page: Thumbnail,
    /// What was posted since the updates were last cleared.
    pub updates: Vec<Thumbnail>,
    pub unfollow_url: String,
    pub clear_url: String,
}

/// A pending friend request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriendRequest {
    pub member: Thumbnail,
    pub accept_url: String,
    pub decline_url: String,
}

/// Inbox row of a message thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadThumbnail {
    pub id: u64,
    pub name: String,
    pub url: String,
    /// Member who sent the latest message.
    pub last_messager: Thumbnail,
    pub date: DateTime<FixedOffset>,
    /// Latest message text as previewed in the inbox.
    pub content: Option<String>,
}

/// One message of a thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: u64,
    pub member: Thumbnail,
    pub date: DateTime<FixedOffset>,
    pub text: String,
}

/// A conversation between two or more members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thread {
    pub id: u64,
    pub name: String,
    pub count: u32,
    /// Participants. The viewing member comes first, named "you".
    pub members: Vec<Thumbnail>,
    pub messages: Vec<Message>,
}

/// Inbox filters. The default lists every received thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadQuery {
    pub keyword: Option<String>,
    /// `Some(true)` for read threads only, `Some(false)` for unread only.
    pub read: Option<bool>,
    /// `Some(true)` where the viewer sent the last message.
    pub replied: Option<bool>,
    /// List threads the viewer started instead of the inbox.
    pub sent_items: bool,
    /// Sort key (`id`, `name`, `hasread`, `hasreplied`) and direction.
    pub sort: Option<(String, SortDirection)>,
}

impl ThreadQuery {
    pub(crate) fn path(&self) -> &'static str {
        if self.sent_items {
            "/messages/sentitems"
        } else {
            "/messages/inbox"
        }
    }

    pub(crate) fn params(&self) -> QueryParams {
        let flag = |value: Option<bool>| value.map(|v| u8::from(v).to_string());
        QueryParams::new()
            .with("filter", Some("t"))
            .with("kw", self.keyword.clone())
            .with("hasread", flag(self.read))
            .with("hasreplied", flag(self.replied))
            .with(
                SORT_PARAM,
                self.sort
                    .as_ref()
                    .map(|(key, direction)| sort_value(key, *direction)),
            )
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn attr<'a>(element: ElementRef<'a>, name: &str) -> Result<&'a str> {
    element.value().attr(name).ok_or_else(|| {
        Error::Parse(format!(
            "<{}> has no {name} attribute",
            element.value().name()
        ))
    })
}

/// Rows of the box whose heading reads `heading`, without its trailing
/// footer row. `None` when the page has no such box.
fn box_rows<'a>(html: &'a Html, heading: &str) -> Result<Option<Vec<ElementRef<'a>>>> {
    let span_sel = selector("span")?;
    let table_sel = selector("div.table")?;

    let Some(span) = html.select(&span_sel).find(|s| text_of(*s) == heading) else {
        return Ok(None);
    };
    // span > div.title > div.normalcorner > box
    let Some(container) = span.ancestors().filter_map(ElementRef::wrap).nth(2) else {
        return Ok(None);
    };
    let Some(table) = container.select(&table_sel).next() else {
        return Ok(Some(Vec::new()));
    };

    let mut rows: Vec<_> = table
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "div")
        .collect();
    rows.pop();
    Ok(Some(rows))
}

/// A titled link with its image: the page or member a row is about.
fn row_subject(row: ElementRef<'_>, base: &str) -> Result<Thumbnail> {
    let link_sel = selector("a[href]")?;
    let img_sel = selector("img")?;
    let time_sel = selector("time")?;

    let link = row
        .select(&link_sel)
        .next()
        .ok_or_else(|| Error::Parse("inbox row has no link".to_string()))?;
    let url = join(base, attr(link, "href")?)?;
    let name = link
        .value()
        .attr("title")
        .map_or_else(|| text_of(link), str::to_string);
    let image = link
        .select(&img_sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);
    let date = row
        .select(&time_sel)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .map(parse_date)
        .transpose()?;

    let kind = ThumbnailType::from_url(&url)?;
    Ok(Thumbnail::new(name, url, kind).with_image(image).with_date(date))
}

fn titled_link(row: ElementRef<'_>, title: &str, base: &str) -> Result<String> {
    let sel = selector(&format!(r#"a[title="{title}"]"#))?;
    let link = row
        .select(&sel)
        .next()
        .ok_or_else(|| Error::Parse(format!("inbox row has no {title:?} link")))?;
    join(base, attr(link, "href")?)
}

/// Followed pages with new content, across every category.
pub fn parse_updates(document: &Document) -> Result<Vec<Update>> {
    let html = document.parse();
    let base = document.url();
    let posted_sel = selector("p a[href]")?;

    let mut updates = Vec::new();
    for category in WatchType::ALL {
        let Some(rows) = box_rows(&html, category.heading())? else {
            continue;
        };
        for row in rows {
            let posted = row
                .select(&posted_sel)
                .map(|a| -> Result<Thumbnail> {
                    let url = join(base, attr(a, "href")?)?;
                    let kind = ThumbnailType::from_url(&url)?;
                    Ok(Thumbnail::new(text_of(a), url, kind))
                })
                .collect::<Result<Vec<_>>>()?;

            updates.push(Update {
                category,
                page: row_subject(row, base)?,
                updates: posted,
                unfollow_url: titled_link(row, "Stop Watching", base)?,
                clear_url: titled_link(row, "Clear", base)?,
            });
        }
    }
    debug!(count = updates.len(), "parsed updates");
    Ok(updates)
}

/// Pending friend requests. A page without the box has none.
pub fn parse_friend_requests(document: &Document) -> Result<Vec<FriendRequest>> {
    let html = document.parse();
    let base = document.url();
    let Some(rows) = box_rows(&html, "Friend Requests")? else {
        return Ok(Vec::new());
    };

    rows.into_iter()
        .map(|row| -> Result<FriendRequest> {
            Ok(FriendRequest {
                member: row_subject(row, base)?,
                accept_url: titled_link(row, "Accept", base)?,
                decline_url: titled_link(row, "Decline", base)?,
            })
        })
        .collect()
}

/// The "clear all" link of one category, shaped
/// `/.../clearall/{hash}/1/{collection}`.
pub fn clear_all_link(document: &Document, category: WatchType) -> Result<Option<String>> {
    let html = document.parse();
    let link_sel = selector("a[href]")?;

    let found = html
        .select(&link_sel)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| {
            let path = href.split(['?', '#']).next().unwrap_or_default();
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            segments.windows(4).any(|w| {
                w[0] == "clearall" && !w[1].is_empty() && w[2] == "1" && w[3] == category.collection()
            })
        });
    found.map(|href| join(document.url(), href)).transpose()
}

/// Threads listed on an inbox or sent-items page.
pub fn parse_threads(document: &Document) -> Result<Vec<ThreadThumbnail>> {
    let html = document.parse();
    let base = document.url();
    let inbox_sel = selector("div.tabinbox")?;
    let row_sel = selector("div.rowcontent")?;
    let link_sel = selector("a[href]")?;
    let member_sel = selector("span.subheading a[href]")?;
    let time_sel = selector("time")?;
    let content_sel = selector("div.content p")?;

    let Some(inbox) = html.select(&inbox_sel).last() else {
        return Ok(Vec::new());
    };

    inbox
        .select(&row_sel)
        .map(|row| -> Result<ThreadThumbnail> {
            let link = row
                .select(&link_sel)
                .next()
                .ok_or_else(|| Error::Parse("thread row has no link".to_string()))?;
            let url = join(base, attr(link, "href")?)?;
            let id = last_number(&url)?;

            let member = row
                .select(&member_sel)
                .next()
                .ok_or_else(|| Error::Parse(format!("thread {id} has no sender")))?;
            let last_messager = Thumbnail::new(
                text_of(member),
                join(base, attr(member, "href")?)?,
                ThumbnailType::Member,
            );

            let date = row
                .select(&time_sel)
                .next()
                .ok_or_else(|| Error::Parse(format!("thread {id} has no timestamp")))
                .and_then(|t| attr(t, "datetime"))
                .and_then(parse_date)?;

            Ok(ThreadThumbnail {
                id,
                name: link.value().attr("title").unwrap_or_default().to_string(),
                url,
                last_messager,
                date,
                content: row.select(&content_sel).next().map(text_of),
            })
        })
        .collect()
}

fn last_number(url: &str) -> Result<u64> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| Error::Parse(format!("{url} does not end in an id")))
}

/// A full thread page, including the one returned after sending a message.
pub fn parse_thread(document: &Document) -> Result<Thread> {
    let html = document.parse();
    let base = document.url();
    let thread_sel = selector("div#firstmessage")?;
    let heading_sel = selector("div.normalcorner span.heading")?;
    let delete_sel = selector("div.normalcorner a.deleteicon")?;
    let members_sel = selector("p.introduction strong a[href]")?;
    let messages_sel = selector("div.tablecomments")?;

    let thread = html
        .select(&thread_sel)
        .next()
        .ok_or_else(|| Error::Parse(format!("{base} shows no message thread")))?;

    let heading = thread
        .select(&heading_sel)
        .next()
        .map(text_of)
        .unwrap_or_default();
    let (name, count) = match THREAD_HEADING.captures(&heading) {
        Some(caps) => (caps[1].to_string(), caps[2].parse::<u32>().unwrap_or(1)),
        None => (heading.clone(), 1),
    };

    let id: u64 = thread
        .select(&delete_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| href.split_once('=').map(|(_, id)| id))
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| Error::Parse(format!("thread {name:?} has no id")))?;

    let members = thread
        .select(&members_sel)
        .map(|a| -> Result<Thumbnail> {
            Ok(Thumbnail::new(
                text_of(a),
                join(base, attr(a, "href")?)?,
                ThumbnailType::Member,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let messages = match thread.select(&messages_sel).next() {
        Some(table) => table
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "div")
            .map(|row| parse_message(row, base))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(Thread {
        id,
        name,
        count,
        members,
        messages,
    })
}

fn parse_message(row: ElementRef<'_>, base: &str) -> Result<Message> {
    let avatar_sel = selector("a.avatar")?;
    let time_sel = selector("time")?;
    let body_sel = selector("div.comment")?;

    let id: u64 = attr(row, "id")?
        .parse()
        .map_err(|_| Error::Parse("message row has a non-numeric id".to_string()))?;
    let avatar = row
        .select(&avatar_sel)
        .next()
        .ok_or_else(|| Error::Parse(format!("message {id} has no sender")))?;
    let member = Thumbnail::new(
        attr(avatar, "title").unwrap_or_default(),
        join(base, attr(avatar, "href")?)?,
        ThumbnailType::Member,
    );
    let date = row
        .select(&time_sel)
        .next()
        .ok_or_else(|| Error::Parse(format!("message {id} has no timestamp")))
        .and_then(|t| attr(t, "datetime"))
        .and_then(parse_date)?;

    Ok(Message {
        id,
        member,
        date,
        text: row.select(&body_sel).next().map(text_of).unwrap_or_default(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const UPDATES_PAGE: &str = r#"
<div class="normalbox">
  <div class="normalcorner"><div class="title"><span class="heading">Mods Watch</span></div></div>
  <div class="inner"><div class="table">
    <div class="row">
      <a href="/mods/portal-reloaded" title="Portal Reloaded"><img src="p.png"></a>
      <time datetime="2024-05-01T08:00:00+00:00">May 1</time>
      <p><a href="/mods/portal-reloaded/images/chamber-1">chamber 1</a><a href="/mods/portal-reloaded/news/v2">v2 released</a></p>
      <a title="Stop Watching" href="/messages/ajax/action/unwatch/1">x</a>
      <a title="Clear" href="/messages/ajax/action/clear/1">c</a>
    </div>
    <div class="footer"><a href="/messages/updates/clearall/abc123/1/mods">Clear all</a></div>
  </div></div>
</div>
<div class="normalbox">
  <div class="normalcorner"><div class="title"><span class="heading">Friend Requests</span></div></div>
  <div class="inner"><div class="table">
    <div class="row">
      <a href="/members/bob" title="bob"><img src="b.png"></a>
      <time datetime="2024-05-02">May 2</time>
      <a title="Accept" href="/members/ajax/friends/accept/9/h9">yes</a>
      <a title="Decline" href="/members/ajax/friends/decline/9/h9">no</a>
    </div>
    <div class="footer"></div>
  </div></div>
</div>"#;

    const THREAD_PAGE: &str = r#"
<div id="firstmessage">
  <div class="normalcorner">
    <span class="heading">Map ideas (2 messages)</span>
    <a class="deleteicon" href="/messages/delete?thread=4411">leave</a>
  </div>
  <p class="introduction">Between <strong><a href="/members/alice">you</a><a href="/members/bob">bob</a></strong></p>
  <div class="tablecomments">
    <div class="row" id="90"><a class="avatar" href="/members/alice" title="alice"></a>
      <time datetime="2024-05-03T10:00:00+00:00"></time><div class="comment">Got any?</div></div>
    <div class="row" id="91"><a class="avatar" href="/members/bob" title="bob"></a>
      <time datetime="2024-05-03T11:00:00+00:00"></time><div class="comment">Plenty.</div></div>
  </div>
</div>"#;

    #[test]
    fn parses_updates_per_category() {
        let doc = Document::new("https://www.moddb.com/messages/updates", UPDATES_PAGE);
        let updates = parse_updates(&doc).unwrap();

        assert_eq!(updates.len(), 1, "footer row is not an update");
        let update = &updates[0];
        assert_eq!(update.category, WatchType::Mod);
        assert_eq!(update.page.name, "Portal Reloaded");
        assert_eq!(update.page.kind, ThumbnailType::Mod);
        assert_eq!(update.updates.len(), 2);
        assert_eq!(update.updates[0].kind, ThumbnailType::Media);
        assert_eq!(update.updates[1].kind, ThumbnailType::Article);
        assert_eq!(
            update.clear_url,
            "https://www.moddb.com/messages/ajax/action/clear/1"
        );
        assert_eq!(
            update.unfollow_url,
            "https://www.moddb.com/messages/ajax/action/unwatch/1"
        );
    }

    #[test]
    fn parses_friend_requests() {
        let doc = Document::new("https://www.moddb.com/messages/updates", UPDATES_PAGE);
        let requests = parse_friend_requests(&doc).unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].member.name, "bob");
        assert_eq!(requests[0].member.kind, ThumbnailType::Member);
        assert_eq!(
            requests[0].accept_url,
            "https://www.moddb.com/members/ajax/friends/accept/9/h9"
        );

        let empty = Document::new("https://www.moddb.com/messages/updates", "<p>none</p>");
        assert!(parse_friend_requests(&empty).unwrap().is_empty());
    }

    #[test]
    fn finds_clear_all_link_by_category() {
        let doc = Document::new("https://www.moddb.com/messages/updates", UPDATES_PAGE);
        assert_eq!(
            clear_all_link(&doc, WatchType::Mod).unwrap().as_deref(),
            Some("https://www.moddb.com/messages/updates/clearall/abc123/1/mods")
        );
        assert_eq!(clear_all_link(&doc, WatchType::Game).unwrap(), None);
    }

    #[test]
    fn parses_thread_page() {
        let doc = Document::new("https://www.moddb.com/messages/inbox/4411", THREAD_PAGE);
        let thread = parse_thread(&doc).unwrap();

        assert_eq!(thread.id, 4411);
        assert_eq!(thread.name, "Map ideas");
        assert_eq!(thread.count, 2);
        assert_eq!(thread.members[0].name, "you");
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[1].id, 91);
        assert_eq!(thread.messages[1].text, "Plenty.");
    }

    #[test]
    fn single_message_heading_has_no_count() {
        let html = THREAD_PAGE.replace("Map ideas (2 messages)", "Hello");
        let doc = Document::new("https://www.moddb.com/messages/inbox/4411", html);
        let thread = parse_thread(&doc).unwrap();
        assert_eq!((thread.name.as_str(), thread.count), ("Hello", 1));
    }

    #[test]
    fn parses_inbox_rows() {
        let html = r#"
<div class="tabinbox"></div>
<div class="tabinbox">
  <div class="rowcontent">
    <a href="/messages/inbox/4411" title="Map ideas">Map ideas</a>
    <span class="subheading">by <a href="/members/bob">bob</a></span>
    <time datetime="2024-05-03T11:00:00+00:00"></time>
    <div class="content"><p>Plenty.</p></div>
  </div>
</div>"#;
        let doc = Document::new("https://www.moddb.com/messages/inbox", html);
        let threads = parse_threads(&doc).unwrap();

        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].id, 4411);
        assert_eq!(threads[0].last_messager.name, "bob");
        assert_eq!(threads[0].content.as_deref(), Some("Plenty."));
    }

    #[test]
    fn thread_query_encodes_filters() {
        let query = ThreadQuery {
            read: Some(false),
            sort: Some(("id".into(), SortDirection::Desc)),
            ..ThreadQuery::default()
        };
        let params = query.params();
        assert_eq!(params.get("filter"), Some("t"));
        assert_eq!(params.get("hasread"), Some("0"));
        assert_eq!(params.get("hasreplied"), None);
        assert_eq!(params.get("sort"), Some("id-desc"));
        assert_eq!(query.path(), "/messages/inbox");
    }
}
