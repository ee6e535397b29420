//! Authenticated reads and write actions.
//!
//! Writes go to the site's ajax endpoints, which answer with
//! `{"error": bool, "text": "..."}`. An action only counts as done when the
//! reply text contains the phrase the site uses for that action; anything
//! else is [`Error::ActionRejected`].
//!
//! Deleting and undeleting comments, and deleting reviews, need a short-lived
//! hash that is only valid for the page the target currently sits on. Those
//! actions re-fetch the page first, pick up the fresh hash, and fail with
//! [`Error::StaleReference`] when the target has moved or vanished.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::comments::{Comment, CommentRecord};
use crate::config::{ClientConfig, DEFAULT_BASE_URL};
use crate::error::{Error, Result};
use crate::extract;
use crate::form::Form;
use crate::http_client::Session;
use crate::messages::{self, FriendRequest, Thread, ThreadQuery, ThreadThumbnail, Update, WatchType};
use crate::pagination::{ListingFetcher, PageFetcher, ResultList};
use crate::ratelimit::Limiters;
use crate::thumbnail::{Thumbnail, ThumbnailType};
use crate::transport::{Document, FormData, QueryParams, Transport};

const FOLLOWED: &str = "be notified";
const VOTED: &str = "successfully issued";
const JOINED: &str = "successfully joined";
const ALREADY_REPORTED: &str = "already reported this content";
const UNFRIENDED: &str = "no longer friends with this member";
const REQUEST_SENT: &str = "friend request has been sent";
const REQUEST_ACCEPTED: &str = "now friends with";
const REMOVED: &str = "successfully removed";
const UNWATCHED: &str = "no longer watching";
const ALL_CLEARED: &str = "updates were cleared";
const MEMBER_ADDED: &str = "has been successfully added";
const THREAD_LEFT: &str = "You have successfully deleted the requested thread";
const ALL_READ: &str = "All messages marked as read";
const COMMENT_SAVED: &str = "Your comment has been saved";
const COMMENT_DELETED: &str = "You have <u>deleted</u> this comment";
const COMMENT_AUTHORIZED: &str = "You have <u>authorized</u> this comment";
const RATING_SAVED: &str = "Your rating has been saved";
const REVIEW_DELETED: &str = "You have <u>deleted</u> this review.";

/// Ratings outside this range must come with a written review.
const UNJUSTIFIED_RATINGS: std::ops::RangeInclusive<u8> = 3..=8;

#[derive(Debug, Deserialize)]
struct ActionReply {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    text: String,
}

/// Read the reply text of an ajax action.
fn reply_text(body: &str) -> Result<String> {
    let reply: ActionReply = serde_json::from_str(body)?;
    if reply.error {
        return Err(Error::Remote(reply.text));
    }
    Ok(reply.text)
}

fn expect_phrase(action: &'static str, text: String, phrase: &str) -> Result<()> {
    if text.contains(phrase) {
        debug!(action, "action confirmed");
        Ok(())
    } else {
        Err(Error::ActionRejected {
            action,
            message: text,
        })
    }
}

/// Reply of the tag vote endpoint, which reports `success` instead of `error`.
#[derive(Debug, Deserialize)]
struct TagReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    text: String,
}

fn form(pairs: &[(&str, String)]) -> FormData {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// A site page addressed by its numeric id and URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub id: u64,
    pub url: String,
}

impl PageRef {
    #[must_use]
    pub fn new(id: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
        }
    }

    /// The site area of the page, the collection segment of its URL
    /// (`mods` for `/mods/portal-reloaded`).
    pub fn sitearea(&self) -> Result<String> {
        let url = url::Url::parse(&self.url)?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [.., area, _] => Ok((*area).to_string()),
            _ => Err(Error::InvalidInput(format!(
                "{} does not point at a site page",
                self.url
            ))),
        }
    }

    pub fn kind(&self) -> Result<ThumbnailType> {
        ThumbnailType::from_url(&self.url)
    }
}

/// A review addressed by id and the listing page showing its delete link
/// (usually the author's own review list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRef {
    pub id: u64,
    pub url: String,
}

/// A tag attached to a page, addressed the way the vote endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    /// Slug of the tag (`first-person-shooter`).
    pub name_id: String,
    /// Numeric site area of the tagged page.
    pub sitearea: u32,
    /// Id of the tagged page.
    pub siteareaid: u64,
}

/// A rating with an optional written review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDraft {
    /// 1 to 10.
    pub rating: u8,
    pub text: Option<String>,
    pub spoilers: bool,
    pub early_access: bool,
}

impl ReviewDraft {
    #[must_use]
    pub fn new(rating: u8) -> Self {
        Self {
            rating,
            text: None,
            spoilers: false,
            early_access: false,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.rating) {
            return Err(Error::InvalidInput(format!(
                "rating must be between 1 and 10, got {}",
                self.rating
            )));
        }
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !UNJUSTIFIED_RATINGS.contains(&self.rating) && !has_text {
            return Err(Error::InvalidInput(format!(
                "a rating of {} needs a written review",
                self.rating
            )));
        }
        Ok(())
    }
}

/// Reads and writes against one site, over one transport.
///
/// With a [`Session`] transport every request is already guarded by the
/// session's throttle and global limiters; the client adds the comment
/// limiter in front of comment posts.
pub struct Client {
    transport: Arc<dyn Transport>,
    limits: Limiters,
    base_url: String,
    per_page: u32,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, limits: Limiters) -> Self {
        Self {
            transport,
            limits,
            base_url: DEFAULT_BASE_URL.to_string(),
            per_page: 30,
        }
    }

    /// Client over a fresh [`Session`] built from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_session(Session::with_config(config)?).with_per_page(config.per_page))
    }

    /// Client sharing the session's limiters.
    pub fn with_session(session: Session) -> Self {
        let limits = session.limits().clone();
        let base_url = session.base_url().to_string();
        Self::new(Arc::new(session), limits).with_base_url(base_url)
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn limits(&self) -> &Limiters {
        &self.limits
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ═══════════════════════════════════════════════════════════════════════
    // READS
    // ═══════════════════════════════════════════════════════════════════════

    /// First page of a result listing such as `/mods` or `/games`.
    pub async fn browse(&self, url: &str, params: QueryParams) -> Result<ResultList<Thumbnail>> {
        self.browse_page(url, params, 1).await
    }

    /// Page `page` of a result listing, fetched directly.
    pub async fn browse_page(
        &self,
        url: &str,
        params: QueryParams,
        page: u32,
    ) -> Result<ResultList<Thumbnail>> {
        let fetcher: Arc<dyn PageFetcher<Thumbnail>> = Arc::new(
            ListingFetcher::new(Arc::clone(&self.transport), extract::parse_results)
                .with_per_page(self.per_page),
        );
        ResultList::at(fetcher, url, params, page).await
    }

    /// Page `page` of the comments on `url`, threaded.
    ///
    /// `show_deleted` includes comments hidden by moderators, visible to the
    /// page owner and staff only.
    #[instrument(skip(self))]
    pub async fn comments(
        &self,
        url: &str,
        page: u32,
        show_deleted: bool,
    ) -> Result<ResultList<Comment>> {
        let fetcher: Arc<dyn PageFetcher<Comment>> = Arc::new(
            ListingFetcher::new(Arc::clone(&self.transport), extract::parse_comments)
                .with_per_page(self.per_page),
        );
        let params = QueryParams::new().with("deleted", show_deleted.then_some("t"));
        let first = fetcher.fetch_page(url, page, &params).await?;
        Ok(ResultList::new(first, url, params, fetcher))
    }

    /// Fetch the entity behind a thumbnail.
    pub async fn resolve<T, P>(&self, thumbnail: &Thumbnail, parse: P) -> Result<T>
    where
        P: FnOnce(&Document, ThumbnailType) -> Result<T>,
    {
        thumbnail.resolve(self.transport.as_ref(), parse).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // WRITES
    // ═══════════════════════════════════════════════════════════════════════

    async fn action(&self, endpoint: &str, data: FormData) -> Result<String> {
        let url = format!("{}{endpoint}", self.base_url);
        let body = self.transport.post(&url, &data).await?;
        reply_text(&body)
    }

    async fn page_action(&self, action: &str, sitearea: String, id: u64) -> Result<String> {
        self.action(
            "/messages/ajax/action/",
            form(&[
                ("ajax", "t".into()),
                ("action", action.into()),
                ("sitearea", sitearea),
                ("siteareaid", id.to_string()),
            ]),
        )
        .await
    }

    /// Follow or unfollow a page. Returns `true` when the page is now followed.
    #[instrument(skip(self), fields(url = %page.url))]
    pub async fn tracking(&self, page: &PageRef) -> Result<bool> {
        let text = self.page_action("watch", page.sitearea()?, page.id).await?;
        let followed = text.contains(FOLLOWED);
        info!(followed, "tracking toggled");
        Ok(followed)
    }

    pub async fn like_comment(&self, comment: &CommentRecord) -> Result<()> {
        let text = self
            .page_action("karmagood", "comment".into(), comment.id)
            .await?;
        expect_phrase("like comment", text, VOTED)
    }

    pub async fn dislike_comment(&self, comment: &CommentRecord) -> Result<()> {
        let text = self
            .page_action("karmabad", "comment".into(), comment.id)
            .await?;
        expect_phrase("dislike comment", text, VOTED)
    }

    /// Join or leave a group or team. Returns `true` when joined.
    #[instrument(skip(self), fields(url = %group.url))]
    pub async fn membership(&self, group: &PageRef) -> Result<bool> {
        let text = self
            .action(
                &format!("/groups/ajax/members/change/{}", group.id),
                form(&[("ajax", "t".into())]),
            )
            .await?;
        Ok(text.contains(JOINED))
    }

    /// Report a page to the moderators.
    pub async fn report(&self, page: &PageRef) -> Result<()> {
        let text = self.page_action("report", page.sitearea()?, page.id).await?;
        if text.contains(ALREADY_REPORTED) {
            return Err(Error::ActionRejected {
                action: "report",
                message: text,
            });
        }
        Ok(())
    }

    pub async fn unfriend(&self, member_id: u64) -> Result<()> {
        let text = self
            .action(
                &format!("/members/ajax/friends/delete/{member_id}"),
                form(&[("ajax", "t".into())]),
            )
            .await?;
        expect_phrase("unfriend", text, UNFRIENDED)
    }

    pub async fn send_friend_request(&self, member_id: u64) -> Result<()> {
        let text = self
            .action(
                &format!("/members/ajax/friends/add/{member_id}"),
                form(&[("ajax", "t".into())]),
            )
            .await?;
        expect_phrase("send friend request", text, REQUEST_SENT)
    }

    /// POST to an action link rendered by the site (possibly relative).
    async fn link_action(&self, link: &str) -> Result<String> {
        let url = extract::join(&self.base_url, link)?;
        let body = self
            .transport
            .post(&url, &form(&[("ajax", "t".into())]))
            .await?;
        reply_text(&body)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // UPDATES & FRIEND REQUESTS
    // ═══════════════════════════════════════════════════════════════════════

    async fn updates_page(&self) -> Result<Document> {
        let url = format!("{}/messages/updates", self.base_url);
        self.transport.get(&url, &QueryParams::new()).await
    }

    /// Followed pages with new content.
    pub async fn updates(&self) -> Result<Vec<Update>> {
        messages::parse_updates(&self.updates_page().await?)
    }

    /// Pending friend requests.
    pub async fn friend_requests(&self) -> Result<Vec<FriendRequest>> {
        messages::parse_friend_requests(&self.updates_page().await?)
    }

    pub async fn accept_friend_request(&self, request: &FriendRequest) -> Result<()> {
        let text = self.link_action(&request.accept_url).await?;
        expect_phrase("accept friend request", text, REQUEST_ACCEPTED)
    }

    pub async fn decline_friend_request(&self, request: &FriendRequest) -> Result<()> {
        let text = self.link_action(&request.decline_url).await?;
        expect_phrase("decline friend request", text, REMOVED)
    }

    /// Clear the pending updates of one followed page.
    pub async fn clear_update(&self, update: &Update) -> Result<()> {
        let text = self.link_action(&update.clear_url).await?;
        expect_phrase("clear update", text, REMOVED)
    }

    /// Stop following the page of an update, which also clears it.
    pub async fn unfollow_update(&self, update: &Update) -> Result<()> {
        let text = self.link_action(&update.unfollow_url).await?;
        expect_phrase("unfollow", text, UNWATCHED)
    }

    /// Clear every update of one category.
    ///
    /// The clear-all link carries a hash, so this re-reads the updates page
    /// first. A category without a clear-all link has nothing to clear.
    #[instrument(skip(self))]
    pub async fn clear_updates(&self, category: WatchType) -> Result<()> {
        let page = self.updates_page().await?;
        let Some(link) = messages::clear_all_link(&page, category)? else {
            debug!("nothing to clear");
            return Ok(());
        };
        let text = self.link_action(&link).await?;
        expect_phrase("clear updates", text, ALL_CLEARED)
    }

    /// Page `page` of the followed pages in `category`.
    pub async fn watched(&self, category: WatchType, page: u32) -> Result<ResultList<Thumbnail>> {
        let url = format!("{}/messages/watching/{}", self.base_url, category.collection());
        self.browse_page(&url, QueryParams::new(), page).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PRIVATE MESSAGES
    // ═══════════════════════════════════════════════════════════════════════

    /// Threads in the inbox (or sent items), minus threads the member left.
    pub async fn threads(&self, query: &ThreadQuery) -> Result<Vec<ThreadThumbnail>> {
        let url = format!("{}{}", self.base_url, query.path());
        let document = self.transport.get(&url, &query.params()).await?;
        messages::parse_threads(&document)
    }

    /// Fetch a thread with all its messages.
    pub async fn thread(&self, thread: &ThreadThumbnail) -> Result<Thread> {
        let document = self.transport.get(&thread.url, &QueryParams::new()).await?;
        messages::parse_thread(&document)
    }

    async fn post_message(&self, url: String, mut data: FormData, text: &str) -> Result<Thread> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("message text is empty".to_string()));
        }
        data.insert(0, ("formhash".to_string(), uuid::Uuid::new_v4().simple().to_string()));
        data.push(("description".to_string(), text.to_string()));
        data.push(("messages".to_string(), "Send message".to_string()));

        let html = self.transport.post(&url, &data).await?;
        messages::parse_thread(&Document::new(url, html))
    }

    /// Start a thread with one or more members.
    #[instrument(skip(self, text))]
    pub async fn send_message(&self, members: &[&str], subject: &str, text: &str) -> Result<Thread> {
        if members.is_empty() {
            return Err(Error::InvalidInput("a message needs at least one recipient".to_string()));
        }
        let data = form(&[
            ("membersto", members.join(",")),
            ("name", subject.to_string()),
        ]);
        let thread = self
            .post_message(format!("{}/messages/compose/", self.base_url), data, text)
            .await?;
        info!(id = thread.id, "thread started");
        Ok(thread)
    }

    /// Add a message to an existing thread. Returns the updated thread.
    #[instrument(skip(self, text))]
    pub async fn reply_to_thread(&self, thread_id: u64, text: &str) -> Result<Thread> {
        let url = format!("{}/messages/inbox/{thread_id}", self.base_url);
        self.post_message(url, FormData::new(), text).await
    }

    pub async fn add_member_to_thread(&self, thread_id: u64, member: &str) -> Result<()> {
        let text = self
            .action(
                &format!("/messages/ajax/members/invite/{thread_id}"),
                form(&[
                    ("ajax", "t".into()),
                    ("username", member.to_string()),
                    ("member", "0".into()),
                ]),
            )
            .await?;
        expect_phrase("add member to thread", text, MEMBER_ADDED)
    }

    /// Leave a thread; no more notifications arrive for it.
    pub async fn leave_thread(&self, thread_id: u64) -> Result<()> {
        let text = self
            .action(
                "/messages/ajax/delete/",
                form(&[("ajax", "t".into()), ("thread", thread_id.to_string())]),
            )
            .await?;
        expect_phrase("leave thread", text, THREAD_LEFT)
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        let text = self
            .action("/messages/ajax/markallread", form(&[("ajax", "t".into())]))
            .await?;
        expect_phrase("mark all read", text, ALL_READ)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TAGS
    // ═══════════════════════════════════════════════════════════════════════

    async fn vote_tag(&self, tag: &TagRef, negative: bool) -> Result<()> {
        let url = format!("{}/tags/ajax/add", self.base_url);
        let data = form(&[
            ("ajax", "t".into()),
            ("tag", tag.name_id.clone()),
            ("sitearea", tag.sitearea.to_string()),
            ("siteareaid", tag.siteareaid.to_string()),
            ("hash", uuid::Uuid::new_v4().simple().to_string()),
            ("negative", u8::from(negative).to_string()),
        ]);
        let body = self.transport.post(&url, &data).await?;
        let reply: TagReply = serde_json::from_str(&body)?;
        if reply.success {
            Ok(())
        } else {
            Err(Error::ActionRejected {
                action: "vote tag",
                message: reply.text,
            })
        }
    }

    pub async fn upvote_tag(&self, tag: &TagRef) -> Result<()> {
        self.vote_tag(tag, false).await
    }

    pub async fn downvote_tag(&self, tag: &TagRef) -> Result<()> {
        self.vote_tag(tag, true).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // COMMENTS & REVIEWS
    // ═══════════════════════════════════════════════════════════════════════

    /// Post a comment on `page_url`, optionally as a reply.
    ///
    /// Spends the comment limiter first, which fails fast while a comment
    /// posted in the last minute is still counted. Returns the page as
    /// rendered after posting.
    #[instrument(skip(self, text, reply_to))]
    pub async fn add_comment(
        &self,
        page_url: &str,
        text: &str,
        reply_to: Option<&CommentRecord>,
    ) -> Result<Document> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("comment text is empty".to_string()));
        }
        self.limits.comment.call().await?;

        let data = form(&[
            ("formhash", uuid::Uuid::new_v4().simple().to_string()),
            ("replyid", reply_to.map_or(0, |c| c.id).to_string()),
            ("page", "1".into()),
            ("summary", text.to_string()),
            ("comment", "Save comment".into()),
        ]);
        let html = self.transport.post(page_url, &data).await?;
        info!("comment posted");
        Ok(Document::new(page_url, html))
    }

    pub async fn edit_comment(&self, comment: &CommentRecord, text: &str) -> Result<()> {
        let reply = self
            .action(
                "/comment/ajax/post",
                form(&[
                    ("ajax", "t".into()),
                    ("id", comment.id.to_string()),
                    ("summary", text.to_string()),
                ]),
            )
            .await?;
        expect_phrase("edit comment", reply, COMMENT_SAVED)
    }

    /// Find the comment again on its page and return its fresh delete token.
    async fn fresh_comment_token(&self, comment: &CommentRecord, deleted: bool) -> Result<String> {
        let stale = || Error::StaleReference {
            id: comment.id,
            url: comment.source_url.clone().unwrap_or_default(),
        };
        let Some(url) = comment.source_url.as_deref() else {
            return Err(stale());
        };

        let params = QueryParams::new().with("deleted", deleted.then_some("t"));
        let document = self.transport.get(url, &params).await?;
        let page = extract::parse_comment_records(&document, self.per_page)?;

        page.items
            .into_iter()
            .find(|c| c.id == comment.id)
            .and_then(|c| c.delete_token)
            .ok_or_else(stale)
    }

    async fn comment_state(&self, comment_id: u64, token: String) -> Result<String> {
        self.action(
            "/messages/ajax/action/",
            form(&[
                ("ajax", "t".into()),
                ("action", "delete".into()),
                ("sitearea", "comment".into()),
                ("siteareaid", comment_id.to_string()),
                ("hash", token),
            ]),
        )
        .await
    }

    /// Delete a comment. Costs a re-fetch of the comment's page and one POST.
    #[instrument(skip(self, comment), fields(id = comment.id))]
    pub async fn delete_comment(&self, comment: &CommentRecord) -> Result<()> {
        let token = self.fresh_comment_token(comment, false).await?;
        let text = self.comment_state(comment.id, token).await?;
        expect_phrase("delete comment", text, COMMENT_DELETED)
    }

    /// Restore a deleted comment. The page is re-fetched with deleted
    /// comments shown.
    #[instrument(skip(self, comment), fields(id = comment.id))]
    pub async fn undelete_comment(&self, comment: &CommentRecord) -> Result<()> {
        let token = self.fresh_comment_token(comment, true).await?;
        let text = self.comment_state(comment.id, token).await?;
        expect_phrase("undelete comment", text, COMMENT_AUTHORIZED)
    }

    /// Rate and optionally review a page; also edits an existing review.
    #[instrument(skip(self, review), fields(url = %page.url, rating = review.rating))]
    pub async fn add_review(&self, page: &PageRef, review: &ReviewDraft) -> Result<()> {
        review.validate()?;
        let sitearea = page.sitearea()?;

        let document = self.transport.get(&page.url, &QueryParams::new()).await?;
        let rating_form = Form::find_by_class(document.html(), "ratingform")?
            .ok_or_else(|| Error::Parse(format!("{} has no rating form", page.url)))?;
        let hash = rating_form.require("hash")?.to_string();

        let text = self
            .action(
                "/reviews/ajax",
                form(&[
                    ("ajax", "t".into()),
                    ("sitearea", sitearea),
                    ("siteareaid", page.id.to_string()),
                    ("hash", hash),
                    ("earlyaccess", u8::from(review.early_access).to_string()),
                    ("rating", review.rating.to_string()),
                    ("summary", review.text.clone().unwrap_or_default()),
                    ("spoiler", u8::from(review.spoilers).to_string()),
                ]),
            )
            .await?;
        expect_phrase("add review", text, RATING_SAVED)
    }

    /// Delete a review, re-reading its delete hash from `review.url`.
    #[instrument(skip(self, review), fields(id = review.id))]
    pub async fn delete_review(&self, review: &ReviewRef) -> Result<()> {
        let document = self.transport.get(&review.url, &QueryParams::new()).await?;
        let token = extract::review_delete_token(&document, review.id)?.ok_or_else(|| {
            Error::StaleReference {
                id: review.id,
                url: review.url.clone(),
            }
        })?;

        let text = self
            .action(
                "/messages/ajax/action/",
                form(&[
                    ("ajax", "t".into()),
                    ("action", "delete".into()),
                    ("sitearea", "reviews".into()),
                    ("siteareaid", review.id.to_string()),
                    ("hash", token),
                    ("ispd", "1".into()),
                ]),
            )
            .await?;
        expect_phrase("delete review", text, REVIEW_DELETED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::COMMENT_PAGE;
    use crate::messages::tests::UPDATES_PAGE;
    use crate::transport::testing::ScriptedTransport;

    const PAGE_ONE: &str = "https://www.moddb.com/mods/portal-reloaded/page/1";
    const UPDATES: &str = "https://www.moddb.com/messages/updates";

    fn client(transport: &Arc<ScriptedTransport>) -> Client {
        let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
        Client::new(transport, Limiters::default())
    }

    fn reply(text: &str) -> String {
        serde_json::json!({ "error": false, "text": text }).to_string()
    }

    fn comment(id: u64) -> CommentRecord {
        let mut record = crate::comments::tests::record(id, 0);
        record.source_url = Some(PAGE_ONE.to_string());
        record
    }

    fn field<'a>(form: &'a FormData, name: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn delete_comment_uses_fresh_token() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .page(PAGE_ONE, COMMENT_PAGE)
                .reply(&reply("You have <u>deleted</u> this comment.")),
        );
        let client = client(&transport);

        client.delete_comment(&comment(101)).await.unwrap();

        let gets = transport.gets();
        assert_eq!(gets.len(), 1);
        assert!(!gets[0].1.contains_key("deleted"));
        let posts = transport.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "https://www.moddb.com/messages/ajax/action/");
        assert_eq!(field(&posts[0].1, "hash"), Some("tok101"));
        assert_eq!(field(&posts[0].1, "siteareaid"), Some("101"));
        assert_eq!(field(&posts[0].1, "action"), Some("delete"));
    }

    #[tokio::test]
    async fn vanished_comment_is_stale() {
        let transport = Arc::new(ScriptedTransport::new().page(PAGE_ONE, COMMENT_PAGE));
        let client = client(&transport);

        let err = client.delete_comment(&comment(999)).await.unwrap_err();
        assert!(matches!(err, Error::StaleReference { id: 999, .. }));
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn comment_without_token_is_stale() {
        let transport = Arc::new(ScriptedTransport::new().page(PAGE_ONE, COMMENT_PAGE));
        let client = client(&transport);

        let err = client.delete_comment(&comment(102)).await.unwrap_err();
        assert!(matches!(err, Error::StaleReference { id: 102, .. }));
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn comment_without_source_is_stale() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(&transport);

        let mut record = comment(101);
        record.source_url = None;
        assert!(matches!(
            client.delete_comment(&record).await,
            Err(Error::StaleReference { .. })
        ));
        assert!(transport.gets().is_empty());
    }

    #[tokio::test]
    async fn delete_without_phrase_is_rejected() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .page(PAGE_ONE, COMMENT_PAGE)
                .reply(&reply("You do not have permission to do that")),
        );
        let client = client(&transport);

        let err = client.delete_comment(&comment(101)).await.unwrap_err();
        match err {
            Error::ActionRejected { action, message } => {
                assert_eq!(action, "delete comment");
                assert!(message.contains("permission"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn undelete_refetches_with_deleted_comments() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .page(PAGE_ONE, COMMENT_PAGE)
                .reply(&reply("You have <u>authorized</u> this comment")),
        );
        let client = client(&transport);

        client.undelete_comment(&comment(101)).await.unwrap();
        assert_eq!(transport.gets()[0].1.get("deleted"), Some("t"));
    }

    #[tokio::test]
    async fn remote_error_flag_is_surfaced() {
        let body = serde_json::json!({ "error": true, "text": "You must be logged in" }).to_string();
        let transport = Arc::new(ScriptedTransport::new().reply(&body));
        let client = client(&transport);

        let err = client.like_comment(&comment(5)).await.unwrap_err();
        assert!(matches!(err, Error::Remote(ref text) if text.contains("logged in")));
    }

    #[tokio::test]
    async fn tracking_reports_toggle_direction() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(&reply("You will now be notified of updates"))
                .reply(&reply("You are no longer watching this")),
        );
        let client = client(&transport);
        let page = PageRef::new(42, "https://www.moddb.com/mods/portal-reloaded");

        assert!(client.tracking(&page).await.unwrap());
        assert!(!client.tracking(&page).await.unwrap());

        let posts = transport.posts();
        assert_eq!(field(&posts[0].1, "sitearea"), Some("mods"));
        assert_eq!(field(&posts[0].1, "siteareaid"), Some("42"));
        assert_eq!(field(&posts[0].1, "action"), Some("watch"));
    }

    #[tokio::test]
    async fn report_twice_is_rejected() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(&reply("Thanks, the content has been reported"))
                .reply(&reply("You have already reported this content")),
        );
        let client = client(&transport);
        let page = PageRef::new(7, "https://www.moddb.com/games/half-life-2");

        client.report(&page).await.unwrap();
        assert!(matches!(
            client.report(&page).await,
            Err(Error::ActionRejected { action: "report", .. })
        ));
    }

    #[tokio::test]
    async fn friend_actions_check_their_phrases() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .page(UPDATES, UPDATES_PAGE)
                .reply(&reply("Your friend request has been sent"))
                .reply(&reply("You are now friends with bob"))
                .reply(&reply("The request was successfully removed"))
                .reply(&reply("You are no longer friends with this member")),
        );
        let client = client(&transport);

        let requests = client.friend_requests().await.unwrap();
        assert_eq!(requests.len(), 1);

        client.send_friend_request(9).await.unwrap();
        client.accept_friend_request(&requests[0]).await.unwrap();
        client.decline_friend_request(&requests[0]).await.unwrap();
        client.unfriend(9).await.unwrap();

        let urls: Vec<_> = transport.posts().into_iter().map(|(url, _)| url).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.moddb.com/members/ajax/friends/add/9",
                "https://www.moddb.com/members/ajax/friends/accept/9/h9",
                "https://www.moddb.com/members/ajax/friends/decline/9/h9",
                "https://www.moddb.com/members/ajax/friends/delete/9",
            ]
        );
    }

    #[tokio::test]
    async fn update_links_come_from_the_updates_page() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .page(UPDATES, UPDATES_PAGE)
                .reply(&reply("Updates were successfully removed"))
                .reply(&reply("You are no longer watching this mod")),
        );
        let client = client(&transport);

        let updates = client.updates().await.unwrap();
        client.clear_update(&updates[0]).await.unwrap();
        client.unfollow_update(&updates[0]).await.unwrap();

        let posts = transport.posts();
        assert_eq!(posts[0].0, updates[0].clear_url);
        assert_eq!(posts[1].0, updates[0].unfollow_url);
        assert_eq!(field(&posts[1].1, "ajax"), Some("t"));
    }

    #[tokio::test]
    async fn clear_updates_uses_category_link() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .page(UPDATES, UPDATES_PAGE)
                .page(UPDATES, UPDATES_PAGE)
                .reply(&reply("All your updates were cleared")),
        );
        let client = client(&transport);

        client.clear_updates(WatchType::Mod).await.unwrap();
        assert_eq!(
            transport.posts()[0].0,
            "https://www.moddb.com/messages/updates/clearall/abc123/1/mods"
        );

        // No game updates: nothing is posted.
        client.clear_updates(WatchType::Game).await.unwrap();
        assert_eq!(transport.posts().len(), 1);
    }

    #[tokio::test]
    async fn watched_lists_use_category_pages() {
        let transport = Arc::new(ScriptedTransport::new().page(
            "https://www.moddb.com/messages/watching/games/page/2",
            "<html></html>",
        ));
        let client = client(&transport);

        let list = client.watched(WatchType::Game, 2).await.unwrap();
        assert!(list.is_empty());
        assert_eq!(
            list.base_url(),
            "https://www.moddb.com/messages/watching/games"
        );
    }

    #[tokio::test]
    async fn thread_actions_check_their_phrases() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(&reply("bob has been successfully added to the conversation"))
                .reply(&reply("You have successfully deleted the requested thread"))
                .reply(&reply("Nothing to mark")),
        );
        let client = client(&transport);

        client.add_member_to_thread(4411, "bob").await.unwrap();
        client.leave_thread(4411).await.unwrap();
        assert!(matches!(
            client.mark_all_read().await,
            Err(Error::ActionRejected { action: "mark all read", .. })
        ));

        let posts = transport.posts();
        assert_eq!(
            posts[0].0,
            "https://www.moddb.com/messages/ajax/members/invite/4411"
        );
        assert_eq!(field(&posts[0].1, "username"), Some("bob"));
        assert_eq!(field(&posts[1].1, "thread"), Some("4411"));
    }

    #[tokio::test]
    async fn send_message_returns_the_new_thread() {
        let thread_page = r#"<div id="firstmessage"><div class="normalcorner">
            <span class="heading">Hi</span><a class="deleteicon" href="/messages/delete?thread=12">x</a>
            </div><div class="tablecomments"></div></div>"#;
        let transport = Arc::new(ScriptedTransport::new().reply(thread_page));
        let client = client(&transport);

        let thread = client.send_message(&["bob", "carol"], "Hi", "Hello both").await.unwrap();
        assert_eq!(thread.id, 12);

        let (url, data) = &transport.posts()[0];
        assert_eq!(url, "https://www.moddb.com/messages/compose/");
        assert_eq!(field(data, "membersto"), Some("bob,carol"));
        assert_eq!(field(data, "description"), Some("Hello both"));

        assert!(matches!(
            client.send_message(&[], "Hi", "x").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            client.reply_to_thread(12, "  ").await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(transport.posts().len(), 1);
    }

    #[tokio::test]
    async fn tag_votes_read_success_flag() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(r#"{"success": true}"#)
                .reply(r#"{"success": false, "text": "You have already voted"}"#),
        );
        let client = client(&transport);
        let tag = TagRef {
            name_id: "puzzle".into(),
            sitearea: 4,
            siteareaid: 42,
        };

        client.upvote_tag(&tag).await.unwrap();
        assert!(matches!(
            client.downvote_tag(&tag).await,
            Err(Error::ActionRejected { action: "vote tag", .. })
        ));

        let posts = transport.posts();
        assert_eq!(posts[0].0, "https://www.moddb.com/tags/ajax/add");
        assert_eq!(field(&posts[0].1, "negative"), Some("0"));
        assert_eq!(field(&posts[1].1, "negative"), Some("1"));
        assert_eq!(field(&posts[1].1, "tag"), Some("puzzle"));
    }

    #[tokio::test]
    async fn second_comment_within_a_minute_fails_fast() {
        let transport = Arc::new(ScriptedTransport::new().reply("<html>posted</html>"));
        let client = client(&transport);
        let url = "https://www.moddb.com/mods/portal-reloaded";

        let page = client.add_comment(url, "Nice", None).await.unwrap();
        assert_eq!(page.html(), "<html>posted</html>");

        let err = client
            .add_comment(url, "Nice again", Some(&comment(101)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
        assert_eq!(transport.posts().len(), 1);

        let data = &transport.posts()[0].1;
        assert_eq!(field(data, "replyid"), Some("0"));
        assert_eq!(field(data, "summary"), Some("Nice"));
        assert_eq!(field(data, "formhash").map(str::len), Some(32));
    }

    #[tokio::test]
    async fn extreme_rating_without_text_makes_no_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(&transport);
        let page = PageRef::new(1, "https://www.moddb.com/mods/portal-reloaded");

        let err = client
            .add_review(&page, &ReviewDraft::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(transport.gets().is_empty());
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn add_review_reads_rating_hash() {
        let page_url = "https://www.moddb.com/mods/portal-reloaded";
        let html = r#"<form class="ratingform"><input type="hidden" name="hash" value="rh1"></form>"#;
        let transport = Arc::new(
            ScriptedTransport::new()
                .page(page_url, html)
                .reply(&reply("Your rating has been saved")),
        );
        let client = client(&transport);
        let page = PageRef::new(3, page_url);

        client
            .add_review(&page, &ReviewDraft::new(1).with_text("Crashes on load"))
            .await
            .unwrap();

        let posts = transport.posts();
        assert_eq!(posts[0].0, "https://www.moddb.com/reviews/ajax");
        assert_eq!(field(&posts[0].1, "hash"), Some("rh1"));
        assert_eq!(field(&posts[0].1, "rating"), Some("1"));
        assert_eq!(field(&posts[0].1, "sitearea"), Some("mods"));
    }

    #[tokio::test]
    async fn delete_review_requires_listed_token() {
        let listing = "https://www.moddb.com/members/alice/reviews";
        let html = r#"<a title="Delete" href="/messages/ajax/action/?action=delete&siteareaid=55&hash=rv55">x</a>"#;
        let transport = Arc::new(
            ScriptedTransport::new()
                .page(listing, html)
                .page(listing, html)
                .reply(&reply("You have <u>deleted</u> this review.")),
        );
        let client = client(&transport);

        client
            .delete_review(&ReviewRef {
                id: 55,
                url: listing.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(field(&transport.posts()[0].1, "hash"), Some("rv55"));

        let err = client
            .delete_review(&ReviewRef {
                id: 56,
                url: listing.to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleReference { id: 56, .. }));
    }

    #[tokio::test]
    async fn comments_are_threaded() {
        let transport = Arc::new(ScriptedTransport::new().page(PAGE_ONE, COMMENT_PAGE));
        let client = client(&transport);

        let list = client
            .comments("https://www.moddb.com/mods/portal-reloaded", 1, false)
            .await
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.items()[0].height(), 3);
        assert_eq!(list.total_pages(), 1);
        assert!(!list.has_next());
    }

    #[test]
    fn sitearea_is_collection_segment() {
        let page = PageRef::new(1, "https://www.moddb.com/games/half-life-2/");
        assert_eq!(page.sitearea().unwrap(), "games");
        assert_eq!(page.kind().unwrap(), ThumbnailType::Game);
        assert!(PageRef::new(1, "https://www.moddb.com/").sitearea().is_err());
    }
}
