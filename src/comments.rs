//! Threaded comment reconstruction.
//!
//! Comment pages list every comment flat, in display order, with a nesting
//! depth of 0 (top level), 1 (reply) or 2 (reply to a reply). [`build_tree`]
//! turns that sequence back into the reply tree in one pass.
//!
//! ```
//! use moddb::comments::{build_tree, flatten};
//! # use moddb::comments::CommentRecord;
//! # fn records() -> Vec<CommentRecord> { Vec::new() }
//!
//! # fn example() -> moddb::Result<()> {
//! let roots = build_tree(records())?;
//! for comment in flatten(&roots) {
//!     println!("{}{}", "  ".repeat(usize::from(comment.depth)), comment.author.name);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::thumbnail::Thumbnail;

/// Deepest nesting the site renders.
pub const MAX_DEPTH: u8 = 2;

/// Vote tally of a comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub net: i64,
    pub positive: Option<u32>,
    pub negative: Option<u32>,
}

/// One comment as read from a page, before threading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: u64,
    pub author: Thumbnail,
    /// `None` for comments that only hold embeds.
    pub content: Option<String>,
    pub date: DateTime<FixedOffset>,
    pub score: Score,
    /// 0, 1 or 2.
    pub depth: u8,
    /// Index in the page's comment sequence.
    pub position: usize,
    /// `false` while waiting for moderation.
    pub approved: bool,
    pub developer: bool,
    pub staff: bool,
    pub subscriber: bool,
    pub guest: bool,
    pub embeds: Vec<String>,
    pub upvote: Option<String>,
    pub downvote: Option<String>,
    /// Short-lived hash authorizing delete/undelete. Bound to the page the
    /// comment currently sits on.
    pub delete_token: Option<String>,
    /// The comment page this record was read from.
    pub source_url: Option<String>,
    /// Where the comment was posted, on member comment listings.
    pub location: Option<Thumbnail>,
}

/// A comment with its direct replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(flatten)]
    pub record: CommentRecord,
    pub children: Vec<Comment>,
}

impl Comment {
    fn leaf(record: CommentRecord) -> Self {
        Self {
            record,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.record.id
    }

    /// Height of the subtree rooted here, counting this comment.
    pub fn height(&self) -> usize {
        1 + self.children.iter().map(Self::height).max().unwrap_or(0)
    }

    /// This comment followed by its descendants, in display order.
    pub fn iter(&self) -> impl Iterator<Item = &CommentRecord> + '_ {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out.into_iter()
    }

    fn collect_into<'a>(&'a self, out: &mut Vec<&'a CommentRecord>) {
        out.push(&self.record);
        for child in &self.children {
            child.collect_into(out);
        }
    }
}

/// Rebuild the reply tree from a flat, display-ordered sequence.
///
/// A depth-1 record attaches to the latest depth-0 record, a depth-2 record to
/// the latest depth-1 record under it. A reply with nothing to attach to (or a
/// depth above [`MAX_DEPTH`]) fails with [`Error::MalformedComment`] instead of
/// being dropped or attached elsewhere.
pub fn build_tree(records: impl IntoIterator<Item = CommentRecord>) -> Result<Vec<Comment>> {
    let mut roots: Vec<Comment> = Vec::new();
    // Whether the latest root has received a first-level reply since it was
    // appended; the reply is then `roots.last().children.last()`.
    let mut has_reply = false;

    for (position, record) in records.into_iter().enumerate() {
        let malformed = |record: &CommentRecord| Error::MalformedComment {
            id: record.id,
            depth: record.depth,
            position,
        };

        match record.depth {
            0 => {
                roots.push(Comment::leaf(record));
                has_reply = false;
            }
            1 => {
                let Some(root) = roots.last_mut() else {
                    return Err(malformed(&record));
                };
                root.children.push(Comment::leaf(record));
                has_reply = true;
            }
            2 => {
                let reply = if has_reply {
                    roots.last_mut().and_then(|root| root.children.last_mut())
                } else {
                    None
                };
                let Some(reply) = reply else {
                    return Err(malformed(&record));
                };
                reply.children.push(Comment::leaf(record));
            }
            _ => return Err(malformed(&record)),
        }
    }

    Ok(roots)
}

/// Every comment of the forest in display order.
pub fn flatten(roots: &[Comment]) -> Vec<&CommentRecord> {
    roots.iter().flat_map(Comment::iter).collect()
}

/// Find a comment anywhere in the forest.
pub fn find(roots: &[Comment], id: u64) -> Option<&CommentRecord> {
    roots
        .iter()
        .flat_map(Comment::iter)
        .find(|record| record.id == id)
}
