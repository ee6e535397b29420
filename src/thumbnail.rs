//! Lazy references to entities that have not been fetched yet.
//!
//! Result lists, comment authors and comment locations all point at other
//! pages through a [`Thumbnail`]. Resolving one fetches the page and hands it
//! to a parser chosen by the thumbnail's [`ThumbnailType`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::{Document, QueryParams, Transport};

/// The kinds of entity a thumbnail can point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailType {
    Mod,
    Game,
    Engine,
    Member,
    Group,
    Article,
    Review,
    /// Also used for companies.
    Team,
    Blog,
    Addon,
    File,
    Job,
    Platform,
    Media,
    Software,
    Hardware,
    Poll,
}

impl ThumbnailType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mod => "mod",
            Self::Game => "game",
            Self::Engine => "engine",
            Self::Member => "member",
            Self::Group => "group",
            Self::Article => "article",
            Self::Review => "review",
            Self::Team => "team",
            Self::Blog => "blog",
            Self::Addon => "addon",
            Self::File => "file",
            Self::Job => "job",
            Self::Platform => "platform",
            Self::Media => "media",
            Self::Software => "software",
            Self::Hardware => "hardware",
            Self::Poll => "poll",
        }
    }

    /// Classify a page by its URL path.
    ///
    /// Site paths alternate collection and slug (`/mods/foo/images/bar`); the
    /// last collection that is followed by a slug names the entity. Pagination
    /// segments (`/page/2`) are ignored.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)?;
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let mut kind = None;
        let mut i = 0;
        while i + 1 < segments.len() {
            let collection = segments[i];
            if collection == "page" || collection == "pages" {
                i += 2;
                continue;
            }
            if let Ok(found) = collection.parse::<Self>() {
                kind = Some(found);
            }
            i += 2;
        }

        let kind = kind.ok_or_else(|| Error::Parse(format!("cannot tell page type of {url}")))?;
        debug!(url, kind = kind.as_str(), "classified page");
        Ok(kind)
    }
}

impl FromStr for ThumbnailType {
    type Err = Error;

    /// Accepts singular or plural collection names as they appear in URLs.
    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "mod" | "mods" => Self::Mod,
            "game" | "games" => Self::Game,
            "engine" | "engines" => Self::Engine,
            "member" | "members" => Self::Member,
            "group" | "groups" => Self::Group,
            "article" | "articles" | "news" | "feature" | "features" | "tutorial"
            | "tutorials" => Self::Article,
            "review" | "reviews" => Self::Review,
            "team" | "teams" | "company" | "companies" => Self::Team,
            "blog" | "blogs" => Self::Blog,
            "addon" | "addons" => Self::Addon,
            "file" | "files" | "download" | "downloads" => Self::File,
            "job" | "jobs" => Self::Job,
            "platform" | "platforms" => Self::Platform,
            "media" | "image" | "images" | "audio" | "video" | "videos" => Self::Media,
            "software" => Self::Software,
            "hardware" => Self::Hardware,
            "poll" | "polls" => Self::Poll,
            other => return Err(Error::Parse(format!("unknown thumbnail type {other:?}"))),
        };
        Ok(kind)
    }
}

impl fmt::Display for ThumbnailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A miniature of an entity: enough to display it and to fetch the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub name: String,
    /// Absolute URL of the full entity.
    pub url: String,
    pub kind: ThumbnailType,
    pub image: Option<String>,
    pub summary: Option<String>,
    pub date: Option<DateTime<FixedOffset>>,
}

impl Thumbnail {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: ThumbnailType) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind,
            image: None,
            summary: None,
            date: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary;
        self
    }

    #[must_use]
    pub fn with_date(mut self, date: Option<DateTime<FixedOffset>>) -> Self {
        self.date = date;
        self
    }

    /// Fetch the full entity.
    ///
    /// Performs exactly one fetch of [`Thumbnail::url`] and one call to
    /// `parse` with the fetched document and [`Thumbnail::kind`]. Nothing is
    /// cached: every call goes back to the site. A [`Error::NotFound`] from
    /// the transport is returned as is.
    pub async fn resolve<T, P>(&self, transport: &(impl Transport + ?Sized), parse: P) -> Result<T>
    where
        P: FnOnce(&Document, ThumbnailType) -> Result<T>,
    {
        debug!(url = %self.url, kind = %self.kind, "resolving thumbnail");
        let document = transport.get(&self.url, &QueryParams::new()).await?;
        parse(&document, self.kind)
    }
}

impl fmt::Display for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) {}", self.name, self.kind, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedTransport;

    #[test]
    fn classifies_top_level_pages() {
        let cases = [
            ("https://www.moddb.com/mods/half-life-2-rtx", ThumbnailType::Mod),
            ("https://www.moddb.com/games/half-life-2", ThumbnailType::Game),
            ("https://www.moddb.com/members/silverelf", ThumbnailType::Member),
            ("https://www.moddb.com/company/valve", ThumbnailType::Team),
            ("https://www.moddb.com/news/version-3-released", ThumbnailType::Article),
            ("https://www.moddb.com/downloads/patch-1", ThumbnailType::File),
            ("https://www.moddb.com/polls/total-conversions-vs-cosmetic-mods", ThumbnailType::Poll),
        ];
        for (url, expected) in cases {
            assert_eq!(ThumbnailType::from_url(url).unwrap(), expected, "{url}");
        }
    }

    #[test]
    fn nested_collection_wins() {
        let url = "https://www.moddb.com/mods/skyrim-overhaul/images/main-menu";
        assert_eq!(ThumbnailType::from_url(url).unwrap(), ThumbnailType::Media);

        let url = "https://www.moddb.com/games/half-life/addons/hd-pack";
        assert_eq!(ThumbnailType::from_url(url).unwrap(), ThumbnailType::Addon);
    }

    #[test]
    fn pagination_segments_are_ignored() {
        let url = "https://www.moddb.com/mods/skyrim-overhaul/page/3";
        assert_eq!(ThumbnailType::from_url(url).unwrap(), ThumbnailType::Mod);
    }

    #[test]
    fn unknown_path_is_a_parse_error() {
        assert!(ThumbnailType::from_url("https://www.moddb.com/").is_err());
        assert!(ThumbnailType::from_url("https://www.moddb.com/frontpage/x").is_err());
    }

    #[tokio::test]
    async fn resolve_fetches_every_time() {
        let transport = ScriptedTransport::new()
            .page("https://www.moddb.com/mods/foo", "<h1>Foo v1</h1>")
            .page("https://www.moddb.com/mods/foo", "<h1>Foo v2</h1>");
        let thumb = Thumbnail::new("Foo", "https://www.moddb.com/mods/foo", ThumbnailType::Mod);

        let parse = |doc: &Document, kind: ThumbnailType| -> Result<String> {
            assert_eq!(kind, ThumbnailType::Mod);
            Ok(doc.html().to_string())
        };

        let first = thumb.resolve(&transport, parse).await.unwrap();
        let second = thumb.resolve(&transport, parse).await.unwrap();
        assert_eq!(first, "<h1>Foo v1</h1>");
        assert_eq!(second, "<h1>Foo v2</h1>");
        assert_eq!(transport.gets().len(), 2);
    }

    #[tokio::test]
    async fn resolve_propagates_not_found() {
        let transport = ScriptedTransport::new();
        let thumb = Thumbnail::new("Gone", "https://www.moddb.com/mods/gone", ThumbnailType::Mod);

        let err = thumb
            .resolve(&transport, |_, _| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(transport.gets().len(), 1);
    }
}
