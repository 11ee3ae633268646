use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which physical content table a row lives in.
///
/// Regular and auto-generated content are stored in separate tables but are
/// queried as one logical domain; edges in `content_tag` carry the source so
/// a `(content_id, content_source)` pair is globally unique.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Regular,
    Auto,
}

impl ContentSource {
    /// Canonical iteration order for cross-source queries and pagination.
    pub const ALL: [ContentSource; 2] = [ContentSource::Regular, ContentSource::Auto];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentSource::Regular => "regular",
            ContentSource::Auto => "auto",
        }
    }

    pub(crate) fn rank(self) -> u8 {
        match self {
            ContentSource::Regular => 0,
            ContentSource::Auto => 1,
        }
    }
}

impl std::str::FromStr for ContentSource {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regular" => Ok(ContentSource::Regular),
            "auto" => Ok(ContentSource::Auto),
            _ => Err(TagError::InvalidContentSource(s.to_string())),
        }
    }
}

impl std::fmt::Display for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of one content row across both physical tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ContentKey {
    pub id: i32,
    pub source: ContentSource,
}

impl ContentKey {
    pub fn new(id: i32, source: ContentSource) -> Self {
        Self { id, source }
    }
}

/// Multi-tag match semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Content matches if it carries at least one of the requested tags.
    Any,
    /// Content matches only if it carries every requested tag.
    All,
}

/// Filter dimension distinguishing the requester's own content from others'.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreatorScope {
    /// Only the requesting user's content.
    Own,
    /// Everything except the requesting user's content.
    Others,
    /// No creator predicate at all. Equivalent to `Own` union `Others`
    /// but issued as a single scan.
    Both,
    /// Selects nothing; short-circuits to an empty page.
    None,
}

/// Pagination cursor: position in `(content_source, created_at, content_id)`
/// tuple order. Points at the last delivered row; the next page starts
/// strictly after it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor {
    pub source: ContentSource,
    pub created_at: DateTimeWithTimeZone,
    pub content_id: i32,
}

/// A tag-filtered content query.
///
/// `sources` distinguishes "no filter provided" (`None`, all sources) from
/// "explicitly nothing selected" (`Some` of an empty vec, empty page). The
/// two must never collapse into one another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagFilter {
    pub tag_ids: Vec<i32>,
    pub match_mode: MatchMode,
    pub creator_scope: CreatorScope,
    /// Requesting user; required for `Own` and `Others` scopes.
    pub viewer_id: Option<i32>,
    pub sources: Option<Vec<ContentSource>>,
    pub cursor: Option<Cursor>,
    pub page_size: u64,
    /// Request a total match count alongside the page. Costs an extra
    /// counting scan per source.
    pub include_total: bool,
}

impl Default for TagFilter {
    fn default() -> Self {
        Self {
            tag_ids: Vec::new(),
            match_mode: MatchMode::Any,
            creator_scope: CreatorScope::Both,
            viewer_id: None,
            sources: None,
            cursor: None,
            page_size: 50,
            include_total: false,
        }
    }
}

/// One result page of content identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<ContentKey>,
    pub next_cursor: Option<Cursor>,
    pub total: Option<u64>,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            total: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TagError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    // The field is deliberately not named `source`: thiserror would treat
    // it as the error's source() and require std::error::Error on it.
    #[error("Content not found: {id} ({content_source})")]
    ContentNotFound {
        id: i32,
        content_source: ContentSource,
    },
    #[error("Invalid content source: {0}")]
    InvalidContentSource(String),
    #[error("Query timed out")]
    Timeout,
}
