//! Defines the [`ContentItem`] type and the small vocabulary types that
//! identify and classify it: [`ContentType`], [`ItemId`] and [`GrowthStage`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;

use crate::tag::Tag;

/// The fixed set of content namespaces. Each type owns a directory in the
/// content tree and the URL prefix of the same name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentType {
    Note,
    Til,
    Bookmark,
    HowTo,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Note,
        ContentType::Til,
        ContentType::Bookmark,
        ContentType::HowTo,
    ];

    /// The directory name and URL path prefix for this type (e.g., `notes`).
    pub fn prefix(self) -> &'static str {
        match self {
            ContentType::Note => "notes",
            ContentType::Til => "til",
            ContentType::Bookmark => "bookmarks",
            ContentType::HowTo => "how-to",
        }
    }

    /// The singular name of the type (e.g., `note`).
    pub fn name(self) -> &'static str {
        match self {
            ContentType::Note => "note",
            ContentType::Til => "til",
            ContentType::Bookmark => "bookmark",
            ContentType::HowTo => "how-to",
        }
    }

    /// Looks a type up by its URL prefix only.
    pub fn from_prefix(prefix: &str) -> Option<ContentType> {
        ContentType::ALL
            .iter()
            .copied()
            .find(|t| t.prefix() == prefix)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContentType {
    type Err = UnknownContentType;

    /// Accepts either the singular name (`note`) or the prefix (`notes`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s || t.prefix() == s)
            .ok_or_else(|| UnknownContentType(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownContentType(pub String);

impl fmt::Display for UnknownContentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown content type: `{}`", &self.0)
    }
}

impl std::error::Error for UnknownContentType {}

/// Identifies a [`ContentItem`]: its content type plus a slug derived from
/// the source file name. Slugs are unique within a content type.
///
/// Displays as `{prefix}/{slug}` (e.g., `notes/rust-lifetimes`), which is also
/// the form accepted by [`ItemId::from_str`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId {
    pub content_type: ContentType,
    pub slug: String,
}

impl ItemId {
    pub fn new(content_type: ContentType, slug: impl Into<String>) -> ItemId {
        ItemId {
            content_type,
            slug: slug.into(),
        }
    }

    /// The canonical site path for the item, e.g. `/notes/rust-lifetimes/`.
    pub fn url_path(&self) -> String {
        format!("/{}/{}/", self.content_type.prefix(), self.slug)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.content_type.prefix(), self.slug)
    }
}

impl FromStr for ItemId {
    type Err = InvalidItemId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches('/');
        let (prefix, slug) = trimmed
            .split_once('/')
            .ok_or_else(|| InvalidItemId(s.to_owned()))?;
        if slug.is_empty() || slug.contains('/') {
            return Err(InvalidItemId(s.to_owned()));
        }
        let content_type = ContentType::from_prefix(prefix)
            .ok_or_else(|| InvalidItemId(s.to_owned()))?;
        Ok(ItemId::new(content_type, slug))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidItemId(pub String);

impl fmt::Display for InvalidItemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid item id `{}` (expected `{{prefix}}/{{slug}}`)", &self.0)
    }
}

impl std::error::Error for InvalidItemId {}

/// An author-assigned maturity ordinal. Declaration order is the ordering:
/// seedling < budding < growing < evergreen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GrowthStage {
    Seedling,
    Budding,
    Growing,
    Evergreen,
}

impl Default for GrowthStage {
    fn default() -> Self {
        GrowthStage::Seedling
    }
}

impl GrowthStage {
    pub fn name(self) -> &'static str {
        match self {
            GrowthStage::Seedling => "seedling",
            GrowthStage::Budding => "budding",
            GrowthStage::Growing => "growing",
            GrowthStage::Evergreen => "evergreen",
        }
    }
}

impl fmt::Display for GrowthStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GrowthStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "seedling" => Ok(GrowthStage::Seedling),
            "budding" => Ok(GrowthStage::Budding),
            "growing" => Ok(GrowthStage::Growing),
            "evergreen" => Ok(GrowthStage::Evergreen),
            _ => Err(format!("unknown growth stage: `{}`", s)),
        }
    }
}

/// Every loaded item, keyed by id.
pub type ItemMap = BTreeMap<ItemId, Arc<ContentItem>>;

/// One parsed document. Items are only ever created by
/// [`crate::parser::parse`] from a [`crate::store::RawDocument`] and are
/// replaced wholesale when their source file is re-read.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentItem {
    /// Derived from the file name at load time; never changes afterwards.
    pub id: ItemId,

    pub title: String,

    pub created: DateTime<Utc>,

    /// Defaults to `created` when the frontmatter doesn't say otherwise.
    pub updated: DateTime<Utc>,

    /// Tags in the order the author wrote them, without duplicates.
    pub tags: Vec<Tag>,

    pub stage: GrowthStage,

    /// The markdown body below the frontmatter. Authoritative.
    pub body: String,

    /// The body rendered to HTML. Derived from `body`.
    pub html: String,

    /// For bookmarks: the page being bookmarked.
    pub external_url: Option<Url>,

    pub source_path: PathBuf,

    pub file_modified: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Returns the rendered body up to the `<!-- more -->` fold, and whether
    /// the fold was found.
    pub fn summary(&self) -> (&str, bool) {
        const FOLD_TAG: &str = "<!-- more -->";
        match self.html.find(FOLD_TAG) {
            Some(i) => (&self.html[..i], true),
            None => (&self.html, false),
        }
    }

    /// Reports whether the item carries a tag. `name` is slugified first, so
    /// `Rust` and `rust` match the same tag.
    pub fn has_tag(&self, name: &str) -> bool {
        let name = slug::slugify(name);
        self.tags.iter().any(|t| t.name == name)
    }
}

#[cfg(test)]
impl ContentItem {
    /// Builds an item created at midnight on day `day` of January 2021. `id`
    /// is in `{prefix}/{slug}` form.
    pub(crate) fn fixture(id: &str, day: u32, body: &str) -> ContentItem {
        use chrono::TimeZone;
        let id: ItemId = id.parse().unwrap();
        let created = Utc.from_utc_datetime(
            &chrono::NaiveDate::from_ymd_opt(2021, 1, day)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap(),
        );
        ContentItem {
            title: id.slug.clone(),
            source_path: PathBuf::from(format!("{}.md", id)),
            id,
            created,
            updated: created,
            tags: Vec::new(),
            stage: GrowthStage::default(),
            body: body.to_owned(),
            html: String::new(),
            external_url: None,
            file_modified: None,
        }
    }
}
