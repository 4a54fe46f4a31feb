//! Mixed-content listings: every content type merged into one sequence,
//! filtered, sorted and cut into pages.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::item::{ContentItem, ContentType, GrowthStage, ItemMap};

/// Restricts a listing. Empty sets don't restrict anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filters {
    /// Keep items of any of these types.
    pub content_types: BTreeSet<ContentType>,

    /// Keep items carrying every one of these tags.
    pub tags: BTreeSet<String>,

    /// Keep items at any of these stages.
    pub stages: BTreeSet<GrowthStage>,
}

impl Filters {
    pub fn with_type(mut self, content_type: ContentType) -> Filters {
        self.content_types.insert(content_type);
        self
    }

    /// Adds a required tag. Tags are slugified, like item tags.
    pub fn with_tag(mut self, tag: &str) -> Filters {
        self.tags.insert(slug::slugify(tag));
        self
    }

    pub fn with_stage(mut self, stage: GrowthStage) -> Filters {
        self.stages.insert(stage);
        self
    }

    pub fn matches(&self, item: &ContentItem) -> bool {
        (self.content_types.is_empty()
            || self.content_types.contains(&item.id.content_type))
            && (self.stages.is_empty() || self.stages.contains(&item.stage))
            && self.tags.iter().all(|tag| item.has_tag(tag))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest first.
    CreatedDesc,
    CreatedAsc,
    /// Most recently updated first.
    UpdatedDesc,
    /// Case-insensitive title order.
    Title,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::CreatedDesc
    }
}

impl SortOrder {
    pub fn name(self) -> &'static str {
        match self {
            SortOrder::CreatedDesc => "created-desc",
            SortOrder::CreatedAsc => "created-asc",
            SortOrder::UpdatedDesc => "updated-desc",
            SortOrder::Title => "title",
        }
    }

    /// Compares two items; ties always fall back to id order so listings
    /// are stable.
    fn compare(self, a: &ContentItem, b: &ContentItem) -> Ordering {
        let primary = match self {
            SortOrder::CreatedDesc => b.created.cmp(&a.created),
            SortOrder::CreatedAsc => a.created.cmp(&b.created),
            SortOrder::UpdatedDesc => b.updated.cmp(&a.updated),
            SortOrder::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            SortOrder::CreatedDesc,
            SortOrder::CreatedAsc,
            SortOrder::UpdatedDesc,
            SortOrder::Title,
        ]
        .iter()
        .copied()
        .find(|order| order.name() == s)
        .ok_or_else(|| format!("unknown sort order: `{}`", s))
    }
}

/// One request for a page of mixed content. Pages are numbered from 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub filters: Filters,
    pub sort: SortOrder,
    pub page: usize,
    pub page_size: usize,
}

impl Query {
    pub fn new(page: usize, page_size: usize) -> Query {
        Query {
            filters: Filters::default(),
            sort: SortOrder::default(),
            page,
            page_size,
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Query {
        self.filters = filters;
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Query {
        self.sort = sort;
        self
    }

    /// Forces `page` to at least 1 and `page_size` into
    /// `1..=max_page_size`.
    pub fn clamped(&self, max_page_size: usize) -> Query {
        Query {
            filters: self.filters.clone(),
            sort: self.sort,
            page: self.page.max(1),
            page_size: self.page_size.max(1).min(max_page_size.max(1)),
        }
    }

    /// A key covering every argument, for memoizing the result.
    pub fn cache_key(&self) -> String {
        fn list<T: ToString>(values: impl Iterator<Item = T>) -> String {
            values.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
        }
        format!(
            "mixed:types={};tags={};stages={};sort={};page={};size={}",
            list(self.filters.content_types.iter()),
            list(self.filters.tags.iter()),
            list(self.filters.stages.iter()),
            self.sort,
            self.page,
            self.page_size,
        )
    }
}

/// One page of a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct PageResult {
    pub items: Vec<Arc<ContentItem>>,
    pub page: usize,
    pub page_size: usize,

    /// Matching items across all pages.
    pub total_items: usize,
    pub total_pages: usize,
}

impl PageResult {
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Filters, sorts and pages `items`. A page past the end is empty rather
/// than an error. The query should already be [`Query::clamped`]; a zero
/// page or page size is treated as 1.
pub fn page(items: &ItemMap, query: &Query) -> PageResult {
    let page = query.page.max(1);
    let page_size = query.page_size.max(1);

    let mut matching: Vec<&Arc<ContentItem>> = items
        .values()
        .filter(|item| query.filters.matches(item))
        .collect();
    matching.sort_by(|a, b| query.sort.compare(a, b));

    let total_items = matching.len();
    let total_pages = match total_items % page_size {
        0 => total_items / page_size,
        _ => total_items / page_size + 1,
    };

    PageResult {
        items: matching
            .chunks(page_size)
            .nth(page - 1)
            .map(|chunk| chunk.iter().map(|item| Arc::clone(item)).collect())
            .unwrap_or_default(),
        page,
        page_size,
        total_items,
        total_pages,
    }
}
