//! The [`Site`] ties the pieces together: it loads documents from a
//! [`ContentSource`], parses them, builds the link graph and publishes the
//! result as an immutable [`Snapshot`]. Queries run against whichever
//! snapshot is current when they start, so readers never see a half-built
//! index, and the expensive ones are memoized in [`TimedCache`]s.
//!
//! Writers (full rebuilds, single-document refreshes and removals) are
//! serialized; each builds its snapshot off to the side and swaps it in at
//! the end.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::aggregate::{self, PageResult, Query};
use crate::cache::{Clock, SystemClock, TimedCache};
use crate::config::{CacheConfig, Config, PaginationConfig};
use crate::graph::LinkGraph;
use crate::item::{ContentItem, ContentType, ItemId, ItemMap};
use crate::links::LinkExtractor;
use crate::parser::{self, ParseError};
use crate::path::{self, ValidatedPath};
use crate::store::{ContentSource, RawDocument, Scan, Warning, WarningKind};

/// One consistent, published view of the content.
#[derive(Debug)]
pub struct Snapshot {
    /// Increases by one with every publish.
    pub generation: u64,
    pub items: ItemMap,
    pub graph: LinkGraph,

    /// Documents that were skipped, and why.
    pub warnings: Vec<Warning>,
}

impl Snapshot {
    /// Parses every document in `scan`. Documents that fail to parse are
    /// recorded as warnings and left out. When two documents claim the same
    /// id, the first in path order wins.
    fn build(scan: Scan, extractor: &LinkExtractor, generation: u64) -> Snapshot {
        let Scan {
            mut documents,
            mut warnings,
        } = scan;
        documents.sort_by(|a, b| a.path.cmp(&b.path));

        let mut items = ItemMap::new();
        for raw in &documents {
            match parser::parse(raw) {
                Ok(item) => {
                    if items.contains_key(&item.id) {
                        warn!(path = %raw.path.display(), id = %item.id, "duplicate id; skipping document");
                        warnings.push(Warning {
                            path: raw.path.clone(),
                            kind: WarningKind::DuplicateId(item.id),
                        });
                        continue;
                    }
                    items.insert(item.id.clone(), Arc::new(item));
                }
                Err(err) => {
                    warn!(%err, "skipping document");
                    warnings.push(Warning {
                        path: err.path,
                        kind: WarningKind::Parse(err.kind),
                    });
                }
            }
        }

        let graph = LinkGraph::build(items.values().map(|item| &**item), extractor);
        Snapshot {
            generation,
            items,
            graph,
            warnings,
        }
    }
}

/// Returned when a requested item doesn't exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotFound(pub ItemId);

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "no such item: `{}`", self.0)
    }
}

impl std::error::Error for NotFound {}

/// Represents an error refreshing a single document. Either way the
/// problem is also recorded in the published warnings.
#[derive(Clone, Debug, PartialEq)]
pub enum RefreshError {
    /// Returned when the document no longer parses.
    Parse(ParseError),

    /// Returned when another file already owns the document's id.
    DuplicateId { id: ItemId, owner: PathBuf },
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RefreshError::Parse(err) => err.fmt(f),
            RefreshError::DuplicateId { id, owner } => write!(
                f,
                "id `{}` already belongs to '{}'",
                id,
                owner.display()
            ),
        }
    }
}

impl std::error::Error for RefreshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RefreshError::Parse(err) => Some(err),
            RefreshError::DuplicateId { .. } => None,
        }
    }
}

impl From<ParseError> for RefreshError {
    fn from(err: ParseError) -> RefreshError {
        RefreshError::Parse(err)
    }
}

pub struct Site<S, C = SystemClock> {
    source: S,
    extractor: LinkExtractor,
    pagination: PaginationConfig,
    current: RwLock<Arc<Snapshot>>,

    // Held for the whole of every rebuild, refresh and removal.
    writer: Mutex<()>,

    pages: Mutex<TimedCache<Arc<PageResult>, C>>,
    backlinks: Mutex<TimedCache<Arc<Vec<ItemId>>, C>>,
    tags: Mutex<TimedCache<Arc<BTreeMap<String, usize>>, C>>,
}

impl<S: ContentSource> Site<S, SystemClock> {
    /// Loads everything from `source` and publishes the first snapshot.
    pub fn new(source: S, config: &Config) -> Self {
        Site::with_clock(source, config, SystemClock)
    }
}

impl<S: ContentSource, C: Clock + Clone> Site<S, C> {
    pub fn with_clock(source: S, config: &Config, clock: C) -> Self {
        let extractor = LinkExtractor::new(config.links);
        let first = Snapshot::build(source.load_all(), &extractor, 1);
        info!(
            items = first.items.len(),
            edges = first.graph.edge_count(),
            warnings = first.warnings.len(),
            "loaded site"
        );
        Site {
            source,
            extractor,
            pagination: config.pagination,
            current: RwLock::new(Arc::new(first)),
            writer: Mutex::new(()),
            pages: cache(&config.cache, clock.clone()),
            backlinks: cache(&config.cache, clock.clone()),
            tags: cache(&config.cache, clock),
        }
    }

    /// The snapshot currently published. It stays valid (and unchanged) for
    /// as long as the caller holds it, whatever happens to the site.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Reloads every document from the source and publishes the result.
    pub fn rebuild(&self) -> Arc<Snapshot> {
        let _writer = lock(&self.writer);
        let generation = self.snapshot().generation + 1;
        self.publish(Snapshot::build(
            self.source.load_all(),
            &self.extractor,
            generation,
        ))
    }

    /// Re-parses one document and publishes a snapshot with it replaced.
    /// If it no longer parses, it is dropped from the index (along with the
    /// links it owned) and the error is both recorded and returned. A
    /// document whose id already belongs to another file is skipped with a
    /// `DuplicateId` warning, as in a full rebuild.
    pub fn refresh(&self, raw: RawDocument) -> Result<Arc<ContentItem>, RefreshError> {
        let _writer = lock(&self.writer);
        let current = self.snapshot();
        let mut items = current.items.clone();
        let mut graph = current.graph.clone();
        let mut warnings: Vec<Warning> = current
            .warnings
            .iter()
            .filter(|warning| warning.path != raw.path)
            .cloned()
            .collect();

        let owner = current
            .items
            .get(&raw.id)
            .map(|item| item.source_path.clone())
            .filter(|path| *path != raw.path);

        let outcome = match (parser::parse(&raw), owner) {
            (Ok(item), Some(owner)) => {
                warn!(path = %raw.path.display(), id = %item.id, "duplicate id; skipping document");
                warnings.push(Warning {
                    path: raw.path.clone(),
                    kind: WarningKind::DuplicateId(item.id.clone()),
                });
                Err(RefreshError::DuplicateId { id: item.id, owner })
            }
            (Ok(item), None) => {
                let item = Arc::new(item);
                graph.set_links(&item.id, self.extractor.extract(&item));
                items.insert(item.id.clone(), Arc::clone(&item));
                debug!(id = %item.id, "refreshed document");
                Ok(item)
            }
            (Err(err), owner) => {
                warn!(%err, "refreshed document rejected");
                if owner.is_none() {
                    items.remove(&raw.id);
                    graph.remove_source(&raw.id);
                }
                warnings.push(Warning {
                    path: err.path.clone(),
                    kind: WarningKind::Parse(err.kind.clone()),
                });
                Err(RefreshError::Parse(err))
            }
        };

        self.publish(Snapshot {
            generation: current.generation + 1,
            items,
            graph,
            warnings,
        });
        outcome
    }

    /// Drops one item and the links it owned. Returns false (and publishes
    /// nothing) when there was no such item.
    pub fn remove(&self, id: &ItemId) -> bool {
        let _writer = lock(&self.writer);
        let current = self.snapshot();
        if !current.items.contains_key(id) {
            return false;
        }
        let mut items = current.items.clone();
        let mut graph = current.graph.clone();
        items.remove(id);
        graph.remove_source(id);
        self.publish(Snapshot {
            generation: current.generation + 1,
            items,
            graph,
            warnings: current.warnings.clone(),
        });
        true
    }

    fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::clone(&snapshot);
        }
        lock(&self.pages).clear();
        lock(&self.backlinks).clear();
        lock(&self.tags).clear();
        info!(
            generation = snapshot.generation,
            items = snapshot.items.len(),
            edges = snapshot.graph.edge_count(),
            warnings = snapshot.warnings.len(),
            "published snapshot"
        );
        snapshot
    }

    pub fn get_item(
        &self,
        content_type: ContentType,
        slug: &str,
    ) -> Result<Arc<ContentItem>, NotFound> {
        self.item(&ItemId::new(content_type, slug))
    }

    pub fn item(&self, id: &ItemId) -> Result<Arc<ContentItem>, NotFound> {
        self.snapshot()
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| NotFound(id.clone()))
    }

    /// A page of every content type merged together. The query is clamped
    /// first, so out-of-range page numbers and sizes never fail.
    pub fn mixed_content(&self, query: &Query) -> Arc<PageResult> {
        let snapshot = self.snapshot();
        let query = query.clamped(self.pagination.max_page_size);
        let key = format!("g{}:{}", snapshot.generation, query.cache_key());

        let cached = lock(&self.pages).get(&key).cloned();
        if let Some(page) = cached {
            debug!(%key, "page cache hit");
            return page;
        }
        debug!(%key, "page cache miss");
        let page = Arc::new(aggregate::page(&snapshot.items, &query));
        lock(&self.pages).insert(key, Arc::clone(&page));
        page
    }

    /// A query for the first page at the configured default page size.
    pub fn default_query(&self) -> Query {
        Query::new(1, self.pagination.page_size)
    }

    /// The items referencing an item, most recently created first (ties in
    /// id order). Unknown items have no backlinks.
    pub fn backlinks_for(
        &self,
        content_type: ContentType,
        slug: &str,
    ) -> Vec<Arc<ContentItem>> {
        let snapshot = self.snapshot();
        let id = ItemId::new(content_type, slug);
        let key = format!("g{}:backlinks:{}", snapshot.generation, id);

        let cached = lock(&self.backlinks).get(&key).cloned();
        let ids = match cached {
            Some(ids) => ids,
            None => {
                let ids = Arc::new(snapshot.graph.backlinks(&id, &snapshot.items));
                lock(&self.backlinks).insert(key, Arc::clone(&ids));
                ids
            }
        };
        ids.iter()
            .filter_map(|source| snapshot.items.get(source).cloned())
            .collect()
    }

    /// Every target an item references, dangling ones included.
    pub fn forward_links(&self, id: &ItemId) -> Result<BTreeSet<ItemId>, NotFound> {
        let snapshot = self.snapshot();
        if !snapshot.items.contains_key(id) {
            return Err(NotFound(id.clone()));
        }
        Ok(snapshot.graph.forward_links(id))
    }

    pub fn validate_path(&self, raw: &str) -> ValidatedPath {
        path::validate(raw, &self.snapshot().items)
    }

    /// How many items carry each tag, keyed by tag slug.
    pub fn tag_counts(&self) -> Arc<BTreeMap<String, usize>> {
        let snapshot = self.snapshot();
        let key = format!("g{}:tags", snapshot.generation);

        let cached = lock(&self.tags).get(&key).cloned();
        if let Some(counts) = cached {
            return counts;
        }
        let mut counts = BTreeMap::new();
        for item in snapshot.items.values() {
            for tag in &item.tags {
                *counts.entry(tag.name.clone()).or_insert(0) += 1;
            }
        }
        let counts = Arc::new(counts);
        lock(&self.tags).insert(key, Arc::clone(&counts));
        counts
    }

    pub fn orphans(&self) -> BTreeSet<ItemId> {
        let snapshot = self.snapshot();
        snapshot.graph.orphans(&snapshot.items)
    }

    pub fn broken_links(&self) -> Vec<(ItemId, ItemId)> {
        let snapshot = self.snapshot();
        snapshot.graph.broken_links(&snapshot.items)
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.snapshot().warnings.clone()
    }
}

fn cache<V, C: Clock>(config: &CacheConfig, clock: C) -> Mutex<TimedCache<V, C>> {
    Mutex::new(TimedCache::with_clock(config.capacity, config.ttl(), clock))
}

// A panic while holding one of these locks can't leave the guarded data
// half-written, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::aggregate::Filters;
    use crate::cache::ManualClock;
    use crate::path::TruncationReason;
    use crate::store::{DirectoryStore, MemoryStore};

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    fn doc(title: &str, day: u32, body: &str) -> String {
        format!(
            "---\ntitle: {}\ncreated: 2021-01-{:02}\ntags: [garden]\n---\n{}",
            title, day, body
        )
    }

    fn raw(s: &str, text: &str) -> RawDocument {
        RawDocument {
            id: id(s),
            path: PathBuf::from(format!("{}.md", s)),
            text: text.to_owned(),
            modified: None,
        }
    }

    fn garden() -> MemoryStore {
        MemoryStore::new()
            .with(id("notes/a"), &doc("A", 1, "See [C](c.md)."))
            .with(id("notes/b"), &doc("B", 2, "Also [[c]]."))
            .with(id("notes/c"), &doc("C", 3, "The target."))
            .with(id("til/lonely"), &doc("Lonely", 4, "Nobody links here."))
    }

    fn site(store: MemoryStore) -> (Site<MemoryStore, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            Site::with_clock(store, &Config::default(), clock.clone()),
            clock,
        )
    }

    fn titles(items: &[Arc<ContentItem>]) -> Vec<&str> {
        items.iter().map(|item| item.title.as_str()).collect()
    }

    #[test]
    fn test_one_bad_document_does_not_sink_the_batch() {
        let mut store = MemoryStore::new();
        for i in 0..10 {
            store.insert(
                ItemId::new(ContentType::Note, format!("n{}", i)),
                &doc(&format!("Note {}", i), i + 1, ""),
            );
        }
        store.insert(id("til/untitled"), "---\ncreated: 2021-01-01\n---\nbody");

        let (site, _clock) = site(store);
        let snapshot = site.snapshot();
        assert_eq!(10, snapshot.items.len());
        assert_eq!(1, snapshot.warnings.len());
        assert_eq!(PathBuf::from("til/untitled.md"), snapshot.warnings[0].path);
        assert_eq!(
            Err(NotFound(id("til/untitled"))),
            site.get_item(ContentType::Til, "untitled")
        );
    }

    #[test]
    fn test_empty_source_is_a_valid_empty_index() {
        let (site, _clock) = site(MemoryStore::new());
        assert!(site.snapshot().items.is_empty());
        assert!(site.warnings().is_empty());
        let page = site.mixed_content(&Query::new(1, 10));
        assert!(page.items.is_empty());
        assert_eq!(0, page.total_pages);
    }

    #[test]
    fn test_duplicate_ids_keep_the_first_document() {
        let store = MemoryStore::new()
            .with(id("notes/a"), &doc("First", 1, ""))
            .with(id("notes/a"), &doc("Second", 2, ""));
        let (site, _clock) = site(store);
        assert_eq!("First", site.get_item(ContentType::Note, "a").unwrap().title);
        assert!(matches!(
            site.warnings()[0].kind,
            WarningKind::DuplicateId(_)
        ));
    }

    #[test]
    fn test_backlinks_are_resolved_items_newest_first() {
        let (site, _clock) = site(garden());
        assert_eq!(
            vec!["B", "A"],
            titles(&site.backlinks_for(ContentType::Note, "c"))
        );
        assert!(site.backlinks_for(ContentType::Note, "ghost").is_empty());
    }

    #[test]
    fn test_orphans_and_forward_links() {
        let (site, _clock) = site(garden());
        let expected: BTreeSet<ItemId> = vec![id("til/lonely")].into_iter().collect();
        assert_eq!(expected, site.orphans());
        let targets: BTreeSet<ItemId> = vec![id("notes/c")].into_iter().collect();
        assert_eq!(Ok(targets), site.forward_links(&id("notes/a")));
        assert_eq!(
            Err(NotFound(id("notes/ghost"))),
            site.forward_links(&id("notes/ghost"))
        );
        assert!(site.broken_links().is_empty());
    }

    #[test]
    fn test_pages_are_cached_until_they_expire() {
        let (site, clock) = site(garden());
        let query = Query::new(1, 2);
        let first = site.mixed_content(&query);
        let again = site.mixed_content(&query);
        assert!(Arc::ptr_eq(&first, &again));

        clock.advance(CacheConfig::default().ttl() + Duration::from_secs(1));
        let recomputed = site.mixed_content(&query);
        assert!(!Arc::ptr_eq(&first, &recomputed));
        assert_eq!(first, recomputed);
        assert_eq!(vec!["Lonely", "C"], titles(&recomputed.items));
    }

    #[test]
    fn test_mixed_content_clamps_and_filters() {
        let (site, _clock) = site(garden());
        let page = site.mixed_content(&Query::new(0, 1000));
        assert_eq!(1, page.page);
        assert_eq!(100, page.page_size);
        assert_eq!(4, page.items.len());

        let notes = Query::new(1, 10)
            .with_filters(Filters::default().with_type(ContentType::Note));
        assert_eq!(vec!["C", "B", "A"], titles(&site.mixed_content(&notes).items));
        assert_eq!(10, site.default_query().page_size);
    }

    #[test]
    fn test_refresh_publishes_a_new_snapshot() {
        let (site, _clock) = site(garden());
        let before = site.snapshot();
        assert_eq!(2, site.backlinks_for(ContentType::Note, "c").len());

        site.refresh(raw("til/lonely", &doc("Lonely", 4, "Now see [[notes/c]].")))
            .unwrap();

        assert_eq!(before.generation + 1, site.generation());
        assert_eq!(
            vec!["Lonely", "B", "A"],
            titles(&site.backlinks_for(ContentType::Note, "c"))
        );
        assert!(site.orphans().is_empty());

        // Holders of the old snapshot still see the old graph.
        assert_eq!(2, before.graph.backlinks(&id("notes/c"), &before.items).len());
    }

    #[test]
    fn test_refresh_that_fails_to_parse_drops_the_item() {
        let (site, _clock) = site(garden());
        let err = site.refresh(raw("notes/b", "---\ntitle: [unclosed\n---\n"));
        assert!(err.is_err());
        assert!(site.get_item(ContentType::Note, "b").is_err());
        assert_eq!(vec!["A"], titles(&site.backlinks_for(ContentType::Note, "c")));
        assert_eq!(1, site.warnings().len());

        // Fixing the document clears its warning.
        site.refresh(raw("notes/b", &doc("B", 2, "[[c]]"))).unwrap();
        assert!(site.warnings().is_empty());
        assert_eq!(2, site.backlinks_for(ContentType::Note, "c").len());
    }

    #[test]
    fn test_refresh_leaves_items_owned_by_other_files_alone() {
        let (site, _clock) = site(garden());
        let bundle = RawDocument {
            path: PathBuf::from("notes/c/index.md"),
            ..raw("notes/c", &doc("Impostor", 9, "[[a]]"))
        };

        assert_eq!(
            Err(RefreshError::DuplicateId {
                id: id("notes/c"),
                owner: PathBuf::from("notes/c.md"),
            }),
            site.refresh(bundle.clone()).map(|item| item.id.clone())
        );
        assert_eq!("C", site.get_item(ContentType::Note, "c").unwrap().title);
        assert!(site.backlinks_for(ContentType::Note, "a").is_empty());
        assert!(matches!(
            site.warnings()[0].kind,
            WarningKind::DuplicateId(_)
        ));

        let broken = RawDocument {
            text: String::from("---\ntitle: [unclosed\n---\n"),
            ..bundle
        };
        assert!(matches!(site.refresh(broken), Err(RefreshError::Parse(_))));
        assert_eq!("C", site.get_item(ContentType::Note, "c").unwrap().title);
        assert_eq!(2, site.backlinks_for(ContentType::Note, "c").len());
        assert_eq!(1, site.warnings().len());
    }

    #[test]
    fn test_remove() {
        let (site, _clock) = site(garden());
        let generation = site.generation();
        assert!(site.remove(&id("notes/a")));
        assert!(!site.remove(&id("notes/a")));
        assert_eq!(generation + 1, site.generation());
        assert_eq!(vec!["B"], titles(&site.backlinks_for(ContentType::Note, "c")));
    }

    #[test]
    fn test_rebuild_discards_incremental_changes() {
        let (site, _clock) = site(garden());
        site.remove(&id("notes/a"));
        let snapshot = site.rebuild();
        assert_eq!(3, snapshot.generation);
        assert_eq!(4, snapshot.items.len());
        assert!(site.get_item(ContentType::Note, "a").is_ok());
    }

    #[test]
    fn test_tag_counts_and_paths() {
        let (site, _clock) = site(garden());
        assert_eq!(Some(&4), site.tag_counts().get("garden"));

        let path = site.validate_path("a,c,a");
        assert_eq!(vec![id("notes/a"), id("notes/c")], path.steps);
        assert_eq!(Some(TruncationReason::Cycle), path.reason());
    }

    #[test]
    fn test_loads_the_content_directory() -> Result<(), Box<dyn std::error::Error>> {
        let config = Config::from_directory(std::path::Path::new("./testdata"))?;
        let site = Site::new(DirectoryStore::new(&config.content_directory), &config);

        assert_eq!(5, site.snapshot().items.len());
        assert!(site.warnings().is_empty());
        assert!(site.broken_links().is_empty());
        assert!(site.orphans().is_empty());
        assert_eq!(
            vec!["Lifetimes", "The Rust Programming Language"],
            titles(&site.backlinks_for(ContentType::Note, "ownership"))
        );
        assert_eq!(Some(&5), site.tag_counts().get("rust"));
        Ok(())
    }

    #[test]
    fn test_readers_never_see_a_partial_snapshot() {
        let (site, _clock) = site(garden());
        let site = Arc::new(site);
        let linked = doc("Hub", 5, "[[a]] [[b]]");
        let unlinked = doc("Hub", 5, "");

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let site = Arc::clone(&site);
                std::thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..200 {
                        let snapshot = site.snapshot();
                        assert!(snapshot.generation >= last);
                        last = snapshot.generation;
                        let a = snapshot.graph.backlinks(&id("notes/a"), &snapshot.items);
                        let b = snapshot.graph.backlinks(&id("notes/b"), &snapshot.items);
                        assert_eq!(a, b);
                    }
                })
            })
            .collect();

        for i in 0..50 {
            let text = if i % 2 == 0 { &linked } else { &unlinked };
            site.refresh(raw("notes/hub", text)).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(51, site.generation());
    }
}
