//! The link graph: which items reference which.
//!
//! The graph records every extracted edge, including self references and
//! references to items that don't exist. Whether an edge is *resolved* is
//! decided at query time against the current [`ItemMap`], so reloading one
//! document only touches that document's edges.

use std::collections::{BTreeMap, BTreeSet};

use crate::item::{ContentItem, ItemId, ItemMap};
use crate::links::LinkExtractor;

/// Forward and backward adjacency over item ids. For every edge `(a, b)`,
/// `b` is in `forward[a]` exactly when `a` is in `backward[b]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkGraph {
    forward: BTreeMap<ItemId, BTreeSet<ItemId>>,
    backward: BTreeMap<ItemId, BTreeSet<ItemId>>,
}

impl LinkGraph {
    pub fn new() -> LinkGraph {
        LinkGraph::default()
    }

    /// Builds a graph from a complete item set. The result depends only on
    /// the items, not on the order they are visited in.
    pub fn build<'a>(
        items: impl IntoIterator<Item = &'a ContentItem>,
        extractor: &LinkExtractor,
    ) -> LinkGraph {
        let mut graph = LinkGraph::new();
        graph.rebuild(items, extractor);
        graph
    }

    /// Discards every edge and re-extracts them from `items`.
    pub fn rebuild<'a>(
        &mut self,
        items: impl IntoIterator<Item = &'a ContentItem>,
        extractor: &LinkExtractor,
    ) {
        self.forward.clear();
        self.backward.clear();
        for item in items {
            self.set_links(&item.id, extractor.extract(item));
        }
    }

    /// Replaces all edges owned by `source` with edges to `targets`.
    pub fn set_links(&mut self, source: &ItemId, targets: BTreeSet<ItemId>) {
        self.remove_source(source);
        if targets.is_empty() {
            return;
        }
        for target in &targets {
            self.backward
                .entry(target.clone())
                .or_default()
                .insert(source.clone());
        }
        self.forward.insert(source.clone(), targets);
    }

    /// Drops every edge owned by `source`. Edges pointing *at* `source` are
    /// kept; they become dangling until it comes back.
    pub fn remove_source(&mut self, source: &ItemId) {
        let targets = match self.forward.remove(source) {
            Some(targets) => targets,
            None => return,
        };
        for target in targets {
            if let Some(sources) = self.backward.get_mut(&target) {
                sources.remove(source);
                if sources.is_empty() {
                    self.backward.remove(&target);
                }
            }
        }
    }

    /// Every target `id` references, including targets that don't exist.
    pub fn forward_links(&self, id: &ItemId) -> BTreeSet<ItemId> {
        self.forward.get(id).cloned().unwrap_or_default()
    }

    /// Every recorded source referencing `id`, stale or not.
    pub fn sources_of(&self, id: &ItemId) -> BTreeSet<ItemId> {
        self.backward.get(id).cloned().unwrap_or_default()
    }

    /// The items referencing `id`, most recently created first. Equal
    /// creation times fall back to id order. Self references and sources
    /// missing from `items` are left out.
    pub fn backlinks(&self, id: &ItemId, items: &ItemMap) -> Vec<ItemId> {
        let mut sources: Vec<&ContentItem> = match self.backward.get(id) {
            Some(sources) => sources
                .iter()
                .filter(|source| *source != id)
                .filter_map(|source| items.get(source).map(|item| &**item))
                .collect(),
            None => return Vec::new(),
        };
        sources.sort_by(|a, b| {
            b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id))
        });
        sources.into_iter().map(|item| item.id.clone()).collect()
    }

    /// Items with no resolved edge in either direction. Self references and
    /// references to missing items don't count.
    pub fn orphans(&self, items: &ItemMap) -> BTreeSet<ItemId> {
        let resolved = |id: &ItemId, neighbors: Option<&BTreeSet<ItemId>>| {
            neighbors.map_or(false, |neighbors| {
                neighbors.iter().any(|n| n != id && items.contains_key(n))
            })
        };
        items
            .keys()
            .filter(|id| {
                !resolved(*id, self.forward.get(*id))
                    && !resolved(*id, self.backward.get(*id))
            })
            .cloned()
            .collect()
    }

    /// `(source, target)` pairs whose target is missing from `items`. Stale
    /// sources are skipped too.
    pub fn broken_links(&self, items: &ItemMap) -> Vec<(ItemId, ItemId)> {
        self.edges()
            .filter(|(source, target)| {
                items.contains_key(*source) && !items.contains_key(*target)
            })
            .map(|(source, target)| (source.clone(), target.clone()))
            .collect()
    }

    /// Every edge in `(source, target)` order.
    pub fn edges(&self) -> impl Iterator<Item = (&ItemId, &ItemId)> {
        self.forward.iter().flat_map(|(source, targets)| {
            targets.iter().map(move |target| (source, target))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    fn items(fixtures: Vec<ContentItem>) -> ItemMap {
        fixtures
            .into_iter()
            .map(|item| (item.id.clone(), Arc::new(item)))
            .collect()
    }

    fn graph(items: &ItemMap) -> LinkGraph {
        LinkGraph::build(items.values().map(|item| &**item), &LinkExtractor::default())
    }

    fn garden() -> ItemMap {
        items(vec![
            ContentItem::fixture("notes/a", 1, "[c](c.md) and [[b]]"),
            ContentItem::fixture("notes/b", 2, "[c](/notes/c/) [ghost](ghost.md)"),
            ContentItem::fixture("notes/c", 3, "[me](c.md)"),
            ContentItem::fixture("til/lonely", 4, "no links here"),
        ])
    }

    #[test]
    fn test_graph_is_symmetric() {
        let items = garden();
        let graph = graph(&items);
        assert_eq!(5, graph.edge_count());
        for (source, target) in graph.edges() {
            assert!(graph.forward_links(source).contains(target));
            assert!(graph.sources_of(target).contains(source));
            if source != target && items.contains_key(target) {
                assert!(graph.backlinks(target, &items).contains(source));
            }
        }
        for (target, sources) in &graph.backward {
            for source in sources {
                assert!(graph.forward_links(source).contains(target));
            }
        }
    }

    #[test]
    fn test_build_is_order_independent() {
        let items = garden();
        let forwards = graph(&items);
        let backwards = LinkGraph::build(
            items.values().rev().map(|item| &**item),
            &LinkExtractor::default(),
        );
        assert_eq!(forwards, backwards);
    }

    #[test]
    fn test_backlinks_most_recent_first() {
        let items = garden();
        assert_eq!(
            vec![id("notes/b"), id("notes/a")],
            graph(&items).backlinks(&id("notes/c"), &items)
        );
    }

    #[test]
    fn test_backlinks_tie_break_on_id() {
        let items = items(vec![
            ContentItem::fixture("til/z", 5, "[t](/notes/target)"),
            ContentItem::fixture("notes/y", 5, "[t](target.md)"),
            ContentItem::fixture("notes/x", 5, "[t](target.md)"),
            ContentItem::fixture("notes/target", 1, ""),
        ]);
        assert_eq!(
            vec![id("notes/x"), id("notes/y"), id("til/z")],
            graph(&items).backlinks(&id("notes/target"), &items)
        );
    }

    #[test]
    fn test_backlinks_exclude_self_and_stale_sources() {
        let mut items = garden();
        let graph = graph(&items);
        items.remove(&id("notes/b"));
        // The edge b -> c is still recorded, but b no longer exists.
        assert!(graph.sources_of(&id("notes/c")).contains(&id("notes/b")));
        assert_eq!(
            vec![id("notes/a")],
            graph.backlinks(&id("notes/c"), &items)
        );
    }

    #[test]
    fn test_forward_links_include_dangling_targets() {
        let items = garden();
        let graph = graph(&items);
        assert_eq!(
            vec![id("notes/c"), id("notes/ghost")],
            graph.forward_links(&id("notes/b")).into_iter().collect::<Vec<_>>()
        );
        assert_eq!(
            vec![(id("notes/b"), id("notes/ghost"))],
            graph.broken_links(&items)
        );
    }

    #[test]
    fn test_set_links_replaces_previous_edges() {
        let items = garden();
        let mut graph = graph(&items);
        let mut targets = BTreeSet::new();
        targets.insert(id("til/lonely"));
        graph.set_links(&id("notes/a"), targets);

        assert!(!graph.sources_of(&id("notes/c")).contains(&id("notes/a")));
        assert!(!graph.sources_of(&id("notes/b")).contains(&id("notes/a")));
        assert_eq!(
            vec![id("notes/a")],
            graph.backlinks(&id("til/lonely"), &items)
        );
    }

    #[test]
    fn test_remove_source_leaves_no_empty_entries() {
        let items = garden();
        let mut graph = graph(&items);
        graph.remove_source(&id("notes/b"));
        assert!(graph.sources_of(&id("notes/ghost")).is_empty());
        assert!(!graph.backward.contains_key(&id("notes/ghost")));
        assert!(!graph.forward.contains_key(&id("notes/b")));
        assert_eq!(3, graph.edge_count());
    }

    #[test]
    fn test_orphans() {
        let items = items(vec![
            ContentItem::fixture("notes/a", 1, "[b](b.md)"),
            ContentItem::fixture("notes/b", 2, ""),
            ContentItem::fixture("notes/self", 3, "[me](self.md)"),
            ContentItem::fixture("notes/dangling", 4, "[x](missing.md)"),
            ContentItem::fixture("til/lonely", 5, ""),
        ]);
        let expected: BTreeSet<ItemId> =
            vec![id("notes/self"), id("notes/dangling"), id("til/lonely")]
                .into_iter()
                .collect();
        assert_eq!(expected, graph(&items).orphans(&items));
    }

    #[test]
    fn test_rebuild_clears_prior_edges() {
        let items = garden();
        let mut graph = graph(&items);
        graph.rebuild(Vec::new(), &LinkExtractor::default());
        assert_eq!(0, graph.edge_count());
        assert_eq!(LinkGraph::new(), graph);
    }
}
