//! Best-effort extraction of internal references from a document body.
//!
//! Three reference syntaxes are recognized, each switchable through
//! [`LinkConventions`]:
//!
//! * markdown links: `[text](../til/cargo-tree.md)`, `[text](/notes/foo/)`
//! * wiki links: `[[ownership]]`, `[[til/cargo-tree|the cargo tip]]`
//! * bare site paths in prose: `see /notes/foo for details`
//!
//! Anything that doesn't normalize to a `(content type, slug)` pair is
//! ignored. Extraction never fails.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use pulldown_cmark::{Event, Options, Parser, Tag};
use regex::Regex;
use serde::Deserialize;
use url::{ParseError, Url};

use crate::item::{ContentItem, ContentType, ItemId};

const MARKDOWN_EXTENSION: &str = ".md";
const HTML_EXTENSION: &str = ".html";

// Relative references are resolved against this host. It never leaves the
// module; only the path of the joined URL is inspected.
const SITE_BASE: &str = "http://site.invalid/";

static WIKI_LINK: Lazy<Regex> = Lazy::new(|| {
    // [[target]], [[target#heading]], [[target|label]]
    Regex::new(r"\[\[([^\[\]|#]+)(?:#[^\[\]|]*)?(?:\|[^\[\]]*)?\]\]").unwrap()
});

static BARE_PATH: Lazy<Regex> = Lazy::new(|| {
    let prefixes: Vec<&str> =
        ContentType::ALL.iter().map(|t| t.prefix()).collect();
    Regex::new(&format!(
        r#"(?:^|[\s(<\["'])/({})/([A-Za-z0-9][A-Za-z0-9_-]*)"#,
        prefixes.join("|")
    ))
    .unwrap()
});

/// Which reference syntaxes count as links.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkConventions {
    pub markdown: bool,
    pub wiki: bool,
    pub bare_paths: bool,
}

impl Default for LinkConventions {
    fn default() -> Self {
        LinkConventions {
            markdown: true,
            wiki: true,
            bare_paths: false,
        }
    }
}

/// Extracts the set of internal targets referenced by an item's body.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkExtractor {
    conventions: LinkConventions,
}

impl LinkExtractor {
    pub fn new(conventions: LinkConventions) -> LinkExtractor {
        LinkExtractor { conventions }
    }

    pub fn conventions(&self) -> LinkConventions {
        self.conventions
    }

    pub fn extract(&self, item: &ContentItem) -> BTreeSet<ItemId> {
        self.extract_from(&item.id, &item.body)
    }

    /// Extracts targets from `body` as written by `source`. Repeated
    /// references collapse into one target. Self references are kept.
    pub fn extract_from(&self, source: &ItemId, body: &str) -> BTreeSet<ItemId> {
        let mut targets = BTreeSet::new();

        // Prose is gathered from consecutive text events, since the parser
        // splits unmatched brackets into separate events. Code never counts.
        let mut prose = String::new();
        let mut in_code_block = false;
        for event in Parser::new_ext(body, Options::empty()) {
            match event {
                Event::Text(text) if !in_code_block => {
                    prose.push_str(&text);
                    continue;
                }
                Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
                Event::End(Tag::CodeBlock(_)) => in_code_block = false,
                Event::Start(Tag::Link(_, dest, _)) if self.conventions.markdown => {
                    targets.extend(resolve_reference(source, &dest));
                }
                _ => {}
            }
            self.scan_prose(source, &prose, &mut targets);
            prose.clear();
        }
        self.scan_prose(source, &prose, &mut targets);

        targets
    }

    fn scan_prose(&self, source: &ItemId, prose: &str, targets: &mut BTreeSet<ItemId>) {
        if prose.is_empty() {
            return;
        }

        if self.conventions.wiki {
            for captures in WIKI_LINK.captures_iter(prose) {
                targets.extend(resolve_wiki_target(source, &captures[1]));
            }
        }

        if self.conventions.bare_paths {
            for captures in BARE_PATH.captures_iter(prose) {
                if let Some(content_type) = ContentType::from_prefix(&captures[1]) {
                    targets.insert(ItemId::new(content_type, &captures[2]));
                }
            }
        }
    }
}

/// Normalizes a markdown link destination written in `source` to the item
/// it refers to. Returns `None` for absolute URLs (other sites, `mailto:`
/// etc.), bare fragments, and paths that don't name a content item.
///
/// Relative destinations resolve from the source's content-type directory,
/// so within `notes/foo` the destination `bar.md` means `notes/bar` and
/// `../til/baz.md` means `til/baz`.
pub fn resolve_reference(source: &ItemId, dest: &str) -> Option<ItemId> {
    let dest = dest.trim();
    if dest.is_empty() || dest.starts_with('#') {
        return None;
    }

    match Url::parse(dest) {
        // Only same-site references count.
        Ok(_) => return None,
        Err(ParseError::RelativeUrlWithoutBase) => {}
        Err(_) => return None,
    }

    let base = Url::parse(SITE_BASE)
        .ok()?
        .join(&format!("{}/{}", source.content_type.prefix(), source.slug))
        .ok()?;
    let absolute = base.join(dest).ok()?;
    // Protocol-relative references (`//host/path`) replace the host.
    if absolute.host_str() != base.host_str() {
        return None;
    }
    item_for_path(absolute.path())
}

/// Maps a site path such as `/notes/foo/`, `/notes/foo.md` or
/// `/notes/foo/index.md` to an [`ItemId`].
fn item_for_path(path: &str) -> Option<ItemId> {
    let mut segments: Vec<&str> =
        path.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(last) = segments.last() {
        if *last == "index.md" || *last == "index.html" {
            segments.pop();
        }
    }

    match segments[..] {
        [prefix, slug] => {
            let content_type = ContentType::from_prefix(prefix)?;
            let slug = slug
                .strip_suffix(MARKDOWN_EXTENSION)
                .or_else(|| slug.strip_suffix(HTML_EXTENSION))
                .unwrap_or(slug);
            if slug.is_empty() {
                None
            } else {
                Some(ItemId::new(content_type, slug))
            }
        }
        _ => None,
    }
}

// Wiki targets name items rather than files: a bare name resolves within
// the source's own content type and is slugified the same way tags are.
fn resolve_wiki_target(source: &ItemId, target: &str) -> Option<ItemId> {
    let target = target.trim().trim_matches('/');
    let target = target.strip_suffix(MARKDOWN_EXTENSION).unwrap_or(target);
    let (content_type, name) = match target.split_once('/') {
        Some((prefix, name)) => (ContentType::from_prefix(prefix)?, name),
        None => (source.content_type, target),
    };
    let slug = slug::slugify(name);
    if slug.is_empty() {
        None
    } else {
        Some(ItemId::new(content_type, slug))
    }
}
