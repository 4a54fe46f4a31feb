//! The content store reader. A [`ContentSource`] produces the raw documents
//! for every content type; [`DirectoryStore`] reads them from a directory
//! tree and [`MemoryStore`] serves a fixed set from memory.
//!
//! The expected tree has one directory per [`ContentType`] prefix, each
//! holding either plain documents or bundles:
//!
//! ```text
//! content/
//!   notes/
//!     ownership.md          -> notes/ownership
//!     lifetimes/index.md    -> notes/lifetimes
//!   til/
//!     cargo-tree.md         -> til/cargo-tree
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::item::{ContentType, ItemId};
use crate::parser::ParseErrorKind;

const MARKDOWN_EXTENSION: &str = "md";
const BUNDLE_INDEX: &str = "index.md";

/// A document as read from storage, before its frontmatter is parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDocument {
    pub id: ItemId,
    pub path: PathBuf,
    pub text: String,
    pub modified: Option<DateTime<Utc>>,
}

/// The result of a full scan. Failures to read individual files are
/// recorded in `warnings` rather than aborting the scan.
#[derive(Debug, Default)]
pub struct Scan {
    pub documents: Vec<RawDocument>,
    pub warnings: Vec<Warning>,
}

/// Anything that can produce the complete set of raw documents.
pub trait ContentSource {
    /// Loads every document. No ordering is guaranteed.
    fn load_all(&self) -> Scan;
}

/// A recovered problem with a single document.
#[derive(Clone, Debug, PartialEq)]
pub struct Warning {
    pub path: PathBuf,
    pub kind: WarningKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WarningKind {
    /// The file (or directory entry) couldn't be read.
    Unreadable(String),

    /// The document was read but its frontmatter was rejected.
    Parse(ParseErrorKind),

    /// Another document already claimed this id; the later one was dropped.
    DuplicateId(ItemId),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            WarningKind::Unreadable(err) => {
                write!(f, "{}: unreadable: {}", self.path.display(), err)
            }
            WarningKind::Parse(kind) => {
                write!(f, "{}: {}", self.path.display(), kind)
            }
            WarningKind::DuplicateId(id) => write!(
                f,
                "{}: duplicate id `{}`; document skipped",
                self.path.display(),
                id
            ),
        }
    }
}

/// Reads documents from a content directory on disk.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> DirectoryStore {
        DirectoryStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads a single document of the given type. `path` is either
    /// `{prefix}/{slug}.md` or `{prefix}/{slug}/index.md` relative to the
    /// root.
    pub fn read_document(
        &self,
        content_type: ContentType,
        path: &Path,
    ) -> Result<RawDocument, Warning> {
        Self::read_path(content_type, self.root.join(path))
    }

    fn read_path(
        content_type: ContentType,
        path: PathBuf,
    ) -> Result<RawDocument, Warning> {
        let unreadable = |err: String| Warning {
            path: path.clone(),
            kind: WarningKind::Unreadable(err),
        };

        let slug = Self::slug_for(&path)
            .ok_or_else(|| unreadable(String::from("invalid file name")))?;
        let text = std::fs::read_to_string(&path)
            .map_err(|e| unreadable(e.to_string()))?;
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(RawDocument {
            id: ItemId::new(content_type, slug),
            path,
            text,
            modified,
        })
    }

    // The slug is the file stem for plain documents and the directory name
    // for bundles.
    fn slug_for(path: &Path) -> Option<String> {
        let stem = if path.file_name()? == BUNDLE_INDEX {
            path.parent()?.file_name()?
        } else {
            path.file_stem()?
        };
        let stem = stem.to_str()?;
        if stem.is_empty() {
            None
        } else {
            Some(stem.to_owned())
        }
    }

    fn is_document(entry: &walkdir::DirEntry) -> bool {
        if !entry.file_type().is_file() {
            return false;
        }
        match entry.depth() {
            1 => entry.path().extension().map_or(false, |e| e == MARKDOWN_EXTENSION),
            2 => entry.file_name() == BUNDLE_INDEX,
            _ => false,
        }
    }

    fn scan_type(&self, content_type: ContentType, scan: &mut Scan) {
        let dir = self.root.join(content_type.prefix());
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no directory for content type");
            return;
        }

        let walker = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(2)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(dir.as_path()).to_owned();
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    scan.warnings.push(Warning {
                        path,
                        kind: WarningKind::Unreadable(err.to_string()),
                    });
                    continue;
                }
            };
            if !Self::is_document(&entry) {
                continue;
            }
            match Self::read_path(content_type, entry.path().to_owned()) {
                Ok(document) => scan.documents.push(document),
                Err(warning) => {
                    warn!(%warning, "skipping unreadable document");
                    scan.warnings.push(warning);
                }
            }
        }
    }
}

impl ContentSource for DirectoryStore {
    fn load_all(&self) -> Scan {
        let mut scan = Scan::default();
        for content_type in ContentType::ALL.iter().copied() {
            self.scan_type(content_type, &mut scan);
        }
        debug!(
            root = %self.root.display(),
            documents = scan.documents.len(),
            warnings = scan.warnings.len(),
            "scanned content directory"
        );
        scan
    }
}

/// An in-memory [`ContentSource`], mostly useful for tests and for callers
/// that assemble documents themselves.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    documents: Vec<RawDocument>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Adds a document with a synthetic path of `{id}.md`.
    pub fn with(mut self, id: ItemId, text: &str) -> MemoryStore {
        self.insert(id, text);
        self
    }

    pub fn insert(&mut self, id: ItemId, text: &str) {
        self.documents.push(RawDocument {
            path: PathBuf::from(format!("{}.{}", id, MARKDOWN_EXTENSION)),
            id,
            text: text.to_owned(),
            modified: None,
        });
    }
}

impl ContentSource for MemoryStore {
    fn load_all(&self) -> Scan {
        Scan {
            documents: self.documents.clone(),
            warnings: Vec::new(),
        }
    }
}
