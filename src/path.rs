//! Exploration paths: reader-chosen trails through the garden, passed around
//! as comma-joined item ids (e.g. `notes/ownership,til/cargo-tree`).
//!
//! A trail doesn't have to follow actual links. [`validate`] only checks
//! that each step exists, that no step repeats and that the trail isn't too
//! long, and keeps the longest valid prefix instead of rejecting the input.

use std::collections::BTreeSet;
use std::fmt;

use crate::item::{ContentType, ItemId, ItemMap};

/// The longest trail kept; later entries are dropped.
pub const MAX_PATH_LENGTH: usize = 10;

pub const DELIMITER: char = ',';

/// Resolves one trail entry to an existing item.
pub trait Resolve {
    fn resolve(&self, entry: &str) -> Option<ItemId>;
}

impl Resolve for ItemMap {
    /// Accepts `{prefix}/{slug}`, or a bare slug when exactly one content
    /// type has an item with that slug.
    fn resolve(&self, entry: &str) -> Option<ItemId> {
        if entry.contains('/') {
            let id: ItemId = entry.parse().ok()?;
            return if self.contains_key(&id) { Some(id) } else { None };
        }

        let mut found = ContentType::ALL
            .iter()
            .map(|t| ItemId::new(*t, entry))
            .filter(|id| self.contains_key(id));
        let first = found.next()?;
        match found.next() {
            Some(_) => None,
            None => Some(first),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TruncationReason {
    /// More than [`MAX_PATH_LENGTH`] entries were given.
    LengthLimit,

    /// An entry repeated an earlier step.
    Cycle,

    /// An entry didn't resolve to an existing item.
    MissingContent,
}

impl fmt::Display for TruncationReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            TruncationReason::LengthLimit => "trail too long",
            TruncationReason::Cycle => "trail revisits a step",
            TruncationReason::MissingContent => "trail step not found",
        })
    }
}

/// Where and why a trail was cut short.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Truncation {
    pub reason: TruncationReason,

    /// The position of the first dropped entry in the (trimmed, non-empty)
    /// input entries.
    pub index: usize,

    /// The first dropped entry as the caller wrote it.
    pub entry: String,
}

/// The longest valid prefix of a trail, plus why the rest was dropped (if
/// anything was).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatedPath {
    pub steps: Vec<ItemId>,
    pub truncation: Option<Truncation>,
}

impl ValidatedPath {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    pub fn reason(&self) -> Option<TruncationReason> {
        self.truncation.as_ref().map(|t| t.reason)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.steps.contains(id)
    }

    /// The trail string for stepping from here to `next`. Returning to a
    /// step already on the trail cuts the trail back to that step; going past
    /// [`MAX_PATH_LENGTH`] drops the oldest steps.
    pub fn extended_with(&self, next: &ItemId) -> String {
        let mut steps: Vec<&ItemId> = match self.steps.iter().position(|s| s == next) {
            Some(i) => self.steps[..i].iter().collect(),
            None => self.steps.iter().collect(),
        };
        steps.push(next);
        let skip = steps.len().saturating_sub(MAX_PATH_LENGTH);
        join(steps.into_iter().skip(skip))
    }
}

impl fmt::Display for ValidatedPath {
    /// Renders the canonical trail string, e.g. `notes/a,til/b`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&join(self.steps.iter()))
    }
}

fn join<'a>(steps: impl Iterator<Item = &'a ItemId>) -> String {
    steps
        .map(ItemId::to_string)
        .collect::<Vec<String>>()
        .join(&DELIMITER.to_string())
}

/// Validates a comma-joined trail, walking it left to right and stopping at
/// the first repeated or missing step. Blank entries are ignored, so an empty
/// string is a valid empty trail.
pub fn validate<R: Resolve + ?Sized>(raw: &str, resolver: &R) -> ValidatedPath {
    let entries: Vec<&str> = raw
        .split(DELIMITER)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();

    let mut path = ValidatedPath::default();
    let mut seen: BTreeSet<ItemId> = BTreeSet::new();
    for (index, entry) in entries.iter().take(MAX_PATH_LENGTH).enumerate() {
        let reason = match resolver.resolve(entry) {
            None => TruncationReason::MissingContent,
            Some(id) if seen.contains(&id) => TruncationReason::Cycle,
            Some(id) => {
                seen.insert(id.clone());
                path.steps.push(id);
                continue;
            }
        };
        path.truncation = Some(Truncation {
            reason,
            index,
            entry: (*entry).to_owned(),
        });
        return path;
    }

    if let Some(entry) = entries.get(MAX_PATH_LENGTH) {
        path.truncation = Some(Truncation {
            reason: TruncationReason::LengthLimit,
            index: MAX_PATH_LENGTH,
            entry: (*entry).to_owned(),
        });
    }
    path
}
