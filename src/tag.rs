//! Defines the [`Tag`] type, which represents a [`crate::item::ContentItem`]
//! tag.

use std::hash::{Hash, Hasher};

/// Represents a [`crate::item::ContentItem`] tag. Tags are compared by their
/// slugified `name` so e.g., `macOS` and `MacOS` resolve to the same tag,
/// while `label` keeps the spelling the author used first.
#[derive(Clone, Debug)]
pub struct Tag {
    /// The slugified name. Safe to drop into a URL path segment.
    pub name: String,

    /// The tag as written in the frontmatter.
    pub label: String,
}

impl Tag {
    pub fn new(label: &str) -> Tag {
        Tag {
            name: slug::slugify(label),
            label: label.trim().to_owned(),
        }
    }

    /// Converts raw frontmatter tags into [`Tag`]s, preserving the author's
    /// order and dropping later duplicates and tags that slugify to nothing.
    pub fn collect<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<Tag> {
        let mut tags: Vec<Tag> = Vec::new();
        for label in labels {
            let tag = Tag::new(label);
            if !tag.name.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }
}

impl Hash for Tag {
    /// Implements [`Hash`] for [`Tag`] by delegating directly to the `name`
    /// field.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

impl PartialEq for Tag {
    /// Implements [`PartialEq`] and [`Eq`] for [`Tag`] by delegating directly
    /// to the `name` field.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Tag {}
