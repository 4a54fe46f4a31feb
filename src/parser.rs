//! Defines [`parse`], which turns a [`RawDocument`] into a [`ContentItem`],
//! and the [`ParseError`] it fails with. Each document must be structured as
//! follows:
//!
//! 1. Initial frontmatter fence (`---`) on the first line
//! 2. YAML frontmatter with `title` and `created` and optionally `updated`,
//!    `tags`, `stage` and `url`
//! 3. Terminal frontmatter fence (`---`) on a line of its own
//! 4. Markdown body
//!
//! For example:
//!
//! ```md
//! ---
//! title: Hello, world!
//! created: 2021-04-16
//! tags: [greet]
//! stage: budding
//! ---
//! # Hello
//!
//! World
//! ```

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use url::Url;

use crate::item::{ContentItem, GrowthStage};
use crate::markdown;
use crate::store::RawDocument;
use crate::tag::Tag;

const FENCE: &str = "---";

#[derive(Deserialize, Default)]
struct Frontmatter {
    #[serde(default, alias = "Title")]
    title: Option<String>,

    #[serde(default, alias = "date", alias = "Date")]
    created: Option<String>,

    #[serde(default, alias = "Updated")]
    updated: Option<String>,

    #[serde(default, alias = "Tags")]
    tags: Option<Tags>,

    #[serde(default, alias = "growth_stage")]
    stage: Option<String>,

    /// The bookmarked page, for bookmarks.
    #[serde(default)]
    url: Option<Url>,
}

/// Authors write either `tags: rust` or `tags: [rust, cli]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Tags {
    One(String),
    Many(Vec<String>),
}

impl Tags {
    fn into_vec(self) -> Vec<String> {
        match self {
            Tags::One(tag) => vec![tag],
            Tags::Many(tags) => tags,
        }
    }
}

/// Parses a single document. The body is only rendered once the header has
/// been accepted.
pub fn parse(raw: &RawDocument) -> Result<ContentItem> {
    _parse(raw).map_err(|kind| ParseError {
        path: raw.path.clone(),
        kind,
    })
}

fn _parse(raw: &RawDocument) -> std::result::Result<ContentItem, ParseErrorKind> {
    let input = raw.text.trim_start_matches('\u{feff}');
    let (frontmatter, body) = match split_frontmatter(input)? {
        Some((yaml, body)) => (decode(yaml)?, body),
        None => (Frontmatter::default(), input),
    };

    let title = frontmatter
        .title
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .ok_or(ParseErrorKind::MissingRequiredField("title"))?;
    let created = frontmatter
        .created
        .ok_or(ParseErrorKind::MissingRequiredField("created"))
        .and_then(|s| timestamp("created", &s))?;
    let updated = match frontmatter.updated {
        Some(s) => timestamp("updated", &s)?,
        None => created,
    };
    let stage = match frontmatter.stage {
        Some(s) => s.parse::<GrowthStage>().map_err(ParseErrorKind::MalformedHeader)?,
        None => GrowthStage::default(),
    };
    let tags = frontmatter.tags.map(Tags::into_vec).unwrap_or_default();

    let mut html = String::new();
    markdown::to_html(&mut html, &raw.id, body);

    Ok(ContentItem {
        id: raw.id.clone(),
        title,
        created,
        updated,
        tags: Tag::collect(tags.iter().map(String::as_str)),
        stage,
        body: body.to_owned(),
        html,
        external_url: frontmatter.url,
        source_path: raw.path.clone(),
        file_modified: raw.modified,
    })
}

fn decode(yaml: &str) -> std::result::Result<Frontmatter, ParseErrorKind> {
    if yaml.trim().is_empty() {
        return Ok(Frontmatter::default());
    }
    serde_yaml::from_str(yaml).map_err(|e| ParseErrorKind::MalformedHeader(e.to_string()))
}

/// Splits `input` into its YAML frontmatter and body. Returns `None` when the
/// document has no frontmatter at all, and an error when the opening fence
/// is never closed.
fn split_frontmatter(
    input: &str,
) -> std::result::Result<Option<(&str, &str)>, ParseErrorKind> {
    let after_open = match strip_fence_line(input) {
        Some(rest) => rest,
        None => return Ok(None),
    };

    // The closing fence must sit on its own line.
    let mut offset = 0;
    loop {
        let line = &after_open[offset..];
        if let Some(body) = strip_fence_line(line) {
            return Ok(Some((&after_open[..offset], body)));
        }
        match line.find('\n') {
            Some(i) => offset += i + 1,
            None => {
                return Err(ParseErrorKind::MalformedHeader(String::from(
                    "missing closing `---`",
                )))
            }
        }
    }
}

// If `s` begins with a fence line, returns what follows that line.
fn strip_fence_line(s: &str) -> Option<&str> {
    let rest = s.strip_prefix(FENCE)?;
    let rest = rest.trim_start_matches(|c: char| c == ' ' || c == '\t');
    if rest.is_empty() {
        Some(rest)
    } else if let Some(rest) = rest.strip_prefix("\r\n") {
        Some(rest)
    } else {
        rest.strip_prefix('\n')
    }
}

/// Parses the timestamp formats authors actually write: RFC 3339, a date
/// with a time, or a bare date (midnight UTC).
fn timestamp(
    field: &'static str,
    s: &str,
) -> std::result::Result<DateTime<Utc>, ParseErrorKind> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            ParseErrorKind::MalformedHeader(format!("invalid `{}` timestamp: `{}`", field, s))
        })
}

/// Represents the result of a [`parse`] operation.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Represents an error parsing a document. The document is excluded from the
/// index; the rest of the batch is unaffected.
#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub path: PathBuf,
    pub kind: ParseErrorKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParseErrorKind {
    /// Returned when a frontmatter block is present but isn't usable: the
    /// closing fence is missing, the YAML doesn't parse, or a field has a
    /// value of the wrong shape.
    MalformedHeader(String),

    /// Returned when `title` or `created` is absent.
    MissingRequiredField(&'static str),
}

impl fmt::Display for ParseErrorKind {
    /// Displays a [`ParseErrorKind`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseErrorKind::MalformedHeader(err) => {
                write!(f, "malformed frontmatter: {}", err)
            }
            ParseErrorKind::MissingRequiredField(field) => {
                write!(f, "missing required field `{}`", field)
            }
        }
    }
}

impl fmt::Display for ParseError {
    /// Displays a [`ParseError`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "parsing `{}`: {}", self.path.display(), self.kind)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::item::{ContentType, ItemId};

    fn raw(text: &str) -> RawDocument {
        RawDocument {
            id: ItemId::new(ContentType::Note, "simple"),
            path: PathBuf::from("notes/simple.md"),
            text: text.to_owned(),
            modified: None,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .unwrap();
        Utc.from_utc_datetime(&naive)
    }

    fn kind(text: &str) -> ParseErrorKind {
        match parse(&raw(text)) {
            Ok(item) => panic!("wanted an error; parsed `{}`", item.title),
            Err(err) => err.kind,
        }
    }

    #[test]
    fn test_parse_applies_defaults() -> Result<()> {
        let item = parse(&raw(
            "---\nTitle: Simple\nDate: 0001-01-01\n---\nToday is the first day.",
        ))?;
        assert_eq!("Simple", item.title);
        assert_eq!(utc(1, 1, 1, 0, 0), item.created);
        assert_eq!(item.created, item.updated);
        assert!(item.tags.is_empty());
        assert_eq!(GrowthStage::Seedling, item.stage);
        assert_eq!("Today is the first day.", item.body);
        assert_eq!("<p>Today is the first day.</p>\n", item.html);
        assert_eq!(None, item.external_url);
        Ok(())
    }

    #[test]
    fn test_parse_all_fields() -> Result<()> {
        let item = parse(&raw(concat!(
            "---\n",
            "title: Everything\n",
            "created: 2021-04-16T10:30:00+02:00\n",
            "updated: 2021-05-01 08:00\n",
            "tags: [Rust, CLI, rust]\n",
            "stage: Evergreen\n",
            "url: https://example.org/article\n",
            "---\n",
            "body\n",
        )))?;
        assert_eq!(utc(2021, 4, 16, 8, 30), item.created);
        assert_eq!(utc(2021, 5, 1, 8, 0), item.updated);
        let tags: Vec<&str> = item.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(vec!["rust", "cli"], tags);
        assert_eq!(GrowthStage::Evergreen, item.stage);
        assert_eq!(
            Some("https://example.org/article"),
            item.external_url.as_ref().map(Url::as_str)
        );
        Ok(())
    }

    #[test]
    fn test_parse_single_tag_string() -> Result<()> {
        let item = parse(&raw("---\ntitle: T\ncreated: 2021-01-01\ntags: rust\n---\n"))?;
        assert!(item.has_tag("Rust"));
        Ok(())
    }

    #[test]
    fn test_dashes_inside_frontmatter_do_not_close_it() -> Result<()> {
        let item = parse(&raw(
            "---\ntitle: a---b\ncreated: 2021-01-01\n---\n\n---\n",
        ))?;
        assert_eq!("a---b", item.title);
        Ok(())
    }

    #[test]
    fn test_missing_title() {
        assert_eq!(
            ParseErrorKind::MissingRequiredField("title"),
            kind("---\ncreated: 2021-01-01\n---\nbody")
        );
        assert_eq!(
            ParseErrorKind::MissingRequiredField("title"),
            kind("---\ntitle: '  '\ncreated: 2021-01-01\n---\nbody")
        );
    }

    #[test]
    fn test_missing_created() {
        assert_eq!(
            ParseErrorKind::MissingRequiredField("created"),
            kind("---\ntitle: T\n---\nbody")
        );
    }

    #[test]
    fn test_no_frontmatter_is_missing_title() {
        assert_eq!(
            ParseErrorKind::MissingRequiredField("title"),
            kind("# Just markdown")
        );
        assert_eq!(
            ParseErrorKind::MissingRequiredField("title"),
            kind("---\n---\nempty header")
        );
    }

    #[test]
    fn test_malformed_headers() {
        let malformed = |text: &str| {
            matches!(kind(text), ParseErrorKind::MalformedHeader(_))
        };
        assert!(malformed("---\ntitle: T\ncreated: 2021-01-01\nbody"));
        assert!(malformed("---\ntitle: [unclosed\n---\nbody"));
        assert!(malformed("---\ntitle: T\ncreated: yesterday\n---\n"));
        assert!(malformed("---\ntitle: T\ncreated: 2021-01-01\nstage: ripe\n---\n"));
        assert!(malformed("---\n- just\n- a list\n---\n"));
    }
}
