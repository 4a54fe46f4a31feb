use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag};

use crate::item::ItemId;
use crate::links::resolve_reference;

/// Converts the markdown body of `source` to HTML, appending the result to
/// `w`.
///
/// Internal links (links from one content item to another) are rewritten
/// from their source form to the canonical item URL, so `bar.md` written in
/// `notes/foo` becomes `/notes/bar/`. Fragments survive the rewrite.
pub fn to_html(w: &mut String, source: &ItemId, markdown: &str) {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let event_converter = EventConverter { source };
    html::push_html(
        w,
        Parser::new_ext(markdown, options).map(|ev| event_converter.convert(ev)),
    );
}

struct EventConverter<'a> {
    source: &'a ItemId,
}

impl<'a> EventConverter<'a> {
    fn convert_link<'b>(&self, url: CowStr<'b>) -> CowStr<'b> {
        match resolve_reference(self.source, &url) {
            Some(target) => {
                let fragment = url.find('#').map_or("", |i| &url[i..]);
                CowStr::Boxed(
                    format!("{}{}", target.url_path(), fragment).into_boxed_str(),
                )
            }
            None => url,
        }
    }

    fn convert_tag<'b>(&self, tag: Tag<'b>) -> Tag<'b> {
        match tag {
            Tag::Link(
                link @ (LinkType::Inline
                | LinkType::Reference
                | LinkType::ReferenceUnknown
                | LinkType::Shortcut
                | LinkType::Collapsed
                | LinkType::CollapsedUnknown),
                url,
                title,
            ) => Tag::Link(link, self.convert_link(url), title),
            _ => tag,
        }
    }

    fn convert<'b>(&self, ev: Event<'b>) -> Event<'b> {
        match ev {
            Event::Start(tag) => Event::Start(self.convert_tag(tag)),
            _ => ev,
        }
    }
}
