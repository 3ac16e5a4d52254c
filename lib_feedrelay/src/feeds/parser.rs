//! # Feed Parser
//!
//! Turns fetched feed text into a [`FeedProperty`] tree. [`RssParser`] reads
//! RSS 2.0 with `quick-xml` and returns a `channel` node whose children are
//! the document's `<item>` elements, each with its own child elements as
//! leaves (`title`, `link`, `dc:creator`, `category`, `pubDate`, ...).

use std::fmt;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::{RelayError, RelayResult};
use crate::feeds::property::FeedProperty;

/// Raw feed text to property tree.
pub trait FeedParser: Send + Sync + fmt::Debug {
    /// Parses one document into a `channel` node holding its items.
    fn parse(&self, content: &str) -> RelayResult<FeedProperty>;
}

/// RSS 2.0 parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct RssParser;

impl FeedParser for RssParser {
    fn parse(&self, content: &str) -> RelayResult<FeedProperty> {
        let root = parse_tree(content)?;
        let channel = if root.name().eq_ignore_ascii_case("channel") {
            &root
        } else {
            root.property_with_name("channel")
                .ok_or_else(|| RelayError::Parse(format!("<{}> has no <channel>", root.name())))?
        };
        let items = channel.properties_with_name("item").cloned().collect();
        Ok(FeedProperty::new("channel", None, items))
    }
}

struct OpenElement {
    name: String,
    text: String,
    children: Vec<FeedProperty>,
}

impl OpenElement {
    fn new(name: String) -> Self {
        Self { name, text: String::new(), children: Vec::new() }
    }

    fn finish(self) -> FeedProperty {
        let value = self.children.is_empty().then(|| self.text.trim().to_string());
        FeedProperty::new(self.name, value, self.children)
    }
}

fn attach(stack: &mut [OpenElement], root: &mut Option<FeedProperty>, node: FeedProperty) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

fn parse_tree(content: &str) -> RelayResult<FeedProperty> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root = None;

    loop {
        let event = reader.read_event().map_err(|e| RelayError::Parse(e.to_string()))?;
        match event {
            Event::Start(e) => {
                stack.push(OpenElement::new(String::from_utf8_lossy(e.name().as_ref()).into_owned()));
            }
            Event::Empty(e) => {
                let node = FeedProperty::new(String::from_utf8_lossy(e.name().as_ref()).into_owned(), None, Vec::new());
                attach(&mut stack, &mut root, node);
            }
            Event::Text(t) => {
                if let Some(open) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| RelayError::Parse(e.to_string()))?;
                    open.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let open = stack
                    .pop()
                    .ok_or_else(|| RelayError::Parse("closing tag without an opening tag".into()))?;
                attach(&mut stack, &mut root, open.finish());
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(RelayError::Parse(format!("document ended inside <{}>", open.name)));
    }
    root.ok_or_else(|| RelayError::Parse("document has no elements".into()))
}
