use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth accepted in a feed document.
const MAX_XML_DEPTH: usize = 64;

/// Errors that can occur while parsing a feed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// XML was malformed or contained unsupported entities.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// Root element was something other than `<rss>`.
    #[error("not an RSS document (root element <{0}>)")]
    NotRss(String),

    /// The `<rss>` element had no `<channel>`.
    #[error("RSS document has no <channel>")]
    MissingChannel,

    /// SEC-003: Nesting depth exceeds safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// Channel metadata plus items in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RssFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

/// One `<item>` exactly as it appeared in the document.
///
/// `pub_date` is the raw string; interpreting it is the ingestor's job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

/// Parses an RSS 2.0 document.
///
/// Only un-prefixed `title`, `link`, `description` and `pubDate` children of
/// `<channel>` and `<item>` are read; everything else, including namespaced
/// elements such as `<atom:link>`, is skipped. Text and CDATA fragments
/// inside one element are concatenated.
///
/// # Errors
///
/// Any XML error fails the whole document; no partial result is returned.
///
/// # Security
///
/// quick-xml (0.37) never expands `<!ENTITY>` declarations; custom entity
/// references fail with an unescape error.
pub fn parse_rss(bytes: &[u8]) -> Result<RssFeed, ParseError> {
    // Text is kept exactly as written; only identity and date fields are
    // trimmed once the document is complete
    let mut reader = Reader::from_reader(bytes);

    let mut feed = RssFeed::default();
    let mut seen_root = false;
    let mut seen_channel = false;
    // Element names from the root down to the current element
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                if !seen_root {
                    if name != b"rss" {
                        return Err(ParseError::NotRss(
                            String::from_utf8_lossy(&name).into_owned(),
                        ));
                    }
                    seen_root = true;
                }

                if path.len() >= MAX_XML_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_XML_DEPTH));
                }

                if is_channel(&path, &name) {
                    seen_channel = true;
                }
                if is_item(&path, &name) {
                    feed.items.push(RssItem::default());
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                let qname = e.name();
                let name = qname.as_ref();
                if !seen_root {
                    if name == b"rss" {
                        return Err(ParseError::MissingChannel);
                    }
                    return Err(ParseError::NotRss(
                        String::from_utf8_lossy(name).into_owned(),
                    ));
                }
                if is_channel(&path, name) {
                    seen_channel = true;
                }
                // `<item/>` is still an item, just an empty one
                if is_item(&path, name) {
                    feed.items.push(RssItem::default());
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                append_text(&mut feed, &path, &text);
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                let text = reader
                    .decoder()
                    .decode(&raw)
                    .map_err(|e| ParseError::Xml(e.to_string()))?;
                append_text(&mut feed, &path, &text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(ParseError::Xml("document has no root element".to_string()));
    }
    if !path.is_empty() {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }
    if !seen_channel {
        return Err(ParseError::MissingChannel);
    }

    trim_in_place(&mut feed.link);
    for item in &mut feed.items {
        trim_in_place(&mut item.link);
        trim_in_place(&mut item.pub_date);
    }

    Ok(feed)
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn is_channel(parent: &[Vec<u8>], name: &[u8]) -> bool {
    parent.len() == 1 && name == b"channel"
}

fn is_item(parent: &[Vec<u8>], name: &[u8]) -> bool {
    parent.len() == 2 && parent[1] == b"channel" && name == b"item"
}

/// Routes a text fragment to the field addressed by `path`.
fn append_text(feed: &mut RssFeed, path: &[Vec<u8>], text: &str) {
    match path {
        [_, channel, field] if channel == b"channel" => {
            if let Some(field) = Field::from_name(field) {
                let target = match field {
                    Field::Title => &mut feed.title,
                    Field::Link => &mut feed.link,
                    Field::Description => &mut feed.description,
                    Field::PubDate => return,
                };
                target.push_str(text);
            }
        }
        [_, channel, item, field] if channel == b"channel" && item == b"item" => {
            let (Some(field), Some(current)) = (Field::from_name(field), feed.items.last_mut())
            else {
                return;
            };
            let target = match field {
                Field::Title => &mut current.title,
                Field::Link => &mut current.link,
                Field::Description => &mut current.description,
                Field::PubDate => &mut current.pub_date,
            };
            target.push_str(text);
        }
        _ => {}
    }
}
