use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use super::models::{RawItem, DEFAULT_CATEGORY};
use crate::{Error, Result};

/// Minimum title length (exclusive) for feed items
const FEED_MIN_TITLE_CHARS: usize = 10;
/// Minimum title length (exclusive) for scraped items
const HTML_MIN_TITLE_CHARS: usize = 15;

/// Path fragments of pages on the court site that are never articles
const NON_ARTICLE_PATHS: &[&str] = &[
    "/category/",
    "/page/",
    "/institucional/",
    "/consultas/",
    "/servicos/",
    "/portal-transparencia/",
];

/// Entity replacements, applied in order. `&amp;` goes last so an escaped
/// entity such as `&amp;#8211;` is decoded only once.
const ENTITIES: &[(&str, &str)] = &[
    ("[&#8230;]", "..."),
    ("&#8230;", "..."),
    ("&hellip;", "..."),
    ("&#8211;", "-"),
    ("&ndash;", "-"),
    ("&#8212;", "-"),
    ("&mdash;", "-"),
    ("&#8220;", "\""),
    ("&#8221;", "\""),
    ("&ldquo;", "\""),
    ("&rdquo;", "\""),
    ("&quot;", "\""),
    ("&#8216;", "'"),
    ("&#8217;", "'"),
    ("&lsquo;", "'"),
    ("&rsquo;", "'"),
    ("&#39;", "'"),
    ("&#160;", " "),
    ("&nbsp;", " "),
    ("&#38;", "&"),
    ("&amp;", "&"),
];

/// Turns the text body of a source into raw items.
///
/// Parsers never fail: text they do not recognise yields no items.
pub trait NewsParser: Send + Sync {
    fn parse(&self, text: &str) -> Vec<RawItem>;
}

/// Remove CDATA markers
fn strip_cdata(text: &str) -> String {
    text.replace("<![CDATA[", "").replace("]]>", "")
}

/// Strip CDATA, decode the common entities and trim
pub fn decode_entities(text: &str) -> String {
    let mut out = strip_cdata(text);
    for (entity, literal) in ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, literal);
        }
    }
    out.trim().to_string()
}

/// Stable identifier from a guid: the WordPress post id when present,
/// otherwise the guid itself
pub fn extract_guid(guid: &str) -> String {
    static POST_ID: OnceLock<Regex> = OnceLock::new();
    let re = POST_ID.get_or_init(|| Regex::new(r"\?p=(\d+)").expect("valid post id regex"));

    re.captures(guid)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| guid.to_string())
}

struct FeedPatterns {
    item: Regex,
    title: Regex,
    link: Regex,
    description: Regex,
    pub_date: Regex,
    guid: Regex,
    category: Regex,
}

fn feed_patterns() -> &'static FeedPatterns {
    static PATTERNS: OnceLock<FeedPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let tag = |name: &str| {
            Regex::new(&format!(r"(?s)<{name}>(.*?)</{name}>")).expect("valid tag regex")
        };
        FeedPatterns {
            item: Regex::new(r"(?s)<item(?:\s[^>]*)?>(.*?)</item>").expect("valid item regex"),
            title: tag("title"),
            link: tag("link"),
            description: tag("description"),
            pub_date: tag("pubDate"),
            guid: Regex::new(r"(?s)<guid[^>]*>(.*?)</guid>").expect("valid guid regex"),
            category: tag("category"),
        }
    })
}

fn capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Parser for RSS text.
///
/// The text is scanned for `<item>` blocks rather than validated as XML, so
/// a feed wrapped in extra text by a reader proxy still parses.
#[derive(Debug, Clone)]
pub struct FeedParser {
    max_items: usize,
}

impl FeedParser {
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }

    fn parse_item(block: &str) -> Option<RawItem> {
        let p = feed_patterns();

        let title = decode_entities(capture(&p.title, block)?);
        let link = strip_cdata(capture(&p.link, block)?).trim().to_string();
        let pub_date = strip_cdata(capture(&p.pub_date, block)?).trim().to_string();
        let guid = strip_cdata(capture(&p.guid, block)?).trim().to_string();

        if title.chars().count() <= FEED_MIN_TITLE_CHARS {
            return None;
        }

        let description = capture(&p.description, block)
            .map(decode_entities)
            .unwrap_or_default();
        let category = capture(&p.category, block)
            .map(decode_entities)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Some(RawItem {
            guid: extract_guid(&guid),
            title,
            link,
            description,
            category,
            pub_date: Some(pub_date),
        })
    }
}

impl NewsParser for FeedParser {
    fn parse(&self, text: &str) -> Vec<RawItem> {
        feed_patterns()
            .item
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .filter_map(|block| Self::parse_item(block.as_str()))
            .take(self.max_items)
            .collect()
    }
}

/// Best-effort parser for the category page as rendered by the reader
/// proxy. Articles show up as markdown links whose text is the title
/// followed by a run of dashes:
///
/// ```text
/// [Tribunal realiza mutirão de conciliação ------](https://www.tjes.jus.br/mutirao/)
/// ```
#[derive(Debug, Clone)]
pub struct HtmlParser {
    pattern: Regex,
    max_items: usize,
}

impl HtmlParser {
    /// `site_origin` is the scheme and host article links must point at,
    /// e.g. `https://www.tjes.jus.br`
    pub fn new(site_origin: &str, max_items: usize) -> Result<Self> {
        let origin = regex::escape(site_origin.trim_end_matches('/'));
        let pattern = Regex::new(&format!(
            r"(?i)\[([^\]]+?)\s*-{{3,}}\s*\]\(({origin}/[a-z0-9-]+/)\)"
        ))
        .map_err(|e| Error::Config(format!("invalid site origin '{}': {}", site_origin, e)))?;

        Ok(Self { pattern, max_items })
    }

    fn clean_title(raw: &str) -> String {
        raw.replace("**", "")
            .trim()
            .trim_end_matches('-')
            .trim()
            .to_string()
    }

    fn is_article_link(link: &str) -> bool {
        !NON_ARTICLE_PATHS.iter().any(|p| link.contains(p))
    }

    /// Last non-empty path segment of the link
    fn slug(link: &str) -> String {
        Url::parse(link)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| link.to_string())
    }
}

impl NewsParser for HtmlParser {
    fn parse(&self, text: &str) -> Vec<RawItem> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();

        for caps in self.pattern.captures_iter(text) {
            if items.len() >= self.max_items {
                break;
            }
            let (Some(title), Some(link)) = (caps.get(1), caps.get(2)) else {
                continue;
            };

            let title = Self::clean_title(title.as_str());
            let link = link.as_str();

            if title.chars().count() <= HTML_MIN_TITLE_CHARS || !Self::is_article_link(link) {
                continue;
            }

            let slug = Self::slug(link);
            if !seen.insert(slug.clone()) {
                continue;
            }

            items.push(RawItem {
                guid: slug,
                title,
                link: link.to_string(),
                description: String::new(),
                category: DEFAULT_CATEGORY.to_string(),
                pub_date: None,
            });
        }

        items
    }
}
