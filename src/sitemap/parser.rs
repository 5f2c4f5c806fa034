//! Sitemap protocol XML parsing

use crate::sitemap::SitemapError;
use quick_xml::events::Event;
use quick_xml::Reader;

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: locations of child sitemaps
    Index(Vec<String>),
    /// `<urlset>`: page locations
    UrlSet(Vec<String>),
}

impl SitemapDocument {
    pub fn locations(&self) -> &[String] {
        match self {
            Self::Index(locs) | Self::UrlSet(locs) => locs,
        }
    }
}

/// Parses a sitemap or sitemap index
///
/// Elements are matched by local name, so namespaced documents parse the same
/// as plain ones. Blank `<loc>` entries are dropped.
///
/// # Returns
///
/// * `Ok(SitemapDocument)` - The root kind and every `<loc>` in document order
/// * `Err(SitemapError)` - Malformed XML or an unknown root element
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument, SitemapError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root: Option<Vec<u8>> = None;
    let mut in_loc = false;
    let mut current = String::new();
    let mut locs = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if root.is_none() {
                    root = Some(name);
                } else if name == b"loc" {
                    in_loc = true;
                    current.clear();
                }
            }
            Ok(Event::Empty(e)) if root.is_none() => {
                root = Some(e.local_name().as_ref().to_vec());
            }
            Ok(Event::Text(t)) if in_loc => {
                let text = t
                    .unescape()
                    .map_err(|e| SitemapError::Xml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::CData(c)) if in_loc => {
                let raw = c.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| SitemapError::Xml(e.to_string()))?;
                current.push_str(text);
            }
            Ok(Event::End(e)) => {
                if in_loc && e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                    let loc = current.trim();
                    if !loc.is_empty() {
                        locs.push(loc.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SitemapError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    match root.as_deref() {
        Some(b"sitemapindex") => Ok(SitemapDocument::Index(locs)),
        Some(b"urlset") => Ok(SitemapDocument::UrlSet(locs)),
        Some(other) => Err(SitemapError::UnknownRoot(
            String::from_utf8_lossy(other).into_owned(),
        )),
        None => Err(SitemapError::Xml("document has no root element".to_string())),
    }
}
