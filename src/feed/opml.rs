use std::path::Path;

use ::opml::{Outline, OPML};

use crate::error::Result;
use crate::models::FeedDescriptor;

/// Read the subscriptions listed in an OPML file.
pub fn parse_opml_file(path: &Path) -> Result<Vec<FeedDescriptor>> {
    let content = std::fs::read_to_string(path)?;
    parse_opml(&content)
}

/// Every outline with an `xmlUrl`, nested folders included, first occurrence wins.
pub fn parse_opml(content: &str) -> Result<Vec<FeedDescriptor>> {
    let document = OPML::from_str(content)?;
    let mut feeds = Vec::new();
    collect(&document.body.outlines, &mut feeds);
    Ok(feeds)
}

fn collect(outlines: &[Outline], feeds: &mut Vec<FeedDescriptor>) {
    for outline in outlines {
        if let Some(url) = outline.xml_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            if !feeds.iter().any(|f| f.url == url) {
                feeds.push(FeedDescriptor {
                    url: url.to_string(),
                    title: outline.title.clone().unwrap_or_else(|| outline.text.clone()),
                });
            }
        }
        collect(&outline.outlines, feeds);
    }
}
