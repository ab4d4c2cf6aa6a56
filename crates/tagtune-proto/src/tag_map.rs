//! Tag → locator mapping, rebuilt wholesale from free-form text.
//!
//! The text is authored by hand, one `tag:locator` pair per line. Parsing is
//! lossy on purpose: lines without a colon, or with an empty tag or locator
//! after trimming, are dropped without complaint.

use std::collections::HashMap;

/// Locator value meaning "silence playback" instead of a resource.
pub const STOP_LOCATOR: &str = "stop";

#[derive(Debug, Clone, Default)]
pub struct TagMap {
    entries: HashMap<String, String>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mapping with the pairs parsed from `text`.
    /// Returns the number of entries afterwards.
    pub fn update(&mut self, text: &str) -> usize {
        let mut entries = HashMap::new();
        for line in text.lines() {
            if let Some((tag, locator)) = parse_line(line) {
                // Later duplicates win.
                entries.insert(tag.to_string(), locator.to_string());
            }
        }
        self.entries = entries;
        self.entries.len()
    }

    pub fn lookup(&self, tag: &str) -> Option<&str> {
        self.entries.get(tag).map(String::as_str)
    }

    /// Locator to load for `tag`, or `None` when the tag is unknown or mapped
    /// to [`STOP_LOCATOR`].
    pub fn resolve(&self, tag: &str) -> Option<&str> {
        self.lookup(tag).filter(|locator| *locator != STOP_LOCATOR)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (tag, locator) = line.split_once(':')?;
    let tag = tag.trim();
    let locator = locator.trim();
    if tag.is_empty() || locator.is_empty() {
        return None;
    }
    Some((tag, locator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_lines_are_skipped() {
        let mut map = TagMap::new();
        let n = map.update("a:x\nbadline\n:y\nb:\n c : z ");
        assert_eq!(n, 2);
        assert_eq!(map.lookup("a"), Some("x"));
        assert_eq!(map.lookup("c"), Some("z"));
        assert_eq!(map.lookup("b"), None);
        assert_eq!(map.lookup(""), None);
    }

    #[test]
    fn test_update_replaces_previous_contents() {
        let mut map = TagMap::new();
        map.update("cat:cat.mp3\ndog:dog.mp3");
        map.update("bird:bird.mp3");
        assert_eq!(map.len(), 1);
        assert_eq!(map.lookup("cat"), None);
        assert_eq!(map.lookup("dog"), None);
        assert_eq!(map.lookup("bird"), Some("bird.mp3"));

        map.update("");
        assert!(map.is_empty());
    }

    #[test]
    fn test_first_colon_splits_so_urls_survive() {
        let mut map = TagMap::new();
        map.update("radio: https://example.com:8000/stream.mp3\r\n");
        assert_eq!(
            map.lookup("radio"),
            Some("https://example.com:8000/stream.mp3")
        );
    }

    #[test]
    fn test_last_duplicate_wins() {
        let mut map = TagMap::new();
        map.update("cat:first.mp3\ncat:second.mp3");
        assert_eq!(map.len(), 1);
        assert_eq!(map.lookup("cat"), Some("second.mp3"));
    }

    #[test]
    fn test_stop_locator_does_not_resolve() {
        let mut map = TagMap::new();
        map.update("silence:stop\nloud:STOP\ncat:cat.mp3");
        assert_eq!(map.lookup("silence"), Some("stop"));
        assert_eq!(map.resolve("silence"), None);
        // Case-sensitive: only the exact literal is reserved.
        assert_eq!(map.resolve("loud"), Some("STOP"));
        assert_eq!(map.resolve("cat"), Some("cat.mp3"));
        assert_eq!(map.resolve("xyz"), None);
    }
}
