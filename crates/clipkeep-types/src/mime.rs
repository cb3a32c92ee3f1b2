//! Multi-representation clipboard content.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// MIME type holding the textual representation of an item.
pub const TEXT_PLAIN: &str = "text/plain";

/// Ordered mapping from MIME type to raw payload.
///
/// Keys are unique. Insertion order is preserved and doubles as the format
/// priority order when content is filtered or compared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeData {
    entries: Vec<(String, Vec<u8>)>,
}

impl MimeData {
    /// Creates empty content.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Creates content holding a single `text/plain` representation.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut data = Self::new();
        data.set_text(text);
        data
    }

    /// Builder-style variant of [`MimeData::insert`].
    #[must_use]
    pub fn with(mut self, mime: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        self.insert(mime, payload);
        self
    }

    /// Stores a payload, replacing any previous payload for the same type in
    /// place so the format order is kept.
    pub fn insert(&mut self, mime: impl Into<String>, payload: impl Into<Vec<u8>>) {
        let key = mime.into();
        let bytes = payload.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = bytes,
            None => self.entries.push((key, bytes)),
        }
    }

    /// Removes the payload for a MIME type.
    pub fn remove(&mut self, mime: &str) -> Option<Vec<u8>> {
        let position = self.entries.iter().position(|(key, _)| key == mime)?;
        Some(self.entries.remove(position).1)
    }

    /// Returns the payload stored for a MIME type.
    #[must_use]
    pub fn get(&self, mime: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(key, _)| key == mime)
            .map(|(_, payload)| payload.as_slice())
    }

    /// Returns true when a payload exists for the MIME type.
    #[must_use]
    pub fn contains(&self, mime: &str) -> bool {
        self.get(mime).is_some()
    }

    /// Iterates over the stored MIME types in priority order.
    pub fn formats(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Iterates over `(mime, payload)` pairs in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(key, payload)| (key.as_str(), payload.as_slice()))
    }

    /// Number of stored representations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no representation is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decodes the `text/plain` representation, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.get(TEXT_PLAIN)
            .map(|payload| String::from_utf8_lossy(payload).into_owned())
    }

    /// Returns the item text or an empty string when it has none.
    #[must_use]
    pub fn text_or_empty(&self) -> String {
        self.text().unwrap_or_default()
    }

    /// Replaces the `text/plain` representation.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.insert(TEXT_PLAIN, text.into().into_bytes());
    }

    /// Returns true for content that should never be stored: no formats at
    /// all, or an empty textual representation.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.is_empty() || self.get(TEXT_PLAIN).is_some_and(<[u8]>::is_empty)
    }

    /// Keeps only the formats named in `priority`, reordered to follow it.
    ///
    /// An empty priority list keeps everything.
    #[must_use]
    pub fn filtered(&self, priority: &[String]) -> Self {
        if priority.is_empty() {
            return self.clone();
        }
        priority
            .iter()
            .filter_map(|mime| {
                self.get(mime)
                    .map(|payload| (mime.clone(), payload.to_vec()))
            })
            .collect()
    }

    /// Compares two items the way duplicate detection needs: the same format
    /// list and the same payload for the first format.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        if !self.formats().eq(other.formats()) {
            return false;
        }
        match (self.entries.first(), other.entries.first()) {
            (Some((_, left)), Some((_, right))) => left == right,
            (None, None) => true,
            _ => false,
        }
    }
}

impl FromIterator<(String, Vec<u8>)> for MimeData {
    fn from_iter<T: IntoIterator<Item = (String, Vec<u8>)>>(iter: T) -> Self {
        let mut data = Self::new();
        for (mime, payload) in iter {
            data.insert(mime, payload);
        }
        data
    }
}

/// Clipboard buffer a snapshot was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// The regular clipboard.
    Clipboard,
    /// The primary selection style secondary buffer.
    Selection,
}

impl Source {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clipboard => "clipboard",
            Self::Selection => "selection",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when a source name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown clipboard source '{0}'")]
pub struct SourceParseError(pub String);

impl FromStr for Source {
    type Err = SourceParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "clipboard" => Ok(Self::Clipboard),
            "selection" => Ok(Self::Selection),
            _ => Err(SourceParseError(value.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn insert_replaces_in_place() {
        let mut data = MimeData::new().with("text/html", "<b>a</b>").with(TEXT_PLAIN, "a");
        data.insert("text/html", "<i>a</i>");
        let formats: Vec<_> = data.formats().collect();
        assert_eq!(formats, vec!["text/html", TEXT_PLAIN]);
        assert_eq!(data.get("text/html"), Some(b"<i>a</i>".as_slice()));
    }

    #[rstest]
    #[case(MimeData::new(), true)]
    #[case(MimeData::from_text(""), true)]
    #[case(MimeData::from_text("x"), false)]
    #[case(MimeData::new().with("image/png", vec![1_u8]), false)]
    fn blank_detection(#[case] data: MimeData, #[case] blank: bool) {
        assert_eq!(data.is_blank(), blank);
    }

    #[rstest]
    fn filtered_follows_priority_order() {
        let data = MimeData::new()
            .with(TEXT_PLAIN, "a")
            .with("text/html", "b")
            .with("application/x-junk", "c");
        let priority = vec!["text/html".to_owned(), TEXT_PLAIN.to_owned()];
        let filtered = data.filtered(&priority);
        let formats: Vec<_> = filtered.formats().collect();
        assert_eq!(formats, vec!["text/html", TEXT_PLAIN]);
    }

    #[rstest]
    fn same_content_compares_formats_and_first_payload() {
        let left = MimeData::from_text("a").with("text/html", "x");
        let right = MimeData::from_text("a").with("text/html", "y");
        assert!(left.same_content(&right));
        assert!(!left.same_content(&MimeData::from_text("b").with("text/html", "x")));
        assert!(!left.same_content(&MimeData::from_text("a")));
    }

    #[rstest]
    #[case("clipboard", Source::Clipboard)]
    #[case("Selection", Source::Selection)]
    fn parses_sources(#[case] input: &str, #[case] expected: Source) {
        assert_eq!(input.parse::<Source>().expect("source"), expected);
    }
}
