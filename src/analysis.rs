//! Text analysis: zone tags and the plain-text tokenizer.
//!
//! Tokenization of richer document formats (markup books, etc.) is a
//! collaborator concern; the index core only consumes a lazy sequence of
//! (normalized term, zone) pairs. This module provides the zone type and a
//! minimal plain-text tokenizer sufficient for the build pipeline and tests.

use std::io::BufRead;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Result;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").expect("static regex");
}

/// A zone tag marking where in a document a term occurred.
///
/// Zones are bit flags so that occurrences of the same (term, document) pair
/// in different zones can be merged by OR-ing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Zone(pub u8);

impl Zone {
    /// Document body text.
    pub const BODY: Zone = Zone(0b001);
    /// Document title.
    pub const TITLE: Zone = Zone(0b010);
    /// Document author.
    pub const AUTHOR: Zone = Zone(0b100);

    /// Combine two zone tags.
    pub fn merge(self, other: Zone) -> Zone {
        Zone(self.0 | other.0)
    }

    /// True if all bits of `other` are present in `self`.
    pub fn contains(self, other: Zone) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw bit value.
    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Split a line of text into lowercased terms.
pub fn terms_of(line: &str) -> Vec<String> {
    WORD.find_iter(line)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Tokenize a plain-text reader into a lazy sequence of (term, zone) pairs.
///
/// Every term is tagged [`Zone::BODY`]; richer formats attach their own zones
/// upstream. I/O errors surface through the iterator and abort the build.
pub fn tokenize_plain<R: BufRead>(reader: R) -> impl Iterator<Item = Result<(String, Zone)>> {
    reader.lines().flat_map(|line| match line {
        Ok(line) => terms_of(&line)
            .into_iter()
            .map(|term| Ok((term, Zone::BODY)))
            .collect::<Vec<_>>(),
        Err(e) => vec![Err(e.into())],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_terms_lowercased_and_split() {
        assert_eq!(
            terms_of("Hello, World! x2"),
            vec!["hello".to_string(), "world".to_string(), "x2".to_string()]
        );
    }

    #[test]
    fn test_tokenize_plain() {
        let input = Cursor::new("One two\nTHREE");
        let tokens: Vec<_> = tokenize_plain(input).map(|t| t.unwrap()).collect();
        assert_eq!(
            tokens,
            vec![
                ("one".to_string(), Zone::BODY),
                ("two".to_string(), Zone::BODY),
                ("three".to_string(), Zone::BODY),
            ]
        );
    }

    #[test]
    fn test_zone_merge() {
        let merged = Zone::BODY.merge(Zone::TITLE);
        assert!(merged.contains(Zone::BODY));
        assert!(merged.contains(Zone::TITLE));
        assert!(!merged.contains(Zone::AUTHOR));
    }
}
