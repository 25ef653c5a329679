//! The disk-backed inverted index: in-memory mapping, chunk files, k-way
//! reduction and the manifest tying a finished index together.

pub mod build;
pub mod chunk;
pub mod codec;
pub mod flags;
pub mod manifest;
pub mod mapper;
pub mod reduce;

use crate::analysis::Zone;
use crate::registry::DocumentId;

/// File extension for index chunk files.
pub const CHUNK_EXTENSION: &str = "spimi";
/// File extension for external documents files.
pub const DOCUMENTS_EXTENSION: &str = "sdoc";
/// File extension for external strings files.
pub const STRINGS_EXTENSION: &str = "sstr";

/// One posting returned by index lookups: a document and the zones the term
/// occurred in.
///
/// Equality and ordering consider the document alone, so a
/// [`KeySet`](crate::keyset::KeySet) of entries behaves as a document set;
/// zone tags ride along and combine through [`merge`](DocumentEntry::merge)
/// when two sets carry the same document.
#[derive(Debug, Clone, Copy)]
pub struct DocumentEntry {
    pub doc: DocumentId,
    pub zone: Zone,
}

impl PartialEq for DocumentEntry {
    fn eq(&self, other: &Self) -> bool {
        self.doc == other.doc
    }
}

impl Eq for DocumentEntry {}

impl PartialOrd for DocumentEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocumentEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.doc.cmp(&other.doc)
    }
}

impl DocumentEntry {
    pub fn new(doc: DocumentId, zone: Zone) -> DocumentEntry {
        DocumentEntry { doc, zone }
    }

    /// Merge two postings for the same document by combining zone tags.
    pub fn merge(self, other: DocumentEntry) -> DocumentEntry {
        debug_assert_eq!(self.doc, other.doc);
        DocumentEntry {
            doc: self.doc,
            zone: self.zone.merge(other.zone),
        }
    }
}
