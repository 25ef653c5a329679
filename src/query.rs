//! Boolean queries over a built index: tokenize, parse, evaluate.

pub mod eval;
pub mod grammar;
pub mod parse;
pub mod token;

use crate::error::Result;
use crate::index::manifest::Index;
use crate::index::DocumentEntry;
use crate::keyset::{self, KeySet};
use eval::EvalContext;

/// Evaluation context wiring the key-set algebra to index lookups. Entries
/// for the same document merge their zone tags.
struct IndexContext<'a> {
    index: &'a Index,
}

impl EvalContext for IndexContext<'_> {
    type Value = KeySet<DocumentEntry>;

    fn from_id(&self, id: &str) -> Result<KeySet<DocumentEntry>> {
        self.index.find(id)
    }

    fn cross(
        &self,
        lhs: KeySet<DocumentEntry>,
        rhs: KeySet<DocumentEntry>,
    ) -> KeySet<DocumentEntry> {
        keyset::cross_with(lhs, rhs, DocumentEntry::merge)
    }

    fn unite(
        &self,
        lhs: KeySet<DocumentEntry>,
        rhs: KeySet<DocumentEntry>,
    ) -> KeySet<DocumentEntry> {
        keyset::unite_with(lhs, rhs, DocumentEntry::merge)
    }

    fn negate(&self, value: KeySet<DocumentEntry>) -> KeySet<DocumentEntry> {
        keyset::negate(value)
    }
}

/// Parse and evaluate a boolean query against an index.
///
/// Syntax and interpretation errors are query-scoped and leave the index
/// untouched. A negated top-level result comes back with its flag set; the
/// caller decides whether to intersect it with the document universe or warn.
pub fn evaluate(query: &str, index: &Index) -> Result<KeySet<DocumentEntry>> {
    let tokens = token::tokenize(query);
    let tree = parse::parse(&tokens)?;
    eval::eval(&tree, &IndexContext { index })
}
