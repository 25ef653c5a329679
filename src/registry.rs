//! Document registry: maps registered file paths to dense document ids.
//!
//! The registry is the single shared mutable resource during the mapping
//! phase. Registration is guarded by a mutex around the "allocate next id and
//! record path" step and is O(1), so concurrent mapper workers do not contend
//! beyond that one critical section.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A dense, totally ordered document identifier.
///
/// Assigned once per registered path, immutable after assignment. Owned by the
/// [`DocumentRegistry`]; referenced everywhere else.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DocumentId(pub u32);

impl DocumentId {
    /// The raw integer value.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryInner {
    document_count: u32,
    documents: BTreeMap<DocumentId, String>,
}

/// Thread-safe registry assigning monotonically increasing document ids.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    inner: Mutex<RegistryInner>,
}

impl DocumentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        DocumentRegistry::default()
    }

    /// Register a path and return its newly assigned id.
    pub fn register<S: Into<String>>(&self, path: S) -> DocumentId {
        let mut inner = self.inner.lock();
        let id = DocumentId(inner.document_count);
        inner.document_count += 1;
        inner.documents.insert(id, path.into());
        id
    }

    /// Remove a registered document. Returns false if the id was unknown.
    pub fn deregister(&self, id: DocumentId) -> bool {
        self.inner.lock().documents.remove(&id).is_some()
    }

    /// Look up the path registered for an id.
    pub fn path(&self, id: DocumentId) -> Option<String> {
        self.inner.lock().documents.get(&id).cloned()
    }

    /// Number of currently registered documents.
    pub fn len(&self) -> usize {
        self.inner.lock().documents.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered ids in ascending order.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.inner.lock().documents.keys().copied().collect()
    }

    /// Persist the registry as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let inner = self.inner.lock();
        serde_json::to_writer(BufWriter::new(file), &*inner)?;
        Ok(())
    }

    /// Load a registry previously written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let inner: RegistryInner = serde_json::from_reader(BufReader::new(file))?;
        Ok(DocumentRegistry {
            inner: Mutex::new(inner),
        })
    }
}
