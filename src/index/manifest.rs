//! The manifest describing a finished index, and the unified reader over it.
//!
//! A manifest is a small JSON file written last during a build, so its
//! presence means every chunk it references is complete. It names either a
//! single root dictionary or an ordered list of lexical partitions, plus the
//! zone bit width the chunks were written with. Paths are stored relative to
//! the manifest's directory.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SorrelError};
use crate::index::chunk::ChunkFile;
use crate::index::codec::ZoneLayout;
use crate::index::DocumentEntry;
use crate::keyset::KeySet;

/// File name of the manifest inside an index directory.
pub const MANIFEST_NAME: &str = "manifest.json";

/// One partition of a partitioned index: its dictionary path and the
/// exclusive upper bound on the terms it holds (absent on the last
/// partition).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestRange {
    pub delimiter: Option<String>,
    pub path: String,
}

/// The persisted description of a built index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    zone_bits: u32,
    root: Option<String>,
    ranges: Option<Vec<ManifestRange>>,
}

impl Manifest {
    /// Describe a single-file index.
    pub fn single<S: Into<String>>(path: S, layout: ZoneLayout) -> Manifest {
        Manifest {
            zone_bits: layout.bits(),
            root: Some(path.into()),
            ranges: None,
        }
    }

    /// Describe a partitioned index. Every range but the last must carry an
    /// ascending delimiter.
    pub fn partitioned(ranges: Vec<ManifestRange>, layout: ZoneLayout) -> Result<Manifest> {
        let manifest = Manifest {
            zone_bits: layout.bits(),
            root: None,
            ranges: Some(ranges),
        };
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        ZoneLayout::new(self.zone_bits)?;
        match (&self.root, &self.ranges) {
            (Some(_), None) => Ok(()),
            (None, Some(ranges)) => {
                if ranges.is_empty() {
                    return Err(SorrelError::config("partitioned manifest with no ranges"));
                }
                for (i, range) in ranges.iter().enumerate() {
                    let last = i == ranges.len() - 1;
                    match (&range.delimiter, last) {
                        (None, false) => {
                            return Err(SorrelError::config(
                                "only the last range may omit its delimiter",
                            ));
                        }
                        (Some(_), true) => {
                            return Err(SorrelError::config(
                                "the last range must omit its delimiter",
                            ));
                        }
                        _ => {}
                    }
                    if i > 0 {
                        if let (Some(prev), Some(this)) =
                            (&ranges[i - 1].delimiter, &range.delimiter)
                        {
                            if prev >= this {
                                return Err(SorrelError::config(
                                    "range delimiters must be strictly ascending",
                                ));
                            }
                        }
                    }
                }
                Ok(())
            }
            _ => Err(SorrelError::config(
                "manifest must name exactly one of root or ranges",
            )),
        }
    }

    /// Zone layout the index was written with.
    pub fn zone_layout(&self) -> Result<ZoneLayout> {
        ZoneLayout::new(self.zone_bits)
    }

    /// Write the manifest as `manifest.json` inside `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        self.validate()?;
        let file = File::create(dir.as_ref().join(MANIFEST_NAME))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load and validate a manifest file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Manifest> {
        let file = File::open(path)?;
        let manifest: Manifest = serde_json::from_reader(BufReader::new(file))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Open every chunk the manifest references, resolving paths against
    /// `dir`.
    pub fn open<P: AsRef<Path>>(&self, dir: P) -> Result<Index> {
        self.validate()?;
        let layout = self.zone_layout()?;
        let dir = dir.as_ref();
        if let Some(root) = &self.root {
            return Ok(Index::Single(ChunkFile::open(dir.join(root), layout)?));
        }
        let ranges = self.ranges.as_ref().ok_or_else(|| {
            SorrelError::config("manifest must name exactly one of root or ranges")
        })?;
        let mut files = Vec::with_capacity(ranges.len());
        let mut delimiters = Vec::with_capacity(ranges.len() - 1);
        for range in ranges {
            files.push(ChunkFile::open(dir.join(&range.path), layout)?);
            if let Some(delimiter) = &range.delimiter {
                delimiters.push(delimiter.clone());
            }
        }
        Ok(Index::Partitioned { files, delimiters })
    }
}

/// Open an index from its directory: load `manifest.json` and every chunk it
/// names.
pub fn open_index<P: AsRef<Path>>(dir: P) -> Result<Index> {
    let dir = dir.as_ref();
    let manifest = Manifest::load(dir.join(MANIFEST_NAME))?;
    manifest.open(dir)
}

/// A complete, queryable index: one dictionary or a set of lexical
/// partitions.
pub enum Index {
    Single(ChunkFile),
    Partitioned {
        files: Vec<ChunkFile>,
        delimiters: Vec<String>,
    },
}

impl Index {
    /// The partition responsible for `term`: the first whose delimiter
    /// exceeds it, else the last.
    pub fn enclosing_file(&self, term: &str) -> &ChunkFile {
        match self {
            Index::Single(file) => file,
            Index::Partitioned { files, delimiters } => {
                let at = delimiters.partition_point(|d| d.as_str() <= term);
                &files[at]
            }
        }
    }

    /// The posting list for `term`, empty on miss.
    pub fn find(&self, term: &str) -> Result<KeySet<DocumentEntry>> {
        self.enclosing_file(term).find(term)
    }

    /// Total entry count across all partitions.
    pub fn entry_count(&self) -> u64 {
        match self {
            Index::Single(file) => file.entry_count() as u64,
            Index::Partitioned { files, .. } => {
                files.iter().map(|f| f.entry_count() as u64).sum()
            }
        }
    }

    /// Remove every chunk file (and their external siblings) from disk.
    pub fn delete(self) -> Result<()> {
        match self {
            Index::Single(file) => file.delete(),
            Index::Partitioned { files, .. } => {
                for file in files {
                    file.delete()?;
                }
                Ok(())
            }
        }
    }
}
