//! In-memory mapping stage: a bounded buffer of packed records with interned
//! term strings, spilled to disk as chunk files when full.

use std::path::Path;

use ahash::AHashMap;
use log::debug;
use uuid::Uuid;

use crate::analysis::Zone;
use crate::error::{Result, SorrelError};
use crate::index::chunk::ChunkFile;
use crate::index::codec::{Header, PackedRecord, WriteBuffer, ZoneLayout, HEADER_SIZE};
use crate::index::flags::{Flags, Width};
use crate::index::CHUNK_EXTENSION;
use crate::registry::DocumentId;

/// Default record capacity, roughly 80 MB of entry buffer.
pub const DEFAULT_CAPACITY: usize = 10_000_000;

/// Single-pass in-memory mapper.
///
/// `add` never reallocates past the configured capacity; when it reports the
/// buffer full the caller dumps to disk and calls [`clear`](Mapper::clear).
/// Dumping requires [`sort_strings`](Mapper::sort_strings) followed by
/// [`sort`](Mapper::sort) or [`unify`](Mapper::unify), so that term-id order
/// equals lexical order and the chunk supports binary search as written.
pub struct Mapper {
    layout: ZoneLayout,
    capacity: usize,
    records: Vec<PackedRecord>,
    strings: Vec<String>,
    ids: AHashMap<String, u32>,
    sorted: bool,
    unified: bool,
    strings_sorted: bool,
}

impl Mapper {
    pub fn new(layout: ZoneLayout) -> Mapper {
        Mapper::with_capacity(layout, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(layout: ZoneLayout, capacity: usize) -> Mapper {
        Mapper {
            layout,
            capacity,
            records: Vec::with_capacity(capacity),
            strings: Vec::new(),
            ids: AHashMap::new(),
            sorted: true,
            unified: true,
            strings_sorted: true,
        }
    }

    /// Record one (term, document, zone) occurrence.
    ///
    /// Returns false without recording when the buffer is full; the caller
    /// dumps, clears and retries.
    pub fn add(&mut self, term: &str, doc: DocumentId, zone: Zone) -> bool {
        if self.records.len() >= self.capacity {
            return false;
        }
        let term_id = match self.ids.get(term) {
            Some(&id) => id,
            None => {
                let id = self.strings.len() as u32;
                self.strings.push(term.to_string());
                self.ids.insert(term.to_string(), id);
                if let Some(prev) = self.strings.len().checked_sub(2) {
                    if self.strings[prev].as_str() > term {
                        self.strings_sorted = false;
                    }
                }
                id
            }
        };
        self.records
            .push(PackedRecord::new(term_id, doc, zone, self.layout));
        self.sorted = false;
        self.unified = false;
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Reorder interned strings lexically and remap term ids in all records.
    pub fn sort_strings(&mut self) {
        if self.strings_sorted {
            return;
        }
        let mut order: Vec<u32> = (0..self.strings.len() as u32).collect();
        order.sort_unstable_by(|&a, &b| self.strings[a as usize].cmp(&self.strings[b as usize]));

        let mut remap = vec![0u32; self.strings.len()];
        let mut sorted_strings = Vec::with_capacity(self.strings.len());
        for (new_id, &old_id) in order.iter().enumerate() {
            remap[old_id as usize] = new_id as u32;
            sorted_strings.push(std::mem::take(&mut self.strings[old_id as usize]));
        }
        self.strings = sorted_strings;
        for (term, id) in self.ids.iter_mut() {
            debug_assert_eq!(self.strings[remap[*id as usize] as usize], *term);
            *id = remap[*id as usize];
        }
        for record in self.records.iter_mut() {
            *record = record.with_term_id(remap[record.term_id() as usize]);
        }
        self.strings_sorted = true;
        self.sorted = false;
        self.unified = false;
    }

    /// Sort records by (term, document, zone).
    pub fn sort(&mut self) {
        self.records.sort_unstable();
        self.sorted = true;
    }

    /// Sort and collapse duplicate (term, document) runs, OR-merging zones.
    pub fn unify(&mut self) {
        self.sort();
        let layout = self.layout;
        self.records.dedup_by(|next, kept| {
            if next.same_posting(*kept, layout) {
                *kept = kept.merge_zones(*next, layout);
                true
            } else {
                false
            }
        });
        self.unified = true;
    }

    /// Reset for reuse without releasing the record buffer.
    pub fn clear(&mut self) {
        self.records.clear();
        self.strings.clear();
        self.ids.clear();
        self.sorted = true;
        self.unified = true;
        self.strings_sorted = true;
    }

    /// Dump the whole buffer as one uuid-named chunk file in `dir`.
    pub fn dump_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<ChunkFile> {
        self.check_dump_ready()?;
        let path = dir
            .as_ref()
            .join(format!("{}.{}", Uuid::new_v4(), CHUNK_EXTENSION));
        self.write_chunk(&path, 0..self.strings.len(), 0..self.records.len())?;
        debug!("dumped {} records to {}", self.records.len(), path.display());
        ChunkFile::open(path, self.layout)
    }

    /// Dump one chunk per lexical partition. `delimiters` are the exclusive
    /// upper bounds of all partitions but the last, in ascending order.
    pub fn dump_ranges<P: AsRef<Path>>(
        &self,
        dirs: &[P],
        delimiters: &[String],
    ) -> Result<Vec<ChunkFile>> {
        self.check_dump_ready()?;
        if dirs.len() != delimiters.len() + 1 {
            return Err(SorrelError::config(format!(
                "{} partition directories for {} delimiters",
                dirs.len(),
                delimiters.len()
            )));
        }

        let mut string_cuts = Vec::with_capacity(delimiters.len() + 2);
        string_cuts.push(0usize);
        for delimiter in delimiters {
            let cut = self
                .strings
                .partition_point(|s| s.as_str() < delimiter.as_str());
            string_cuts.push(cut);
        }
        string_cuts.push(self.strings.len());

        let mut chunks = Vec::with_capacity(dirs.len());
        for (partition, window) in string_cuts.windows(2).enumerate() {
            let (lo, hi) = (window[0], window[1]);
            let record_lo = self.records.partition_point(|r| (r.term_id() as usize) < lo);
            let record_hi = self.records.partition_point(|r| (r.term_id() as usize) < hi);
            let path = dirs[partition]
                .as_ref()
                .join(format!("{}.{}", Uuid::new_v4(), CHUNK_EXTENSION));
            self.write_chunk(&path, lo..hi, record_lo..record_hi)?;
            chunks.push(ChunkFile::open(path, self.layout)?);
        }
        Ok(chunks)
    }

    fn check_dump_ready(&self) -> Result<()> {
        if !self.strings_sorted || !self.sorted {
            return Err(SorrelError::config(
                "mapper must sort_strings and sort (or unify) before dumping",
            ));
        }
        Ok(())
    }

    fn write_chunk(
        &self,
        path: &Path,
        strings: std::ops::Range<usize>,
        records: std::ops::Range<usize>,
    ) -> Result<()> {
        let string_slice = &self.strings[strings.clone()];
        let record_slice = &self.records[records];

        let max_len = string_slice.iter().map(|s| s.len() as u32).max().unwrap_or(0);
        let length_width = Width::for_max(max_len);

        // Absolute file address of each string's length prefix.
        let mut addresses = Vec::with_capacity(string_slice.len());
        let mut offset = HEADER_SIZE;
        for string in string_slice {
            addresses.push(offset);
            offset += length_width.bytes() + string.len() as u32;
        }
        let strings_block_size = offset - HEADER_SIZE;
        let pointer_width = Width::for_max(offset);

        let max_packed = record_slice.iter().map(|r| r.packed_doc()).max().unwrap_or(0);
        let doc_width = Width::for_max(max_packed);

        let mut flags = Flags::default();
        flags.set_string_length_width(length_width);
        flags.set_string_pointer_width(pointer_width);
        flags.set_doc_id_width(doc_width);
        flags.set_sorted(true);
        flags.set_unified(self.unified);
        flags.set_sorted_strings(true);

        let mut out = WriteBuffer::create(path)?;
        out.skip(HEADER_SIZE)?;
        for string in string_slice {
            out.write_uint(string.len() as u32, length_width)?;
            out.write_bytes(string.as_bytes())?;
        }
        let base = strings.start as u32;
        for record in record_slice {
            out.write_uint(addresses[(record.term_id() - base) as usize], pointer_width)?;
            out.write_uint(record.packed_doc(), doc_width)?;
        }
        out.finish(Header {
            flags,
            strings_block_size,
            documents_block_size: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ZoneLayout {
        ZoneLayout::default()
    }

    #[test]
    fn test_add_until_full() {
        let mut mapper = Mapper::with_capacity(layout(), 3);
        assert!(mapper.add("a", DocumentId(0), Zone::BODY));
        assert!(mapper.add("b", DocumentId(0), Zone::BODY));
        assert!(mapper.add("a", DocumentId(1), Zone::BODY));
        assert!(mapper.is_full());
        assert!(!mapper.add("c", DocumentId(1), Zone::BODY));
        assert_eq!(mapper.len(), 3);

        mapper.clear();
        assert!(mapper.is_empty());
        assert!(mapper.add("c", DocumentId(1), Zone::BODY));
    }

    #[test]
    fn test_unify_merges_zones() {
        let mut mapper = Mapper::new(layout());
        mapper.add("word", DocumentId(1), Zone::BODY);
        mapper.add("word", DocumentId(1), Zone::TITLE);
        mapper.add("word", DocumentId(2), Zone::BODY);
        mapper.sort_strings();
        mapper.unify();
        assert_eq!(mapper.len(), 2);
    }

    #[test]
    fn test_dump_requires_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let mut mapper = Mapper::new(layout());
        mapper.add("b", DocumentId(0), Zone::BODY);
        mapper.add("a", DocumentId(0), Zone::BODY);
        assert!(mapper.dump_to_dir(dir.path()).is_err());
    }

    #[test]
    fn test_dump_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut mapper = Mapper::new(layout());
        mapper.add("pear", DocumentId(2), Zone::BODY);
        mapper.add("apple", DocumentId(0), Zone::TITLE);
        mapper.add("apple", DocumentId(1), Zone::BODY);
        mapper.add("apple", DocumentId(0), Zone::BODY);
        mapper.sort_strings();
        mapper.unify();

        let chunk = mapper.dump_to_dir(dir.path()).unwrap();
        assert_eq!(chunk.entry_count(), 3);
        assert!(chunk.flags().sorted());
        assert!(chunk.flags().unified());
        assert!(chunk.flags().sorted_strings());

        let apple: Vec<_> = chunk.find("apple").unwrap().collect();
        assert_eq!(apple.len(), 2);
        assert_eq!(apple[0].doc, DocumentId(0));
        assert_eq!(apple[0].zone, Zone::BODY.merge(Zone::TITLE));
        assert_eq!(apple[1].doc, DocumentId(1));

        let none: Vec<_> = chunk.find("plum").unwrap().collect();
        assert!(none.is_empty());
    }

    #[test]
    fn test_dump_ranges_partitions_by_delimiter() {
        let root = tempfile::tempdir().unwrap();
        let dirs: Vec<_> = (0..3)
            .map(|i| {
                let d = root.path().join(format!("part_{i}"));
                std::fs::create_dir(&d).unwrap();
                d
            })
            .collect();

        let mut mapper = Mapper::new(layout());
        mapper.add("ant", DocumentId(0), Zone::BODY);
        mapper.add("horse", DocumentId(1), Zone::BODY);
        mapper.add("zebra", DocumentId(2), Zone::BODY);
        mapper.sort_strings();
        mapper.unify();

        let delimiters = vec!["g".to_string(), "n".to_string()];
        let chunks = mapper.dump_ranges(&dirs, &delimiters).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].entry_count(), 1);
        assert_eq!(chunks[1].entry_count(), 1);
        assert_eq!(chunks[2].entry_count(), 1);
        assert_eq!(
            chunks[0].find("ant").unwrap().next().map(|e| e.doc),
            Some(DocumentId(0))
        );
        assert_eq!(
            chunks[1].find("horse").unwrap().next().map(|e| e.doc),
            Some(DocumentId(1))
        );
        assert_eq!(
            chunks[2].find("zebra").unwrap().next().map(|e| e.doc),
            Some(DocumentId(2))
        );
    }
}
