//! Memory-mapped reader for a single index chunk file.
//!
//! A [`ChunkFile`] decodes the fixed header once and then serves random
//! access into the strings block, the optional documents block and the entry
//! body. String dereferencing is cached behind a `RefCell`, so a handle is
//! not shareable across threads; parallel readers open independent handles on
//! the same path.

use std::cell::RefCell;
use std::fs::File;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use memmap2::Mmap;

use crate::error::{Result, SorrelError};
use crate::index::codec::{self, Header, ZoneLayout, HEADER_SIZE};
use crate::index::flags::Flags;
use crate::index::DocumentEntry;
use crate::keyset::KeySet;

/// A raw body entry: string pointer plus either a packed document value or a
/// document-list pointer, depending on the file's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEntry {
    pub string_pointer: u32,
    pub doc_value: u32,
}

/// Read-only handle on one chunk file.
pub struct ChunkFile {
    path: PathBuf,
    map: Mmap,
    header: Header,
    layout: ZoneLayout,
    entry_count: u32,
    external_strings: Option<(PathBuf, Mmap)>,
    external_documents: Option<(PathBuf, Mmap)>,
    string_cache: RefCell<AHashMap<u32, String>>,
}

impl ChunkFile {
    /// Open and validate the chunk at `path`, following external string and
    /// document files when the flags point to them.
    pub fn open<P: AsRef<Path>>(path: P, layout: ZoneLayout) -> Result<ChunkFile> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let map = unsafe { Mmap::map(&file)? };
        let header = Header::decode(&map)?;

        let preamble = header.preamble_size() as u64;
        let len = map.len() as u64;
        if len < preamble {
            return Err(SorrelError::corrupt(format!(
                "{}: {} bytes but preamble claims {}",
                path.display(),
                len,
                preamble
            )));
        }
        let entry_size = header.flags.entry_size() as u64;
        let body = len - preamble;
        if body % entry_size != 0 {
            return Err(SorrelError::corrupt(format!(
                "{}: body of {} bytes is not a multiple of entry size {}",
                path.display(),
                body,
                entry_size
            )));
        }

        let external_strings = if header.flags.external_strings() {
            Some(Self::open_external(
                &path,
                &map,
                HEADER_SIZE,
                header.strings_block_size,
            )?)
        } else {
            None
        };
        let external_documents = if header.flags.external_documents() {
            Some(Self::open_external(
                &path,
                &map,
                HEADER_SIZE + header.strings_block_size,
                header.documents_block_size,
            )?)
        } else {
            None
        };

        Ok(ChunkFile {
            path,
            map,
            header,
            layout,
            entry_count: (body / entry_size) as u32,
            external_strings,
            external_documents,
            string_cache: RefCell::new(AHashMap::new()),
        })
    }

    fn open_external(
        chunk: &Path,
        map: &Mmap,
        offset: u32,
        size: u32,
    ) -> Result<(PathBuf, Mmap)> {
        let raw = &map[offset as usize..(offset + size) as usize];
        let relative = std::str::from_utf8(raw).map_err(|_| {
            SorrelError::corrupt(format!("{}: external path is not UTF-8", chunk.display()))
        })?;
        let path = match chunk.parent() {
            Some(parent) => parent.join(relative),
            None => PathBuf::from(relative),
        };
        let file = File::open(&path)?;
        let map = unsafe { Mmap::map(&file)? };
        Ok((path, map))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flags(&self) -> Flags {
        self.header.flags
    }

    pub fn layout(&self) -> ZoneLayout {
        self.layout
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// The raw entry at `idx`.
    pub fn entry(&self, idx: u32) -> Result<RawEntry> {
        if idx >= self.entry_count {
            return Err(SorrelError::corrupt(format!(
                "entry index {idx} out of range ({} entries)",
                self.entry_count
            )));
        }
        let flags = self.header.flags;
        let offset =
            self.header.preamble_size() as usize + (idx * flags.entry_size()) as usize;
        let string_pointer =
            codec::read_uint(&self.map[offset..], flags.string_pointer_width())?;
        let doc_width = if flags.has_doc_block() {
            flags.doc_pointer_width()
        } else {
            flags.doc_id_width()
        };
        let doc_value = codec::read_uint(
            &self.map[offset + flags.string_pointer_width().bytes() as usize..],
            doc_width,
        )?;
        Ok(RawEntry {
            string_pointer,
            doc_value,
        })
    }

    /// Iterate all raw entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = Result<RawEntry>> + '_ {
        (0..self.entry_count).map(move |idx| self.entry(idx))
    }

    fn strings_buffer(&self) -> &[u8] {
        match &self.external_strings {
            Some((_, map)) => map,
            None => &self.map,
        }
    }

    fn documents_buffer(&self) -> &[u8] {
        match &self.external_documents {
            Some((_, map)) => map,
            None => &self.map,
        }
    }

    /// Resolve a string pointer to its term, caching the result.
    pub fn dereference_string(&self, pointer: u32) -> Result<String> {
        if let Some(hit) = self.string_cache.borrow().get(&pointer) {
            return Ok(hit.clone());
        }
        let buffer = self.strings_buffer();
        let offset = pointer as usize;
        if offset >= buffer.len() {
            return Err(SorrelError::corrupt(format!(
                "string pointer {pointer} beyond strings data"
            )));
        }
        let length_width = self.header.flags.string_length_width();
        let length = codec::read_uint(&buffer[offset..], length_width)? as usize;
        let start = offset + length_width.bytes() as usize;
        let end = start + length;
        if end > buffer.len() {
            return Err(SorrelError::corrupt(format!(
                "string at {pointer} overruns strings data"
            )));
        }
        let term = std::str::from_utf8(&buffer[start..end])
            .map_err(|_| SorrelError::corrupt(format!("string at {pointer} is not UTF-8")))?
            .to_string();
        self.string_cache
            .borrow_mut()
            .insert(pointer, term.clone());
        Ok(term)
    }

    /// Resolve a document-list pointer to its packed document values,
    /// honoring interval and variable-byte coding.
    pub fn dereference_documents(&self, pointer: u32) -> Result<Vec<u32>> {
        let flags = self.header.flags;
        let buffer = self.documents_buffer();
        let mut offset = pointer as usize;
        if offset >= buffer.len() {
            return Err(SorrelError::corrupt(format!(
                "document pointer {pointer} beyond documents data"
            )));
        }
        let count = codec::read_uint(&buffer[offset..], flags.doc_block_size_width())?;
        offset += flags.doc_block_size_width().bytes() as usize;

        let mut documents = Vec::with_capacity(count as usize);
        let mut previous: u32 = 0;
        for _ in 0..count {
            let raw = if flags.varbyte_coded() {
                let (value, consumed) = codec::read_varbyte(&buffer[offset..])?;
                offset += consumed;
                value
            } else {
                let value = codec::read_uint(&buffer[offset..], flags.doc_id_width())?;
                offset += flags.doc_id_width().bytes() as usize;
                value
            };
            let value = if flags.interval_coded() && !documents.is_empty() {
                previous + raw
            } else {
                raw
            };
            previous = value;
            documents.push(value);
        }
        Ok(documents)
    }

    /// The term of the entry at `idx`.
    pub fn term(&self, idx: u32) -> Result<String> {
        self.dereference_string(self.entry(idx)?.string_pointer)
    }

    /// The single posting of the entry at `idx`. Requires a file without a
    /// documents block.
    pub fn get(&self, idx: u32) -> Result<(String, DocumentEntry)> {
        if self.header.flags.has_doc_block() {
            return Err(SorrelError::config(
                "get on a multi-entry file, use get_multi",
            ));
        }
        let entry = self.entry(idx)?;
        let term = self.dereference_string(entry.string_pointer)?;
        let (doc, zone) = self.layout.unpack(entry.doc_value);
        Ok((term, DocumentEntry::new(doc, zone)))
    }

    /// The full posting list of the entry at `idx`, for files with or without
    /// a documents block.
    pub fn get_multi(&self, idx: u32) -> Result<(String, Vec<DocumentEntry>)> {
        let entry = self.entry(idx)?;
        let term = self.dereference_string(entry.string_pointer)?;
        let packed = if self.header.flags.has_doc_block() {
            self.dereference_documents(entry.doc_value)?
        } else {
            vec![entry.doc_value]
        };
        let postings = packed
            .into_iter()
            .map(|value| {
                let (doc, zone) = self.layout.unpack(value);
                DocumentEntry::new(doc, zone)
            })
            .collect();
        Ok((term, postings))
    }

    /// Walk the strings data sequentially, yielding each string with the
    /// pointer that body entries use to reference it.
    pub fn strings(&self) -> impl Iterator<Item = Result<(u32, String)>> + '_ {
        let flags = self.header.flags;
        let (start, end) = match &self.external_strings {
            Some((_, map)) => (0usize, map.len()),
            None => (
                HEADER_SIZE as usize,
                (HEADER_SIZE + self.header.strings_block_size) as usize,
            ),
        };
        let length_width = flags.string_length_width();
        let mut offset = start;
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed || offset >= end {
                return None;
            }
            let pointer = offset as u32;
            let buffer = self.strings_buffer();
            let item = codec::read_uint(&buffer[offset..end], length_width).and_then(|length| {
                let from = offset + length_width.bytes() as usize;
                let to = from + length as usize;
                if to > end {
                    return Err(SorrelError::corrupt(format!(
                        "string at {pointer} overruns strings data"
                    )));
                }
                offset = to;
                std::str::from_utf8(&buffer[from..to])
                    .map(|s| (pointer, s.to_string()))
                    .map_err(|_| {
                        SorrelError::corrupt(format!("string at {pointer} is not UTF-8"))
                    })
            });
            if item.is_err() {
                failed = true;
            }
            Some(item)
        })
    }

    /// Locate `term` among the entries. `Ok(idx)` is a matching index (any
    /// one of a duplicate run), `Err(idx)` the insertion point.
    ///
    /// Requires sorted entries over lexically sorted strings.
    pub fn binary_search(&self, term: &str) -> Result<std::result::Result<u32, u32>> {
        let flags = self.header.flags;
        if !flags.sorted() || !flags.sorted_strings() {
            return Err(SorrelError::config(
                "binary search requires sorted entries and sorted strings",
            ));
        }
        let mut lo = 0u32;
        let mut hi = self.entry_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.term(mid)?.as_str().cmp(term) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    /// The posting list for `term` as a [`KeySet`], empty on miss.
    pub fn find(&self, term: &str) -> Result<KeySet<DocumentEntry>> {
        let hit = match self.binary_search(term)? {
            Ok(idx) => idx,
            Err(_) => return Ok(KeySet::empty()),
        };
        if self.header.flags.has_doc_block() {
            let (_, postings) = self.get_multi(hit)?;
            return Ok(KeySet::from_sorted(postings));
        }
        // Inline postings: expand the duplicate run around the hit and merge
        // repeated documents.
        let mut lo = hit;
        while lo > 0 && self.term(lo - 1)? == term {
            lo -= 1;
        }
        let mut hi = hit + 1;
        while hi < self.entry_count && self.term(hi)? == term {
            hi += 1;
        }
        let mut postings: Vec<DocumentEntry> = Vec::with_capacity((hi - lo) as usize);
        for idx in lo..hi {
            let (doc, zone) = self.layout.unpack(self.entry(idx)?.doc_value);
            match postings.last_mut() {
                Some(last) if last.doc == doc => last.zone = last.zone.merge(zone),
                _ => postings.push(DocumentEntry::new(doc, zone)),
            }
        }
        Ok(KeySet::from_sorted(postings))
    }

    /// Remove the chunk and any external files it points to.
    pub fn delete(self) -> Result<()> {
        let ChunkFile {
            path,
            map,
            external_strings,
            external_documents,
            ..
        } = self;
        drop(map);
        std::fs::remove_file(&path)?;
        if let Some((path, map)) = external_strings {
            drop(map);
            std::fs::remove_file(&path)?;
        }
        if let Some((path, map)) = external_documents {
            drop(map);
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}
