//! K-way reduction of sorted chunk files into one unified index chunk.
//!
//! The reducer merges the string blocks of its inputs (deduplicated, with a
//! per-input pointer remapping), then streams all entries through a binary
//! heap ordered by (term, packed document). Runs of one term collapse into a
//! single multi-entry whose posting list lives in the documents block; the
//! same document appearing in several inputs has its zone bits OR-merged.
//!
//! Posting lists can be delta (interval) coded, variable-byte coded, and
//! placed in an external file. With an in-file documents block the reducer
//! buffers lists to pick pointer widths exactly; with an external file it
//! streams lists out under pessimistic widths in a single pass.

use std::collections::BinaryHeap;
use std::path::Path;

use ahash::AHashMap;
use log::debug;

use crate::error::{Result, SorrelError};
use crate::index::chunk::ChunkFile;
use crate::index::codec::{self, Header, WriteBuffer, ZoneLayout, HEADER_SIZE};
use crate::index::flags::{Flags, Width};
use crate::index::{DOCUMENTS_EXTENSION, STRINGS_EXTENSION};
use crate::progress::{ProgressEvent, ProgressSink};

const REPORT_INTERVAL: u64 = 1 << 14;

/// Reduction options. Defaults produce a self-contained file with plain
/// fixed-width posting lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceConfig {
    /// Delta-code posting lists (first value absolute, rest differences).
    pub interval_coding: bool,
    /// Variable-byte code posting-list values.
    pub varbyte_coding: bool,
    /// Stream posting lists to a sibling file instead of an in-file block.
    pub external_documents: bool,
    /// Place merged strings in a sibling file.
    pub external_strings: bool,
}

/// Merge `files` into a unified multi-entry chunk at `to`.
///
/// Every input must be sorted and carry inline postings; violations are
/// configuration errors. Inputs are left in place; the caller deletes them
/// once the output is safely on disk.
pub fn reduce(
    files: &[ChunkFile],
    to: &Path,
    config: &ReduceConfig,
    sink: &dyn ProgressSink,
) -> Result<ChunkFile> {
    if files.is_empty() {
        return Err(SorrelError::config("reduce requires at least one input"));
    }
    for file in files {
        if !file.flags().sorted() {
            return Err(SorrelError::config(format!(
                "cannot reduce unsorted chunk {}",
                file.path().display()
            )));
        }
        if file.flags().has_doc_block() {
            return Err(SorrelError::config(format!(
                "cannot reduce multi-entry chunk {}",
                file.path().display()
            )));
        }
    }
    let layout = files[0].layout();

    let mut flags = files[0].flags();
    for file in &files[1..] {
        flags.intersect_tiers(file.flags());
    }
    flags.set_sorted(true);
    flags.set_unified(true);
    flags.set_has_doc_block(true);
    flags.set_external_strings(config.external_strings);
    flags.set_external_documents(config.external_documents);
    flags.set_interval_coded(config.interval_coding);
    flags.set_varbyte_coded(config.varbyte_coding);

    let string_base = if config.external_strings { 0 } else { HEADER_SIZE };
    let (strings_data, mappings, strings_sorted) =
        merge_strings(files, flags, string_base)?;
    flags.set_sorted_strings(strings_sorted);

    // The strings block holds either the merged strings or the name of the
    // sibling file that does.
    let strings_file_name = external_name(to, STRINGS_EXTENSION)?;
    let strings_block: Vec<u8> = if config.external_strings {
        strings_file_name.as_bytes().to_vec()
    } else {
        strings_data.clone()
    };
    flags.set_string_pointer_width(Width::for_max(
        string_base + strings_data.len() as u32,
    ));

    if config.external_strings {
        let path = sibling(to, &strings_file_name);
        let mut out = WriteBuffer::create(&path)?;
        out.write_bytes(&strings_data)?;
        out.finish_raw()?;
    }

    let result = if config.external_documents {
        write_streaming(files, to, config, flags, layout, &mappings, &strings_block, sink)
    } else {
        write_buffered(files, to, config, flags, layout, &mappings, &strings_block, sink)
    }?;
    debug!(
        "reduced {} chunks into {} ({} entries)",
        files.len(),
        to.display(),
        result.entry_count()
    );
    Ok(result)
}

fn external_name(to: &Path, extension: &str) -> Result<String> {
    let stem = to
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| SorrelError::config(format!("bad output path {}", to.display())))?;
    Ok(format!("{stem}.{extension}"))
}

fn sibling(to: &Path, name: &str) -> std::path::PathBuf {
    match to.parent() {
        Some(parent) => parent.join(name),
        None => std::path::PathBuf::from(name),
    }
}

/// Merge the input string blocks, deduplicating terms.
///
/// Returns the encoded output strings data (offsets relative to `base`), one
/// old-pointer to new-pointer mapping per input, and whether the output data
/// is in lexical order. A priority-queue merge keeps lexical order when every
/// input has sorted strings; otherwise a hash merge is used.
fn merge_strings(
    files: &[ChunkFile],
    flags: Flags,
    base: u32,
) -> Result<(Vec<u8>, Vec<AHashMap<u32, u32>>, bool)> {
    let length_width = flags.string_length_width();
    let mut data: Vec<u8> = Vec::new();
    let mut mappings: Vec<AHashMap<u32, u32>> = files.iter().map(|_| AHashMap::new()).collect();

    let all_sorted = files.iter().all(|f| f.flags().sorted_strings());
    if all_sorted {
        let mut iters: Vec<_> = files.iter().map(|f| f.strings()).collect();
        let mut heap: BinaryHeap<std::cmp::Reverse<(String, usize, u32)>> = BinaryHeap::new();
        for (idx, iter) in iters.iter_mut().enumerate() {
            if let Some(item) = iter.next() {
                let (pointer, string) = item?;
                heap.push(std::cmp::Reverse((string, idx, pointer)));
            }
        }
        let mut last: Option<(String, u32)> = None;
        while let Some(std::cmp::Reverse((string, file, pointer))) = heap.pop() {
            if let Some(item) = iters[file].next() {
                let (next_pointer, next_string) = item?;
                heap.push(std::cmp::Reverse((next_string, file, next_pointer)));
            }
            let new_pointer = match &last {
                Some((seen, at)) if *seen == string => *at,
                _ => {
                    let at = base + data.len() as u32;
                    codec::write_uint(&mut data, string.len() as u32, length_width)?;
                    data.extend_from_slice(string.as_bytes());
                    last = Some((string, at));
                    at
                }
            };
            mappings[file].insert(pointer, new_pointer);
        }
    } else {
        let mut seen: AHashMap<String, u32> = AHashMap::new();
        for (idx, file) in files.iter().enumerate() {
            for item in file.strings() {
                let (pointer, string) = item?;
                let new_pointer = match seen.get(&string) {
                    Some(&at) => at,
                    None => {
                        let at = base + data.len() as u32;
                        codec::write_uint(&mut data, string.len() as u32, length_width)?;
                        data.extend_from_slice(string.as_bytes());
                        seen.insert(string, at);
                        at
                    }
                };
                mappings[idx].insert(pointer, new_pointer);
            }
        }
    }
    Ok((data, mappings, all_sorted))
}

/// One pending input entry in the k-way merge heap.
struct Head {
    term: String,
    packed: u32,
    new_pointer: u32,
    file: usize,
    index: u32,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.term
            .cmp(&other.term)
            .then(self.packed.cmp(&other.packed))
            .then(self.file.cmp(&other.file))
    }
}

fn make_head(
    files: &[ChunkFile],
    mappings: &[AHashMap<u32, u32>],
    file: usize,
    index: u32,
) -> Result<Head> {
    let entry = files[file].entry(index)?;
    let term = files[file].dereference_string(entry.string_pointer)?;
    let new_pointer = *mappings[file].get(&entry.string_pointer).ok_or_else(|| {
        SorrelError::corrupt(format!(
            "entry {} of {} references an unmapped string",
            index,
            files[file].path().display()
        ))
    })?;
    Ok(Head {
        term,
        packed: entry.doc_value,
        new_pointer,
        file,
        index,
    })
}

/// Stream all input entries in (term, document) order, emitting one
/// `(string pointer, packed posting list)` group per distinct term. Returns
/// the number of source entries consumed.
fn merge_entries<F>(
    files: &[ChunkFile],
    mappings: &[AHashMap<u32, u32>],
    layout: ZoneLayout,
    sink: &dyn ProgressSink,
    mut emit: F,
) -> Result<u64>
where
    F: FnMut(u32, Vec<u32>) -> Result<()>,
{
    let mut heap: BinaryHeap<std::cmp::Reverse<Head>> = BinaryHeap::new();
    for file in 0..files.len() {
        if files[file].entry_count() > 0 {
            heap.push(std::cmp::Reverse(make_head(files, mappings, file, 0)?));
        }
    }

    let zone_mask = layout.mask();
    let mut merged: u64 = 0;
    let mut current: Option<(u32, Vec<u32>)> = None;
    while let Some(std::cmp::Reverse(head)) = heap.pop() {
        if head.index + 1 < files[head.file].entry_count() {
            heap.push(std::cmp::Reverse(make_head(
                files,
                mappings,
                head.file,
                head.index + 1,
            )?));
        }
        match current.as_mut() {
            Some((pointer, documents)) if *pointer == head.new_pointer => {
                match documents.last_mut() {
                    // Same document again: OR the zone bits together.
                    Some(last) if (*last ^ head.packed) <= zone_mask => {
                        *last |= head.packed & zone_mask;
                    }
                    _ => documents.push(head.packed),
                }
            }
            _ => {
                if let Some((pointer, documents)) = current.take() {
                    emit(pointer, documents)?;
                }
                current = Some((head.new_pointer, vec![head.packed]));
            }
        }
        merged += 1;
        if merged % REPORT_INTERVAL == 0 {
            sink.report(ProgressEvent::EntriesReduced { count: merged });
        }
    }
    if let Some((pointer, documents)) = current.take() {
        emit(pointer, documents)?;
    }
    sink.report(ProgressEvent::EntriesReduced { count: merged });
    Ok(merged)
}

fn encode_document_list(
    data: &mut Vec<u8>,
    documents: &[u32],
    flags: Flags,
) -> Result<()> {
    codec::write_uint(data, documents.len() as u32, flags.doc_block_size_width())?;
    let mut previous = 0u32;
    for (i, &value) in documents.iter().enumerate() {
        let stored = if flags.interval_coded() && i > 0 {
            value - previous
        } else {
            value
        };
        previous = value;
        if flags.varbyte_coded() {
            codec::write_varbyte(data, stored)?;
        } else {
            codec::write_uint(data, stored, flags.doc_id_width())?;
        }
    }
    Ok(())
}

/// Two-pass mode: buffer posting lists in memory, size the document-block
/// widths exactly, then lay the file out back to front.
#[allow(clippy::too_many_arguments)]
fn write_buffered(
    files: &[ChunkFile],
    to: &Path,
    _config: &ReduceConfig,
    mut flags: Flags,
    layout: ZoneLayout,
    mappings: &[AHashMap<u32, u32>],
    strings_block: &[u8],
    sink: &dyn ProgressSink,
) -> Result<ChunkFile> {
    let mut groups: Vec<(u32, Vec<u32>)> = Vec::new();
    merge_entries(files, mappings, layout, sink, |pointer, documents| {
        groups.push((pointer, documents));
        Ok(())
    })?;

    let max_count = groups.iter().map(|(_, d)| d.len() as u32).max().unwrap_or(0);
    flags.set_doc_block_size_width(Width::for_max(max_count));

    let document_base = HEADER_SIZE + strings_block.len() as u32;
    let mut document_data: Vec<u8> = Vec::new();
    let mut pointers: Vec<u32> = Vec::with_capacity(groups.len());
    for (_, documents) in &groups {
        pointers.push(document_base + document_data.len() as u32);
        encode_document_list(&mut document_data, documents, flags)?;
    }
    flags.set_doc_pointer_width(Width::for_max(
        document_base + document_data.len() as u32,
    ));

    let mut out = WriteBuffer::create(to)?;
    out.skip(HEADER_SIZE)?;
    out.write_bytes(strings_block)?;
    out.write_bytes(&document_data)?;
    for ((string_pointer, _), document_pointer) in groups.iter().zip(&pointers) {
        out.write_uint(*string_pointer, flags.string_pointer_width())?;
        out.write_uint(*document_pointer, flags.doc_pointer_width())?;
    }
    out.finish(Header {
        flags,
        strings_block_size: strings_block.len() as u32,
        documents_block_size: document_data.len() as u32,
    })?;
    ChunkFile::open(to, layout)
}

/// Single-pass mode: posting lists stream to a sibling documents file under
/// pessimistic pointer widths, entries stream straight to the output.
#[allow(clippy::too_many_arguments)]
fn write_streaming(
    files: &[ChunkFile],
    to: &Path,
    _config: &ReduceConfig,
    mut flags: Flags,
    layout: ZoneLayout,
    mappings: &[AHashMap<u32, u32>],
    strings_block: &[u8],
    sink: &dyn ProgressSink,
) -> Result<ChunkFile> {
    // List sizes and positions are unknown until written, so both widths stay
    // at their maximum.
    flags.set_doc_block_size_width(Width::W4);
    flags.set_doc_pointer_width(Width::W4);

    let documents_name = external_name(to, DOCUMENTS_EXTENSION)?;

    let mut out = WriteBuffer::create(to)?;
    out.skip(HEADER_SIZE)?;
    out.write_bytes(strings_block)?;
    out.write_bytes(documents_name.as_bytes())?;

    let mut documents_out = WriteBuffer::create(sibling(to, &documents_name))?;
    let result = merge_entries(files, mappings, layout, sink, |pointer, documents| {
        let list_pointer = documents_out.position() as u32;
        let mut encoded = Vec::new();
        encode_document_list(&mut encoded, &documents, flags)?;
        documents_out.write_bytes(&encoded)?;
        out.write_uint(pointer, flags.string_pointer_width())?;
        out.write_uint(list_pointer, flags.doc_pointer_width())?;
        Ok(())
    });
    result?;
    documents_out.finish_raw()?;
    out.finish(Header {
        flags,
        strings_block_size: strings_block.len() as u32,
        documents_block_size: documents_name.len() as u32,
    })?;
    ChunkFile::open(to, layout)
}
