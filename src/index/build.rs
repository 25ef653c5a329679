//! End-to-end index construction: map documents in parallel, spill sorted
//! chunks per lexical partition, reduce each partition, write the manifest.
//!
//! The document list splits into one contiguous slice per worker thread; each
//! worker owns a private mapper and spills it whenever it fills. The registry
//! is the only shared mutable state. Reduction runs partition-parallel on the
//! rayon pool, and the manifest is written only after every partition reduced
//! successfully, so a present manifest always names complete files.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::info;
use rayon::prelude::*;

use crate::analysis::tokenize_plain;
use crate::error::{Result, SorrelError};
use crate::index::chunk::ChunkFile;
use crate::index::codec::ZoneLayout;
use crate::index::manifest::{Manifest, ManifestRange};
use crate::index::mapper::{Mapper, DEFAULT_CAPACITY};
use crate::index::reduce::{reduce, ReduceConfig};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::registry::DocumentRegistry;

/// File name of a partition's reduced dictionary.
pub const DICTIONARY_NAME: &str = "dictionary.spimi";
/// File name of the persisted registry inside an index directory.
pub const REGISTRY_NAME: &str = "registry.json";

const DELIMITER_ALPHABET: &[u8] = b"0abcdefghijklmnopqrstuvwxyz";
const DELIMITER_LENGTH: usize = 4;

/// Knobs for [`build_index`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Mapper worker threads.
    pub threads: usize,
    /// Records each mapper buffers before spilling.
    pub mapper_capacity: usize,
    /// Zone bit width for packed document values.
    pub zone_layout: ZoneLayout,
    /// Lexical partitions of the final index.
    pub partitions: usize,
    /// Reduction options applied to every partition.
    pub reduce: ReduceConfig,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            threads: num_cpus::get(),
            mapper_capacity: DEFAULT_CAPACITY,
            zone_layout: ZoneLayout::default(),
            partitions: 1,
            reduce: ReduceConfig::default(),
        }
    }
}

/// Evenly spaced lexical delimiters for `partitions` partitions, from a
/// fractional walk over the delimiter alphabet. Returns `partitions - 1`
/// four-character strings in strictly ascending order.
pub fn gen_delimiters(partitions: usize) -> Vec<String> {
    let base = DELIMITER_ALPHABET.len() as f64;
    (1..partitions)
        .map(|i| {
            let mut x = i as f64 / partitions as f64;
            let mut delimiter = String::with_capacity(DELIMITER_LENGTH);
            for _ in 0..DELIMITER_LENGTH {
                let idx = ((x * base) as usize).min(DELIMITER_ALPHABET.len() - 1);
                delimiter.push(DELIMITER_ALPHABET[idx] as char);
                x = x * base - idx as f64;
            }
            delimiter
        })
        .collect()
}

/// Contiguous `(start, end)` split bounds covering `0..count`.
fn gen_splits(count: usize, parts: usize) -> Vec<(usize, usize)> {
    (0..parts)
        .map(|i| (i * count / parts, (i + 1) * count / parts))
        .collect()
}

/// Build a complete index over `documents` into `out_dir`.
///
/// Registers every document in `registry`, persists the registry next to the
/// chunks, and returns the manifest that was written last. Intermediate spill
/// chunks are deleted once their partition reduced.
pub fn build_index(
    documents: &[PathBuf],
    out_dir: &Path,
    registry: &DocumentRegistry,
    options: &BuildOptions,
    sink: &dyn ProgressSink,
) -> Result<Manifest> {
    if options.threads == 0 {
        return Err(SorrelError::config("at least one mapper thread required"));
    }
    if options.partitions == 0 {
        return Err(SorrelError::config("at least one partition required"));
    }
    if options.mapper_capacity == 0 {
        return Err(SorrelError::config("mapper capacity must be positive"));
    }
    std::fs::create_dir_all(out_dir)?;

    let layout = options.zone_layout;
    let delimiters = gen_delimiters(options.partitions);
    let partition_dirs: Vec<PathBuf> = if options.partitions == 1 {
        vec![out_dir.to_path_buf()]
    } else {
        (0..options.partitions)
            .map(|i| out_dir.join(format!("part_{i:03}")))
            .collect()
    };
    for dir in &partition_dirs {
        std::fs::create_dir_all(dir)?;
    }

    info!(
        "mapping {} documents on {} threads into {} partitions",
        documents.len(),
        options.threads,
        options.partitions
    );
    let splits = gen_splits(documents.len(), options.threads);
    let mut partition_chunks: Vec<Vec<ChunkFile>> =
        (0..options.partitions).map(|_| Vec::new()).collect();
    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(splits.len());
        for (worker, &(start, end)) in splits.iter().enumerate() {
            let split = &documents[start..end];
            let dirs = &partition_dirs;
            let delimiters = &delimiters;
            handles.push(scope.spawn(move || {
                map_split(worker, split, registry, options, dirs, delimiters, sink)
            }));
        }
        for handle in handles {
            let mapped = match handle.join() {
                Ok(result) => result?,
                Err(payload) => std::panic::resume_unwind(payload),
            };
            for (partition, chunks) in mapped.into_iter().enumerate() {
                partition_chunks[partition].extend(chunks);
            }
        }
        Ok(())
    })?;

    // A partition no worker touched still needs a (trivial) dictionary.
    for (partition, chunks) in partition_chunks.iter_mut().enumerate() {
        if chunks.is_empty() {
            let mapper = Mapper::with_capacity(layout, 1);
            chunks.push(mapper.dump_to_dir(&partition_dirs[partition])?);
        }
    }

    info!("reducing {} partitions", options.partitions);
    partition_chunks
        .into_par_iter()
        .enumerate()
        .map(|(partition, chunks)| {
            let out = partition_dirs[partition].join(DICTIONARY_NAME);
            let reduced = reduce(&chunks, &out, &options.reduce, sink)?;
            for chunk in chunks {
                chunk.delete()?;
            }
            drop(reduced);
            sink.report(ProgressEvent::PartitionReduced { partition });
            Ok(())
        })
        .collect::<Result<Vec<()>>>()?;

    registry.save(out_dir.join(REGISTRY_NAME))?;
    let manifest = if options.partitions == 1 {
        Manifest::single(DICTIONARY_NAME, layout)
    } else {
        let ranges = partition_dirs
            .iter()
            .enumerate()
            .map(|(i, dir)| {
                let name = dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| SorrelError::config("partition directory has no name"))?;
                Ok(ManifestRange {
                    delimiter: delimiters.get(i).cloned(),
                    path: format!("{name}/{DICTIONARY_NAME}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Manifest::partitioned(ranges, layout)?
    };
    manifest.save(out_dir)?;
    sink.report(ProgressEvent::BuildDone);
    Ok(manifest)
}

fn map_split(
    worker: usize,
    split: &[PathBuf],
    registry: &DocumentRegistry,
    options: &BuildOptions,
    dirs: &[PathBuf],
    delimiters: &[String],
    sink: &dyn ProgressSink,
) -> Result<Vec<Vec<ChunkFile>>> {
    let mut mapper = Mapper::with_capacity(options.zone_layout, options.mapper_capacity);
    let mut partitions: Vec<Vec<ChunkFile>> = (0..dirs.len()).map(|_| Vec::new()).collect();

    for path in split {
        let id = registry.register(path.to_string_lossy());
        let file = File::open(path)?;
        for token in tokenize_plain(BufReader::new(file)) {
            let (term, zone) = token?;
            if !mapper.add(&term, id, zone) {
                spill(&mut mapper, dirs, delimiters, &mut partitions)?;
                if !mapper.add(&term, id, zone) {
                    return Err(SorrelError::config("mapper capacity too small to hold one record"));
                }
            }
        }
        sink.report(ProgressEvent::DocumentMapped {
            path: path.to_string_lossy().into_owned(),
        });
    }
    if !mapper.is_empty() {
        spill(&mut mapper, dirs, delimiters, &mut partitions)?;
    }
    sink.report(ProgressEvent::MapStageDone { worker });
    Ok(partitions)
}

fn spill(
    mapper: &mut Mapper,
    dirs: &[PathBuf],
    delimiters: &[String],
    partitions: &mut [Vec<ChunkFile>],
) -> Result<()> {
    mapper.sort_strings();
    mapper.unify();
    let chunks = mapper.dump_ranges(dirs, delimiters)?;
    for (partition, chunk) in chunks.into_iter().enumerate() {
        partitions[partition].push(chunk);
    }
    mapper.clear();
    Ok(())
}
