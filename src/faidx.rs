use crate::reference::ReferenceStore;
use log::debug;
use rust_htslib::faidx;
use rustc_hash::FxHashMap;
use std::io;

// Simple cache for FASTA file handles with random eviction
struct FaidxCache {
    capacity: usize,
    readers: FxHashMap<String, faidx::Reader>,
}

impl FaidxCache {
    fn new(capacity: usize) -> Self {
        FaidxCache {
            capacity,
            readers: FxHashMap::default(),
        }
    }

    fn get_or_open(&mut self, path: &str) -> io::Result<&mut faidx::Reader> {
        if !self.readers.contains_key(path) {
            // Evict one random entry if at capacity
            if self.readers.len() >= self.capacity {
                if let Some(key_to_remove) = self.readers.keys().next().cloned() {
                    self.readers.remove(&key_to_remove);
                }
            }

            let reader = faidx::Reader::from_path(path).map_err(|e| {
                io::Error::other(format!("Failed to open FASTA file '{path}': {e}"))
            })?;
            self.readers.insert(path.to_string(), reader);
        }

        self.readers
            .get_mut(path)
            .ok_or_else(|| io::Error::other(format!("FASTA reader for '{path}' was evicted")))
    }
}

/// Reference windows served from one or more indexed FASTA files.
pub struct FastaReferenceStore {
    fasta_paths: Vec<String>,
    sequence_names: Vec<String>,
    name_to_fasta: FxHashMap<String, usize>,
    sequence_lengths: FxHashMap<String, usize>,
    cache: FaidxCache,
}

impl FastaReferenceStore {
    fn new() -> Self {
        FastaReferenceStore {
            fasta_paths: Vec::new(),
            sequence_names: Vec::new(),
            name_to_fasta: FxHashMap::default(),
            sequence_lengths: FxHashMap::default(),
            cache: FaidxCache::new(4),
        }
    }

    pub fn build_from_files(fasta_files: &[String]) -> io::Result<Self> {
        let mut store = FastaReferenceStore::new();

        for (fasta_idx, fasta_path) in fasta_files.iter().enumerate() {
            store.fasta_paths.push(fasta_path.clone());

            let fai_path = format!("{fasta_path}.fai");

            // Opening the FASTA through htslib writes the .fai when it is missing
            let fai_content = match std::fs::read_to_string(&fai_path) {
                Ok(content) => content,
                Err(_) => match faidx::Reader::from_path(fasta_path) {
                    Ok(_) => std::fs::read_to_string(&fai_path)?,
                    Err(e) => {
                        return Err(io::Error::other(format!(
                            "Failed to create FASTA index for '{fasta_path}': {e}"
                        )));
                    }
                },
            };

            // name, length, offset, line bases, line width
            for line in fai_content.lines() {
                let fields: Vec<&str> = line.split('\t').collect();
                if fields.len() < 2 || fields[0].is_empty() {
                    continue;
                }
                let Ok(length) = fields[1].parse::<usize>() else {
                    continue;
                };
                let seq_name = fields[0].to_string();
                if store.name_to_fasta.insert(seq_name.clone(), fasta_idx).is_none() {
                    store.sequence_names.push(seq_name.clone());
                }
                store.sequence_lengths.insert(seq_name, length);
            }
        }

        debug!(
            "Indexed {} sequences from {} FASTA files",
            store.sequence_names.len(),
            store.fasta_paths.len()
        );

        Ok(store)
    }

    /// Sequence names in the order they appear in the indexes.
    pub fn sequence_names(&self) -> &[String] {
        &self.sequence_names
    }

    pub fn get_sequence_length(&self, seq_name: &str) -> io::Result<usize> {
        self.sequence_lengths.get(seq_name).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Sequence '{seq_name}' not found"),
            )
        })
    }

    /// Resolve a chromosome to the name used in the FASTA, trying a `chr`
    /// prefix when the bare name is unknown.
    fn resolve_name(&self, chromosome: &str) -> Option<String> {
        if self.name_to_fasta.contains_key(chromosome) {
            return Some(chromosome.to_string());
        }
        let prefixed = format!("chr{chromosome}");
        self.name_to_fasta
            .contains_key(&prefixed)
            .then_some(prefixed)
    }

    /// Fetch the 0-based half-open range `[start, end)` of `seq_name`, uppercased.
    pub fn fetch_sequence(&mut self, seq_name: &str, start: usize, end: usize) -> io::Result<Vec<u8>> {
        if start >= end {
            return Ok(Vec::new());
        }

        let fasta_path = self
            .name_to_fasta
            .get(seq_name)
            .map(|&idx| self.fasta_paths[idx].clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Sequence '{seq_name}' not found in any FASTA file"),
                )
            })?;

        let reader = self.cache.get_or_open(&fasta_path)?;

        // fetch_seq expects a 0-based inclusive end coordinate
        match reader.fetch_seq(seq_name, start, end - 1) {
            Ok(seq) => {
                let mut seq_vec = seq.to_vec();
                unsafe { libc::free(seq.as_ptr() as *mut std::ffi::c_void) }; // Free up memory to avoid memory leak (bug https://github.com/rust-bio/rust-htslib/issues/401#issuecomment-1704290171)
                seq_vec.make_ascii_uppercase();
                Ok(seq_vec)
            }
            Err(e) => Err(io::Error::other(format!(
                "Failed to fetch sequence for {seq_name}: {e}"
            ))),
        }
    }
}

impl ReferenceStore for FastaReferenceStore {
    fn fetch_window(&mut self, chromosome: &str, position: u64, length: usize) -> io::Result<Vec<u8>> {
        let seq_name = self.resolve_name(chromosome).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Chromosome '{chromosome}' not found in any FASTA file"),
            )
        })?;
        let seq_len = self.get_sequence_length(&seq_name)?;

        // Clamp to the end of the sequence; the caller sees a short window
        let start = (position.saturating_sub(1) as usize).min(seq_len);
        let end = start.saturating_add(length).min(seq_len);
        self.fetch_sequence(&seq_name, start, end)
    }

    fn close(&mut self) {
        self.cache.readers.clear();
    }
}
