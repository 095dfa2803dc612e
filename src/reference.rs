use crate::faidx::FastaReferenceStore;
use log::debug;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// File name suffix of the per-chromosome flat reference files.
pub const DEFAULT_REFERENCE_SUFFIX: &str = ".FASTA";

// Trait for reference window fetching from different stores
pub trait ReferenceStore {
    /// Fetch `length` bases starting at the 1-based `position` of `chromosome`.
    /// The window comes back shorter when it runs past the end of the chromosome.
    fn fetch_window(&mut self, chromosome: &str, position: u64, length: usize) -> io::Result<Vec<u8>>;

    /// Release any open file handles.
    fn close(&mut self) {}
}

struct OpenReference {
    chromosome: String,
    reader: BufReader<File>,
}

/// One headerless, unwrapped sequence file per chromosome, named
/// `<chromosome><suffix>` inside a directory.
///
/// Windows are read by byte offset, so a line-wrapped file is refused as
/// soon as a window crosses a line break.
///
/// Only one file is open at a time; it is swapped when a window on another
/// chromosome is requested, so callers should visit chromosomes in runs.
pub struct FlatReferenceStore {
    dir: PathBuf,
    suffix: String,
    current: Option<OpenReference>,
}

impl FlatReferenceStore {
    pub fn new(dir: impl Into<PathBuf>, suffix: &str) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.to_string(),
            current: None,
        }
    }

    pub fn chromosome_path(&self, chromosome: &str) -> PathBuf {
        self.dir.join(format!("{chromosome}{}", self.suffix))
    }

    fn reader_for(&mut self, chromosome: &str) -> io::Result<&mut BufReader<File>> {
        let is_open = self
            .current
            .as_ref()
            .is_some_and(|open| open.chromosome == chromosome);

        if !is_open {
            let path = self.chromosome_path(chromosome);
            let file = File::open(&path).map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to open reference file '{}': {e}", path.display()),
                )
            })?;
            debug!("Switched reference to {}", path.display());
            self.current = Some(OpenReference {
                chromosome: chromosome.to_string(),
                reader: BufReader::new(file),
            });
        }

        match self.current.as_mut() {
            Some(open) => Ok(&mut open.reader),
            None => Err(io::Error::other("No reference file open")),
        }
    }
}

impl ReferenceStore for FlatReferenceStore {
    fn fetch_window(&mut self, chromosome: &str, position: u64, length: usize) -> io::Result<Vec<u8>> {
        let reader = self.reader_for(chromosome)?;
        reader.seek(SeekFrom::Start(position.saturating_sub(1)))?;

        let mut window = Vec::with_capacity(length);
        reader.by_ref().take(length as u64).read_to_end(&mut window)?;

        // A trailing newline at the end of the file is not sequence, but a
        // line break followed by more bases means the file is wrapped
        if let Some(first_break) = window.iter().position(u8::is_ascii_whitespace) {
            if window[first_break..].iter().any(|b| !b.is_ascii_whitespace()) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Reference file '{}' is line-wrapped near position {}; flat reference files must hold the sequence on one line (see prepare-reference)",
                        self.chromosome_path(chromosome).display(),
                        position + first_break as u64
                    ),
                ));
            }
            window.truncate(first_break);
        }
        window.make_ascii_uppercase();
        Ok(window)
    }

    fn close(&mut self) {
        if let Some(open) = self.current.take() {
            debug!("Closed reference for chromosome {}", open.chromosome);
        }
    }
}

// Enum to hold either a flat-file or an indexed FASTA store
pub enum UnifiedReferenceStore {
    Flat(FlatReferenceStore),
    Fasta(FastaReferenceStore),
}

impl UnifiedReferenceStore {
    /// A single directory selects the flat-file store; FASTA files select the
    /// indexed store.
    pub fn from_paths(paths: &[String], suffix: &str) -> io::Result<Self> {
        if paths.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "No reference provided",
            ));
        }

        if paths.len() == 1 && Path::new(&paths[0]).is_dir() {
            return Ok(UnifiedReferenceStore::Flat(FlatReferenceStore::new(
                &paths[0], suffix,
            )));
        }

        let is_fasta = |path: &str| {
            [".fa", ".fasta", ".fna", ".fa.gz", ".fasta.gz", ".fna.gz"]
                .iter()
                .any(|ext| path.ends_with(ext))
        };
        if let Some(other) = paths.iter().find(|p| !is_fasta(p)) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Unsupported reference '{other}'. Provide one directory of flat files or .fa/.fasta/.fna(.gz) files"
                ),
            ));
        }

        Ok(UnifiedReferenceStore::Fasta(
            FastaReferenceStore::build_from_files(paths)?,
        ))
    }
}

impl ReferenceStore for UnifiedReferenceStore {
    fn fetch_window(&mut self, chromosome: &str, position: u64, length: usize) -> io::Result<Vec<u8>> {
        match self {
            UnifiedReferenceStore::Flat(store) => store.fetch_window(chromosome, position, length),
            UnifiedReferenceStore::Fasta(store) => store.fetch_window(chromosome, position, length),
        }
    }

    fn close(&mut self) {
        match self {
            UnifiedReferenceStore::Flat(store) => store.close(),
            UnifiedReferenceStore::Fasta(store) => store.close(),
        }
    }
}
