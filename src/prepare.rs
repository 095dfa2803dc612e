//! Conversion of FASTA references into per-chromosome flat files.

use crate::faidx::FastaReferenceStore;
use crate::split_read::normalize_chromosome;
use log::{info, warn};
use rustc_hash::FxHashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write every sequence of `fasta_files` to `<output_dir>/<name><suffix>`
/// without header or line breaks. A leading `chr` is dropped from the file
/// name. Returns the files written.
pub fn prepare_reference(
    fasta_files: &[String],
    output_dir: &Path,
    suffix: &str,
) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;

    let mut store = FastaReferenceStore::build_from_files(fasta_files)?;
    let names = store.sequence_names().to_vec();

    let mut seen = FxHashSet::default();
    let mut written = Vec::with_capacity(names.len());

    for name in names {
        let chromosome = normalize_chromosome(&name).to_string();
        if !seen.insert(chromosome.clone()) {
            warn!("Skipping {name}: a sequence named {chromosome} was already written");
            continue;
        }

        let length = store.get_sequence_length(&name)?;
        let sequence = store.fetch_sequence(&name, 0, length)?;

        let path = output_dir.join(format!("{chromosome}{suffix}"));
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(&sequence)?;
        writer.flush()?;

        info!("Wrote {} bases of {name} to {}", sequence.len(), path.display());
        written.push(path);
    }

    Ok(written)
}
