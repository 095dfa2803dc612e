//! Decoding of BAM/SAM/CRAM files into [`DecodedAlignment`]s via htslib.

use crate::alignment_record::{AlignmentFormat, DecodedAlignment};
use log::{debug, info};
use rust_htslib::bam;
use rust_htslib::bam::record::Aux;
use rust_htslib::bam::Read as HtsRead;
use std::io;

/// Streams decoded alignments, skipping records without a reference.
pub struct AlignmentReader {
    reader: bam::Reader,
    record: bam::Record,
    target_names: Vec<String>,
    unplaced: usize,
}

impl AlignmentReader {
    pub fn from_path(path: &str) -> io::Result<Self> {
        let format = AlignmentFormat::from_path(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Unsupported alignment file '{path}': expected .bam, .sam or .cram"),
            )
        })?;
        debug!("Opening {path} as {format:?}");

        let reader = bam::Reader::from_path(path)
            .map_err(|e| io::Error::other(format!("Failed to open alignment file '{path}': {e}")))?;
        let target_names = reader
            .header()
            .target_names()
            .iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();

        Ok(Self {
            reader,
            record: bam::Record::new(),
            target_names,
            unplaced: 0,
        })
    }

    /// Number of records skipped so far because they had no reference.
    pub fn unplaced(&self) -> usize {
        self.unplaced
    }

    fn decode(&self) -> DecodedAlignment {
        let record = &self.record;
        let reference_name = self
            .target_names
            .get(record.tid() as usize)
            .cloned()
            .unwrap_or_default();
        let cigar = record.cigar().to_string();

        DecodedAlignment {
            name: String::from_utf8_lossy(record.qname()).into_owned(),
            reference_name,
            position: (record.pos() + 1) as u64,
            mapping_quality: record.mapq(),
            cigar: if cigar.is_empty() { "*".to_string() } else { cigar },
            tags: format_tags(record),
            sequence: String::from_utf8_lossy(&record.seq().as_bytes()).into_owned(),
            sequence_len: record.seq_len(),
        }
    }
}

impl Iterator for AlignmentReader {
    type Item = io::Result<DecodedAlignment>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Err(e) = self.reader.read(&mut self.record)? {
                return Some(Err(io::Error::other(format!(
                    "Failed to decode alignment record: {e}"
                ))));
            }

            if self.record.tid() < 0 || self.record.is_unmapped() {
                self.unplaced += 1;
                continue;
            }

            return Some(Ok(self.decode()));
        }
    }
}

impl Drop for AlignmentReader {
    fn drop(&mut self) {
        if self.unplaced > 0 {
            info!("Skipped {} records without a reference", self.unplaced);
        }
    }
}

/// Render the auxiliary fields as SAM text. Array-typed tags are left out.
fn format_tags(record: &bam::Record) -> String {
    let mut tags = Vec::new();

    for entry in record.aux_iter() {
        let Ok((tag, value)) = entry else { continue };
        let tag = String::from_utf8_lossy(tag);
        let formatted = match value {
            Aux::Char(c) => format!("{tag}:A:{}", c as char),
            Aux::I8(v) => format!("{tag}:i:{v}"),
            Aux::U8(v) => format!("{tag}:i:{v}"),
            Aux::I16(v) => format!("{tag}:i:{v}"),
            Aux::U16(v) => format!("{tag}:i:{v}"),
            Aux::I32(v) => format!("{tag}:i:{v}"),
            Aux::U32(v) => format!("{tag}:i:{v}"),
            Aux::Float(v) => format!("{tag}:f:{v}"),
            Aux::Double(v) => format!("{tag}:f:{v}"),
            Aux::String(v) => format!("{tag}:Z:{v}"),
            Aux::HexByteArray(v) => format!("{tag}:H:{v}"),
            _ => continue,
        };
        tags.push(formatted);
    }

    tags.join("\t")
}
