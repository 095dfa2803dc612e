//! Flat text format tying split-read candidates to their reference windows.
//!
//! Each record is a block of seven lines:
//!
//! ```text
//! read name
//! chromosome:position
//! read length
//! CIGAR
//! read sequence
//! reference window
//! >
//! ```
//!
//! Blocks follow each other directly. Plain text and BGZF-compressed files
//! can be read back.

use crate::cigar::{cigar_to_string, parse_cigar, trim_hard_clips, CigarOp};
use crate::error::CandidateError;
use crate::padding::{pad_alignment, PaddedAlignment};
use crate::split_read::SplitReadCandidate;
use log::{debug, warn};
use noodles::bgzf;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;

pub const BLOCK_DELIMITER: &str = ">";

const BLOCK_DATA_LINES: usize = 6;
/// Index of the first data line (read sequence) that may be empty.
const EMPTY_FIELD_FIRST: usize = 4;

/// One block of the intermediate format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionAlignmentRecord {
    pub name: String,
    pub chromosome: String,
    pub position: u64,
    pub read_len: usize,
    pub cigar: String,
    pub read_sequence: String,
    pub reference_sequence: String,
}

impl FusionAlignmentRecord {
    pub fn from_candidate(candidate: &SplitReadCandidate, reference_window: String) -> Self {
        Self {
            name: candidate.name.clone(),
            chromosome: candidate.primary_chromosome.clone(),
            position: candidate.primary_position,
            read_len: candidate.read_len,
            cigar: cigar_to_string(&candidate.cigar),
            read_sequence: candidate.read_sequence.clone(),
            reference_sequence: reference_window,
        }
    }

    /// Start of the read; the format stores a single position for both sides.
    pub fn read_start(&self) -> u64 {
        self.position
    }

    pub fn reference_start(&self) -> u64 {
        self.position
    }

    /// CIGAR re-tokenized with leading and trailing hard clips removed.
    pub fn trimmed_cigar(&self) -> Result<Vec<CigarOp>, CandidateError> {
        let ops = parse_cigar(&self.cigar)?;
        Ok(trim_hard_clips(&ops).to_vec())
    }

    pub fn padded(&self) -> Result<PaddedAlignment, CandidateError> {
        let cigar = self.trimmed_cigar()?;
        pad_alignment(&cigar, &self.read_sequence, &self.reference_sequence)
    }
}

/// Write one block, delimiter included.
pub fn write_record<W: Write>(writer: &mut W, record: &FusionAlignmentRecord) -> io::Result<()> {
    writeln!(writer, "{}", record.name)?;
    writeln!(writer, "{}:{}", record.chromosome, record.position)?;
    writeln!(writer, "{}", record.read_len)?;
    writeln!(writer, "{}", record.cigar)?;
    writeln!(writer, "{}", record.read_sequence)?;
    writeln!(writer, "{}", record.reference_sequence)?;
    writeln!(writer, "{BLOCK_DELIMITER}")
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A complete block that could not be parsed; reading can go on.
    #[error("block '{name}' ending at line {line}: {error}")]
    Block {
        line: usize,
        name: String,
        error: CandidateError,
    },
}

fn parse_block(lines: &[String]) -> Result<FusionAlignmentRecord, CandidateError> {
    if lines.len() != BLOCK_DATA_LINES {
        return Err(CandidateError::MalformedRecordBlock(format!(
            "expected {BLOCK_DATA_LINES} lines before '{BLOCK_DELIMITER}', found {}",
            lines.len()
        )));
    }

    let (chromosome, position) = lines[1]
        .rsplit_once(':')
        .and_then(|(chrom, pos)| Some((chrom, pos.parse::<u64>().ok()?)))
        .ok_or_else(|| {
            CandidateError::MalformedRecordBlock(format!(
                "expected chromosome:position, found '{}'",
                lines[1]
            ))
        })?;
    let read_len = lines[2].parse::<usize>().map_err(|_| {
        CandidateError::MalformedRecordBlock(format!("invalid read length '{}'", lines[2]))
    })?;
    parse_cigar(&lines[3])?;

    Ok(FusionAlignmentRecord {
        name: lines[0].clone(),
        chromosome: chromosome.to_string(),
        position,
        read_len,
        cigar: lines[3].clone(),
        read_sequence: lines[4].clone(),
        reference_sequence: lines[5].clone(),
    })
}

/// Streaming reader over blocks. A trailing block without its delimiter is
/// dropped.
pub struct RecordReader<R> {
    reader: R,
    buf: String,
    lines: Vec<String>,
    line_no: usize,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            lines: Vec::with_capacity(BLOCK_DATA_LINES),
            line_no: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<FusionAlignmentRecord, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            let bytes_read = match self.reader.read_line(&mut self.buf) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(ReadError::Io(e)));
                }
            };

            if bytes_read == 0 {
                self.done = true;
                if !self.lines.is_empty() {
                    debug!(
                        "Discarding unterminated block of {} lines at end of input",
                        self.lines.len()
                    );
                    self.lines.clear();
                }
                return None;
            }
            self.line_no += 1;

            let line = self.buf.trim_end_matches(&['\n', '\r'][..]);
            if line.is_empty() {
                // Read sequence and reference window may legitimately be empty
                if (EMPTY_FIELD_FIRST..BLOCK_DATA_LINES).contains(&self.lines.len()) {
                    self.lines.push(String::new());
                    continue;
                }
                warn!("Blank line {} found! This is not expected.", self.line_no);
                continue;
            }

            if line == BLOCK_DELIMITER {
                let lines = std::mem::take(&mut self.lines);
                let line_no = self.line_no;
                return Some(parse_block(&lines).map_err(|error| ReadError::Block {
                    line: line_no,
                    name: lines.first().cloned().unwrap_or_default(),
                    error,
                }));
            }

            self.lines.push(line.to_string());
        }
    }
}

const BGZF_HEADER_SIZE: usize = 18;

/// Check whether a file starts with a valid BGZF header.
/// Returns `Ok(false)` for regular gzip, too-small files, or plain text.
fn is_bgzf<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let mut header = [0u8; BGZF_HEADER_SIZE];
    let result = match reader.read_exact(&mut header) {
        Ok(()) => {
            Ok(header[0..2] == [0x1f, 0x8b]      // gzip magic
                && header[2] == 0x08              // DEFLATE
                && header[3] == 0x04              // FEXTRA
                && header[10..12] == [0x06, 0x00] // XLEN=6
                && header[12..14] == [b'B', b'C'] // BC subfield
                && header[14..16] == [0x02, 0x00]) // SLEN=2
        }
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    };
    reader.seek(SeekFrom::Start(0))?;
    result
}

/// Open a record file, decompressing `.gz`/`.bgz` input with BGZF.
pub fn open_records(
    path: &str,
    threads: NonZeroUsize,
) -> io::Result<RecordReader<Box<dyn BufRead>>> {
    let mut file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("Failed to open '{path}': {e}")))?;

    let reader: Box<dyn BufRead> = if [".gz", ".bgz"].iter().any(|e| path.ends_with(e)) {
        if !is_bgzf(&mut file)? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "'{path}' is regular gzip, not BGZF. Convert with: zcat '{path}' | bgzip > records.txt.gz"
                ),
            ));
        }
        if threads.get() > 1 {
            debug!("Reading {path} with {threads} BGZF workers");
            Box::new(BufReader::new(
                bgzf::io::MultithreadedReader::with_worker_count(threads, file),
            ))
        } else {
            Box::new(bgzf::io::Reader::new(file))
        }
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(RecordReader::new(reader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::padding::ShadedInterval;
    use std::io::Cursor;

    fn record(name: &str) -> FusionAlignmentRecord {
        FusionAlignmentRecord {
            name: name.to_string(),
            chromosome: "7".to_string(),
            position: 1200,
            read_len: 25,
            cigar: "10M5I10M".to_string(),
            read_sequence: "A".repeat(25),
            reference_sequence: "C".repeat(20),
        }
    }

    fn read_all(text: &str) -> Vec<Result<FusionAlignmentRecord, ReadError>> {
        RecordReader::new(Cursor::new(text.to_string())).collect()
    }

    #[test]
    fn test_write_block_layout() {
        let mut out = Vec::new();
        write_record(&mut out, &record("r1")).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "r1",
                "7:1200",
                "25",
                "10M5I10M",
                "AAAAAAAAAAAAAAAAAAAAAAAAA",
                "CCCCCCCCCCCCCCCCCCCC",
                ">"
            ]
        );
    }

    #[test]
    fn test_read_back_concatenated_blocks() {
        let mut out = Vec::new();
        write_record(&mut out, &record("r1")).unwrap();
        write_record(&mut out, &record("r2")).unwrap();

        let records: Vec<_> = RecordReader::new(Cursor::new(out))
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records, vec![record("r1"), record("r2")]);
    }

    #[test]
    fn test_partial_trailing_block_is_discarded() {
        let text = "r1\n7:1200\n25\n10M5I10M\nAAAAAAAAAAAAAAAAAAAAAAAAA\nCCCCCCCCCCCCCCCCCCCC\n>\nr2\n7:5\n";
        let records = read_all(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().name, "r1");
    }

    #[test]
    fn test_blank_line_inside_block_is_tolerated() {
        let text = "r1\n7:1200\n\n25\n10M5I10M\nAAAAAAAAAAAAAAAAAAAAAAAAA\nCCCCCCCCCCCCCCCCCCCC\r\n>\n";
        let records = read_all(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap(), &record("r1"));
    }

    #[test]
    fn test_malformed_block_is_skipped_and_reading_continues() {
        let text = "bad\n7:1200\n25\n>\n\
                    r2\n7:1200\n25\n10M5I10M\nAAAAAAAAAAAAAAAAAAAAAAAAA\nCCCCCCCCCCCCCCCCCCCC\n>\n";
        let records = read_all(text);
        assert_eq!(records.len(), 2);
        match &records[0] {
            Err(ReadError::Block { line, name, error }) => {
                assert_eq!(*line, 4);
                assert_eq!(name, "bad");
                assert!(matches!(error, CandidateError::MalformedRecordBlock(_)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(records[1].as_ref().unwrap().name, "r2");
    }

    #[test]
    fn test_invalid_fields_are_block_errors() {
        let bad_position = "r1\n7-1200\n25\n10M\nA\nC\n>\n";
        assert!(matches!(
            read_all(bad_position).remove(0),
            Err(ReadError::Block {
                error: CandidateError::MalformedRecordBlock(_),
                ..
            })
        ));

        let bad_cigar = "r1\n7:1200\n25\n10Q\nA\nC\n>\n";
        assert!(matches!(
            read_all(bad_cigar).remove(0),
            Err(ReadError::Block {
                error: CandidateError::UnsupportedCigarOperation('Q'),
                ..
            })
        ));
    }

    #[test]
    fn test_chromosome_with_colon() {
        let text = "r1\nHG002#1#chr7:1200\n25\n10M5I10M\nAAAAAAAAAAAAAAAAAAAAAAAAA\nCCCCCCCCCCCCCCCCCCCC\n>\n";
        let parsed = read_all(text).remove(0).unwrap();
        assert_eq!(parsed.chromosome, "HG002#1#chr7");
        assert_eq!(parsed.read_start(), 1200);
        assert_eq!(parsed.reference_start(), 1200);
    }

    #[test]
    fn test_padded_from_record_trims_hard_clips() {
        let mut hard_clipped = record("r1");
        hard_clipped.cigar = "5H10M5H".to_string();
        hard_clipped.read_sequence = "ACGTACGTAC".to_string();
        hard_clipped.reference_sequence = "ACGTACGTAC".to_string();

        let padded = hard_clipped.padded().unwrap();
        assert_eq!(padded.columns(), 10);
        assert_eq!(
            padded.reference_shaded,
            vec![ShadedInterval { start: 0, len: 10 }]
        );

        let padded = record("r2").padded().unwrap();
        assert_eq!(
            padded.reference_shaded,
            vec![
                ShadedInterval { start: 0, len: 10 },
                ShadedInterval { start: 15, len: 10 }
            ]
        );
        assert_eq!(padded.read_shaded, vec![ShadedInterval { start: 0, len: 25 }]);
    }

    #[test]
    fn test_empty_reference_window_reads_back() {
        let insertion = FusionAlignmentRecord {
            name: "ins".to_string(),
            chromosome: "7".to_string(),
            position: 1,
            read_len: 4,
            cigar: "4I".to_string(),
            read_sequence: "ACGT".to_string(),
            reference_sequence: String::new(),
        };
        let clipped = FusionAlignmentRecord {
            name: "clip".to_string(),
            cigar: "4H".to_string(),
            read_len: 0,
            read_sequence: String::new(),
            ..insertion.clone()
        };

        let mut out = Vec::new();
        write_record(&mut out, &insertion).unwrap();
        write_record(&mut out, &clipped).unwrap();
        assert!(out.starts_with(b"ins\n7:1\n4\n4I\nACGT\n\n>\n"));

        let records: Vec<_> = RecordReader::new(Cursor::new(out))
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records, vec![insertion.clone(), clipped.clone()]);

        let padded = records[0].padded().unwrap();
        assert_eq!(padded.reference_padded, "    ");
        assert_eq!(padded.read_padded, "ACGT");
        assert_eq!(records[1].padded().unwrap().columns(), 0);
    }

    #[test]
    fn test_stray_blank_line_between_blocks_is_skipped() {
        let text = "r1\n7:1200\n25\n10M5I10M\nAAAAAAAAAAAAAAAAAAAAAAAAA\nCCCCCCCCCCCCCCCCCCCC\n>\n\n\
                    r2\n7:1200\n25\n10M5I10M\nAAAAAAAAAAAAAAAAAAAAAAAAA\nCCCCCCCCCCCCCCCCCCCC\n>\n";
        let records = read_all(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].as_ref().unwrap(), &record("r2"));
    }

    #[test]
    fn test_open_plain_records_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("records.txt");
        let mut file = File::create(&path).unwrap();
        write_record(&mut file, &record("r1")).unwrap();
        drop(file);

        let records: Vec<_> = open_records(path.to_str().unwrap(), NonZeroUsize::new(1).unwrap())
            .unwrap()
            .collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_plain_gzip_is_refused() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("records.txt.gz");
        // gzip magic without the BGZF extra field
        let header: [u8; 20] = [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0, 0x03, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        std::fs::write(&path, header).unwrap();

        let err = open_records(path.to_str().unwrap(), NonZeroUsize::new(1).unwrap())
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
