//! Batch passes over split reads.
//!
//! Extraction: decoded alignments are filtered into candidates, sorted by read
//! name, given their reference windows, checked by padding them, and written
//! as record blocks. Padding: record blocks are read back and turned into
//! [`PaddedAlignment`]s for display.

use crate::alignment_record::DecodedAlignment;
use crate::cigar::{reference_span, trim_hard_clips};
use crate::error::{CandidateError, Rejection};
use crate::padding::{PaddedAlignment, ShadedInterval};
use crate::record_codec::{write_record, FusionAlignmentRecord, ReadError};
use crate::reference::ReferenceStore;
use crate::split_read::{filter_record, FilterConfig, SplitReadCandidate};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Decoded records seen
    pub examined: usize,
    /// Records that passed the split-read filter
    pub candidates: usize,
    /// Blocks written
    pub written: usize,
    pub rejected: Vec<Rejection>,
    /// Set when the abort signal stopped the run early
    pub aborted: bool,
}

#[derive(Debug, Default)]
pub struct PadReport {
    pub blocks: usize,
    pub rejected: Vec<Rejection>,
}

/// A record together with its padded layout.
#[derive(Debug, Clone)]
pub struct PaddedRecord {
    pub record: FusionAlignmentRecord,
    pub padded: PaddedAlignment,
}

fn reject(rejected: &mut Vec<Rejection>, name: &str, error: CandidateError) {
    debug!("Rejected {name}: {error}");
    rejected.push(Rejection {
        name: name.to_string(),
        error,
    });
}

/// Filter decoded alignments into candidates sorted by read name.
///
/// I/O errors from the decoder end the pass; candidates that cannot be built
/// are recorded in `rejected`.
pub fn collect_candidates<I>(
    records: I,
    config: &FilterConfig,
    examined: &mut usize,
    rejected: &mut Vec<Rejection>,
) -> io::Result<Vec<SplitReadCandidate>>
where
    I: IntoIterator<Item = io::Result<DecodedAlignment>>,
{
    let mut candidates = Vec::new();

    for record in records {
        let record = record?;
        *examined += 1;

        match filter_record(&record, config) {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(error) => reject(rejected, &record.name, error),
        }
    }

    candidates.sort();
    Ok(candidates)
}

/// Fetch every candidate's reference window.
///
/// Windows are fetched grouped by chromosome and position so that a store
/// keeping a single file open switches files as rarely as possible. Returns
/// `None` when the abort signal was raised.
fn fetch_windows<S: ReferenceStore>(
    candidates: &[SplitReadCandidate],
    store: &mut S,
    abort: &AtomicBool,
) -> io::Result<Option<Vec<String>>> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&candidates[a], &candidates[b]);
        a.primary_chromosome
            .cmp(&b.primary_chromosome)
            .then(a.primary_position.cmp(&b.primary_position))
    });

    let mut windows = vec![String::new(); candidates.len()];
    for idx in order {
        if abort.load(Ordering::Relaxed) {
            return Ok(None);
        }

        let candidate = &candidates[idx];
        let span = reference_span(trim_hard_clips(&candidate.cigar));
        let window = store.fetch_window(
            &candidate.primary_chromosome,
            candidate.primary_position,
            span,
        )?;
        debug!(
            "{}: fetched {} of {} bases at {}:{}",
            candidate.name,
            window.len(),
            span,
            candidate.primary_chromosome,
            candidate.primary_position
        );
        windows[idx] = String::from_utf8_lossy(&window).into_owned();
    }

    Ok(Some(windows))
}

/// Run the extraction pass and write one block per accepted candidate.
///
/// Candidates whose padding fails are left out of the output. Reference-store
/// and output I/O failures end the run. The store is closed on return.
///
/// Raising `abort` (the binary raises it on SIGINT) stops the run between
/// blocks; everything written up to then is complete.
pub fn extract<I, S, W>(
    records: I,
    store: &mut S,
    writer: &mut W,
    config: &FilterConfig,
    abort: &AtomicBool,
) -> io::Result<ExtractReport>
where
    I: IntoIterator<Item = io::Result<DecodedAlignment>>,
    S: ReferenceStore,
    W: Write,
{
    let result = run_extract(records, store, writer, config, abort);
    store.close();
    result
}

fn run_extract<I, S, W>(
    records: I,
    store: &mut S,
    writer: &mut W,
    config: &FilterConfig,
    abort: &AtomicBool,
) -> io::Result<ExtractReport>
where
    I: IntoIterator<Item = io::Result<DecodedAlignment>>,
    S: ReferenceStore,
    W: Write,
{
    let mut report = ExtractReport::default();

    let candidates =
        collect_candidates(records, config, &mut report.examined, &mut report.rejected)?;
    report.candidates = candidates.len();
    info!(
        "Selected {} split-read candidates from {} records",
        report.candidates, report.examined
    );

    let Some(windows) = fetch_windows(&candidates, store, abort)? else {
        warn!("Aborted before any block was written");
        report.aborted = true;
        return Ok(report);
    };

    let blocks: Vec<FusionAlignmentRecord> = candidates
        .iter()
        .zip(windows)
        .map(|(candidate, window)| FusionAlignmentRecord::from_candidate(candidate, window))
        .collect();

    // Padding is independent per candidate
    let checks: Vec<Result<(), CandidateError>> = blocks
        .par_iter()
        .map(|block| block.padded().map(|_| ()))
        .collect();

    for (block, check) in blocks.iter().zip(checks) {
        if abort.load(Ordering::Relaxed) {
            warn!("Aborted after writing {} blocks", report.written);
            report.aborted = true;
            break;
        }

        match check {
            Ok(()) => {
                write_record(writer, block)?;
                report.written += 1;
            }
            Err(error) => reject(&mut report.rejected, &block.name, error),
        }
    }
    writer.flush()?;

    Ok(report)
}

/// Pad every record read back from a record file, preserving file order.
///
/// Malformed blocks and records whose padding fails are reported and skipped;
/// I/O errors end the pass.
pub fn pad_records<I>(records: I) -> io::Result<(Vec<PaddedRecord>, PadReport)>
where
    I: IntoIterator<Item = Result<FusionAlignmentRecord, ReadError>>,
{
    let mut report = PadReport::default();
    let mut parsed = Vec::new();

    for record in records {
        report.blocks += 1;
        match record {
            Ok(record) => parsed.push(record),
            Err(ReadError::Io(e)) => return Err(e),
            Err(ReadError::Block { line, name, error }) => {
                debug!("Skipping block ending at line {line}");
                reject(&mut report.rejected, &name, error);
            }
        }
    }

    let results: Vec<Result<PaddedAlignment, CandidateError>> =
        parsed.par_iter().map(FusionAlignmentRecord::padded).collect();

    let mut padded_records = Vec::with_capacity(parsed.len());
    for (record, result) in parsed.into_iter().zip(results) {
        match result {
            Ok(padded) => padded_records.push(PaddedRecord { record, padded }),
            Err(error) => reject(&mut report.rejected, &record.name, error),
        }
    }

    info!(
        "Padded {} of {} record blocks",
        padded_records.len(),
        report.blocks
    );

    Ok((padded_records, report))
}

/// Tab-separated rendering of a padded record: name, locus, padded reference,
/// padded read, reference shading, read shading.
pub fn padded_tsv_line(padded_record: &PaddedRecord) -> String {
    let PaddedRecord { record, padded } = padded_record;
    format!(
        "{}\t{}:{}\t{}\t{}\t{}\t{}",
        record.name,
        record.chromosome,
        record.position,
        padded.reference_padded,
        padded.read_padded,
        format_shaded(&padded.reference_shaded),
        format_shaded(&padded.read_shaded)
    )
}

fn format_shaded(intervals: &[ShadedInterval]) -> String {
    if intervals.is_empty() {
        return ".".to_string();
    }
    intervals
        .iter()
        .map(|interval| format!("{}+{}", interval.start, interval.len))
        .collect::<Vec<_>>()
        .join(",")
}
