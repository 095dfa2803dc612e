//! CIGAR-driven padding of a read against its reference window.
//!
//! Walking the CIGAR produces two equally long sequences where gaps are
//! filled with blanks, plus the runs of each sequence that carry real
//! aligned content. Shaded intervals are offsets into the padded sequences,
//! not into the raw read or reference.
//!
//! ```text
//!                      I          N           M
//!                   [0-535)  [535-1035)  [1035-1074)
//! reference:                  ==========  ===========
//! read:             ==========            ===========
//! ```
//!
//! For the layout above the reference is shaded at `[535, 539]` and the read at
//! `[0, 535]` and `[1035, 39]`.

use crate::cigar::{cigar_to_string, reference_span, CigarKind, CigarOp};
use crate::error::CandidateError;
use log::debug;

/// Filler placed wherever a sequence has no base in a column.
pub const PAD_CHAR: u8 = b' ';

/// A highlighted run of columns in a padded sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadedInterval {
    pub start: usize,
    pub len: usize,
}

impl ShadedInterval {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Padded reference and read, with their shaded intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedAlignment {
    pub reference_padded: String,
    pub read_padded: String,
    pub reference_shaded: Vec<ShadedInterval>,
    pub read_shaded: Vec<ShadedInterval>,
}

impl PaddedAlignment {
    /// Number of columns, identical for both padded sequences.
    pub fn columns(&self) -> usize {
        self.reference_padded.len()
    }
}

/// How one operation kind is laid out.
struct Layout {
    shade_reference: bool,
    shade_read: bool,
    consume_reference: bool,
    consume_read: bool,
}

const fn layout(kind: CigarKind) -> Layout {
    match kind {
        CigarKind::Match => Layout {
            shade_reference: true,
            shade_read: true,
            consume_reference: true,
            consume_read: true,
        },
        CigarKind::Skip | CigarKind::Deletion | CigarKind::SoftClip => Layout {
            shade_reference: true,
            shade_read: false,
            consume_reference: true,
            consume_read: false,
        },
        CigarKind::Insertion => Layout {
            shade_reference: false,
            shade_read: true,
            consume_reference: false,
            consume_read: true,
        },
        CigarKind::HardClip => Layout {
            shade_reference: false,
            shade_read: false,
            consume_reference: false,
            consume_read: false,
        },
    }
}

/// Append `[start, len]`, extending the last interval when it ends at `start`.
fn push_shaded(intervals: &mut Vec<ShadedInterval>, start: usize, len: usize) {
    match intervals.last_mut() {
        Some(last) if last.end() == start => last.len += len,
        _ => intervals.push(ShadedInterval { start, len }),
    }
}

/// Append `len` bases of `source` from `cursor` (clamped to the end of the
/// source) and advance the cursor by `len`.
fn take_bases(padded: &mut Vec<u8>, source: &[u8], cursor: &mut usize, len: usize) {
    let start = (*cursor).min(source.len());
    let end = (*cursor + len).min(source.len());
    padded.extend_from_slice(&source[start..end]);
    *cursor += len;
}

/// Pad `read` and `reference` according to `cigar`.
///
/// `cigar` is expected to be hard-clip trimmed already and `reference` must
/// hold exactly the number of bases [`reference_span`] reports for it.
pub fn pad_alignment(
    cigar: &[CigarOp],
    read: &str,
    reference: &str,
) -> Result<PaddedAlignment, CandidateError> {
    let expected_reference = reference_span(cigar);
    if reference.len() != expected_reference {
        return Err(CandidateError::ReferenceWindowSizeMismatch {
            expected: expected_reference,
            actual: reference.len(),
        });
    }

    let read_bytes = read.as_bytes();
    let reference_bytes = reference.as_bytes();

    let mut reference_padded: Vec<u8> = Vec::with_capacity(read.len() + reference.len());
    let mut read_padded: Vec<u8> = Vec::with_capacity(read.len() + reference.len());
    let mut reference_shaded = Vec::new();
    let mut read_shaded = Vec::new();

    let mut ref_cursor = 0usize;
    let mut read_cursor = 0usize;
    let mut shade_pos = 0usize;

    for op in cigar {
        let len = op.len();
        let layout = layout(op.kind());

        if layout.shade_reference {
            push_shaded(&mut reference_shaded, shade_pos, len);
        }
        if layout.shade_read {
            push_shaded(&mut read_shaded, shade_pos, len);
        }
        shade_pos += len;

        if layout.consume_reference {
            take_bases(&mut reference_padded, reference_bytes, &mut ref_cursor, len);
        } else {
            reference_padded.resize(reference_padded.len() + len, PAD_CHAR);
        }

        if layout.consume_read {
            take_bases(&mut read_padded, read_bytes, &mut read_cursor, len);
        } else {
            read_padded.resize(read_padded.len() + len, PAD_CHAR);
        }

        debug!(
            "Processed {}: reference at {}/{}, read at {}/{}, {} columns",
            op,
            ref_cursor,
            reference_bytes.len(),
            read_cursor,
            read_bytes.len(),
            shade_pos
        );
    }

    if shade_pos != reference_padded.len()
        || shade_pos != read_padded.len()
        || ref_cursor != reference_bytes.len()
        || read_cursor != read_bytes.len()
    {
        return Err(CandidateError::PaddingLengthMismatch {
            cigar: cigar_to_string(cigar),
            expected: shade_pos,
            reference_padded: reference_padded.len(),
            read_padded: read_padded.len(),
            reference_consumed: ref_cursor,
            reference_len: reference_bytes.len(),
            read_consumed: read_cursor,
            read_len: read_bytes.len(),
        });
    }

    Ok(PaddedAlignment {
        reference_padded: String::from_utf8_lossy(&reference_padded).into_owned(),
        read_padded: String::from_utf8_lossy(&read_padded).into_owned(),
        reference_shaded,
        read_shaded,
    })
}
