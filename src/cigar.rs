//! CIGAR tokenizing and reference-span arithmetic.
//!
//! Only the six operations produced by the split-read aligners we read are
//! accepted: `M`, `I`, `D`, `N`, `S` and `H`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CigarError {
    /// The string has no parseable `(digits)(letter)` segment, or a segment
    /// is incomplete (digits without a letter, a letter without digits, a
    /// zero or overflowing length).
    #[error("malformed CIGAR string '{0}'")]
    Malformed(String),
    /// A well-formed segment whose letter is outside `MIDNSH`.
    #[error("CIGAR operation '{0}' is not supported")]
    UnsupportedOperation(char),
}

/// Kind of a CIGAR operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CigarKind {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
}

impl CigarKind {
    pub fn from_char(op: char) -> Result<Self, CigarError> {
        match op {
            'M' => Ok(CigarKind::Match),
            'I' => Ok(CigarKind::Insertion),
            'D' => Ok(CigarKind::Deletion),
            'N' => Ok(CigarKind::Skip),
            'S' => Ok(CigarKind::SoftClip),
            'H' => Ok(CigarKind::HardClip),
            _ => Err(CigarError::UnsupportedOperation(op)),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            CigarKind::Match => 'M',
            CigarKind::Insertion => 'I',
            CigarKind::Deletion => 'D',
            CigarKind::Skip => 'N',
            CigarKind::SoftClip => 'S',
            CigarKind::HardClip => 'H',
        }
    }

    /// Whether the operation consumes bases of the reference window.
    pub fn consumes_reference(self) -> bool {
        match self {
            CigarKind::Match | CigarKind::Skip | CigarKind::Deletion | CigarKind::SoftClip => true,
            CigarKind::Insertion | CigarKind::HardClip => false,
        }
    }
}

/// One `(length, kind)` CIGAR segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CigarOp {
    len: u32,
    kind: CigarKind,
}

impl CigarOp {
    pub fn new(len: u32, kind: CigarKind) -> Self {
        Self { len, kind }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kind(&self) -> CigarKind {
        self.kind
    }

    pub fn op(&self) -> char {
        self.kind.as_char()
    }

    /// Number of reference bases this segment covers.
    pub fn target_delta(&self) -> usize {
        if self.kind.consumes_reference() {
            self.len()
        } else {
            0
        }
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.op())
    }
}

/// Parse a CIGAR string such as `15H200M1D300M` into its segments, in order.
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>, CigarError> {
    let malformed = || CigarError::Malformed(cigar.to_string());

    let mut ops = Vec::new();
    let mut len: Option<u32> = None;

    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            let current = len.unwrap_or(0);
            len = Some(
                current
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or_else(malformed)?,
            );
        } else if c.is_ascii_alphabetic() || c == '=' {
            let Some(op_len) = len.take() else {
                return Err(malformed());
            };
            let kind = CigarKind::from_char(c)?;
            if op_len == 0 {
                return Err(malformed());
            }
            ops.push(CigarOp::new(op_len, kind));
        } else {
            return Err(malformed());
        }
    }

    // Trailing digits without an operation letter
    if len.is_some() || ops.is_empty() {
        return Err(malformed());
    }

    Ok(ops)
}

/// Render segments back to the compact string form.
pub fn cigar_to_string(ops: &[CigarOp]) -> String {
    ops.iter().map(|op| op.to_string()).collect()
}

/// Drop leading and trailing hard clips. Internal `H` segments are kept.
pub fn trim_hard_clips(ops: &[CigarOp]) -> &[CigarOp] {
    let is_hard_clip = |op: &CigarOp| op.kind() == CigarKind::HardClip;

    let start = ops.iter().position(|op| !is_hard_clip(op)).unwrap_or(ops.len());
    let end = ops
        .iter()
        .rposition(|op| !is_hard_clip(op))
        .map_or(start, |idx| idx + 1);

    &ops[start..end]
}

/// Number of reference bases that must be read to cover the alignment:
/// the summed lengths of `M`, `N`, `D` and `S` segments.
pub fn reference_span(ops: &[CigarOp]) -> usize {
    ops.iter().map(CigarOp::target_delta).sum()
}

/// Total number of columns the padded alignment occupies.
pub fn alignment_columns(ops: &[CigarOp]) -> usize {
    ops.iter().map(CigarOp::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(pairs: &[(u32, char)]) -> Vec<CigarOp> {
        pairs.iter()
            .map(|&(len, op)| CigarOp::new(len, CigarKind::from_char(op).unwrap()))
            .collect()
    }

    #[test]
    fn test_parse_cigar_in_source_order() {
        let parsed = parse_cigar("15H200M1D300M").unwrap();
        assert_eq!(parsed, ops(&[(15, 'H'), (200, 'M'), (1, 'D'), (300, 'M')]));
    }

    #[test]
    fn test_parse_cigar_rejects_unsupported_operation() {
        assert_eq!(
            parse_cigar("10M5X"),
            Err(CigarError::UnsupportedOperation('X'))
        );
        assert_eq!(
            parse_cigar("10="),
            Err(CigarError::UnsupportedOperation('='))
        );
    }

    #[test]
    fn test_parse_cigar_rejects_malformed() {
        for bad in ["", "*", "M", "10", "10M5", "10M 5I", "0M", "99999999999M", "-5M"] {
            assert!(
                matches!(parse_cigar(bad), Err(CigarError::Malformed(_))),
                "expected '{bad}' to be malformed"
            );
        }
    }

    #[test]
    fn test_stringify_round_trip() {
        for cigar in ["10M5I10M", "5H10M5H", "3S20M500N7M2D1M", "1H"] {
            let parsed = parse_cigar(cigar).unwrap();
            assert_eq!(cigar_to_string(&parsed), cigar);
            assert_eq!(parse_cigar(&cigar_to_string(&parsed)).unwrap(), parsed);
        }
    }

    #[test]
    fn test_trim_hard_clips() {
        let parsed = parse_cigar("5H10M5H").unwrap();
        assert_eq!(trim_hard_clips(&parsed), ops(&[(10, 'M')]).as_slice());

        // Internal hard clips are left alone
        let parsed = parse_cigar("2H4M3H4M1H").unwrap();
        assert_eq!(
            trim_hard_clips(&parsed),
            ops(&[(4, 'M'), (3, 'H'), (4, 'M')]).as_slice()
        );

        let all_hard = parse_cigar("5H3H").unwrap();
        assert!(trim_hard_clips(&all_hard).is_empty());

        let no_hard = parse_cigar("4S10M2I").unwrap();
        assert_eq!(trim_hard_clips(&no_hard), no_hard.as_slice());
    }

    #[test]
    fn test_reference_span() {
        let parsed = parse_cigar("10M5I10M").unwrap();
        assert_eq!(reference_span(&parsed), 20);
        assert_eq!(alignment_columns(&parsed), 25);

        let parsed = parse_cigar("4S10M100N2D3I6M7H").unwrap();
        assert_eq!(reference_span(&parsed), 4 + 10 + 100 + 2 + 6);

        let parsed = parse_cigar("5H10M5H").unwrap();
        assert_eq!(reference_span(trim_hard_clips(&parsed)), 10);
        assert_eq!(reference_span(&[]), 0);
    }
}
