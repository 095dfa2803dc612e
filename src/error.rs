use crate::cigar::CigarError;

/// Reasons a single candidate is rejected. None of these stop a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandidateError {
    #[error("malformed CIGAR string '{0}'")]
    MalformedCigar(String),

    #[error("CIGAR operation '{0}' is not supported")]
    UnsupportedCigarOperation(char),

    #[error("malformed SA tag '{0}'")]
    MalformedSupplementaryTag(String),

    #[error("reference window holds {actual} bases but the CIGAR spans {expected}")]
    ReferenceWindowSizeMismatch { expected: usize, actual: usize },

    #[error(
        "padded lengths are inconsistent for CIGAR {cigar}: expected {expected} columns, \
         padded reference {reference_padded}, padded read {read_padded}, \
         reference consumed {reference_consumed}/{reference_len}, \
         read consumed {read_consumed}/{read_len}"
    )]
    PaddingLengthMismatch {
        cigar: String,
        expected: usize,
        reference_padded: usize,
        read_padded: usize,
        reference_consumed: usize,
        reference_len: usize,
        read_consumed: usize,
        read_len: usize,
    },

    #[error("malformed record block: {0}")]
    MalformedRecordBlock(String),
}

impl From<CigarError> for CandidateError {
    fn from(err: CigarError) -> Self {
        match err {
            CigarError::Malformed(cigar) => CandidateError::MalformedCigar(cigar),
            CigarError::UnsupportedOperation(op) => CandidateError::UnsupportedCigarOperation(op),
        }
    }
}

/// A candidate that was dropped, with enough context to triage it by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub name: String,
    pub error: CandidateError,
}
