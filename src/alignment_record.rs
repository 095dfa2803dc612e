/// An alignment record as handed over by the decoding layer.
///
/// ## Field interpretation:
/// - `position`: 1-based leftmost reference position
/// - `tags`: whitespace-delimited SAM-style tags, e.g. `NM:i:0 SA:Z:chr3,500,+,20M,60,0;`
/// - `cigar`: CIGAR in string form, `*` when absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAlignment {
    pub name: String,
    pub reference_name: String,
    pub position: u64,
    pub mapping_quality: u8,
    pub cigar: String,
    pub tags: String,
    pub sequence: String,
    pub sequence_len: usize,
}

/// Alignment file format types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlignmentFormat {
    Bam,
    Sam,
    Cram,
}

impl AlignmentFormat {
    /// Detect format from file extension
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with(".bam") {
            Some(AlignmentFormat::Bam)
        } else if path.ends_with(".sam") || path.ends_with(".sam.gz") {
            Some(AlignmentFormat::Sam)
        } else if path.ends_with(".cram") {
            Some(AlignmentFormat::Cram)
        } else {
            None
        }
    }
}
