//! Selection of split reads: records carrying a supplementary alignment (SA)
//! tag, with both the primary and the supplementary alignment above the
//! mapping-quality thresholds.

use crate::alignment_record::DecodedAlignment;
use crate::cigar::{parse_cigar, CigarOp};
use crate::error::CandidateError;
use log::debug;

pub const DEFAULT_MIN_MAPQ: u8 = 50;

const SA_TAG_PREFIX: &str = "SA:Z:";

/// Thresholds and normalization applied by [`filter_record`].
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Minimum primary mapping quality (inclusive)
    pub min_mapq: u8,
    /// Minimum mapping quality of the supplementary alignment (inclusive)
    pub min_supplementary_mapq: u8,
    /// Also strip a leading `chr` from the supplementary chromosome
    pub strip_supplementary_chr: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_mapq: DEFAULT_MIN_MAPQ,
            min_supplementary_mapq: DEFAULT_MIN_MAPQ,
            strip_supplementary_chr: false,
        }
    }
}

/// The fields of an `SA:Z:` tag that are used downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplementaryAlignment {
    pub chromosome: String,
    pub position: u64,
    pub mapping_quality: u8,
}

/// A read whose alignment is split across two loci.
///
/// Ordering is by read name first, which keeps output deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitReadCandidate {
    pub name: String,
    pub primary_chromosome: String,
    pub primary_position: u64,
    pub cigar: Vec<CigarOp>,
    pub read_sequence: String,
    pub read_len: usize,
    pub supplementary_chromosome: String,
    pub supplementary_position: u64,
    pub supplementary_mapping_quality: u8,
}

/// Remove a leading `chr` so that `chr7` and `7` name the same reference file.
pub fn normalize_chromosome(name: &str) -> &str {
    name.strip_prefix("chr").unwrap_or(name)
}

/// Parse an `SA:Z:` tag value. When several supplementary segments are listed
/// (`;`-separated) the first one is used.
pub fn parse_sa_value(value: &str) -> Result<SupplementaryAlignment, CandidateError> {
    let malformed = || CandidateError::MalformedSupplementaryTag(value.to_string());

    let segment = value.split(';').next().unwrap_or(value);
    // chromosome, position, strand, cigar, mapq, edit distance
    let fields: Vec<&str> = segment.split(',').collect();
    if fields.len() < 5 || fields[0].is_empty() {
        return Err(malformed());
    }

    let position = fields[1].trim().parse::<u64>().map_err(|_| malformed())?;
    let mapping_quality = fields[4].trim().parse::<u8>().map_err(|_| malformed())?;

    Ok(SupplementaryAlignment {
        chromosome: fields[0].to_string(),
        position,
        mapping_quality,
    })
}

/// Locate the `SA:Z:` tag in a whitespace-delimited tag string.
fn find_sa_value(tags: &str) -> Option<&str> {
    tags.split_whitespace()
        .find_map(|tag| tag.strip_prefix(SA_TAG_PREFIX))
}

/// Decide whether `record` is a split-read candidate.
///
/// Returns `Ok(None)` for records that are merely uninteresting and an error
/// only when a record passes the quality gates but cannot be turned into a
/// candidate.
pub fn filter_record(
    record: &DecodedAlignment,
    config: &FilterConfig,
) -> Result<Option<SplitReadCandidate>, CandidateError> {
    if !record.tags.contains("SA:") {
        return Ok(None);
    }
    if record.mapping_quality < config.min_mapq {
        return Ok(None);
    }

    let Some(sa_value) = find_sa_value(&record.tags) else {
        debug!(
            "{}: tag string mentions SA: but has no {} tag",
            record.name, SA_TAG_PREFIX
        );
        return Ok(None);
    };
    let supplementary = parse_sa_value(sa_value)?;

    if supplementary.mapping_quality < config.min_supplementary_mapq {
        return Ok(None);
    }

    let cigar = parse_cigar(&record.cigar)?;
    let supplementary_chromosome = if config.strip_supplementary_chr {
        normalize_chromosome(&supplementary.chromosome).to_string()
    } else {
        supplementary.chromosome
    };

    Ok(Some(SplitReadCandidate {
        name: record.name.clone(),
        primary_chromosome: normalize_chromosome(&record.reference_name).to_string(),
        primary_position: record.position,
        cigar,
        read_sequence: record.sequence.clone(),
        read_len: record.sequence_len,
        supplementary_chromosome,
        supplementary_position: supplementary.position,
        supplementary_mapping_quality: supplementary.mapping_quality,
    }))
}
