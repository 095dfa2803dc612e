// lib.rs
pub mod alignment_record;
pub mod bam_input;
pub mod cigar;
pub mod error;
pub mod faidx;
pub mod padding;
pub mod pipeline;
pub mod prepare;
pub mod record_codec;
pub mod reference;
pub mod split_read;
pub mod stats;
