//! End-to-end extraction through the library: SAM input decoded by htslib,
//! flat reference directory, record file written and padded back.

use splitpad::bam_input::AlignmentReader;
use splitpad::pipeline::{extract, pad_records, padded_tsv_line};
use splitpad::record_codec::open_records;
use splitpad::reference::{FlatReferenceStore, DEFAULT_REFERENCE_SUFFIX};
use splitpad::split_read::FilterConfig;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;

const CHR7: &str = "ACGTAAGGCCTTGGAACCTTGGAACCTTGGAACCTTGGAA";

fn write_sam(path: &Path) {
    let lines = [
        "@HD\tVN:1.6\tSO:unsorted",
        "@SQ\tSN:chr7\tLN:40",
        "@SQ\tSN:chr12\tLN:40",
        "readB\t0\tchr7\t5\t60\t2M1I2M\t*\t0\t0\tAAGGC\t*\tNM:i:1\tSA:Z:chr12,10,+,3S2M,60,0;",
        "readA\t0\tchr7\t1\t60\t2H4M\t*\t0\t0\tACGT\t*\tSA:Z:chr12,20,-,4M2S,55,1;",
        "lowmapq\t0\tchr7\t1\t20\t4M\t*\t0\t0\tACGT\t*\tSA:Z:chr12,20,-,4M,60,0;",
        "nosa\t0\tchr7\t1\t60\t4M\t*\t0\t0\tACGT\t*\tNM:i:0",
        "unmapped\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t*",
    ];
    let mut file = File::create(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

fn write_flat_reference(dir: &Path) {
    fs::write(dir.join(format!("7{DEFAULT_REFERENCE_SUFFIX}")), CHR7).unwrap();
}

#[test]
fn test_sam_decoding_skips_unmapped_records() {
    let temp = TempDir::new().unwrap();
    let sam = temp.path().join("reads.sam");
    write_sam(&sam);

    let records: Vec<_> = AlignmentReader::from_path(sam.to_str().unwrap())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["readB", "readA", "lowmapq", "nosa"]);

    let read_b = &records[0];
    assert_eq!(read_b.reference_name, "chr7");
    assert_eq!(read_b.position, 5);
    assert_eq!(read_b.mapping_quality, 60);
    assert_eq!(read_b.cigar, "2M1I2M");
    assert_eq!(read_b.sequence, "AAGGC");
    assert_eq!(read_b.sequence_len, 5);
    assert!(read_b.tags.contains("SA:Z:chr12,10,+,3S2M,60,0;"));
    assert!(read_b.tags.contains("NM:i:1"));
}

#[test]
fn test_extract_then_pad() {
    let temp = TempDir::new().unwrap();
    let sam = temp.path().join("reads.sam");
    write_sam(&sam);
    let reference_dir = temp.path().join("reference");
    fs::create_dir(&reference_dir).unwrap();
    write_flat_reference(&reference_dir);

    let output = temp.path().join("records.txt");
    let records = AlignmentReader::from_path(sam.to_str().unwrap()).unwrap();
    let mut store = FlatReferenceStore::new(&reference_dir, DEFAULT_REFERENCE_SUFFIX);
    let mut writer = BufWriter::new(File::create(&output).unwrap());
    let abort = AtomicBool::new(false);

    let report = extract(
        records,
        &mut store,
        &mut writer,
        &FilterConfig::default(),
        &abort,
    )
    .unwrap();
    drop(writer);

    assert_eq!(report.examined, 4);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.written, 2);
    assert!(report.rejected.is_empty());
    assert!(!report.aborted);

    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(
        text,
        "readA\n7:1\n4\n2H4M\nACGT\nACGT\n>\n\
         readB\n7:5\n5\n2M1I2M\nAAGGC\nAAGG\n>\n"
    );

    let reader = open_records(output.to_str().unwrap(), NonZeroUsize::MIN).unwrap();
    let (padded, pad_report) = pad_records(reader).unwrap();
    assert_eq!(pad_report.blocks, 2);
    assert!(pad_report.rejected.is_empty());

    let lines: Vec<String> = padded.iter().map(padded_tsv_line).collect();
    assert_eq!(
        lines,
        vec![
            "readA\t7:1\tACGT\tACGT\t0+4\t0+4",
            "readB\t7:5\tAA GG\tAAGGC\t0+2,3+2\t0+5",
        ]
    );
}

#[test]
fn test_missing_chromosome_file_ends_the_run() {
    let temp = TempDir::new().unwrap();
    let sam = temp.path().join("reads.sam");
    write_sam(&sam);
    let reference_dir = temp.path().join("empty");
    fs::create_dir(&reference_dir).unwrap();

    let records = AlignmentReader::from_path(sam.to_str().unwrap()).unwrap();
    let mut store = FlatReferenceStore::new(&reference_dir, DEFAULT_REFERENCE_SUFFIX);
    let mut out = Vec::new();
    let abort = AtomicBool::new(false);

    let result = extract(records, &mut store, &mut out, &FilterConfig::default(), &abort);
    assert!(result.is_err());
    assert!(out.is_empty());
}
