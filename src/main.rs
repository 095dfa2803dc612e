use clap::Parser;
use log::{error, info, warn};
use rayon::ThreadPoolBuilder;
use splitpad::bam_input::AlignmentReader;
use splitpad::error::Rejection;
use splitpad::pipeline::{self, padded_tsv_line};
use splitpad::prepare::prepare_reference;
use splitpad::record_codec::open_records;
use splitpad::reference::{UnifiedReferenceStore, DEFAULT_REFERENCE_SUFFIX};
use splitpad::split_read::{FilterConfig, DEFAULT_MIN_MAPQ};
use splitpad::stats::count_partners;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Raised by SIGINT; extraction stops before the next block.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

fn install_interrupt_handler() {
    let handler = on_interrupt as extern "C" fn(libc::c_int);
    // Only an atomic store happens inside the handler
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        warn!("Could not install the SIGINT handler; Ctrl-C will end the run without a clean stop");
    }
}

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = default_threads())]
    num_threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Split-read selection thresholds
#[derive(Parser, Debug)]
struct FilterOpts {
    /// Minimum mapping quality of the primary alignment
    #[clap(long, value_parser, default_value_t = DEFAULT_MIN_MAPQ)]
    min_mapq: u8,

    /// Minimum mapping quality of the supplementary alignment (SA tag)
    #[clap(long, value_parser, default_value_t = DEFAULT_MIN_MAPQ)]
    min_supplementary_mapq: u8,

    /// Also strip a leading `chr` from the supplementary chromosome
    #[clap(long, action)]
    strip_supplementary_chr: bool,
}

impl From<&FilterOpts> for FilterConfig {
    fn from(opts: &FilterOpts) -> Self {
        FilterConfig {
            min_mapq: opts.min_mapq,
            min_supplementary_mapq: opts.min_supplementary_mapq,
            strip_supplementary_chr: opts.strip_supplementary_chr,
        }
    }
}

/// Extract and inspect split-read evidence for candidate gene fusions.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Select split reads and write them with their reference windows
    Extract {
        #[clap(flatten)]
        common: CommonOpts,

        #[clap(flatten)]
        filter: FilterOpts,

        /// Path to the BAM/SAM/CRAM file
        #[clap(short = 'a', long, value_parser)]
        alignments: String,

        /// Directory of per-chromosome flat files, or one or more FASTA files
        #[clap(short = 'r', long, value_parser, num_args = 1.., required = true)]
        reference: Vec<String>,

        /// File name suffix of the flat reference files
        #[clap(long, value_parser, default_value = DEFAULT_REFERENCE_SUFFIX)]
        reference_suffix: String,

        /// Path of the record file to write
        #[clap(short = 'o', long, value_parser)]
        output: String,
    },
    /// Pad the records of a record file for display
    Pad {
        #[clap(flatten)]
        common: CommonOpts,

        /// Path to the record file (plain or BGZF-compressed)
        #[clap(short = 'i', long, value_parser)]
        records: String,
    },
    /// Convert FASTA files into per-chromosome flat reference files
    PrepareReference {
        #[clap(flatten)]
        common: CommonOpts,

        /// FASTA files to convert
        #[clap(short = 'f', long, value_parser, num_args = 1.., required = true)]
        fasta: Vec<String>,

        /// Directory receiving the flat files
        #[clap(short = 'o', long, value_parser)]
        output_dir: String,

        /// File name suffix of the flat reference files
        #[clap(long, value_parser, default_value = DEFAULT_REFERENCE_SUFFIX)]
        reference_suffix: String,
    },
    /// Print split-read statistics per fusion partner pair
    Stats {
        #[clap(flatten)]
        common: CommonOpts,

        #[clap(flatten)]
        filter: FilterOpts,

        /// Path to the BAM/SAM/CRAM file
        #[clap(short = 'a', long, value_parser)]
        alignments: String,
    },
}

fn default_threads() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Extract {
            common,
            filter,
            alignments,
            reference,
            reference_suffix,
            output,
        } => {
            initialize(&common)?;

            let records = AlignmentReader::from_path(&alignments)?;
            let mut store = UnifiedReferenceStore::from_paths(&reference, &reference_suffix)?;
            let mut writer = BufWriter::new(File::create(&output)?);
            install_interrupt_handler();

            let report = pipeline::extract(
                records,
                &mut store,
                &mut writer,
                &FilterConfig::from(&filter),
                &INTERRUPTED,
            )?;

            info!(
                "Examined {} records: {} candidates, {} written to {}, {} rejected",
                report.examined,
                report.candidates,
                report.written,
                output,
                report.rejected.len()
            );
            report_rejections(&report.rejected, report.examined);

            if report.aborted {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    format!("Interrupted after writing {} blocks to {output}", report.written),
                ));
            }
        }
        Args::Pad { common, records } => {
            initialize(&common)?;

            let reader = open_records(&records, common.num_threads)?;
            let (padded, report) = pipeline::pad_records(reader)?;

            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            for padded_record in &padded {
                writeln!(out, "{}", padded_tsv_line(padded_record))?;
            }
            out.flush()?;

            report_rejections(&report.rejected, report.blocks);
        }
        Args::PrepareReference {
            common,
            fasta,
            output_dir,
            reference_suffix,
        } => {
            initialize(&common)?;

            let written = prepare_reference(&fasta, Path::new(&output_dir), &reference_suffix)?;
            info!("Wrote {} reference files to {}", written.len(), output_dir);
        }
        Args::Stats {
            common,
            filter,
            alignments,
        } => {
            initialize(&common)?;

            let records = AlignmentReader::from_path(&alignments)?;
            let mut examined = 0;
            let mut rejected = Vec::new();
            let candidates = pipeline::collect_candidates(
                records,
                &FilterConfig::from(&filter),
                &mut examined,
                &mut rejected,
            )?;

            print_stats(examined, candidates.len(), rejected.len(), &candidates);
        }
    }

    Ok(())
}

/// Initialize logging and the thread pool based on common options
fn initialize(common: &CommonOpts) -> io::Result<()> {
    // Initialize logger based on verbosity
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    // Configure thread pool
    ThreadPoolBuilder::new()
        .num_threads(common.num_threads.into())
        .build_global()
        .map_err(|e| io::Error::other(format!("Failed to build thread pool: {e}")))
}

/// Rejections are shown at every verbosity level.
fn report_rejections(rejected: &[Rejection], total: usize) {
    if rejected.is_empty() {
        return;
    }
    error!("Rejected {} of {} records:", rejected.len(), total);
    for rejection in rejected {
        error!("  {}: {}", rejection.name, rejection.error);
    }
}

fn print_stats(
    examined: usize,
    num_candidates: usize,
    num_rejected: usize,
    candidates: &[splitpad::split_read::SplitReadCandidate],
) {
    println!("Records examined: {}", examined);
    println!("Split-read candidates: {}", num_candidates);
    println!("Rejected records: {}", num_rejected);

    let partners = count_partners(candidates);
    if !partners.is_empty() {
        println!("\nFusion partners:");
        for partner in partners {
            println!(
                "{}\t{}\t{}",
                partner.primary_chromosome, partner.supplementary_chromosome, partner.candidates
            );
        }
    }
}
