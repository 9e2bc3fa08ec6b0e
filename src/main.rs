use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use measure_uncertainty::genomics::{
    io::{load_read_set, load_reference, resolve_intervals},
    parse_uncertainty, write_uncertainty, write_uncertainty_file, Category, MeasureUncertainty,
    DEFAULT_WINDOW_LEN,
};
use measure_uncertainty::TraversalConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "measure-uncertainty",
    about = "Per-position read category counts for alignment uncertainty evaluation"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count matches, mismatches and indels per reference position.
    Measure {
        /// Reference genome (FASTA; a missing `.fai` index is built alongside).
        #[arg(short = 'R', long)]
        reference: PathBuf,
        /// Alignments (BAM or CRAM); repeatable.
        #[arg(short = 'I', long = "input", required = true)]
        alignments: Vec<PathBuf>,
        /// Output `.uncertainty` file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Restrict to `chr`, `chr:start-end` (1-based, inclusive) or an intervals file
        /// (`.bed`, Picard interval list, or one region per line); repeatable.
        #[arg(short = 'L', long = "intervals")]
        intervals: Vec<String>,
        /// Loci folded per block before merging.
        #[arg(long, default_value_t = measure_uncertainty::framework::DEFAULT_LOCI_PER_BLOCK)]
        block_size: usize,
        /// Reference positions piled up at a time.
        #[arg(long, default_value_t = DEFAULT_WINDOW_LEN)]
        window_size: u32,
        /// Worker threads (default: all cores).
        #[arg(short = 't', long)]
        threads: Option<usize>,
        /// Evaluate on the current thread only.
        #[arg(long)]
        serial: bool,
        /// Drop reads with lower mapping quality.
        #[arg(long, default_value_t = 0)]
        min_mapq: u8,
    },
    /// Print per-category totals of an uncertainty file.
    Summarize {
        /// Uncertainty file produced by `measure`.
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Measure {
            reference,
            alignments,
            output,
            intervals,
            block_size,
            window_size,
            threads,
            serial,
            min_mapq,
        } => run_measure(MeasureArgs {
            reference,
            alignments,
            output,
            intervals,
            block_size,
            window_size,
            threads,
            serial,
            min_mapq,
        })?,
        Commands::Summarize { input } => run_summarize(&input)?,
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

struct MeasureArgs {
    reference: PathBuf,
    alignments: Vec<PathBuf>,
    output: Option<PathBuf>,
    intervals: Vec<String>,
    block_size: usize,
    window_size: u32,
    threads: Option<usize>,
    serial: bool,
    min_mapq: u8,
}

fn run_measure(args: MeasureArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build_global()
            .context("failed to configure worker threads")?;
    }

    let reference = load_reference(&args.reference)?;
    info!(
        sequences = reference.len(),
        path = %args.reference.display(),
        "reference loaded"
    );

    let regions = resolve_intervals(&args.intervals, &reference)?;

    let read_sets = args
        .alignments
        .iter()
        .map(|path| load_read_set(path, &args.reference))
        .collect::<Result<Vec<_>>>()?;

    let config = TraversalConfig::with_block_size(args.block_size)
        .context("invalid block size")?
        .with_parallel(!args.serial);

    let run = MeasureUncertainty::new(reference, config)
        .with_min_mapq(args.min_mapq)
        .with_regions(regions)
        .with_window_size(args.window_size)
        .measure(&read_sets)
        .context("uncertainty measurement failed")?;

    if run.report.skipped_observations > 0 {
        warn!(
            skipped = run.report.skipped_observations,
            "observations with unrecognized bases were skipped"
        );
    }
    if run.report.reference_gaps > 0 {
        warn!(
            loci = run.report.reference_gaps,
            "loci without a reference base were excluded"
        );
    }

    match &args.output {
        Some(path) => write_uncertainty_file(path, &run.table)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let stdout = io::stdout();
            write_uncertainty(&mut stdout.lock(), &run.table)?;
        }
    }

    Ok(())
}

fn run_summarize(path: &Path) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let table = parse_uncertainty(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let totals = table.totals();
    println!("positions\t{}", table.len());
    for category in Category::ALL {
        println!("{}\t{}", category, totals.get(category));
    }
    println!("discordant\t{}", totals.discordant());

    Ok(())
}
