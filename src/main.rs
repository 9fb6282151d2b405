use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use promer::alphabet::{Alphabet, DigitalSequence};
use promer::build::Builder;
use promer::io::{press, HmmFile, HmmPressedFile};
use promer::report::TableFormat;
use promer::results::tophits::Thresholds;
use promer::search::pipeline::{Pipeline, PipelineConfig, PipelineQuery};
use promer::search::{LongTargetsConfig, LongTargetsPipeline};

#[derive(Parser)]
#[command(name = "promer")]
#[command(version)]
#[command(about = "Profile HMM searches against sequence databases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search profile(s) against a sequence database
    Search(SearchArgs),

    /// Scan one sequence against a pressed profile database
    Scan(ScanArgs),

    /// Press a text HMM file into the binary database format
    Press(PressArgs),

    /// Iteratively refine a model from a seed sequence
    Iterate(IterateArgs),

    /// Windowed search of long nucleotide targets
    Nsearch(NsearchArgs),
}

#[derive(Args)]
struct CommonReport {
    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Table format: targets, domains, or pfam
    #[arg(long, default_value = "targets")]
    format: String,

    /// Report hits with E-value at or below this
    #[arg(short = 'E', long, default_value_t = 10.0)]
    evalue: f64,

    /// Report hits with bit score at or above this (overrides -E)
    #[arg(short = 'T', long)]
    score: Option<f32>,

    /// Use the models' gathering/trusted/noise cutoffs
    #[arg(long)]
    cut: Option<String>,

    /// Override the search-space size
    #[arg(short = 'Z', long)]
    z: Option<f64>,

    /// Worker chunk size for parallel search (0 = serial)
    #[arg(long, default_value_t = 64)]
    chunk: usize,
}

#[derive(Args)]
struct SearchArgs {
    /// Query model file (text HMM format)
    hmmfile: PathBuf,
    /// Target sequence database (FASTA)
    seqdb: PathBuf,
    #[command(flatten)]
    report: CommonReport,
}

#[derive(Args)]
struct ScanArgs {
    /// Pressed model database stem
    hmmdb: PathBuf,
    /// Query sequences (FASTA)
    seqfile: PathBuf,
    #[command(flatten)]
    report: CommonReport,
}

#[derive(Args)]
struct PressArgs {
    /// Text HMM file to press
    hmmfile: PathBuf,
}

#[derive(Args)]
struct IterateArgs {
    /// Seed sequence (FASTA, first record)
    query: PathBuf,
    /// Target sequence database (FASTA)
    seqdb: PathBuf,
    /// Maximum number of rounds
    #[arg(short = 'N', long, default_value_t = 5)]
    max_iterations: usize,
    #[command(flatten)]
    report: CommonReport,
}

#[derive(Args)]
struct NsearchArgs {
    /// Query model file (text HMM format)
    hmmfile: PathBuf,
    /// Target nucleotide database (FASTA)
    seqdb: PathBuf,
    /// Strand to search: watson, crick, or both
    #[arg(long, default_value = "both")]
    strand: String,
    /// Window block length
    #[arg(long, default_value_t = 262_144)]
    block_length: usize,
    #[command(flatten)]
    report: CommonReport,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Search(args) => run_search(args),
        Commands::Scan(args) => run_scan(args),
        Commands::Press(args) => run_press(args),
        Commands::Iterate(args) => run_iterate(args),
        Commands::Nsearch(args) => run_nsearch(args),
    }
}

fn read_fasta(path: &PathBuf, alphabet: Alphabet) -> Result<Vec<DigitalSequence>> {
    let reader = bio::io::fasta::Reader::from_file(path)
        .with_context(|| format!("cannot open '{}'", path.display()))?;
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed FASTA record")?;
        let text = promer::TextSequence {
            name: record.id().to_string(),
            accession: None,
            description: record.desc().map(str::to_string),
            sequence: String::from_utf8_lossy(record.seq()).to_string(),
        };
        out.push(text.digitize(alphabet)?);
    }
    Ok(out)
}

fn pipeline_config(report: &CommonReport) -> Result<PipelineConfig> {
    let mut thresholds = Thresholds {
        e: report.evalue,
        t: report.score,
        ..Thresholds::default()
    };
    if let Some(cut) = &report.cut {
        thresholds.bit_cutoffs = Some(FromStr::from_str(cut)?);
    }
    Ok(PipelineConfig { thresholds, z: report.z, ..PipelineConfig::default() })
}

fn write_report(hits: &promer::TopHits, report: &CommonReport) -> Result<()> {
    let format = TableFormat::from_str(&report.format)?;
    match &report.output {
        Some(path) => {
            let mut out = BufWriter::new(
                File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?,
            );
            hits.write(&mut out, format, true)?;
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            hits.write(&mut out, format, true)?;
        }
    }
    Ok(())
}

fn progress(len: u64, what: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .expect("static template")
            .progress_chars("=> "),
    );
    bar.set_message(what.to_string());
    bar
}

fn run_search(args: SearchArgs) -> Result<()> {
    let mut hmms = HmmFile::open(&args.hmmfile)
        .with_context(|| format!("cannot open '{}'", args.hmmfile.display()))?;
    let first = match hmms.read_next()? {
        Some(hmm) => hmm,
        None => bail!("'{}' contains no models", args.hmmfile.display()),
    };
    let alphabet = first.alphabet;
    let targets = read_fasta(&args.seqdb, alphabet)?;
    eprintln!("read {} target sequences", targets.len());

    let config = pipeline_config(&args.report)?;
    let mut pipeline = Pipeline::new(alphabet, config)?;

    let mut all: Vec<promer::TopHits> = Vec::new();
    let bar = progress(0, "searching");
    let mut current = Some(first);
    loop {
        let hmm = match current.take() {
            Some(h) => h,
            None => match hmms.read_next()? {
                Some(h) => h,
                None => break,
            },
        };
        let hits = if args.report.chunk > 0 && targets.len() > args.report.chunk {
            pipeline.search_hmm_parallel(PipelineQuery::Hmm(&hmm), &targets, args.report.chunk)?
        } else {
            pipeline.search_hmm(PipelineQuery::Hmm(&hmm), &targets)?
        };
        bar.inc_length(1);
        bar.inc(1);
        all.push(hits);
        pipeline.clear();
    }
    bar.finish_and_clear();
    hmms.close();

    let format = TableFormat::from_str(&args.report.format)?;
    match &args.report.output {
        Some(path) => {
            let mut out = BufWriter::new(
                File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?,
            );
            for (i, hits) in all.iter().enumerate() {
                hits.write(&mut out, format, i == 0)?;
            }
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for (i, hits) in all.iter().enumerate() {
                hits.write(&mut out, format, i == 0)?;
            }
        }
    }
    Ok(())
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let mut db = HmmPressedFile::open(&args.hmmdb)
        .with_context(|| format!("cannot open pressed database '{}'", args.hmmdb.display()))?;
    let first_model = db
        .read_next()?
        .context("pressed database is empty")?;
    let alphabet = first_model.profile.alphabet;
    db.rewind()?;
    let queries = read_fasta(&args.seqfile, alphabet)?;

    let config = pipeline_config(&args.report)?;
    let mut pipeline = Pipeline::new(alphabet, config)?;

    let bar = progress(queries.len() as u64, "scanning");
    let mut all = Vec::with_capacity(queries.len());
    for query in &queries {
        db.rewind()?;
        let models: Vec<_> = (&mut db).collect();
        all.push(pipeline.scan_seq(query, models)?);
        pipeline.clear();
        bar.inc(1);
    }
    bar.finish_and_clear();

    let format = TableFormat::from_str(&args.report.format)?;
    match &args.report.output {
        Some(path) => {
            let mut out = BufWriter::new(
                File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?,
            );
            for (i, hits) in all.iter().enumerate() {
                hits.write(&mut out, format, i == 0)?;
            }
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for (i, hits) in all.iter().enumerate() {
                hits.write(&mut out, format, i == 0)?;
            }
        }
    }
    Ok(())
}

fn run_press(args: PressArgs) -> Result<()> {
    let hmms = HmmFile::open(&args.hmmfile)
        .with_context(|| format!("cannot open '{}'", args.hmmfile.display()))?;
    let mut models = Vec::new();
    for hmm in hmms {
        models.push(hmm?);
    }
    let n = press(models.iter(), &args.hmmfile)?;
    eprintln!("pressed {n} model(s) into {}.h3{{m,f,i,p}}", args.hmmfile.display());
    Ok(())
}

fn run_iterate(args: IterateArgs) -> Result<()> {
    // Alphabet comes from the seed; amino unless it digitizes as DNA.
    let seed = {
        let amino = read_fasta(&args.query, Alphabet::Amino);
        match amino {
            Ok(seqs) => seqs,
            Err(_) => read_fasta(&args.query, Alphabet::Dna)?,
        }
    };
    let seed = seed.into_iter().next().context("empty query file")?;
    let alphabet = seed.alphabet;
    let targets = read_fasta(&args.seqdb, alphabet)?;

    let config = pipeline_config(&args.report)?;
    let mut pipeline = Pipeline::new(alphabet, config)?;
    let mut builder = Builder::new(alphabet)?;
    let search = pipeline.iterate_seq(&mut builder, &seed, &targets)?;

    let mut last = None;
    for (round, result) in search.enumerate() {
        let result = result?;
        eprintln!(
            "round {}: {} hits included{}",
            result.iteration,
            result.hits.included_len(),
            if result.converged { " (converged)" } else { "" }
        );
        let done = result.converged;
        last = Some(result);
        if done || round + 1 >= args.max_iterations {
            break;
        }
    }
    if let Some(result) = last {
        write_report(&result.hits, &args.report)?;
    }
    Ok(())
}

fn run_nsearch(args: NsearchArgs) -> Result<()> {
    let mut hmms = HmmFile::open(&args.hmmfile)?;
    let hmm = hmms.read_next()?.context("no models in query file")?;
    if hmm.alphabet == Alphabet::Amino {
        bail!("nsearch requires a nucleotide model");
    }
    let targets = read_fasta(&args.seqdb, hmm.alphabet)?;

    let config = pipeline_config(&args.report)?;
    let pipeline = Pipeline::new(hmm.alphabet, config)?;
    let lt_config = LongTargetsConfig {
        block_length: args.block_length,
        strand: FromStr::from_str(&args.strand)?,
        ..LongTargetsConfig::default()
    };
    let mut lt = LongTargetsPipeline::new(pipeline, lt_config)?;
    let hits = lt.search_hmm(PipelineQuery::Hmm(&hmm), &targets)?;
    write_report(&hits, &args.report)?;
    Ok(())
}
