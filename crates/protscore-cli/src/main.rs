//! protscore
//!
//! Command-line host for protein scoring plugins. Loads a plugin from a YAML
//! configuration, scores sequences given on the command line, in a FASTA file
//! or on stdin, and prints one score record per sequence.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use protscore_app::{
    AppConfig, AppLoaderPlugin, ConfiguredAppLoader, ScoringApp, TransformerBackend,
};
use protscore_core::{Score, SequenceInput};
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use tracing::info;

mod fasta;

use fasta::Record;

/// Example inputs bundled with the demo command
const DEMO_SEQUENCES: [&str; 2] = [
    "MKTVRQERLKSIVRILERSKEPVSGAQLAEELSVSRQVIVQDIAYLRSLGYNIVATPRGYVLAGG",
    "KALTARQQEVFDLIRDHISQTGMPPTRAEIAQRLGFRSPNAAEEHLKALARKGVIEIVSGASRGIRLLQEE",
];

#[derive(Parser, Debug)]
#[command(name = "protscore")]
#[command(about = "Score protein sequences with a transformer-backed plugin", long_about = None)]
struct Cli {
    /// Plugin configuration file
    #[arg(short, long, default_value = "protscore.yaml", env = "PROTSCORE_CONFIG", global = true)]
    config: PathBuf,

    /// Compute target (cpu, cuda, cuda:N, metal); overrides the configuration
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score sequences
    Score(ScoreArgs),

    /// Print the score names the configured plugin produces
    Names,

    /// List the built-in transformer backends
    Backends,

    /// Score the bundled example sequences
    Demo {
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Sequences to score
    sequences: Vec<String>,

    /// Read sequences from a FASTA file
    #[arg(long)]
    fasta: Option<PathBuf>,

    /// Read FASTA from stdin
    #[arg(long, conflicts_with = "fasta")]
    stdin: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Tsv,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match &cli.command {
        Command::Score(args) => {
            let records = collect_records(args)?;
            run_scoring(&cli, records, args.format)
        }
        Command::Names => {
            let config = load_config(&cli)?;
            for name in config.score_names()?.as_slice() {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Backends => {
            for backend in TransformerBackend::ALL {
                println!("{}\t{}", backend, backend.repo_id());
            }
            Ok(())
        }
        Command::Demo { format } => {
            let records = DEMO_SEQUENCES
                .iter()
                .enumerate()
                .map(|(idx, seq)| Record {
                    id: format!("example_{}", idx + 1),
                    sequence: seq.to_string(),
                })
                .collect();
            run_scoring(&cli, records, *format)
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    AppConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))
}

fn collect_records(args: &ScoreArgs) -> Result<Vec<Record>> {
    let mut records: Vec<Record> = args
        .sequences
        .iter()
        .enumerate()
        .map(|(idx, seq)| Record {
            id: format!("seq{}", idx + 1),
            sequence: seq.clone(),
        })
        .collect();

    if let Some(path) = &args.fasta {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        records.extend(fasta::read_records(BufReader::new(file))?);
    }

    if args.stdin {
        records.extend(fasta::read_records(io::stdin().lock())?);
    }

    if records.is_empty() {
        bail!("No sequences given (pass sequences, --fasta FILE or --stdin)");
    }

    Ok(records)
}

fn run_scoring(cli: &Cli, records: Vec<Record>, format: OutputFormat) -> Result<()> {
    let config = load_config(cli)?;
    let device = cli
        .device
        .clone()
        .unwrap_or_else(|| config.device.to_string());

    let loader = ConfiguredAppLoader::new(config);
    info!("Loading plugin: {}", loader.describe());
    let app = loader.load_app(&device)?;
    info!("Plugin ready on {}", device);

    let input: SequenceInput = records.iter().map(|r| r.sequence.clone()).collect();
    let scores = app.compute_scores(input)?;
    info!("Scored {} sequences", scores.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Json => write_json(&mut out, &records, &scores)?,
        OutputFormat::Tsv => write_tsv(&mut out, app.as_ref(), &records, &scores)?,
    }
    out.flush()?;

    Ok(())
}

fn write_json(out: &mut impl Write, records: &[Record], scores: &[Score]) -> Result<()> {
    let rows: Vec<serde_json::Value> = records
        .iter()
        .zip(scores)
        .map(|(record, score)| serde_json::json!({ "id": record.id, "scores": score }))
        .collect();
    serde_json::to_writer_pretty(&mut *out, &rows)?;
    writeln!(out)?;
    Ok(())
}

fn write_tsv(
    out: &mut impl Write,
    app: &dyn ScoringApp,
    records: &[Record],
    scores: &[Score],
) -> Result<()> {
    writeln!(out, "id\t{}", app.score_names().as_slice().join("\t"))?;
    for (record, score) in records.iter().zip(scores) {
        let values: Vec<String> = score.values().iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}\t{}", record.id, values.join("\t"))?;
    }
    Ok(())
}

/// Initialize tracing/logging on stderr
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("protscore=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("protscore=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}
