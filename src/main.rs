//! cristae CLI: batch segmentation and interactive cristae counting.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use cristae_lib::commands::{self, AnalyzeRequest, PrepareRequest};
use cristae_lib::pipeline::batch::BatchStatusEvent;
use cristae_lib::pipeline::segmentation::ExternalCommandClient;
use cristae_lib::pipeline::session::{LogOutput, TerminalInput};
use cristae_lib::pipeline_config::Settings;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "cristae")]
#[command(about = "Measure cristae density in electron micrographs of mitochondria")]
#[command(version)]
struct Cli {
    /// Settings file (JSON). Defaults to the per-user settings file if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop, segment and checkpoint every region of a catalog.
    Prepare(PrepareArgs),

    /// Count cristae interactively over prepared regions.
    Analyze(AnalyzeArgs),

    /// Copy the results table to another location.
    Export {
        /// Output root used by `prepare`.
        #[arg(long)]
        out: PathBuf,

        /// Destination CSV file.
        #[arg(long)]
        dest: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct PrepareArgs {
    /// Source micrograph.
    #[arg(long)]
    image: PathBuf,

    /// Region catalog (JSON).
    #[arg(long)]
    catalog: PathBuf,

    /// Trained pixel-classification model.
    #[arg(long)]
    model: PathBuf,

    /// Output root for artifacts and results.
    #[arg(long)]
    out: PathBuf,

    /// Context margin around each region, in pixels.
    #[arg(long)]
    padding: Option<u32>,

    /// Attempts per region before it is marked failed.
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct AnalyzeArgs {
    /// Output root used by `prepare`.
    #[arg(long)]
    out: PathBuf,

    /// Peak threshold on the 8-bit scale (0-255).
    #[arg(long)]
    threshold: Option<f64>,

    /// Minimum peak width in samples.
    #[arg(long)]
    min_width: Option<usize>,

    /// Minimum gap between peaks in samples.
    #[arg(long)]
    min_distance: Option<usize>,

    /// Catalog position to start at (0-based).
    #[arg(long)]
    start: Option<usize>,
}

fn main() -> ExitCode {
    cristae_lib::init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let settings = Settings::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Prepare(args) => run_prepare(settings, args),
        Commands::Analyze(args) => run_analyze(settings, args),
        Commands::Export { out, dest } => {
            let rows = commands::export(&out, &dest)?;
            println!("exported {rows} rows to {}", dest.display());
            Ok(())
        }
    }
}

fn run_prepare(settings: Settings, args: PrepareArgs) -> CliResult<()> {
    let mut config = settings.prepare;
    if let Some(padding) = args.padding {
        config.padding = padding;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }

    let request = PrepareRequest {
        source_image: args.image,
        catalog: args.catalog,
        model: args.model,
        output_root: args.out,
    };
    let mut client = ExternalCommandClient::new(settings.segmenter)?;
    let progress = |event: BatchStatusEvent| match &event {
        BatchStatusEvent::RegionFinished {
            outcome,
            estimate: Some(estimate),
        } => eprintln!(
            "[{}] {} done, ~{:.0}s remaining",
            outcome.index + 1,
            outcome.name,
            estimate.remaining_secs
        ),
        BatchStatusEvent::ComputeWaiting { name, elapsed_ms, .. } => {
            eprintln!("{name}: still computing ({:.0}s)", *elapsed_ms as f64 / 1000.0)
        }
        _ => {}
    };

    let report = commands::prepare(&request, &mut client, &config, Some(&progress))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_analyze(settings: Settings, args: AnalyzeArgs) -> CliResult<()> {
    let mut config = settings.analysis;
    if let Some(threshold) = args.threshold {
        config.peaks.threshold = threshold;
    }
    if let Some(min_width) = args.min_width {
        config.peaks.min_width = min_width;
    }
    if let Some(min_distance) = args.min_distance {
        config.peaks.min_distance = min_distance;
    }

    let request = AnalyzeRequest {
        output_root: args.out,
        start_index: args.start,
    };
    let stdin = std::io::stdin();
    let mut input = TerminalInput::new(stdin.lock(), std::io::stdout());
    let mut output = LogOutput;

    let summary = commands::analyze(&request, &config, &mut input, &mut output)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
