use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lessonmap::io::{format_timestamp, write_json};
use lessonmap::llm::CompletionService;
use lessonmap::models::{AnnotatedSentence, UnitKind};
use lessonmap::pipeline::{Checkpoint, log_completeness};
use lessonmap::stages::{partition_batches, plan_windows, window_checkpoint};
use lessonmap::{
    ArtifactStore, ExtractionStrategy, OutputPaths, OverlapPolicy, PipelineConfig,
    PipelineContext, ProbabilityPolicy, ProviderKind, RunReport, read_flat_output,
    read_transcript, run_annotation, run_organization, run_pipeline, segment_transcript,
};

#[derive(Parser)]
#[command(name = "lessonmap")]
#[command(author, version, about = "Turn timestamped lesson transcripts into task/event trees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both passes: annotate the transcript, then organize it into tasks
    Process {
        /// Input transcript (lines like `12.0s - 15.5s: text`)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the flat sentence list (JSON)
        #[arg(short, long, default_value = "output.json")]
        output: PathBuf,

        /// Output file for the task tree (JSON)
        #[arg(long, default_value = "output_tasks.json")]
        tasks_output: PathBuf,

        /// Output file for the run report (JSON)
        #[arg(long, default_value = "run_report.json")]
        report: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// First pass only: correct and attribute sentences
    Annotate {
        /// Input transcript
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the flat sentence list (JSON)
        #[arg(short, long, default_value = "output.json")]
        output: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Second pass only: organize an existing flat sentence list into tasks
    Organize {
        /// Flat sentence list produced by `annotate`
        #[arg(short, long, default_value = "output.json")]
        input: PathBuf,

        /// Output file for the task tree (JSON)
        #[arg(short, long, default_value = "output_tasks.json")]
        output: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show how a transcript will be split and which artifacts already exist
    Status {
        /// Input transcript
        #[arg(short, long)]
        input: PathBuf,

        /// Flat sentence list, if the first pass has run
        #[arg(long)]
        flat: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },
}

/// Settings shared by every command; unset values come from the environment
#[derive(Args)]
struct RunArgs {
    /// Completion backend
    #[arg(long, value_enum, default_value_t = ProviderKind::Openai)]
    provider: ProviderKind,

    /// Model identifier (default: $MODEL or gpt-4o)
    #[arg(long)]
    model: Option<String>,

    /// Directory for per-batch and per-window artifacts (default: $ARTIFACT_DIR or ./batches)
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Segments per batch (default: $BATCH_SIZE or 100)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Sentences per window (default: $CHUNK_SIZE or 300)
    #[arg(long)]
    window_size: Option<usize>,

    /// Sentences repeated from the previous window (default: $CHUNK_OVERLAP or 30)
    #[arg(long)]
    overlap: Option<usize>,

    /// Attempts per batch or window
    #[arg(long, default_value = "3")]
    max_attempts: u32,

    /// Seconds to wait before retrying a failed batch or window
    #[arg(long, default_value = "5")]
    retry_delay_secs: u64,

    /// Seconds to wait after each batch or window
    #[arg(long, default_value = "1")]
    pacing_secs: u64,

    /// How a payload is located in the model response
    #[arg(long, value_enum, default_value_t = ExtractionStrategy::Layered)]
    extraction: ExtractionStrategy,

    /// What to do with speaker probabilities that do not sum to 1
    #[arg(long, value_enum, default_value_t = ProbabilityPolicy::Normalize)]
    probability_policy: ProbabilityPolicy,

    /// How overlapping window sentences are joined
    #[arg(long, value_enum, default_value_t = OverlapPolicy::Deduplicate)]
    overlap_policy: OverlapPolicy,

    /// Do not keep raw model responses next to the payloads
    #[arg(long)]
    no_raw: bool,

    /// Keep filler and noise sentences
    #[arg(long)]
    keep_noise: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl RunArgs {
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::from_env().context("Invalid environment configuration")?;

        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(dir) = &self.artifacts {
            config.artifact_dir = dir.clone();
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(size) = self.window_size {
            config.window.window_size = size;
        }
        if let Some(overlap) = self.overlap {
            config.window.overlap = overlap;
        }
        config.max_attempts = self.max_attempts;
        config.retry_delay = Duration::from_secs(self.retry_delay_secs);
        config.pacing_delay = Duration::from_secs(self.pacing_secs);
        config.extraction = self.extraction;
        config.probability_policy = self.probability_policy;
        config.overlap_policy = self.overlap_policy;
        config.persist_raw_response = !self.no_raw;
        config.noise_filtering = !self.keep_noise;

        config.validate()?;
        Ok(config)
    }

    fn client(&self) -> Result<Box<dyn CompletionService>> {
        Ok(self.provider.client_from_env()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output,
            tasks_output,
            report,
            run,
        } => {
            setup_logging(run.verbose);
            let outputs = OutputPaths {
                flat: output,
                tasks: tasks_output,
                report,
            };
            process_transcript(input, outputs, run).await
        }
        Commands::Annotate { input, output, run } => {
            setup_logging(run.verbose);
            annotate_transcript(input, output, run).await
        }
        Commands::Organize { input, output, run } => {
            setup_logging(run.verbose);
            organize_sentences(input, output, run).await
        }
        Commands::Status { input, flat, run } => {
            setup_logging(run.verbose);
            show_status(input, flat, run)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn process_transcript(input: PathBuf, outputs: OutputPaths, run: RunArgs) -> Result<()> {
    let config = run.config()?;
    let client = run.client()?;
    let ctx = PipelineContext::new(client.as_ref(), config)?;

    info!("Loading transcript from {:?}", input);
    let transcript = read_transcript(&input)?;

    let report = run_pipeline(&ctx, &transcript, &outputs).await?;
    print_summary(&report);
    Ok(())
}

async fn annotate_transcript(input: PathBuf, output: PathBuf, run: RunArgs) -> Result<()> {
    let config = run.config()?;
    let client = run.client()?;
    let ctx = PipelineContext::new(client.as_ref(), config)?;

    info!("Loading transcript from {:?}", input);
    let transcript = read_transcript(&input)?;

    let flat = run_annotation(&ctx, &transcript).await?;
    write_json(&output, &flat.sentences)?;
    info!("Flat output written to {:?}", output);

    if flat.summary.is_complete() {
        info!(
            "Complete: {} sentences from {} segments ({} service calls)",
            flat.sentences.len(),
            flat.segments,
            ctx.calls_made()
        );
    } else {
        warn!(
            "INCOMPLETE: batches {:?} omitted; rerun to retry them",
            flat.summary.omitted
        );
    }
    Ok(())
}

async fn organize_sentences(input: PathBuf, output: PathBuf, run: RunArgs) -> Result<()> {
    let config = run.config()?;
    let client = run.client()?;
    let ctx = PipelineContext::new(client.as_ref(), config)?;

    info!("Loading flat sentences from {:?}", input);
    let sentences = read_flat_output(&input)?;
    info!("Loaded {} sentences", sentences.len());

    let tree = run_organization(&ctx, &sentences).await?;
    write_json(&output, &tree.tasks)?;
    info!("Task tree written to {:?}", output);

    if tree.summary.is_complete() {
        info!(
            "Complete: {} tasks ({} duplicates removed, {} service calls)",
            tree.tasks.len(),
            tree.duplicates_removed,
            ctx.calls_made()
        );
    } else {
        warn!(
            "INCOMPLETE: windows {:?} omitted; rerun to retry them",
            tree.summary.omitted
        );
    }
    Ok(())
}

fn show_status(input: PathBuf, flat: Option<PathBuf>, run: RunArgs) -> Result<()> {
    let config = run.config()?;
    let store = ArtifactStore::new(&config.artifact_dir);

    let transcript = read_transcript(&input)?;
    let segments = segment_transcript(&transcript)?;
    let batches = partition_batches(&segments, config.batch_size);

    println!("Transcript Status");
    println!("=================");
    println!("Segments: {}", segments.len());
    if let (Some(first), Some(last)) = (segments.first(), segments.last()) {
        println!(
            "Time span: {} - {}",
            format_timestamp(first.start),
            format_timestamp(last.end)
        );
    }
    let malformed = segments.iter().filter(|s| !s.is_well_formed()).count();
    if malformed > 0 {
        println!("Segments with empty or inverted ranges: {}", malformed);
    }
    println!();

    let batch_summary =
        Checkpoint::scan::<Vec<AnnotatedSentence>>(&store, UnitKind::Batch, batches.len())
            .summary();
    println!("Batches (size {})", config.batch_size);
    println!("-------");
    println!("Total: {}", batch_summary.total);
    println!("Complete: {}", batch_summary.completed.len());
    println!("Pending: {:?}", batch_summary.omitted);
    println!();

    if let Some(flat) = flat {
        let sentences = read_flat_output(&flat)?;
        let windows = plan_windows(&sentences, &config.window);
        let checkpoint = window_checkpoint(&store, &windows);

        println!(
            "Windows (size {}, overlap {})",
            config.window.window_size, config.window.overlap
        );
        println!("-------");
        for window in &windows {
            let state = if checkpoint.status(window.index).is_complete() {
                "done"
            } else {
                "pending"
            };
            println!(
                "Window {}: sentences {}..{} [{}]",
                window.label(),
                window.start,
                window.end,
                state
            );
        }
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    log_completeness(report);
    info!(
        "Complete: {} segments -> {} sentences -> {} tasks ({} service calls)",
        report.segments, report.sentences, report.tasks, report.service_calls
    );
}
