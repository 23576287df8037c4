use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::io::{ArtifactStore, write_json};
use crate::llm::{CompletionRequest, CompletionService, RetryPolicy, ValidationConfig};
use crate::models::{AnnotatedSentence, TaskNode, UnitKind, UnitStatus, count_sentences};
use crate::stages::{
    execute_stage1, execute_stage2, execute_stage4, plan_windows, segment_transcript,
};

/// Everything a stage needs for one run: the service, the artifact store and the settings
pub struct PipelineContext<'a> {
    pub client: &'a dyn CompletionService,
    pub store: ArtifactStore,
    pub config: PipelineConfig,
    pub run_id: Uuid,
    calls: AtomicUsize,
}

impl<'a> PipelineContext<'a> {
    /// Create a context, opening the artifact directory from `config`
    pub fn new(client: &'a dyn CompletionService, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let store = ArtifactStore::open(&config.artifact_dir)?;
        Ok(Self {
            client,
            store,
            config,
            run_id: Uuid::new_v4(),
            calls: AtomicUsize::new(0),
        })
    }

    /// Call the completion service, counting the call
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.client.complete(request).await
    }

    /// Number of service calls made through this context
    pub fn calls_made(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.max_attempts,
            retry_delay: self.config.retry_delay,
        }
    }

    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            probability_policy: self.config.probability_policy,
            drop_empty_text: self.config.noise_filtering,
            ..Default::default()
        }
    }
}

/// Per-unit state of one pass, indexed by batch or window
#[derive(Debug, Clone)]
pub struct Checkpoint {
    statuses: Vec<UnitStatus>,
}

impl Checkpoint {
    pub fn new(count: usize) -> Self {
        Self {
            statuses: vec![UnitStatus::Pending; count],
        }
    }

    /// Build the checkpoint from the store: a unit whose payload exists and
    /// parses as `T` is complete, anything else is pending
    pub fn scan<T: DeserializeOwned>(store: &ArtifactStore, kind: UnitKind, count: usize) -> Self {
        let mut checkpoint = Self::new(count);
        for index in 0..count {
            match store.load_payload::<T>(kind, index) {
                Ok(Some(_)) => checkpoint.mark(index, UnitStatus::Complete { resumed: true }),
                Ok(None) => {}
                Err(e) => warn!("{} {} artifact will be redone: {}", kind, index + 1, e),
            }
        }
        checkpoint
    }

    pub fn status(&self, index: usize) -> UnitStatus {
        self.statuses
            .get(index)
            .copied()
            .unwrap_or(UnitStatus::Pending)
    }

    pub fn mark(&mut self, index: usize, status: UnitStatus) {
        if let Some(slot) = self.statuses.get_mut(index) {
            *slot = status;
        }
    }

    /// Lowest index still waiting to be processed
    pub fn next_pending(&self) -> Option<usize> {
        self.statuses.iter().position(UnitStatus::is_pending)
    }

    pub fn completed_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.is_complete()).count()
    }

    pub fn summary(&self) -> PassSummary {
        let mut summary = PassSummary {
            total: self.statuses.len(),
            ..Default::default()
        };
        for (index, status) in self.statuses.iter().enumerate() {
            let label = index + 1;
            match status {
                UnitStatus::Complete { resumed } => {
                    summary.completed.push(label);
                    if *resumed {
                        summary.resumed.push(label);
                    }
                }
                UnitStatus::Exhausted | UnitStatus::Pending => summary.omitted.push(label),
            }
        }
        summary
    }
}

/// Outcome of one pass; unit numbers are 1-based like the artifact files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub total: usize,
    pub completed: Vec<usize>,
    /// Completed units whose payload predates this run
    pub resumed: Vec<usize>,
    pub omitted: Vec<usize>,
}

impl PassSummary {
    pub fn is_complete(&self) -> bool {
        self.omitted.is_empty()
    }
}

/// Where final outputs are written
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub flat: PathBuf,
    pub tasks: PathBuf,
    pub report: PathBuf,
}

impl OutputPaths {
    /// Conventional names inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            flat: dir.join("output.json"),
            tasks: dir.join("output_tasks.json"),
            report: dir.join("run_report.json"),
        }
    }
}

/// Machine-readable account of a run, written next to the outputs
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub segments: usize,
    pub sentences: usize,
    pub annotation: Option<PassSummary>,
    pub organization: Option<PassSummary>,
    pub tasks: usize,
    pub tree_sentences: usize,
    pub duplicates_removed: usize,
    pub service_calls: usize,
}

impl RunReport {
    fn start(ctx: &PipelineContext<'_>) -> Self {
        let now = Utc::now();
        Self {
            run_id: ctx.run_id,
            model: ctx.config.model.clone(),
            started_at: now,
            finished_at: now,
            segments: 0,
            sentences: 0,
            annotation: None,
            organization: None,
            tasks: 0,
            tree_sentences: 0,
            duplicates_removed: 0,
            service_calls: 0,
        }
    }

    fn finish(&mut self, ctx: &PipelineContext<'_>) {
        self.finished_at = Utc::now();
        self.service_calls = ctx.calls_made();
    }

    /// True when no batch or window was omitted
    pub fn is_complete(&self) -> bool {
        self.annotation.as_ref().is_none_or(PassSummary::is_complete)
            && self.organization.as_ref().is_none_or(PassSummary::is_complete)
    }
}

/// Result of the first pass
#[derive(Debug, Clone)]
pub struct FlatOutput {
    pub segments: usize,
    pub sentences: Vec<AnnotatedSentence>,
    pub summary: PassSummary,
}

/// Result of the second pass
#[derive(Debug, Clone)]
pub struct TreeOutput {
    pub tasks: Vec<TaskNode>,
    pub summary: PassSummary,
    pub duplicates_removed: usize,
}

/// Segment, annotate and merge a transcript into the flat sentence sequence
pub async fn run_annotation(ctx: &PipelineContext<'_>, transcript: &str) -> Result<FlatOutput> {
    let segments = segment_transcript(transcript)?;
    info!("Segmented transcript into {} segments", segments.len());

    let stage1 = execute_stage1(ctx, &segments).await?;
    let stage2 = execute_stage2(&ctx.store, stage1.batch_count);

    let mut summary = stage1.summary();
    // A payload that vanished between annotation and merge is still a gap
    for label in stage2.omitted {
        if !summary.omitted.contains(&label) {
            summary.completed.retain(|&l| l != label);
            summary.resumed.retain(|&l| l != label);
            summary.omitted.push(label);
        }
    }
    summary.omitted.sort_unstable();

    Ok(FlatOutput {
        segments: segments.len(),
        sentences: stage2.sentences,
        summary,
    })
}

/// Plan windows over the flat sequence and build the task tree
pub async fn run_organization(
    ctx: &PipelineContext<'_>,
    sentences: &[AnnotatedSentence],
) -> Result<TreeOutput> {
    let windows = plan_windows(sentences, &ctx.config.window);
    let stage4 = execute_stage4(ctx, &windows).await?;
    let summary = stage4.summary();

    Ok(TreeOutput {
        tasks: stage4.tasks,
        summary,
        duplicates_removed: stage4.duplicates_removed,
    })
}

/// Run both passes and write the flat output, the task tree and the run report
pub async fn run_pipeline(
    ctx: &PipelineContext<'_>,
    transcript: &str,
    outputs: &OutputPaths,
) -> Result<RunReport> {
    let span = info_span!("run", run_id = %ctx.run_id);
    async move {
        let mut report = RunReport::start(ctx);

        let flat = run_annotation(ctx, transcript).await?;
        write_json(&outputs.flat, &flat.sentences)?;
        info!("Flat output written to {:?}", outputs.flat);

        report.segments = flat.segments;
        report.sentences = flat.sentences.len();
        report.annotation = Some(flat.summary);

        let tree = run_organization(ctx, &flat.sentences).await?;
        write_json(&outputs.tasks, &tree.tasks)?;
        info!("Task tree written to {:?}", outputs.tasks);

        report.tasks = tree.tasks.len();
        report.tree_sentences = count_sentences(&tree.tasks);
        report.duplicates_removed = tree.duplicates_removed;
        report.organization = Some(tree.summary);

        report.finish(ctx);
        write_json(&outputs.report, &report)?;
        log_completeness(&report);
        Ok(report)
    }
    .instrument(span)
    .await
}

/// One line per pass listing omitted units, so gaps are visible without reading artifacts
pub fn log_completeness(report: &RunReport) {
    for (name, summary) in [
        ("batches", &report.annotation),
        ("windows", &report.organization),
    ] {
        let Some(summary) = summary else { continue };
        if summary.is_complete() {
            info!(
                "All {} {} complete ({} resumed)",
                summary.total,
                name,
                summary.resumed.len()
            );
        } else {
            warn!(
                "INCOMPLETE: {} of {} {} omitted: {:?}",
                summary.omitted.len(),
                summary.total,
                name,
                summary.omitted
            );
        }
    }
}
