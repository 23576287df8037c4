use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::error::Result;
use crate::io::ArtifactStore;
use crate::llm::{
    CompletionRequest, HIERARCHY_SYSTEM_PROMPT, build_hierarchy_prompt, run_unit, validate_tasks,
};
use crate::models::{
    SentenceKey, TaskNode, UnitKind, UnitStatus, Window, WindowStamp, count_sentences,
};
use crate::pipeline::{Checkpoint, PassSummary, PipelineContext};

/// How sentences shared by adjacent windows are handled when trees are joined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OverlapPolicy {
    /// Keep the first occurrence of each sentence and stitch a task or event
    /// that continues across the boundary
    #[default]
    Deduplicate,
    /// Concatenate window trees unchanged; overlap sentences appear twice
    KeepDuplicates,
}

/// Result of Stage 4 processing
#[derive(Debug)]
pub struct Stage4Result {
    /// Final task tree in window order
    pub tasks: Vec<TaskNode>,
    /// Per-window outcome
    pub checkpoint: Checkpoint,
    /// Sentences dropped because an earlier window already placed them
    pub duplicates_removed: usize,
}

impl Stage4Result {
    pub fn summary(&self) -> PassSummary {
        self.checkpoint.summary()
    }
}

/// Execute Stage 4: group each window into tasks and events, then reconcile
///
/// Windows are processed with the same retry rules as Stage 1. A stored tree
/// is only resumed when its stamp matches the planned window (see
/// [`window_checkpoint`]). Trees are then read back from the store in window
/// order and joined under the configured [`OverlapPolicy`].
pub async fn execute_stage4(
    ctx: &PipelineContext<'_>,
    windows: &[Window],
) -> Result<Stage4Result> {
    let mut checkpoint = window_checkpoint(&ctx.store, windows);

    info!(
        "Stage 4: organizing {} windows ({} already complete)",
        windows.len(),
        checkpoint.completed_count()
    );

    while let Some(index) = checkpoint.next_pending() {
        let window = &windows[index];
        info!(
            "Sending window {}/{} -> sentences {}..{}",
            window.label(),
            windows.len(),
            window.start,
            window.end
        );

        let status = match process_window(ctx, window).await {
            Ok(tasks) => {
                info!(
                    "Window {} completed: {} tasks, {} sentences",
                    window.label(),
                    tasks.len(),
                    count_sentences(&tasks)
                );
                UnitStatus::Complete { resumed: false }
            }
            Err(e) => {
                warn!("Window {} skipped: {}", window.label(), e);
                UnitStatus::Exhausted
            }
        };
        checkpoint.mark(index, status);

        tokio::time::sleep(ctx.config.pacing_delay).await;
    }

    let mut per_window = Vec::with_capacity(windows.len());
    for window in windows {
        if !checkpoint.status(window.index).is_complete() {
            continue;
        }
        match ctx.store.load_payload::<Vec<TaskNode>>(UnitKind::Window, window.index) {
            Ok(Some(tasks)) => per_window.push(tasks),
            Ok(None) => {
                warn!("Window {} payload disappeared, skipping", window.label());
                checkpoint.mark(window.index, UnitStatus::Exhausted);
            }
            Err(e) => {
                warn!("Window {} payload unreadable, skipping: {}", window.label(), e);
                checkpoint.mark(window.index, UnitStatus::Exhausted);
            }
        }
    }

    let summary = checkpoint.summary();
    if !summary.omitted.is_empty() {
        warn!("Stage 4: windows omitted from task tree: {:?}", summary.omitted);
    }

    let reconciled = reconcile_windows(per_window, ctx.config.overlap_policy);

    info!(
        "Stage 4: {} tasks, {} sentences ({} duplicates removed)",
        reconciled.tasks.len(),
        count_sentences(&reconciled.tasks),
        reconciled.duplicates_removed
    );

    Ok(Stage4Result {
        tasks: reconciled.tasks,
        checkpoint,
        duplicates_removed: reconciled.duplicates_removed,
    })
}

/// Scan stored window trees, treating a tree as complete only when the stamp
/// saved with it matches `window`. A missing or different stamp means the
/// tree was built over other sentences (for example before a failed batch was
/// recovered), so the window is redone.
pub fn window_checkpoint(store: &ArtifactStore, windows: &[Window]) -> Checkpoint {
    let mut checkpoint =
        Checkpoint::scan::<Vec<TaskNode>>(store, UnitKind::Window, windows.len());

    for window in windows {
        if !checkpoint.status(window.index).is_complete() {
            continue;
        }
        let current = match store.load_stamp::<WindowStamp>(UnitKind::Window, window.index) {
            Ok(Some(stamp)) => stamp == window.stamp(),
            Ok(None) => false,
            Err(e) => {
                warn!("Window {} stamp unreadable: {}", window.label(), e);
                false
            }
        };
        if !current {
            warn!(
                "Window {} artifact was built from different sentences, will be redone",
                window.label()
            );
            checkpoint.mark(window.index, UnitStatus::Pending);
        }
    }

    checkpoint
}

async fn process_window(ctx: &PipelineContext<'_>, window: &Window) -> Result<Vec<TaskNode>> {
    let prompt = build_hierarchy_prompt(&window.sentences);
    let request =
        CompletionRequest::new(&ctx.config.model, prompt).with_system(HIERARCHY_SYSTEM_PROMPT);
    let validation = ctx.validation_config();

    let tasks = run_unit(ctx, UnitKind::Window, window.index, &request, |payload| {
        let tasks: Vec<TaskNode> = serde_json::from_str(payload)?;
        validate_tasks(tasks, window, &validation)
    })
    .await?;

    // Stamp last: a payload without its stamp is redone on the next run
    ctx.store.save_stamp(UnitKind::Window, window.index, &window.stamp())?;
    Ok(tasks)
}

/// Outcome of joining per-window trees
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    pub tasks: Vec<TaskNode>,
    pub duplicates_removed: usize,
}

/// Join per-window task trees, in window order, into one tree
pub fn reconcile_windows(per_window: Vec<Vec<TaskNode>>, policy: OverlapPolicy) -> Reconciled {
    match policy {
        OverlapPolicy::KeepDuplicates => {
            let tasks: Vec<TaskNode> = per_window.into_iter().flatten().collect();
            let repeated = count_repeated(&tasks);
            if repeated > 0 {
                warn!(
                    "{} sentences appear more than once in the task tree (overlap kept)",
                    repeated
                );
            }
            Reconciled {
                tasks,
                duplicates_removed: 0,
            }
        }
        OverlapPolicy::Deduplicate => deduplicate(per_window),
    }
}

fn deduplicate(per_window: Vec<Vec<TaskNode>>) -> Reconciled {
    let mut seen: HashSet<SentenceKey> = HashSet::new();
    let mut merged: Vec<TaskNode> = Vec::new();
    let mut duplicates_removed = 0;

    for tasks in per_window {
        let mut at_boundary = !merged.is_empty();
        let mut placed: Vec<SentenceKey> = Vec::new();

        for mut task in tasks {
            for event in &mut task.events {
                let before = event.sentences.len();
                event.sentences.retain(|s| !seen.contains(&s.key()));
                duplicates_removed += before - event.sentences.len();
                placed.extend(event.sentences.iter().map(|s| s.key()));
            }
            task.events.retain(|e| !e.sentences.is_empty());
            if task.events.is_empty() {
                continue;
            }

            if at_boundary {
                at_boundary = false;
                if let Some(last) = merged.last_mut() {
                    if same_label(&last.title, &task.title) {
                        continue_task(last, task);
                        continue;
                    }
                }
            }
            merged.push(task);
        }

        // Only earlier windows count, so equal keys within one window are kept
        seen.extend(placed);
    }

    Reconciled {
        tasks: merged,
        duplicates_removed,
    }
}

/// Append `next` to `task`, extending the last event if `next` opens with the same event type
fn continue_task(task: &mut TaskNode, next: TaskNode) {
    let mut events = next.events.into_iter();

    if let Some(first) = events.next() {
        match task.events.last_mut() {
            Some(last) if same_label(&last.event_type, &first.event_type) => {
                last.sentences.extend(first.sentences);
                if last.summary.trim().is_empty() {
                    last.summary = first.summary;
                }
            }
            _ => task.events.push(first),
        }
    }
    task.events.extend(events);
}

fn same_label(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn count_repeated(tasks: &[TaskNode]) -> usize {
    let mut counts: HashMap<SentenceKey, usize> = HashMap::new();
    for sentence in tasks.iter().flat_map(|t| t.sentences()) {
        *counts.entry(sentence.key()).or_default() += 1;
    }
    counts.values().filter(|&&n| n > 1).map(|n| n - 1).sum()
}
