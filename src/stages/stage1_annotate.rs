use tracing::{info, warn};

use crate::error::Result;
use crate::llm::{CompletionRequest, build_annotation_prompt, run_unit, validate_sentences};
use crate::models::{AnnotatedSentence, Batch, Segment, UnitKind, UnitStatus};
use crate::pipeline::{Checkpoint, PassSummary, PipelineContext};

/// Result of Stage 1 processing
#[derive(Debug)]
pub struct Stage1Result {
    /// Number of batches the transcript was partitioned into
    pub batch_count: usize,
    /// Per-batch outcome, indexed by batch
    pub checkpoint: Checkpoint,
}

impl Stage1Result {
    pub fn summary(&self) -> PassSummary {
        self.checkpoint.summary()
    }
}

/// Split segments into contiguous, disjoint batches of at most `batch_size`
pub fn partition_batches(segments: &[Segment], batch_size: usize) -> Vec<Batch> {
    segments
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| Batch::new(index, chunk.to_vec()))
        .collect()
}

/// Execute Stage 1: annotate segments batch by batch
///
/// Batches with a parseable payload on disk are skipped without calling the
/// service. Every other batch goes through the bounded retry loop; a batch
/// that still fails is marked exhausted and the run moves on.
pub async fn execute_stage1(
    ctx: &PipelineContext<'_>,
    segments: &[Segment],
) -> Result<Stage1Result> {
    let batches = partition_batches(segments, ctx.config.batch_size);
    let mut checkpoint =
        Checkpoint::scan::<Vec<AnnotatedSentence>>(&ctx.store, UnitKind::Batch, batches.len());

    info!(
        "Stage 1: {} segments in {} batches ({} already complete)",
        segments.len(),
        batches.len(),
        checkpoint.completed_count()
    );

    for batch in &batches {
        if checkpoint.status(batch.index).is_complete() {
            info!("Batch {} already exists, skipping", batch.label());
        }
    }

    while let Some(index) = checkpoint.next_pending() {
        let batch = &batches[index];

        let status = match process_batch(ctx, batch).await {
            Ok(sentences) => {
                info!(
                    "Batch {} completed: {} segments -> {} sentences",
                    batch.label(),
                    batch.segment_count(),
                    sentences.len()
                );
                UnitStatus::Complete { resumed: false }
            }
            Err(e) => {
                warn!("Batch {} skipped: {}", batch.label(), e);
                UnitStatus::Exhausted
            }
        };
        checkpoint.mark(index, status);

        tokio::time::sleep(ctx.config.pacing_delay).await;
    }

    let summary = checkpoint.summary();
    if !summary.omitted.is_empty() {
        warn!("Stage 1: batches omitted from output: {:?}", summary.omitted);
    }

    Ok(Stage1Result {
        batch_count: batches.len(),
        checkpoint,
    })
}

async fn process_batch(
    ctx: &PipelineContext<'_>,
    batch: &Batch,
) -> Result<Vec<AnnotatedSentence>> {
    let prompt = build_annotation_prompt(&batch.segments, ctx.config.noise_filtering);
    let request = CompletionRequest::new(&ctx.config.model, prompt);
    let validation = ctx.validation_config();

    run_unit(ctx, UnitKind::Batch, batch.index, &request, |payload| {
        let sentences: Vec<AnnotatedSentence> = serde_json::from_str(payload)?;
        validate_sentences(sentences, &validation)
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::error::PipelineError;
    use crate::testing::{ScriptedService, segments, sentence_json};

    fn config(dir: &std::path::Path, batch_size: usize) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            artifact_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_partition_batches() {
        let batches = partition_batches(&segments(10), 4);
        let sizes: Vec<usize> = batches.iter().map(|b| b.segment_count()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(batches[2].index, 2);
        assert_eq!(batches[1].segments[0].start, 4.0);
        assert!(partition_batches(&[], 4).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage1_processes_every_batch() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::new(vec![
            Ok(format!("```json\n[{}]\n```", sentence_json(0.0))),
            Ok(format!("[{}]", sentence_json(2.0))),
        ]);
        let ctx = PipelineContext::new(&service, config(dir.path(), 2)).unwrap();

        let started = tokio::time::Instant::now();
        let result = execute_stage1(&ctx, &segments(4)).await.unwrap();

        assert_eq!(result.batch_count, 2);
        assert_eq!(result.summary().completed, vec![1, 2]);
        assert_eq!(service.calls(), 2);
        // One pacing delay per processed batch
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert!(service.prompts()[1].contains("2.0s - 3.0s: segment 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage1_exhausted_batch_does_not_stop_run() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::new(vec![
            Err(PipelineError::TransientCall("timeout".into())),
            Ok("Sorry, I cannot help with that.".into()),
            Err(PipelineError::EmptyResponse),
            Ok(format!("[{}]", sentence_json(2.0))),
        ]);
        let ctx = PipelineContext::new(&service, config(dir.path(), 2)).unwrap();

        let result = execute_stage1(&ctx, &segments(4)).await.unwrap();
        let summary = result.summary();

        assert_eq!(summary.omitted, vec![1]);
        assert_eq!(summary.completed, vec![2]);
        assert_eq!(service.calls(), 4);
        assert!(!ctx.store.has_payload(UnitKind::Batch, 0));
        assert!(ctx.store.has_payload(UnitKind::Batch, 1));
    }

    #[tokio::test]
    async fn test_stage1_resume_skips_completed_batches() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 2);

        let first = ScriptedService::new(vec![Ok(format!("[{}]", sentence_json(0.0)))]);
        let mut quick = config.clone();
        quick.pacing_delay = Duration::ZERO;
        quick.retry_delay = Duration::ZERO;
        quick.max_attempts = 1;
        let ctx = PipelineContext::new(&first, quick.clone()).unwrap();
        let result = execute_stage1(&ctx, &segments(4)).await.unwrap();
        assert_eq!(result.summary().omitted, vec![2]);

        let second = ScriptedService::new(vec![Ok(format!("[{}]", sentence_json(2.0)))]);
        let ctx = PipelineContext::new(&second, quick).unwrap();
        let result = execute_stage1(&ctx, &segments(4)).await.unwrap();
        let summary = result.summary();

        assert_eq!(second.calls(), 1);
        assert_eq!(summary.resumed, vec![1]);
        assert_eq!(summary.completed, vec![1, 2]);
        assert!(summary.omitted.is_empty());
    }

    #[tokio::test]
    async fn test_stage1_corrupt_artifact_is_reprocessed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), 10);
        config.pacing_delay = Duration::ZERO;
        std::fs::write(dir.path().join("batch_1.json"), "[{\"start\":").unwrap();

        let service = ScriptedService::new(vec![Ok(format!("[{}]", sentence_json(0.0)))]);
        let ctx = PipelineContext::new(&service, config).unwrap();
        let result = execute_stage1(&ctx, &segments(3)).await.unwrap();

        assert_eq!(service.calls(), 1);
        assert!(result.summary().resumed.is_empty());
        assert_eq!(result.summary().completed, vec![1]);
    }
}
