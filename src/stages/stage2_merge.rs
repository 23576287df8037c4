use tracing::{info, warn};

use crate::io::ArtifactStore;
use crate::models::{AnnotatedSentence, UnitKind};

/// Result of Stage 2 merging
#[derive(Debug, Clone)]
pub struct Stage2Result {
    /// All sentences in batch order, then within-batch order
    pub sentences: Vec<AnnotatedSentence>,
    /// 1-based batch numbers that contributed to the output
    pub included: Vec<usize>,
    /// 1-based batch numbers missing from the output
    pub omitted: Vec<usize>,
}

/// Execute Stage 2: concatenate batch payloads into one flat sequence
///
/// Reads payloads from the store rather than from memory, so a merge after a
/// resumed run gives exactly the same output as an uninterrupted one. Missing
/// or unreadable payloads are skipped with a warning.
pub fn execute_stage2(store: &ArtifactStore, batch_count: usize) -> Stage2Result {
    let mut sentences: Vec<AnnotatedSentence> = Vec::new();
    let mut included = Vec::new();
    let mut omitted = Vec::new();

    for index in 0..batch_count {
        match store.load_payload::<Vec<AnnotatedSentence>>(UnitKind::Batch, index) {
            Ok(Some(batch)) => {
                if let (Some(last), Some(first)) = (sentences.last(), batch.first()) {
                    if first.start < last.start {
                        warn!(
                            "Batch {} starts at {}s, before the last sentence of the previous batch ({}s)",
                            index + 1,
                            first.start,
                            last.start
                        );
                    }
                }
                sentences.extend(batch);
                included.push(index + 1);
            }
            Ok(None) => {
                warn!("Batch {} has no payload, skipping in merge", index + 1);
                omitted.push(index + 1);
            }
            Err(e) => {
                warn!("Batch {} payload unreadable, skipping in merge: {}", index + 1, e);
                omitted.push(index + 1);
            }
        }
    }

    info!(
        "Stage 2: merged {} sentences from {} of {} batches",
        sentences.len(),
        included.len(),
        batch_count
    );
    if !omitted.is_empty() {
        warn!("Stage 2: flat output is missing batches {:?}", omitted);
    }

    Stage2Result {
        sentences,
        included,
        omitted,
    }
}
