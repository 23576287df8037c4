use tracing::info;

use crate::models::{AnnotatedSentence, Window, WindowConfig};

/// Perform Stage 3: plan overlapping windows over the flat sentence sequence
///
/// Window `k` covers `[max(0, k*W - O), min(N, (k+1)*W))`. The leading overlap
/// repeats the tail of the previous window so the model can continue a task or
/// event across the boundary; it is sent as-is and deduplicated only after the
/// model responds.
pub fn plan_windows(sentences: &[AnnotatedSentence], config: &WindowConfig) -> Vec<Window> {
    let windows: Vec<Window> = plan_ranges(sentences.len(), config)
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| Window {
            index,
            start,
            end,
            overlap: (index * config.window_size) - start,
            sentences: sentences[start..end].to_vec(),
        })
        .collect();

    info!(
        "Stage 3: {} sentences in {} windows (size {}, overlap {})",
        sentences.len(),
        windows.len(),
        config.window_size,
        config.overlap
    );

    windows
}

/// Global index ranges of each window, without copying sentences
pub fn plan_ranges(len: usize, config: &WindowConfig) -> Vec<(usize, usize)> {
    let size = config.window_size.max(1);
    let count = len.div_ceil(size);

    (0..count)
        .map(|k| {
            let start = (k * size).saturating_sub(config.overlap);
            let end = ((k + 1) * size).min(len);
            (start, end)
        })
        .collect()
}
