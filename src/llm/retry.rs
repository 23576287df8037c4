use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::llm::{CompletionRequest, Validated, extract_payload};
use crate::models::UnitKind;
use crate::pipeline::PipelineContext;

/// Bounded retry settings for one batch or window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one
    pub retry_delay: Duration,
}

/// Drive one unit to a persisted payload.
///
/// Each attempt calls the service, stores the raw response, extracts the
/// payload and hands it to `parse`. Transient, empty and malformed results are
/// retried after `retry_delay`; a persistence failure ends the unit at once.
/// When the budget is spent the unit fails with [`PipelineError::Exhausted`].
pub async fn run_unit<T, F>(
    ctx: &PipelineContext<'_>,
    kind: UnitKind,
    index: usize,
    request: &CompletionRequest,
    parse: F,
) -> Result<T>
where
    T: Serialize,
    F: Fn(&str) -> Result<Validated<T>>,
{
    let policy = ctx.retry_policy();
    let label = index + 1;
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        info!("{} {} attempt {}...", kind, label, attempt);

        match attempt_unit(ctx, kind, index, request, &parse).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                warn!("{} {} attempt {} failed: {}", kind, label, attempt, e);
                last_error = Some(e);
                if attempt < policy.max_attempts {
                    info!("Retrying after {:?}...", policy.retry_delay);
                    tokio::time::sleep(policy.retry_delay).await;
                }
            }
            Err(e) => {
                warn!("{} {} failed without retry: {}", kind, label, e);
                return Err(e);
            }
        }
    }

    Err(PipelineError::Exhausted {
        kind,
        index,
        attempts: policy.max_attempts,
        last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

async fn attempt_unit<T, F>(
    ctx: &PipelineContext<'_>,
    kind: UnitKind,
    index: usize,
    request: &CompletionRequest,
    parse: &F,
) -> Result<T>
where
    T: Serialize,
    F: Fn(&str) -> Result<Validated<T>>,
{
    let content = ctx.complete(request).await?;

    if ctx.config.persist_raw_response {
        ctx.store.save_raw(kind, index, &content)?;
    }

    let payload = extract_payload(&content, ctx.config.extraction);
    let validated = parse(&payload)?;
    for note in &validated.notes {
        warn!("{} {}: {}", kind, index + 1, note);
    }

    ctx.store.save_payload(kind, index, &validated.value)?;
    Ok(validated.value)
}
