use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::llm::{ExtractionStrategy, ProbabilityPolicy};
use crate::models::WindowConfig;
use crate::stages::OverlapPolicy;

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Settings for one pipeline run, selected once at startup
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model identifier passed to the completion service
    pub model: String,
    /// Segments per first-pass batch
    pub batch_size: usize,
    /// Window size and overlap for the hierarchical pass
    pub window: WindowConfig,
    /// Attempts per batch or window, including the first
    pub max_attempts: u32,
    /// Wait between failed attempts of the same unit
    pub retry_delay: Duration,
    /// Wait after every unit to stay under service rate limits
    pub pacing_delay: Duration,
    /// Keep the unprocessed model response next to each payload
    pub persist_raw_response: bool,
    /// Ask the model to drop filler/noise sentences and discard empty ones
    pub noise_filtering: bool,
    pub extraction: ExtractionStrategy,
    pub probability_policy: ProbabilityPolicy,
    pub overlap_policy: OverlapPolicy,
    /// Directory holding per-unit artifacts
    pub artifact_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            batch_size: 100,
            window: WindowConfig::default(),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            pacing_delay: Duration::from_secs(1),
            persist_raw_response: true,
            noise_filtering: true,
            extraction: ExtractionStrategy::Layered,
            probability_policy: ProbabilityPolicy::Normalize,
            overlap_policy: OverlapPolicy::Deduplicate,
            artifact_dir: PathBuf::from("batches"),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(model) = lookup("MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = model.trim().to_string();
        }
        if let Some(size) = parse_var(&lookup, "BATCH_SIZE")? {
            config.batch_size = size;
        }
        if let Some(size) = parse_var(&lookup, "CHUNK_SIZE")? {
            config.window.window_size = size;
        }
        if let Some(overlap) = parse_var(&lookup, "CHUNK_OVERLAP")? {
            config.window.overlap = overlap;
        }
        if let Some(dir) = lookup("ARTIFACT_DIR").filter(|d| !d.trim().is_empty()) {
            config.artifact_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch size must be positive".into()));
        }
        if self.window.window_size == 0 {
            return Err(PipelineError::Config("window size must be positive".into()));
        }
        if self.window.overlap >= self.window.window_size {
            return Err(PipelineError::Config(format!(
                "overlap ({}) must be smaller than window size ({})",
                self.window.overlap, self.window.window_size
            )));
        }
        if self.max_attempts == 0 {
            return Err(PipelineError::Config("at least one attempt is required".into()));
        }
        Ok(())
    }
}

fn parse_var<F>(lookup: &F, key: &str) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::Config(format!("{} is not a number: {:?}", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.window.window_size, 300);
        assert_eq!(config.window.overlap, 30);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert!(config.persist_raw_response);
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("MODEL", "gpt-4o-mini"),
            ("BATCH_SIZE", "50"),
            ("CHUNK_SIZE", "120"),
            ("CHUNK_OVERLAP", "10"),
            ("ARTIFACT_DIR", "/tmp/lesson"),
        ]))
        .unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.window.window_size, 120);
        assert_eq!(config.window.overlap, 10);
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/lesson"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(PipelineConfig::from_lookup(lookup_from(&[("BATCH_SIZE", "0")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup_from(&[("BATCH_SIZE", "ten")])).is_err());
        let overlap_too_large = lookup_from(&[("CHUNK_SIZE", "30"), ("CHUNK_OVERLAP", "30")]);
        assert!(PipelineConfig::from_lookup(overlap_too_large).is_err());
    }
}
