use std::path::Path;

use anyhow::{Context, Result};

use crate::models::AnnotatedSentence;

/// Read a plain-text transcript
pub fn read_transcript(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read transcript: {:?}", path))
}

/// Read a flat sentence sequence written by the annotation pass
pub fn read_flat_output(path: &Path) -> Result<Vec<AnnotatedSentence>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    parse_flat_output(&content)
}

/// Parse a flat sentence sequence from JSON
pub fn parse_flat_output(json: &str) -> Result<Vec<AnnotatedSentence>> {
    serde_json::from_str(json).context("Failed to parse flat sentence JSON")
}
