use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::models::Segment;

/// `12.3s - 15.0s:` at the start of a line
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(\d+\.\d)s[ \t]*-[ \t]*(\d+\.\d)s:").unwrap()
});

/// Perform Stage 0: split a raw transcript into timestamped segments
///
/// A new segment starts at every line beginning with a time-range marker.
/// Lines without a marker stay attached to the segment before them, and text
/// before the first marker is discarded. Nothing is validated here; odd
/// segments are left for the annotation pass to deal with.
pub fn segment_transcript(text: &str) -> Result<Vec<Segment>> {
    if text.trim().is_empty() {
        return Err(PipelineError::Segmentation);
    }

    let markers: Vec<_> = MARKER.captures_iter(text).collect();

    if let Some(first) = markers.first() {
        let preamble = &text[..first.get(0).map_or(0, |m| m.start())];
        if !preamble.trim().is_empty() {
            debug!(
                "Discarding {} chars before the first timestamp marker",
                preamble.trim().len()
            );
        }
    } else {
        warn!("No timestamp markers found; transcript yields no segments");
    }

    let mut segments = Vec::with_capacity(markers.len());
    for (i, caps) in markers.iter().enumerate() {
        let Some(whole) = caps.get(0) else { continue };
        let end_offset = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());

        let start = parse_seconds(caps.get(1).map(|m| m.as_str()));
        let end = parse_seconds(caps.get(2).map(|m| m.as_str()));

        segments.push(Segment {
            start,
            end,
            raw_text: text[whole.start()..end_offset].trim().to_string(),
        });
    }

    let malformed = segments.iter().filter(|s| !s.is_well_formed()).count();
    if malformed > 0 {
        debug!("{} segments have an empty or inverted time range", malformed);
    }

    Ok(segments)
}

fn parse_seconds(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(0.0)
}
