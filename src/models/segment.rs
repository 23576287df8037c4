use serde::{Deserialize, Serialize};

/// One timestamped unit of the raw transcript, before annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds, as written in the marker
    pub start: f64,
    /// End time in seconds, as written in the marker
    pub end: f64,
    /// Full segment text including its `start - end:` marker and any continuation lines
    pub raw_text: String,
}

impl Segment {
    /// Whether the marker describes a non-empty time range
    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }
}

/// Join segments back into the line-oriented form the annotation prompt expects
pub fn join_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.raw_text.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_well_formed() {
        let segment = Segment {
            start: 1.5,
            end: 4.0,
            raw_text: "1.5s - 4.0s: hello".to_string(),
        };
        assert!(segment.is_well_formed());

        let inverted = Segment {
            start: 4.0,
            end: 1.5,
            raw_text: "4.0s - 1.5s: hello".to_string(),
        };
        assert!(!inverted.is_well_formed());
    }

    #[test]
    fn test_join_segments() {
        let segments = vec![
            Segment {
                start: 0.0,
                end: 1.0,
                raw_text: "0.0s - 1.0s: a\n".to_string(),
            },
            Segment {
                start: 1.0,
                end: 2.0,
                raw_text: "1.0s - 2.0s: b".to_string(),
            },
        ];
        assert_eq!(join_segments(&segments), "0.0s - 1.0s: a\n1.0s - 2.0s: b");
    }
}
