use std::fmt;

use serde::{Deserialize, Serialize};

use super::Segment;

/// Which pass a unit of work belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// First pass: segments annotated into flat sentences
    Batch,
    /// Second pass: sentences grouped into tasks and events
    Window,
}

impl UnitKind {
    /// Stem used for artifact file names
    pub fn file_stem(&self) -> &'static str {
        match self {
            UnitKind::Batch => "batch",
            UnitKind::Window => "task_chunk",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Batch => write!(f, "batch"),
            UnitKind::Window => write!(f, "window"),
        }
    }
}

/// Processing state of one batch or window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    /// A validated payload is on disk; `resumed` is true when it predates this run
    Complete { resumed: bool },
    /// Retry budget spent without a usable payload
    Exhausted,
}

impl UnitStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, UnitStatus::Complete { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, UnitStatus::Pending)
    }
}

/// A contiguous group of segments sent together in the first pass
#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    pub segments: Vec<Segment>,
}

impl Batch {
    pub fn new(index: usize, segments: Vec<Segment>) -> Self {
        Self { index, segments }
    }

    /// 1-based label used in logs and file names
    pub fn label(&self) -> usize {
        self.index + 1
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_kind_names() {
        assert_eq!(UnitKind::Batch.file_stem(), "batch");
        assert_eq!(UnitKind::Window.file_stem(), "task_chunk");
        assert_eq!(UnitKind::Window.to_string(), "window");
    }

    #[test]
    fn test_batch_label_and_status() {
        let batch = Batch::new(4, vec![]);
        assert_eq!(batch.label(), 5);
        assert!(UnitStatus::Pending.is_pending());
        assert!(!UnitStatus::Exhausted.is_complete());
        assert!(UnitStatus::Complete { resumed: true }.is_complete());
    }
}
