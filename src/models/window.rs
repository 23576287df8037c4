use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::{AnnotatedSentence, SentenceKey};

/// Configuration for window generation over the flat sentence sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Sentences per window, including the leading overlap
    pub window_size: usize,
    /// Sentences repeated from the previous window as context
    pub overlap: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: 300,
            overlap: 30,
        }
    }
}

/// An overlapping slice of annotated sentences sent to the hierarchical pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    pub index: usize,
    /// Global index of the first sentence (including overlap)
    pub start: usize,
    /// Global index one past the last sentence
    pub end: usize,
    /// Number of leading sentences shared with the previous window
    pub overlap: usize,
    pub sentences: Vec<AnnotatedSentence>,
}

impl Window {
    /// Global index range covered by this window
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Identity of the sentences this window was built from
    pub fn stamp(&self) -> WindowStamp {
        WindowStamp {
            range: self.range(),
            keys: self.sentences.iter().map(AnnotatedSentence::key).collect(),
        }
    }

    /// 1-based label used in logs and file names
    pub fn label(&self) -> usize {
        self.index + 1
    }
}

/// Stored next to a window payload. A payload whose stamp no longer matches
/// the planned window was built from other sentences and must be redone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStamp {
    pub range: Range<usize>,
    pub keys: Vec<SentenceKey>,
}
