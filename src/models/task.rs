use serde::{Deserialize, Serialize};

use super::AnnotatedSentence;

/// A teaching activity inside a task (explanation, Q&A, transition, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNode {
    pub event_type: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sentences: Vec<AnnotatedSentence>,
}

/// A teaching module; the top level of the final hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    #[serde(rename = "task_title")]
    pub title: String,
    #[serde(default)]
    pub events: Vec<EventNode>,
}

impl TaskNode {
    pub fn sentence_count(&self) -> usize {
        self.events.iter().map(|e| e.sentences.len()).sum()
    }

    /// All sentences in tree order
    pub fn sentences(&self) -> impl Iterator<Item = &AnnotatedSentence> {
        self.events.iter().flat_map(|e| e.sentences.iter())
    }
}

/// Total number of sentences across a task sequence
pub fn count_sentences(tasks: &[TaskNode]) -> usize {
    tasks.iter().map(TaskNode::sentence_count).sum()
}
