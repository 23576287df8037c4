//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::llm::{CompletionRequest, CompletionService};
use crate::models::{AnnotatedSentence, Segment, SpeakerProbabilities};

/// Completion service that replays a fixed script of responses.
/// Once the script runs out every call fails as a transient error.
pub struct ScriptedService {
    script: Mutex<VecDeque<Result<String>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    systems: Mutex<Vec<Option<String>>>,
}

impl ScriptedService {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            systems: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn systems(&self) -> Vec<Option<String>> {
        self.systems.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.user.clone());
        self.systems.lock().unwrap().push(request.system.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::TransientCall("script exhausted".into())))
    }
}

/// `count` one-second segments starting at 0.0s
pub fn segments(count: usize) -> Vec<Segment> {
    (0..count)
        .map(|i| {
            let start = i as f64;
            Segment {
                start,
                end: start + 1.0,
                raw_text: format!("{:.1}s - {:.1}s: segment {}", start, start + 1.0, i),
            }
        })
        .collect()
}

/// A one-second, teacher-leaning sentence starting at `start`
pub fn sentence(start: f64) -> AnnotatedSentence {
    AnnotatedSentence {
        start,
        end: start + 1.0,
        text: format!("sentence at {}", start),
        speaker_probabilities: SpeakerProbabilities {
            teacher: 0.75,
            student: 0.25,
        },
    }
}

pub fn sentence_json(start: f64) -> String {
    serde_json::to_string(&sentence(start)).unwrap()
}
