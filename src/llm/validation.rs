use std::collections::HashSet;

use crate::error::{PipelineError, Result};
use crate::models::{AnnotatedSentence, SentenceKey, TaskNode, Window};

/// What to do with speaker probabilities that are out of range or do not sum to 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProbabilityPolicy {
    /// Treat the whole payload as malformed so the unit is retried
    Reject,
    /// Clamp to [0, 1] and rescale to sum 1
    #[default]
    Normalize,
    /// Keep the model's values, logging each inconsistency
    PassThrough,
}

/// Configuration for payload validation
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub probability_policy: ProbabilityPolicy,
    /// Drop sentences whose corrected text is empty
    pub drop_empty_text: bool,
    /// Allowed deviation of teacher + student from 1.0
    pub tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            probability_policy: ProbabilityPolicy::Normalize,
            drop_empty_text: true,
            tolerance: 0.01,
        }
    }
}

/// A payload that passed validation, with any corrections applied
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub value: T,
    /// Human-readable notes about corrections and suspicious content
    pub notes: Vec<String>,
}

/// Validate a first-pass payload
pub fn validate_sentences(
    sentences: Vec<AnnotatedSentence>,
    config: &ValidationConfig,
) -> Result<Validated<Vec<AnnotatedSentence>>> {
    let mut notes = Vec::new();
    let mut kept = Vec::with_capacity(sentences.len());
    let mut previous_start = f64::NEG_INFINITY;

    for (i, mut sentence) in sentences.into_iter().enumerate() {
        check_times(&sentence, i)?;

        if sentence.start < previous_start {
            return Err(PipelineError::MalformedPayload(format!(
                "sentence {} starts at {}s, before the previous sentence ({}s)",
                i, sentence.start, previous_start
            )));
        }
        previous_start = sentence.start;

        if config.drop_empty_text && sentence.text.trim().is_empty() {
            notes.push(format!("dropped empty sentence at {}s", sentence.start));
            continue;
        }

        apply_probability_policy(&mut sentence, config, &mut notes)?;
        kept.push(sentence);
    }

    Ok(Validated { value: kept, notes })
}

/// Validate a hierarchical payload produced for `window`
pub fn validate_tasks(
    mut tasks: Vec<TaskNode>,
    window: &Window,
    config: &ValidationConfig,
) -> Result<Validated<Vec<TaskNode>>> {
    let mut notes = Vec::new();
    let known: HashSet<SentenceKey> = window.sentences.iter().map(|s| s.key()).collect();
    let mut unknown = 0;

    for (t, task) in tasks.iter_mut().enumerate() {
        if task.title.trim().is_empty() {
            notes.push(format!("task {} has no title", t));
        }
        for event in &mut task.events {
            for (i, sentence) in event.sentences.iter_mut().enumerate() {
                check_times(sentence, i)?;
                apply_probability_policy(sentence, config, &mut notes)?;
                if !known.contains(&sentence.key()) {
                    unknown += 1;
                }
            }
        }
    }

    if unknown > 0 {
        notes.push(format!(
            "{} sentences do not match any input sentence by timestamp",
            unknown
        ));
    }

    Ok(Validated { value: tasks, notes })
}

fn check_times(sentence: &AnnotatedSentence, position: usize) -> Result<()> {
    if !sentence.start.is_finite() || !sentence.end.is_finite() {
        return Err(PipelineError::MalformedPayload(format!(
            "sentence {} has a non-finite timestamp",
            position
        )));
    }
    if sentence.start > sentence.end {
        return Err(PipelineError::MalformedPayload(format!(
            "sentence {} ends ({}s) before it starts ({}s)",
            position, sentence.end, sentence.start
        )));
    }
    Ok(())
}

fn apply_probability_policy(
    sentence: &mut AnnotatedSentence,
    config: &ValidationConfig,
    notes: &mut Vec<String>,
) -> Result<()> {
    let probs = sentence.speaker_probabilities;
    if probs.is_consistent(config.tolerance) {
        return Ok(());
    }

    match config.probability_policy {
        ProbabilityPolicy::Reject => Err(PipelineError::MalformedPayload(format!(
            "speaker probabilities at {}s are inconsistent (teacher={}, student={})",
            sentence.start, probs.teacher, probs.student
        ))),
        ProbabilityPolicy::Normalize => {
            sentence.speaker_probabilities = probs.normalized();
            notes.push(format!(
                "normalized speaker probabilities at {}s (sum was {:.2})",
                sentence.start,
                probs.sum()
            ));
            Ok(())
        }
        ProbabilityPolicy::PassThrough => {
            notes.push(format!(
                "kept inconsistent speaker probabilities at {}s (sum {:.2})",
                sentence.start,
                probs.sum()
            ));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventNode, SpeakerProbabilities};

    fn sentence(start: f64, teacher: f64, student: f64) -> AnnotatedSentence {
        AnnotatedSentence {
            start,
            end: start + 2.0,
            text: "text".to_string(),
            speaker_probabilities: SpeakerProbabilities { teacher, student },
        }
    }

    fn config(policy: ProbabilityPolicy) -> ValidationConfig {
        ValidationConfig {
            probability_policy: policy,
            ..Default::default()
        }
    }

    #[test]
    fn test_probability_policy_reject() {
        let result = validate_sentences(
            vec![sentence(0.0, 0.7, 0.4)],
            &config(ProbabilityPolicy::Reject),
        );
        assert!(matches!(result, Err(PipelineError::MalformedPayload(_))));
    }

    #[test]
    fn test_probability_policy_normalize() {
        let result = validate_sentences(
            vec![sentence(0.0, 0.7, 0.4)],
            &config(ProbabilityPolicy::Normalize),
        )
        .unwrap();
        let probs = result.value[0].speaker_probabilities;
        assert!((probs.sum() - 1.0).abs() < 1e-9);
        assert!(probs.teacher > probs.student);
        assert_eq!(result.notes.len(), 1);
    }

    #[test]
    fn test_probability_policy_pass_through() {
        let result = validate_sentences(
            vec![sentence(0.0, 0.7, 0.4)],
            &config(ProbabilityPolicy::PassThrough),
        )
        .unwrap();
        assert_eq!(result.value[0].speaker_probabilities.teacher, 0.7);
        assert_eq!(result.value[0].speaker_probabilities.student, 0.4);
        assert!(result.notes[0].contains("kept inconsistent"));
    }

    #[test]
    fn test_consistent_sentences_untouched() {
        let input = vec![sentence(0.0, 0.9, 0.1), sentence(2.0, 0.2, 0.8)];
        let result = validate_sentences(input.clone(), &ValidationConfig::default()).unwrap();
        assert_eq!(result.value, input);
        assert!(result.notes.is_empty());
    }

    #[test]
    fn test_reordered_sentences_rejected() {
        let result = validate_sentences(
            vec![sentence(5.0, 1.0, 0.0), sentence(1.0, 1.0, 0.0)],
            &ValidationConfig::default(),
        );
        assert!(matches!(result, Err(PipelineError::MalformedPayload(_))));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut bad = sentence(3.0, 1.0, 0.0);
        bad.end = 1.0;
        assert!(validate_sentences(vec![bad], &ValidationConfig::default()).is_err());
    }

    #[test]
    fn test_empty_text_dropped() {
        let mut empty = sentence(2.0, 1.0, 0.0);
        empty.text = "   ".to_string();
        let result =
            validate_sentences(vec![sentence(0.0, 1.0, 0.0), empty], &ValidationConfig::default())
                .unwrap();
        assert_eq!(result.value.len(), 1);
    }

    #[test]
    fn test_validate_tasks_counts_unknown_sentences() {
        let window = Window {
            index: 0,
            start: 0,
            end: 1,
            overlap: 0,
            sentences: vec![sentence(0.0, 1.0, 0.0)],
        };
        let tasks = vec![TaskNode {
            title: "Intro".to_string(),
            events: vec![EventNode {
                event_type: "Lecture".to_string(),
                summary: String::new(),
                sentences: vec![sentence(0.0, 0.7, 0.4), sentence(9.0, 1.0, 0.0)],
            }],
        }];

        let result = validate_tasks(tasks, &window, &ValidationConfig::default()).unwrap();
        let probs = result.value[0].events[0].sentences[0].speaker_probabilities;
        assert!((probs.sum() - 1.0).abs() < 1e-9);
        assert!(result.notes.iter().any(|n| n.contains("1 sentences do not match")));
    }
}
