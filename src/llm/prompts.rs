use crate::models::{AnnotatedSentence, Segment, join_segments};

const TRANSCRIPT_PLACEHOLDER: &str = "<<<TRANSCRIPT>>>";

/// First-pass prompt; `<<<TRANSCRIPT>>>` is replaced with the batch text
pub const ANNOTATION_TEMPLATE: &str = r#"You are a transcript correction assistant for classroom recordings. You fix speech-to-text errors and estimate who spoke each sentence.

The transcript arrives one sentence per line in this format:

start - end: original text

For every line:

1. Correct recognition errors (homophones, mangled terminology, repeated words, bad sentence breaks, typos) so the sentence reads as natural speech. Keep the teaching content and the original language.
2. Do NOT change the time range. Copy start and end exactly as numbers in seconds.
3. Estimate whether the sentence was spoken by the teacher or by a student, as probabilities "teacher" and "student" that sum to 1.
<<<NOISE_RULES>>>
Output a strict JSON array. Each item has:
  - start
  - end
  - text (the corrected sentence)
  - speaker_probabilities (with teacher and student)

Output JSON only. No explanations, no status messages. Keep the items in the same order as the input lines.

Example:

[
  {
    "start": 0.0,
    "end": 4.0,
    "text": "Class, we live in a world full of sound and light.",
    "speaker_probabilities": {
      "teacher": 1.0,
      "student": 0.0
    }
  }
]

Here is the transcript to process:
<<<TRANSCRIPT>>>
"#;

const NOISE_RULES: &str = r#"4. Important rules:
   - Delete sentences that are only meaningless repetition or noise (a single repeated syllable, "oh oh oh", "ah ah ah").
   - Delete sentences that are recording noise or bare fillers ("um", "uh", "hm", "ah") with no recoverable teaching content.
   - Everything you keep must be readable, meaningful classroom speech.
"#;

/// Second-pass system prompt
pub const HIERARCHY_SYSTEM_PROMPT: &str = r#"You are a teaching content analyst. You organize classroom transcript sentences into a three-level JSON structure:

1. Task: a teaching task, a natural module of the lesson. A lesson usually has 3 to 5 tasks.
2. Event: a teaching activity inside a task, such as "teacher explanation", "student question and answer", "transition", "class discussion" or "experiment observation".
3. Sentences: the timestamped sentences belonging to the event, with their speaker probabilities.

If the first sentences continue the task or event that the previous part of the lesson ended with, continue that task and event with the same title and type instead of inventing a new one.

Output strictly this JSON shape:

[
  {
    "task_title": "Task title summarizing the module",
    "events": [
      {
        "event_type": "Event type, e.g. teacher explanation",
        "summary": "One-sentence summary of the activity",
        "sentences": [
          { "start": 0.0, "end": 4.0, "text": "...", "speaker_probabilities": {"teacher": 1.0, "student": 0.0} }
        ]
      }
    ]
  }
]

Rules:
- Split tasks and events by meaning, never by fixed length or fixed time.
- Event types must be specific; never use "unknown" or "other".
- Keep every sentence's timestamps, text and speaker probabilities exactly as given, in the given order.
- Every event covers a contiguous run of sentences.
- Output only the JSON, with no explanation or comments."#;

/// Render the first-pass prompt for a batch of segments
pub fn build_annotation_prompt(segments: &[Segment], noise_filtering: bool) -> String {
    let noise_rules = if noise_filtering { NOISE_RULES } else { "" };
    ANNOTATION_TEMPLATE
        .replace("<<<NOISE_RULES>>>\n", noise_rules)
        .replace(TRANSCRIPT_PLACEHOLDER, &join_segments(segments))
}

/// Render the second-pass user prompt for a window of sentences
pub fn build_hierarchy_prompt(sentences: &[AnnotatedSentence]) -> String {
    let json = serde_json::to_string_pretty(sentences).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Here are the lesson sentences (JSON array):\n\n```json\n{}\n```\n\nOrganize them into the three-level JSON structure, strictly following the required format.",
        json
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpeakerProbabilities;

    fn segment(start: f64, text: &str) -> Segment {
        Segment {
            start,
            end: start + 1.0,
            raw_text: format!("{:.1}s - {:.1}s: {}", start, start + 1.0, text),
        }
    }

    #[test]
    fn test_annotation_prompt_substitutes_transcript() {
        let prompt = build_annotation_prompt(&[segment(0.0, "hello"), segment(1.0, "again")], true);
        assert!(prompt.contains("0.0s - 1.0s: hello\n1.0s - 2.0s: again"));
        assert!(!prompt.contains(TRANSCRIPT_PLACEHOLDER));
        assert!(!prompt.contains("<<<NOISE_RULES>>>"));
        assert!(prompt.contains("Important rules"));
    }

    #[test]
    fn test_annotation_prompt_without_noise_rules() {
        let prompt = build_annotation_prompt(&[segment(0.0, "hello")], false);
        assert!(!prompt.contains("Important rules"));
        assert!(!prompt.contains("<<<NOISE_RULES>>>"));
    }

    #[test]
    fn test_hierarchy_prompt_embeds_sentences() {
        let sentences = vec![AnnotatedSentence {
            start: 0.0,
            end: 4.0,
            text: "Open your books".to_string(),
            speaker_probabilities: SpeakerProbabilities {
                teacher: 1.0,
                student: 0.0,
            },
        }];
        let prompt = build_hierarchy_prompt(&sentences);
        assert!(prompt.contains("```json\n["));
        assert!(prompt.contains("\"speaker_probabilities\""));
        assert!(prompt.contains("Open your books"));
    }
}
