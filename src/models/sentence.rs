use serde::{Deserialize, Serialize};

/// Teacher/student attribution produced by the model for one sentence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeakerProbabilities {
    pub teacher: f64,
    pub student: f64,
}

impl SpeakerProbabilities {
    /// Sum of both probabilities (1.0 for a well-formed pair)
    pub fn sum(&self) -> f64 {
        self.teacher + self.student
    }

    /// Whether both values lie in [0, 1] and add up to 1 within `tolerance`
    pub fn is_consistent(&self, tolerance: f64) -> bool {
        let in_range = |p: f64| p.is_finite() && (0.0..=1.0).contains(&p);
        in_range(self.teacher) && in_range(self.student) && (self.sum() - 1.0).abs() <= tolerance
    }

    /// Clamp to [0, 1] and rescale so the pair sums to 1.
    /// A pair with nothing left after clamping becomes an even split.
    pub fn normalized(&self) -> Self {
        let clamp = |p: f64| if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
        let teacher = clamp(self.teacher);
        let student = clamp(self.student);
        let total = teacher + student;
        if total <= f64::EPSILON {
            return Self {
                teacher: 0.5,
                student: 0.5,
            };
        }
        Self {
            teacher: teacher / total,
            student: student / total,
        }
    }
}

/// A segment after correction and speaker attribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSentence {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker_probabilities: SpeakerProbabilities,
}

/// Identity of a sentence across overlapping windows, in whole milliseconds
pub type SentenceKey = (i64, i64);

impl AnnotatedSentence {
    pub fn key(&self) -> SentenceKey {
        (
            (self.start * 1000.0).round() as i64,
            (self.end * 1000.0).round() as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sentence() {
        let json = r#"{
            "start": 0.0,
            "end": 4.0,
            "text": "Good morning everyone",
            "speaker_probabilities": {"teacher": 1.0, "student": 0.0}
        }"#;

        let sentence: AnnotatedSentence = serde_json::from_str(json).unwrap();
        assert_eq!(sentence.text, "Good morning everyone");
        assert_eq!(sentence.speaker_probabilities.teacher, 1.0);
        assert_eq!(sentence.key(), (0, 4000));
    }

    #[test]
    fn test_normalize_invalid_sum() {
        let probs = SpeakerProbabilities {
            teacher: 0.7,
            student: 0.4,
        };
        assert!(!probs.is_consistent(0.01));

        let fixed = probs.normalized();
        assert!(fixed.is_consistent(1e-9));
        assert!((fixed.teacher - 0.7 / 1.1).abs() < 1e-9);
        assert!((fixed.student - 0.4 / 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_clamps_and_splits_zero() {
        let probs = SpeakerProbabilities {
            teacher: 1.4,
            student: -0.2,
        };
        assert_eq!(
            probs.normalized(),
            SpeakerProbabilities {
                teacher: 1.0,
                student: 0.0
            }
        );

        let zero = SpeakerProbabilities {
            teacher: 0.0,
            student: f64::NAN,
        };
        assert_eq!(
            zero.normalized(),
            SpeakerProbabilities {
                teacher: 0.5,
                student: 0.5
            }
        );
    }
}
