use anyhow::Result;

use crate::frame::{Frame, Orientation};

/// One ranked classification candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub identifier: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

impl Candidate {
    pub fn new(identifier: impl Into<String>, confidence: f64) -> Self {
        Self {
            identifier: identifier.into(),
            confidence,
        }
    }
}

/// Image classifier.
///
/// `classify` runs synchronously on the inference worker and may be slow.
/// On success it returns candidates ordered best first; callers only rely on
/// the first entry.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Classify one frame. `orientation` tells the backend how the buffer is
    /// oriented relative to upright.
    fn classify(&mut self, frame: &Frame, orientation: Orientation) -> Result<Vec<Candidate>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sort best first and keep at most `top_k` candidates.
pub fn rank(mut candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    candidates.truncate(top_k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_orders_and_truncates() {
        let ranked = rank(
            vec![
                Candidate::new("dog", 0.05),
                Candidate::new("cat", 0.92),
                Candidate::new("fox", 0.03),
            ],
            2,
        );
        assert_eq!(
            ranked,
            vec![Candidate::new("cat", 0.92), Candidate::new("dog", 0.05)]
        );
    }
}
