use anyhow::{anyhow, Result};

use crate::classify::backend::{rank, Candidate, Classifier};
use crate::frame::{Frame, Orientation};

const DEFAULT_LABELS: [&str; 5] = [
    "dark scene",
    "dim scene",
    "balanced scene",
    "bright scene",
    "overexposed scene",
];

/// Stub backend for testing and demos.
///
/// Splits the luma range into one band per label and scores each label by the
/// fraction of pixels falling into its band. Deterministic, no model file.
pub struct StubClassifier {
    labels: Vec<String>,
    top_k: usize,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self::with_labels(DEFAULT_LABELS.iter().map(|l| l.to_string()).collect())
    }

    pub fn with_labels(labels: Vec<String>) -> Self {
        let top_k = labels.len();
        Self { labels, top_k }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, frame: &Frame, _orientation: Orientation) -> Result<Vec<Candidate>> {
        if self.labels.is_empty() {
            return Err(anyhow!("stub classifier has no labels"));
        }
        let luma = frame.luma()?;
        let bands = self.labels.len();
        let mut histogram = vec![0u64; bands];
        for &y in &luma {
            histogram[(y as usize * bands) / 256] += 1;
        }
        let total = luma.len().max(1) as f64;
        let candidates = self
            .labels
            .iter()
            .zip(&histogram)
            .map(|(label, &count)| Candidate::new(label.clone(), count as f64 / total))
            .collect();
        Ok(rank(candidates, self.top_k))
    }
}
