use tracing::debug;

use crate::{Result, VisionError};

/// Returned by [`classify`] when no class clears the threshold.
pub const NO_CLASS: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScore {
    pub index: usize,
    pub score: f32,
}

/// Index of the best score if it is strictly above `threshold`, else [`NO_CLASS`].
pub fn classify(scores: &[f32], threshold: f32) -> Result<i32> {
    match decide(scores, threshold)? {
        Some(c) => i32::try_from(c.index)
            .map_err(|_| VisionError::invalid(format!("class index {} overflows i32", c.index))),
        None => Ok(NO_CLASS),
    }
}

pub fn decide(scores: &[f32], threshold: f32) -> Result<Option<ClassScore>> {
    ensure_finite(scores)?;
    let best = argmax(scores).ok_or_else(|| VisionError::invalid("empty score vector"))?;
    debug!("classify: max index={} value={}", best.index, best.score);
    if best.score > threshold { Ok(Some(best)) } else { Ok(None) }
}

fn ensure_finite(scores: &[f32]) -> Result<()> {
    match scores.iter().position(|s| !s.is_finite()) {
        Some(i) => Err(VisionError::invalid(format!("score {} is not finite ({})", i, scores[i]))),
        None => Ok(()),
    }
}

// First maximum wins: later equal scores do not replace it.
fn argmax(scores: &[f32]) -> Option<ClassScore> {
    let (&first, rest) = scores.split_first()?;
    let mut best = ClassScore { index: 0, score: first };
    for (i, &s) in rest.iter().enumerate() {
        if s > best.score {
            best = ClassScore { index: i + 1, score: s };
        }
    }
    Some(best)
}

/// Numerically stable softmax over raw logits.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Classifier with a fixed threshold, as configured for a deployment.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdClassifier {
    pub threshold: f32,
    pub softmax: bool,
}

impl ThresholdClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold, softmax: false }
    }

    pub fn with_softmax(mut self, on: bool) -> Self {
        self.softmax = on;
        self
    }

    pub fn classify(&self, scores: &[f32]) -> Result<i32> {
        ensure_finite(scores)?;
        if self.softmax { classify(&softmax(scores), self.threshold) } else { classify(scores, self.threshold) }
    }

    pub fn decide(&self, scores: &[f32]) -> Result<Option<ClassScore>> {
        ensure_finite(scores)?;
        if self.softmax { decide(&softmax(scores), self.threshold) } else { decide(scores, self.threshold) }
    }
}
