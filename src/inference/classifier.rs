use super::FaceTensor;
use crate::errors::InferenceError;

/// Produces one score per label for a preprocessed face
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, input: &FaceTensor) -> Result<Vec<f32>, InferenceError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the highest score
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .cloned()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

/// Deterministic classifier for development and tests
///
/// Without a fixed answer the winning class follows the mean brightness of
/// the face, so different frames give different labels.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    classes: usize,
    fixed: Option<(usize, f32)>,
}

/// Score of the winning class in brightness mode
const MOCK_CONFIDENCE: f32 = 0.7;

impl MockClassifier {
    pub fn new(classes: usize) -> Self {
        Self { classes, fixed: None }
    }

    /// Always answer `index` with `confidence`
    pub fn fixed(classes: usize, index: usize, confidence: f32) -> Self {
        Self {
            classes,
            fixed: Some((index, confidence.clamp(0.0, 1.0))),
        }
    }

    fn distribution(&self, winner: usize, confidence: f32) -> Vec<f32> {
        if self.classes == 1 {
            return vec![1.0];
        }
        let rest = (1.0 - confidence) / (self.classes - 1) as f32;
        (0..self.classes)
            .map(|i| if i == winner { confidence } else { rest })
            .collect()
    }
}

impl EmotionClassifier for MockClassifier {
    fn classify(&self, input: &FaceTensor) -> Result<Vec<f32>, InferenceError> {
        if self.classes == 0 {
            return Err(InferenceError::Classifier("no classes configured".to_string()));
        }
        if input.data.is_empty() {
            return Err(InferenceError::Classifier("empty input tensor".to_string()));
        }

        let (winner, confidence) = match self.fixed {
            Some((index, confidence)) => (index.min(self.classes - 1), confidence),
            None => {
                let index = (input.mean() * self.classes as f32) as usize;
                (index.min(self.classes - 1), MOCK_CONFIDENCE)
            }
        };

        Ok(self.distribution(winner, confidence))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
