/*!
 * Facial emotion inference.
 *
 * A frame travels through the pipeline in this order:
 * - `frame`: payload decoding and grayscale loading
 * - `detector`: face detection and region selection
 * - `preprocess`: crop, resize and normalization into a model tensor
 * - `classifier`: score computation (mock or ONNX Runtime)
 * - `predictor`: orchestration and the async `FrameAnalyzer` seam
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::InferenceError;

pub mod classifier;
pub mod detector;
pub mod frame;
pub mod labels;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod predictor;
pub mod preprocess;

pub use classifier::{EmotionClassifier, MockClassifier};
pub use detector::{CenterCropDetector, FaceDetector};
pub use labels::EmotionLabels;
pub use predictor::EmotionPredictor;

/// Axis-aligned face rectangle in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Largest square centred in a `width` x `height` image
    pub fn centered_square(width: u32, height: u32) -> Self {
        let side = width.min(height);
        Self {
            x: width / 2 - side / 2,
            y: height / 2 - side / 2,
            width: side,
            height: side,
        }
    }

    /// Clip the box to the image bounds, `None` if nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clipped = Self {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        };
        (clipped.width > 0 && clipped.height > 0).then_some(clipped)
    }
}

/// Model input: a normalized grayscale square in NHWC layout
#[derive(Debug, Clone, PartialEq)]
pub struct FaceTensor {
    /// Side length in pixels
    pub size: u32,
    /// Row-major pixels scaled to [0, 1]
    pub data: Vec<f32>,
}

impl FaceTensor {
    /// `(batch, height, width, channels)`
    pub fn shape(&self) -> [usize; 4] {
        let side = self.size as usize;
        [1, side, side, 1]
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}

/// Result of classifying one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Winning label
    pub emotion: String,
    /// Score of the winning label
    pub confidence: f32,
    /// Region that was classified
    pub face: FaceBox,
    /// False when the centre-crop fallback was used
    pub face_detected: bool,
    /// Score per label
    pub scores: BTreeMap<String, f32>,
}

/// Anything that turns encoded image bytes into a prediction
///
/// The relay and the HTTP layer only see this trait, so tests can swap in a
/// scripted analyzer.
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    /// Classify one encoded image (JPEG or PNG)
    async fn analyze(&self, image: Vec<u8>) -> Result<Prediction, InferenceError>;

    /// Largest accepted frame in bytes
    fn max_frame_bytes(&self) -> usize;
}
