/*!
 * ONNX Runtime classifier backend.
 */

use log::{error, info};
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::Path;

use super::classifier::{softmax, EmotionClassifier};
use super::FaceTensor;
use crate::errors::InferenceError;

/// Emotion classifier running an ONNX model with NHWC grayscale input
pub struct OnnxClassifier {
    // Session::run needs &mut
    session: Mutex<Session>,
    apply_softmax: bool,
}

impl OnnxClassifier {
    /// Load a model file
    pub fn load(model_path: &Path, apply_softmax: bool) -> Result<Self, InferenceError> {
        let session = Session::builder()
            .map_err(|e| InferenceError::ModelLoad(format!("Failed to create session builder: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                error!("Failed to load ONNX model: {}", e);
                InferenceError::ModelLoad(format!("ONNX model load failed: {e}"))
            })?;

        info!("Loaded ONNX model from {:?}", model_path);

        Ok(Self {
            session: Mutex::new(session),
            apply_softmax,
        })
    }
}

impl EmotionClassifier for OnnxClassifier {
    fn classify(&self, input: &FaceTensor) -> Result<Vec<f32>, InferenceError> {
        let [n, h, w, c] = input.shape();
        let array = ndarray::Array4::from_shape_vec((n, h, w, c), input.data.clone())
            .map_err(|e| InferenceError::Classifier(format!("Failed to create input array: {e}")))?;
        let tensor = Value::from_array(array)
            .map_err(|e| InferenceError::Classifier(format!("Failed to create input tensor: {e}")))?;

        let scores = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![tensor]).map_err(|e| {
                error!("ONNX inference failed: {}", e);
                InferenceError::Classifier(format!("Inference failed: {e}"))
            })?;

            let (_, output) = outputs
                .iter()
                .next()
                .ok_or_else(|| InferenceError::Classifier("No output from model".to_string()))?;

            let (_, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::Classifier(format!("Failed to extract output tensor: {e}")))?;
            data.to_vec()
        };

        if self.apply_softmax {
            Ok(softmax(&scores))
        } else {
            Ok(scores)
        }
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
