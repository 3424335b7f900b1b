use async_trait::async_trait;
use image::GrayImage;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::classifier::{argmax, EmotionClassifier, MockClassifier};
use super::detector::{select_face_region, CenterCropDetector, FaceDetector};
use super::frame::{check_frame_size, load_grayscale};
use super::labels::EmotionLabels;
use super::preprocess::preprocess;
use super::{FrameAnalyzer, Prediction};
use crate::app_config::{DetectorKind, InferenceBackend, InferenceConfig};
use crate::errors::InferenceError;

/// Tunables of the prediction pipeline
#[derive(Debug, Clone, Copy)]
pub struct PredictorSettings {
    pub input_size: u32,
    pub fallback_center_crop: bool,
    pub max_frame_bytes: usize,
}

impl From<&InferenceConfig> for PredictorSettings {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            input_size: config.input_size,
            fallback_center_crop: config.fallback_center_crop,
            max_frame_bytes: config.max_frame_bytes,
        }
    }
}

struct PredictorInner {
    detector: Box<dyn FaceDetector>,
    classifier: Box<dyn EmotionClassifier>,
    labels: EmotionLabels,
    settings: PredictorSettings,
}

/// Detect, preprocess and classify frames
///
/// Cheap to clone; clones share the loaded detector and model.
#[derive(Clone)]
pub struct EmotionPredictor {
    inner: Arc<PredictorInner>,
}

impl std::fmt::Debug for EmotionPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmotionPredictor")
            .field("detector", &self.inner.detector.name())
            .field("classifier", &self.inner.classifier.name())
            .field("labels", &self.inner.labels.len())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl EmotionPredictor {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        classifier: Box<dyn EmotionClassifier>,
        labels: EmotionLabels,
        settings: PredictorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(PredictorInner {
                detector,
                classifier,
                labels,
                settings,
            }),
        }
    }

    /// Build the detector and classifier selected in the configuration
    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let labels = EmotionLabels::load(&config.labels_path)?;
        let detector = build_detector(config)?;
        let classifier = build_classifier(config, &labels)?;

        info!(
            "Emotion predictor ready: detector={}, classifier={}, {} labels, input {}x{}",
            detector.name(),
            classifier.name(),
            labels.len(),
            config.input_size,
            config.input_size
        );

        Ok(Self::new(detector, classifier, labels, PredictorSettings::from(config)))
    }

    pub fn labels(&self) -> &EmotionLabels {
        &self.inner.labels
    }

    pub fn settings(&self) -> PredictorSettings {
        self.inner.settings
    }

    /// Classify encoded image bytes
    pub fn predict(&self, bytes: &[u8]) -> Result<Prediction, InferenceError> {
        check_frame_size(bytes.len(), self.inner.settings.max_frame_bytes)?;
        let gray = load_grayscale(bytes)?;
        self.predict_gray(&gray)
    }

    /// Classify an already decoded grayscale image
    pub fn predict_gray(&self, gray: &GrayImage) -> Result<Prediction, InferenceError> {
        let inner = &self.inner;
        let (width, height) = gray.dimensions();

        let faces = inner.detector.detect(gray)?;
        let (region, face_detected) =
            select_face_region(&faces, width, height, inner.settings.fallback_center_crop)?;

        let tensor = preprocess(gray, region, inner.settings.input_size);
        let scores = inner.classifier.classify(&tensor)?;

        if scores.len() != inner.labels.len() {
            return Err(InferenceError::LabelMismatch {
                expected: inner.labels.len(),
                actual: scores.len(),
            });
        }

        let (index, confidence) = argmax(&scores)
            .ok_or_else(|| InferenceError::Classifier("model returned no scores".to_string()))?;
        let emotion = inner
            .labels
            .get(index)
            .ok_or_else(|| InferenceError::Classifier(format!("no label for index {}", index)))?
            .to_string();

        debug!(
            "Predicted {} ({:.3}) from {} faces, region {:?}",
            emotion,
            confidence,
            faces.len(),
            region
        );

        Ok(Prediction {
            emotion,
            confidence,
            face: region,
            face_detected,
            scores: inner
                .labels
                .names()
                .iter()
                .cloned()
                .zip(scores.iter().cloned())
                .collect::<BTreeMap<_, _>>(),
        })
    }
}

#[async_trait]
impl FrameAnalyzer for EmotionPredictor {
    async fn analyze(&self, image: Vec<u8>) -> Result<Prediction, InferenceError> {
        let predictor = self.clone();
        tokio::task::spawn_blocking(move || predictor.predict(&image))
            .await
            .map_err(|e| InferenceError::Task(e.to_string()))?
    }

    fn max_frame_bytes(&self) -> usize {
        self.inner.settings.max_frame_bytes
    }
}

fn build_detector(config: &InferenceConfig) -> Result<Box<dyn FaceDetector>, InferenceError> {
    match config.detector {
        DetectorKind::CenterCrop => Ok(Box::new(CenterCropDetector)),
        #[cfg(feature = "opencv")]
        DetectorKind::HaarCascade => Ok(Box::new(super::detector::HaarCascadeDetector::load(
            &config.cascade_path,
        )?)),
        #[cfg(not(feature = "opencv"))]
        DetectorKind::HaarCascade => Err(InferenceError::ModelLoad(
            "haar_cascade detector requires the `opencv` feature".to_string(),
        )),
    }
}

fn build_classifier(
    config: &InferenceConfig,
    labels: &EmotionLabels,
) -> Result<Box<dyn EmotionClassifier>, InferenceError> {
    match config.backend {
        InferenceBackend::Mock => Ok(Box::new(MockClassifier::new(labels.len()))),
        #[cfg(feature = "onnx")]
        InferenceBackend::Onnx => Ok(Box::new(super::onnx::OnnxClassifier::load(
            &config.model_path,
            config.apply_softmax,
        )?)),
        #[cfg(not(feature = "onnx"))]
        InferenceBackend::Onnx => Err(InferenceError::ModelLoad(
            "onnx backend requires the `onnx` feature".to_string(),
        )),
    }
}
