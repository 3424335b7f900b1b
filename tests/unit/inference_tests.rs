/*!
 * Tests for the emotion prediction pipeline
 */

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use tempfile::TempDir;

use emotia::app_config::InferenceConfig;
use emotia::errors::InferenceError;
use emotia::inference::frame::decode_frame;
use emotia::inference::labels::DEFAULT_LABELS;
use emotia::inference::{EmotionPredictor, FrameAnalyzer};

use crate::common::image_bytes;

fn config_with_labels(dir: &TempDir, labels: &str) -> InferenceConfig {
    let path = dir.path().join("labels.json");
    std::fs::write(&path, labels).unwrap();
    InferenceConfig {
        labels_path: path,
        ..InferenceConfig::default()
    }
}

#[test]
fn test_predict_withJpegFrame_shouldReturnKnownLabel() {
    let predictor = EmotionPredictor::from_config(&InferenceConfig::default()).unwrap();
    let jpeg = image_bytes(320, 240, 90, ImageFormat::Jpeg);

    let prediction = predictor.predict(&jpeg).unwrap();

    assert!(DEFAULT_LABELS.contains(&prediction.emotion.as_str()));
    assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
    assert_eq!(prediction.scores.len(), DEFAULT_LABELS.len());
    assert_eq!(prediction.face.width, prediction.face.height);
}

#[test]
fn test_fromConfig_withLabelsFile_shouldUseFileOrder() {
    let dir = TempDir::new().unwrap();
    let config = config_with_labels(&dir, r#"["calm", "tense", "joy"]"#);
    let predictor = EmotionPredictor::from_config(&config).unwrap();

    let dark = predictor.predict(&image_bytes(64, 64, 0, ImageFormat::Png)).unwrap();
    let bright = predictor.predict(&image_bytes(64, 64, 255, ImageFormat::Png)).unwrap();

    assert_eq!(predictor.labels().len(), 3);
    assert_eq!(dark.emotion, "calm");
    assert_eq!(bright.emotion, "joy");
    assert_eq!(bright.scores.keys().cloned().collect::<Vec<_>>(), vec!["calm", "joy", "tense"]);
}

#[test]
fn test_fromConfig_withIndexedLabelsFile_shouldSortByIndex() {
    let dir = TempDir::new().unwrap();
    let config = config_with_labels(&dir, r#"{"1": "sad", "0": "happy"}"#);

    let predictor = EmotionPredictor::from_config(&config).unwrap();

    assert_eq!(predictor.labels().names(), &["happy".to_string(), "sad".to_string()]);
}

#[test]
fn test_fromConfig_withBrokenLabelsFile_shouldFail() {
    let dir = TempDir::new().unwrap();
    let config = config_with_labels(&dir, "[]");

    let error = EmotionPredictor::from_config(&config).unwrap_err();

    assert!(matches!(error, InferenceError::ModelLoad(_)));
}

#[test]
fn test_predict_withDataUrlFrame_shouldMatchRawBytes() {
    let predictor = EmotionPredictor::from_config(&InferenceConfig::default()).unwrap();
    let png = image_bytes(80, 60, 140, ImageFormat::Png);
    let data_url = format!("data:image/png;base64,{}", STANDARD.encode(&png));

    let decoded = decode_frame(&data_url, predictor.max_frame_bytes()).unwrap();

    assert_eq!(decoded, png);
    assert_eq!(
        predictor.predict(&decoded).unwrap().emotion,
        predictor.predict(&png).unwrap().emotion
    );
}

#[test]
fn test_predict_overFrameLimit_shouldReturnFrameTooLarge() {
    let config = InferenceConfig {
        max_frame_bytes: 16,
        ..InferenceConfig::default()
    };
    let predictor = EmotionPredictor::from_config(&config).unwrap();

    let error = predictor.predict(&image_bytes(64, 64, 10, ImageFormat::Png)).unwrap_err();

    assert!(matches!(error, InferenceError::FrameTooLarge { limit: 16, .. }));
}

#[test]
fn test_predict_withTinyImage_shouldStillClassify() {
    let predictor = EmotionPredictor::from_config(&InferenceConfig::default()).unwrap();

    let prediction = predictor.predict(&image_bytes(3, 2, 50, ImageFormat::Png)).unwrap();

    assert!(prediction.face.width <= 2);
}

#[tokio::test]
async fn test_analyze_withGarbage_shouldReturnImageDecode() {
    let predictor = EmotionPredictor::from_config(&InferenceConfig::default()).unwrap();

    let error = predictor.analyze(b"definitely not an image".to_vec()).await.unwrap_err();

    assert!(matches!(error, InferenceError::ImageDecode(_)));
}
