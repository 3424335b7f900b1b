use image::GrayImage;

use super::FaceBox;
use crate::errors::InferenceError;

/// Finds faces in a grayscale image
pub trait FaceDetector: Send + Sync {
    /// Detected faces, most relevant first
    fn detect(&self, image: &GrayImage) -> Result<Vec<FaceBox>, InferenceError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Detector that never finds a face, so the centre crop is always used
#[derive(Debug, Clone, Copy, Default)]
pub struct CenterCropDetector;

impl FaceDetector for CenterCropDetector {
    fn detect(&self, _image: &GrayImage) -> Result<Vec<FaceBox>, InferenceError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "center_crop"
    }
}

/// Choose the region to classify
///
/// Returns the first face that overlaps the image and `true`, or the centred
/// square and `false` when `fallback_center_crop` is set.
pub fn select_face_region(
    faces: &[FaceBox],
    width: u32,
    height: u32,
    fallback_center_crop: bool,
) -> Result<(FaceBox, bool), InferenceError> {
    if let Some(face) = faces.iter().find_map(|f| f.clamp_to(width, height)) {
        return Ok((face, true));
    }

    if fallback_center_crop && width > 0 && height > 0 {
        return Ok((FaceBox::centered_square(width, height), false));
    }

    Err(InferenceError::NoFaceDetected)
}

#[cfg(feature = "opencv")]
pub use haar::HaarCascadeDetector;

#[cfg(feature = "opencv")]
mod haar {
    use image::GrayImage;
    use log::error;
    use opencv::core::{Mat, Rect, Size, Vector};
    use opencv::objdetect::CascadeClassifier;
    use opencv::prelude::*;
    use parking_lot::Mutex;
    use std::path::Path;

    use super::FaceDetector;
    use crate::errors::InferenceError;
    use crate::inference::FaceBox;

    const SCALE_FACTOR: f64 = 1.1;
    const MIN_NEIGHBORS: i32 = 5;
    const MIN_FACE_SIDE: i32 = 30;

    /// OpenCV Haar cascade face detector
    pub struct HaarCascadeDetector {
        // detect_multi_scale needs &mut
        classifier: Mutex<CascadeClassifier>,
    }

    impl HaarCascadeDetector {
        /// Load a cascade XML file
        pub fn load(cascade_path: &Path) -> Result<Self, InferenceError> {
            let path = cascade_path.to_string_lossy();
            let classifier = CascadeClassifier::new(&path).map_err(|e| {
                error!("Failed to load Haar cascade: {}", e);
                InferenceError::ModelLoad(format!("Haar cascade load failed: {e}"))
            })?;

            let empty = classifier
                .empty()
                .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;
            if empty {
                return Err(InferenceError::ModelLoad(format!(
                    "Haar cascade '{}' is empty",
                    path
                )));
            }

            Ok(Self {
                classifier: Mutex::new(classifier),
            })
        }
    }

    impl FaceDetector for HaarCascadeDetector {
        fn detect(&self, image: &GrayImage) -> Result<Vec<FaceBox>, InferenceError> {
            let mat = Mat::from_slice(image.as_raw())
                .map_err(|e| InferenceError::FaceDetection(format!("Failed to create Mat: {e}")))?;
            let gray = mat
                .reshape(1, image.height() as i32)
                .map_err(|e| InferenceError::FaceDetection(format!("Failed to reshape Mat: {e}")))?;

            let mut faces = Vector::<Rect>::new();
            self.classifier
                .lock()
                .detect_multi_scale(
                    &gray,
                    &mut faces,
                    SCALE_FACTOR,
                    MIN_NEIGHBORS,
                    0,
                    Size::new(MIN_FACE_SIDE, MIN_FACE_SIDE),
                    Size::new(0, 0),
                )
                .map_err(|e| InferenceError::FaceDetection(format!("Face detection failed: {e}")))?;

            Ok(faces
                .iter()
                .filter(|r| r.x >= 0 && r.y >= 0 && r.width > 0 && r.height > 0)
                .map(|r| FaceBox::new(r.x as u32, r.y as u32, r.width as u32, r.height as u32))
                .collect())
        }

        fn name(&self) -> &'static str {
            "haar_cascade"
        }
    }
}
