use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::Json;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ApiResult, AppState, CurrentUser, JsonBody};
use crate::database::models::{DetectionRecord, NewDetection, UserRole};
use crate::errors::ApiError;

/// Name of the multipart field carrying the image
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub image_name: String,
    pub emotion: String,
    pub confidence: f32,
    pub detection_id: i64,
    pub face_detected: bool,
}

#[derive(Debug, Deserialize)]
pub struct EmotionFilter {
    pub emotion: Option<String>,
}

/// Classify an uploaded image and store the result
///
/// A bearer token is optional; when present the detection is attributed to
/// the caller.
pub async fn predict(
    caller: Option<CurrentUser>,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<PredictResponse>> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
        upload = Some((name, bytes.to_vec()));
        break;
    }

    let (image_name, bytes) = upload.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    debug!("Predicting '{}' ({} bytes)", image_name, bytes.len());

    let prediction = state.analyzer.analyze(bytes).await?;

    let mut detection = NewDetection::new(image_name.clone(), prediction.emotion.clone(), prediction.confidence as f64);
    if let Some(CurrentUser(user)) = &caller {
        match user.role {
            UserRole::Patient => detection.patient_id = Some(user.id),
            UserRole::Psychologist => detection.psychologist_id = Some(user.id),
            UserRole::Admin => {}
        }
    }
    let stored = state.repository.insert_detection(&detection).await?;
    info!(
        "Detection {}: '{}' -> {} ({:.3})",
        stored.id, image_name, prediction.emotion, prediction.confidence
    );

    Ok(Json(PredictResponse {
        image_name,
        emotion: prediction.emotion,
        confidence: prediction.confidence,
        detection_id: stored.id,
        face_detected: prediction.face_detected,
    }))
}

pub async fn create_detection(
    State(state): State<AppState>,
    JsonBody(mut detection): JsonBody<NewDetection>,
) -> ApiResult<Json<DetectionRecord>> {
    detection.emotion = detection.emotion.trim().to_lowercase();
    if detection.emotion.is_empty() {
        return Err(ApiError::BadRequest("Emotion is required".to_string()));
    }
    if !detection.confidence.is_finite() {
        return Err(ApiError::BadRequest("Confidence must be a number".to_string()));
    }

    Ok(Json(state.repository.insert_detection(&detection).await?))
}

pub async fn list_detections(State(state): State<AppState>) -> ApiResult<Json<Vec<DetectionRecord>>> {
    Ok(Json(state.repository.list_detections(None).await?))
}

pub async fn filter_detections(
    State(state): State<AppState>,
    Query(filter): Query<EmotionFilter>,
) -> ApiResult<Json<Vec<DetectionRecord>>> {
    let emotion = filter.emotion.as_deref().filter(|e| !e.trim().is_empty());
    Ok(Json(state.repository.list_detections(emotion).await?))
}

pub async fn emotion_stats(State(state): State<AppState>) -> ApiResult<Json<Map<String, Value>>> {
    let counts = state.repository.emotion_counts(None).await?;
    Ok(Json(
        counts
            .into_iter()
            .map(|(emotion, count)| (emotion, Value::from(count)))
            .collect(),
    ))
}
