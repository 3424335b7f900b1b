/*!
 * Tests for error types and conversions
 */

use emotia::errors::{ApiError, AuthError, InferenceError, SessionError};

#[test]
fn test_inferenceError_frameTooLarge_shouldDisplaySizes() {
    let error = InferenceError::FrameTooLarge { size: 2048, limit: 1024 };
    let display = error.to_string();
    assert!(display.contains("2048"));
    assert!(display.contains("1024"));
}

#[test]
fn test_inferenceError_labelMismatch_shouldDisplayCounts() {
    let error = InferenceError::LabelMismatch { expected: 7, actual: 5 };
    assert_eq!(error.to_string(), "Classifier returned 5 scores but 7 labels are configured");
}

#[test]
fn test_apiError_fromInferenceError_shouldMapStatusCodes() {
    assert_eq!(ApiError::from(InferenceError::InvalidFrame("x".into())).status_code(), 500);
    assert_eq!(ApiError::from(InferenceError::ImageDecode("x".into())).status_code(), 500);
    assert_eq!(
        ApiError::from(InferenceError::FrameTooLarge { size: 2, limit: 1 }).status_code(),
        500
    );
    assert_eq!(ApiError::from(InferenceError::NoFaceDetected).status_code(), 422);
    assert_eq!(ApiError::from(InferenceError::Classifier("x".into())).status_code(), 500);
    assert_eq!(ApiError::from(InferenceError::Task("x".into())).status_code(), 500);
}

#[test]
fn test_apiError_fromAuthError_shouldMapStatusCodes() {
    assert_eq!(ApiError::from(AuthError::Expired).status_code(), 401);
    assert_eq!(ApiError::from(AuthError::InvalidToken("bad".into())).status_code(), 401);
    assert_eq!(ApiError::from(AuthError::Hashing("x".into())).status_code(), 500);
    assert_eq!(ApiError::from(AuthError::TokenCreation("x".into())).status_code(), 500);
}

#[test]
fn test_apiError_fromSessionError_shouldMapStatusCodes() {
    assert_eq!(ApiError::from(SessionError::NotFound(3)).status_code(), 404);
    assert_eq!(ApiError::from(SessionError::AppointmentNotFound(3)).status_code(), 404);
    assert_eq!(ApiError::from(SessionError::NotOwner).status_code(), 403);
    assert_eq!(ApiError::from(SessionError::AlreadyClosed(3)).status_code(), 409);
    assert_eq!(
        ApiError::from(SessionError::Storage(anyhow::anyhow!("disk full"))).status_code(),
        500
    );
}

#[test]
fn test_apiError_fromAnyhow_shouldBeInternalWithMessage() {
    let error = ApiError::from(anyhow::anyhow!("database is locked"));
    assert_eq!(error.status_code(), 500);
    assert_eq!(error.to_string(), "database is locked");
}

#[test]
fn test_sessionError_shouldDisplayIds() {
    assert_eq!(SessionError::NotFound(12).to_string(), "Session 12 not found");
    assert_eq!(SessionError::AlreadyClosed(4).to_string(), "Session 4 is already closed");
}

#[test]
fn test_apiError_notAuthorized_shouldBeForbidden() {
    let error = ApiError::not_authorized();
    assert_eq!(error.status_code(), 403);
    assert_eq!(error.to_string(), "Not authorized");
}
