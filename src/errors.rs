/*!
 * Error types for the emotia application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur while turning a frame into an emotion prediction
#[derive(Error, Debug)]
pub enum InferenceError {
    /// The frame payload could not be decoded into image bytes
    #[error("Invalid frame payload: {0}")]
    InvalidFrame(String),

    /// The frame exceeds the configured size limit
    #[error("Frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge {
        /// Decoded frame size in bytes
        size: usize,
        /// Configured maximum in bytes
        limit: usize,
    },

    /// The image bytes could not be decoded
    #[error("Image decoding failed: {0}")]
    ImageDecode(String),

    /// No face was found and the centre-crop fallback is disabled
    #[error("No face detected in frame")]
    NoFaceDetected,

    /// The face detector failed
    #[error("Face detection failed: {0}")]
    FaceDetection(String),

    /// A model or label file could not be loaded
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    /// The classifier backend failed while running
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// The classifier output does not line up with the configured labels
    #[error("Classifier returned {actual} scores but {expected} labels are configured")]
    LabelMismatch {
        /// Number of configured labels
        expected: usize,
        /// Number of scores returned by the model
        actual: usize,
    },

    /// The blocking inference task could not be joined
    #[error("Inference task failed: {0}")]
    Task(String),
}

/// Errors that can occur while hashing passwords or handling tokens
#[derive(Error, Debug)]
pub enum AuthError {
    /// Password hashing or verification failed internally
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// The token could not be created
    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    /// The token is malformed, has a bad signature or an unknown subject
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The token has expired
    #[error("Token expired")]
    Expired,
}

/// Errors from the live-session lifecycle
#[derive(Error, Debug)]
pub enum SessionError {
    /// No session with this id
    #[error("Session {0} not found")]
    NotFound(i64),

    /// The linked appointment does not exist
    #[error("Appointment {0} not found")]
    AppointmentNotFound(i64),

    /// The caller does not own the session or appointment
    #[error("Not authorized")]
    NotOwner,

    /// The session was already ended
    #[error("Session {0} is already closed")]
    AlreadyClosed(i64),

    /// Database failure
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Errors returned by the HTTP layer
///
/// Every variant maps onto one HTTP status code; the message ends up in the
/// `detail` field of the JSON body.
#[derive(Error, Debug)]
pub enum ApiError {
    /// 400
    #[error("{0}")]
    BadRequest(String),

    /// 401
    #[error("{0}")]
    Unauthorized(String),

    /// 403
    #[error("{0}")]
    Forbidden(String),

    /// 404
    #[error("{0}")]
    NotFound(String),

    /// 409
    #[error("{0}")]
    Conflict(String),

    /// 422
    #[error("{0}")]
    Unprocessable(String),

    /// 500
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// The HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unprocessable(_) => 422,
            Self::Internal(_) => 500,
        }
    }

    /// Shorthand for the most common authorization failure
    pub fn not_authorized() -> Self {
        Self::Forbidden("Not authorized".to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidToken(_) | AuthError::Expired => Self::Unauthorized(error.to_string()),
            AuthError::Hashing(_) | AuthError::TokenCreation(_) => Self::Internal(error.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::NotFound(_) | SessionError::AppointmentNotFound(_) => {
                Self::NotFound(error.to_string())
            }
            SessionError::NotOwner => Self::Forbidden(error.to_string()),
            SessionError::AlreadyClosed(_) => Self::Conflict(error.to_string()),
            SessionError::Storage(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<InferenceError> for ApiError {
    fn from(error: InferenceError) -> Self {
        match error {
            InferenceError::NoFaceDetected => Self::Unprocessable(error.to_string()),
            _ => Self::Internal(error.to_string()),
        }
    }
}
