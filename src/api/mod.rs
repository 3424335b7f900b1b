/*!
 * HTTP surface.
 *
 * REST endpoints for accounts, scheduling, reports, chat history and
 * detections, plus the two streaming WebSocket endpoints. Every failure is
 * answered as `{"detail": "<message>"}` with the status code of its
 * `ApiError` variant.
 */

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use log::error;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::errors::ApiError;

pub mod admin;
pub mod auth;
pub mod chat;
pub mod detections;
pub mod extract;
pub mod meetings;
pub mod psychologist;
pub mod sessions;
pub mod state;
pub mod ws;

pub use extract::{CurrentUser, JsonBody};
pub use state::AppState;

/// Handler result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Multipart framing on top of the largest accepted image
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let upload_limit = state.analyzer.max_frame_bytes() + UPLOAD_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(auth::root))
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/me", get(auth::me))
        // Administration
        .route("/admin/users", get(admin::list_users).post(admin::create_user))
        .route("/admin/users/:id", delete(admin::delete_user))
        .route("/admin/patients", get(admin::list_patients).post(admin::create_patient))
        .route("/admin/patients/:id", delete(admin::delete_patient))
        .route(
            "/admin/psychologists",
            get(admin::list_psychologists).post(admin::create_psychologist),
        )
        .route("/admin/psychologists/:id", delete(admin::delete_psychologist))
        .route("/admin/assign_patient", post(admin::assign_patient))
        .route("/admin/reports", get(admin::list_reports))
        .route("/admin/reports/stats", get(admin::report_stats))
        .route("/admin/reports/summary", get(admin::report_summary))
        .route("/admin/reports/:id", delete(admin::delete_report))
        // Scheduling
        .route("/meetings", get(meetings::list_meetings).post(meetings::create_meeting))
        .route("/meetings/:id", put(meetings::update_meeting))
        // Psychologist workspace
        .route("/psychologist/patients", get(psychologist::assigned_patients))
        .route("/psychologist/emotions/:patient_id", get(psychologist::patient_emotions))
        .route(
            "/psychologist/reports",
            get(psychologist::list_reports).post(psychologist::create_report),
        )
        .route("/psychologist/reports/patients", get(psychologist::report_patients))
        // Chat history
        .route("/chat/history/:user_id/:peer_id", get(chat::history))
        .route("/chat/contacts/:psychologist_id", get(chat::contacts))
        .route("/chat/assigned/:patient_id", get(chat::assigned_psychologist))
        // Live sessions
        .route("/sessions", post(sessions::start_session))
        .route("/sessions/:id", get(sessions::get_session))
        .route("/sessions/:id/end", post(sessions::end_session))
        // Detections
        .route(
            "/predict",
            post(detections::predict).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/detections",
            get(detections::list_detections).post(detections::create_detection),
        )
        .route("/detections/filter", get(detections::filter_detections))
        .route("/stats/emotions", get(detections::emotion_stats))
        // Streaming
        .route("/ws/chat/:user_id/:peer_id", get(ws::chat_socket))
        .route("/ws/predict/:session_id", get(ws::predict_socket))
        // Desktop web views load pages from file://
        .layer(CorsLayer::permissive())
        .with_state(state)
}
