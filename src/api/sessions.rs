use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiResult, AppState, CurrentUser};
use crate::database::models::UserRole;
use crate::session::SessionInfo;

#[derive(Debug, Default, Deserialize)]
pub struct StartSession {
    pub appointment_id: Option<i64>,
}

/// The body is optional; the desktop client posts none
pub async fn start_session(
    user: CurrentUser,
    State(state): State<AppState>,
    body: Option<Json<StartSession>>,
) -> ApiResult<Json<Value>> {
    user.require(UserRole::Psychologist)?;

    let request = body.map(|Json(request)| request).unwrap_or_default();
    let session = state.sessions.start_session(user.id(), request.appointment_id).await?;

    Ok(Json(json!({
        "session_id": session.id,
        "status": session.status,
        "started_at": session.started_at,
    })))
}

pub async fn end_session(user: CurrentUser, State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<SessionInfo>> {
    user.require(UserRole::Psychologist)?;

    let session = state.sessions.end_session(id, user.id()).await?;
    Ok(Json(SessionInfo::from_record(&session, state.predictions.subscriber_count(id))))
}

pub async fn get_session(_user: CurrentUser, State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<SessionInfo>> {
    let session = state.sessions.get_session(id).await?;
    Ok(Json(SessionInfo::from_record(&session, state.predictions.subscriber_count(id))))
}
