use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use super::{ApiResult, AppState};
use crate::database::models::{MessageRecord, UserRole};
use crate::errors::ApiError;

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    /// `HH:MM`
    pub sent_at: String,
}

impl From<MessageRecord> for HistoryEntry {
    fn from(message: MessageRecord) -> Self {
        let sent_at = message.sent_at.get(11..16).unwrap_or_default().to_string();
        Self {
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            sent_at,
        }
    }
}

pub async fn history(
    State(state): State<AppState>,
    Path((user_id, peer_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let messages = state.repository.chat_history(user_id, peer_id).await?;
    Ok(Json(messages.into_iter().map(HistoryEntry::from).collect()))
}

pub async fn contacts(State(state): State<AppState>, Path(psychologist_id): Path<i64>) -> ApiResult<Json<Vec<Value>>> {
    if state
        .repository
        .get_user_with_role(psychologist_id, UserRole::Psychologist)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Psychologist not found".to_string()));
    }

    let patients = state.repository.list_assigned_patients(psychologist_id).await?;
    Ok(Json(
        patients
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "username": p.username,
                    "email": p.email.clone().unwrap_or_default(),
                    "role": p.role,
                })
            })
            .collect(),
    ))
}

pub async fn assigned_psychologist(State(state): State<AppState>, Path(patient_id): Path<i64>) -> ApiResult<Json<Value>> {
    let repo = &state.repository;
    let patient = repo
        .get_user_with_role(patient_id, UserRole::Patient)
        .await?
        .ok_or_else(|| ApiError::NotFound("Patient not found".to_string()))?;

    let psychologist_id = patient
        .assigned_to
        .ok_or_else(|| ApiError::NotFound("This patient has no assigned psychologist".to_string()))?;

    let psychologist = repo
        .get_user_with_role(psychologist_id, UserRole::Psychologist)
        .await?
        .ok_or_else(|| ApiError::NotFound("Assigned psychologist not found".to_string()))?;

    Ok(Json(json!({
        "psychologist_id": psychologist.id,
        "psychologist_name": psychologist.username,
        "psychologist_email": psychologist.email,
    })))
}
