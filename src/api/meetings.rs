use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDateTime;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ApiResult, AppState, CurrentUser, JsonBody};
use crate::database::models::{
    AppointmentRecord, AppointmentStatus, AppointmentUpdate, NewAppointment, UserRole, SCHEDULE_FORMAT,
};
use crate::errors::ApiError;

/// Format of `date` and `time` joined by a space
const INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";
const DEFAULT_MODE: &str = "virtual";

#[derive(Debug, Deserialize)]
pub struct CreateMeeting {
    pub patient_id: Option<i64>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub topic: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMeeting {
    pub date: Option<String>,
    pub time: Option<String>,
    pub topic: Option<String>,
    pub status: Option<String>,
    pub progress: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MeetingView {
    pub id: i64,
    pub date: String,
    pub time: String,
    pub topic: String,
    pub status: AppointmentStatus,
    pub mode: String,
    pub patient_id: i64,
    pub psychologist_id: i64,
}

impl From<&AppointmentRecord> for MeetingView {
    fn from(record: &AppointmentRecord) -> Self {
        Self {
            id: record.id,
            date: record.date().to_string(),
            time: record.time().to_string(),
            topic: record.notes.clone().unwrap_or_default(),
            status: record.status,
            mode: record.mode.clone(),
            patient_id: record.patient_id,
            psychologist_id: record.psychologist_id,
        }
    }
}

pub async fn create_meeting(
    user: CurrentUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateMeeting>,
) -> ApiResult<Json<Value>> {
    user.require(UserRole::Psychologist)?;

    let (Some(patient_id), Some(date), Some(time)) = (request.patient_id, request.date, request.time) else {
        return Err(ApiError::BadRequest("Incomplete fields".to_string()));
    };
    let scheduled_at = parse_schedule(&date, &time)?;

    if state
        .repository
        .get_user_with_role(patient_id, UserRole::Patient)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Patient not found".to_string()));
    }

    let appointment = NewAppointment {
        psychologist_id: user.id(),
        patient_id,
        scheduled_at,
        status: AppointmentStatus::Scheduled,
        notes: request.topic.filter(|t| !t.trim().is_empty()),
        mode: request.mode.unwrap_or_else(|| DEFAULT_MODE.to_string()),
    };
    let id = state.repository.create_appointment(&appointment).await?;
    info!(
        "Meeting {} scheduled by psychologist {} for patient {} at {}",
        id,
        user.id(),
        patient_id,
        appointment.scheduled_at
    );

    Ok(Json(json!({ "message": "Meeting created", "id": id })))
}

pub async fn list_meetings(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Vec<MeetingView>>> {
    let meetings = match user.role() {
        UserRole::Psychologist => state.repository.list_appointments_for_psychologist(user.id()).await?,
        UserRole::Patient => state.repository.list_appointments_for_patient(user.id()).await?,
        UserRole::Admin => return Err(ApiError::Forbidden("Role not allowed".to_string())),
    };
    Ok(Json(meetings.iter().map(MeetingView::from).collect()))
}

pub async fn update_meeting(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(request): JsonBody<UpdateMeeting>,
) -> ApiResult<Json<Value>> {
    let meeting = state
        .repository
        .get_appointment(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Meeting not found".to_string()))?;

    if user.role() != UserRole::Psychologist || meeting.psychologist_id != user.id() {
        return Err(ApiError::not_authorized());
    }

    let scheduled_at = match (request.date.as_deref(), request.time.as_deref()) {
        (Some(date), Some(time)) => Some(parse_schedule(date, time)?),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "Date and time must be changed together".to_string(),
            ))
        }
    };

    let status = request
        .status
        .as_deref()
        .map(str::parse::<AppointmentStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if let Some(progress) = request.progress {
        if !(0..=100).contains(&progress) {
            return Err(ApiError::BadRequest("Progress must be between 0 and 100".to_string()));
        }
    }

    let update = AppointmentUpdate {
        scheduled_at,
        notes: request.topic,
        status,
        progress: request.progress,
    };
    state.repository.update_appointment(id, &update).await?;

    Ok(Json(json!({ "message": "Meeting updated" })))
}

/// Join `YYYY-MM-DD` and `HH:MM` into the stored schedule format
pub fn parse_schedule(date: &str, time: &str) -> Result<String, ApiError> {
    NaiveDateTime::parse_from_str(&format!("{} {}", date.trim(), time.trim()), INPUT_FORMAT)
        .map(|dt| dt.format(SCHEDULE_FORMAT).to_string())
        .map_err(|_| ApiError::BadRequest("Wrong date or time format".to_string()))
}
