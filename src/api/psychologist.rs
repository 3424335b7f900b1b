use axum::extract::{Path, State};
use axum::Json;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{ApiResult, AppState, CurrentUser, JsonBody};
use crate::database::models::{NewReport, ReportRecord, UserRecord, UserRole, UserStatus};
use crate::errors::ApiError;

#[derive(Debug, Serialize)]
pub struct PatientView {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub status: UserStatus,
    pub birth_date: Option<String>,
    pub created_at: String,
}

impl From<&UserRecord> for PatientView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            status: user.status,
            birth_date: user.birth_date.clone(),
            created_at: user.created_at.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReport {
    pub patient_id: Option<i64>,
    pub summary: Option<String>,
    pub progress_percent: Option<i64>,
    pub session_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReportView {
    pub id: i64,
    pub patient_id: i64,
    pub session_id: Option<i64>,
    pub summary: String,
    pub progress_percent: i64,
    pub created_at: String,
    pub status: String,
}

impl From<ReportRecord> for ReportView {
    fn from(report: ReportRecord) -> Self {
        let created_at = report.created_at.get(..10).unwrap_or(&report.created_at).to_string();
        Self {
            id: report.id,
            patient_id: report.patient_id,
            session_id: report.session_id,
            summary: report.summary,
            progress_percent: report.progress_percent,
            created_at,
            status: report.status,
        }
    }
}

pub async fn assigned_patients(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Vec<PatientView>>> {
    user.require(UserRole::Psychologist)?;
    let patients = state.repository.list_assigned_patients(user.id()).await?;
    Ok(Json(patients.iter().map(PatientView::from).collect()))
}

pub async fn patient_emotions(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    user.require(UserRole::Psychologist)?;

    let counts = state.repository.emotion_counts(Some(patient_id)).await?;
    let total: i64 = counts.iter().map(|(_, count)| count).sum();
    if total == 0 {
        return Err(ApiError::NotFound("No emotion records".to_string()));
    }

    Ok(Json(json!({
        "patient_id": patient_id,
        "summary": emotion_percentages(&counts, total),
        "total": total,
    })))
}

pub async fn create_report(
    user: CurrentUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateReport>,
) -> ApiResult<Json<Value>> {
    user.require(UserRole::Psychologist)?;

    let patient_id = request.patient_id;
    let summary = request.summary.filter(|s| !s.trim().is_empty());
    let (Some(patient_id), Some(summary)) = (patient_id, summary) else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };

    let progress_percent = request.progress_percent.unwrap_or(0);
    if !(0..=100).contains(&progress_percent) {
        return Err(ApiError::BadRequest("Progress must be between 0 and 100".to_string()));
    }

    if state
        .repository
        .get_user_with_role(patient_id, UserRole::Patient)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Patient not found".to_string()));
    }
    if let Some(session_id) = request.session_id {
        if state.repository.get_session(session_id).await?.is_none() {
            return Err(ApiError::NotFound(format!("Session {} not found", session_id)));
        }
    }

    let report = NewReport {
        session_id: request.session_id,
        psychologist_id: user.id(),
        patient_id,
        summary,
        progress_percent,
    };
    let id = state.repository.create_report(&report).await?;
    info!("Report {} created by psychologist {} for patient {}", id, user.id(), patient_id);

    Ok(Json(json!({ "message": "Report created", "report_id": id })))
}

pub async fn list_reports(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Vec<ReportView>>> {
    user.require(UserRole::Psychologist)?;
    let reports = state.repository.list_reports_by_psychologist(user.id()).await?;
    Ok(Json(reports.into_iter().map(ReportView::from).collect()))
}

pub async fn report_patients(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Vec<Value>>> {
    user.require(UserRole::Psychologist)?;
    let patients = state.repository.list_assigned_patients(user.id()).await?;
    Ok(Json(
        patients
            .iter()
            .map(|p| json!({ "id": p.id, "username": p.username, "email": p.email }))
            .collect(),
    ))
}

/// Share of each emotion in percent, rounded to two decimals
pub fn emotion_percentages(counts: &[(String, i64)], total: i64) -> Map<String, Value> {
    counts
        .iter()
        .map(|(emotion, count)| {
            let percent = (*count as f64 / total as f64 * 100.0 * 100.0).round() / 100.0;
            (emotion.clone(), Value::from(percent))
        })
        .collect()
}
