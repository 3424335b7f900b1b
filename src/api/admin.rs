use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::auth::{create_account, RegisterRequest};
use super::{ApiResult, AppState, CurrentUser, JsonBody};
use crate::database::models::{ReportListing, UserRecord, UserRole, UserStatus};
use crate::errors::ApiError;

/// Months shown in the progress chart
const SUMMARY_MONTHS: u32 = 6;
/// Weeks shown in the sessions chart
const SUMMARY_WEEKS: i64 = 4;

#[derive(Debug, Deserialize)]
pub struct RoleFilter {
    pub role: Option<UserRole>,
}

/// Row of the admin user table
#[derive(Debug, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub nombre: String,
    pub email: Option<String>,
    pub estado: UserStatus,
    pub rol: UserRole,
    pub fecha: String,
}

impl From<&UserRecord> for UserRow {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            nombre: user.full_name(),
            email: user.email.clone(),
            estado: user.status,
            rol: user.role,
            fecha: user.created_date().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub patient_id: i64,
    pub psychologist_id: i64,
}

pub async fn list_users(
    user: CurrentUser,
    State(state): State<AppState>,
    Query(filter): Query<RoleFilter>,
) -> ApiResult<Json<Vec<UserRow>>> {
    user.require(UserRole::Admin)?;
    let users = state.repository.list_users(filter.role).await?;
    Ok(Json(users.iter().map(UserRow::from).collect()))
}

pub async fn create_user(
    user: CurrentUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> ApiResult<Json<Value>> {
    user.require(UserRole::Admin)?;

    let role = request
        .role
        .ok_or_else(|| ApiError::BadRequest("Role is required".to_string()))?;
    if let Some(email) = request.email.as_deref() {
        if state.repository.email_exists(&email.to_lowercase()).await? {
            return Err(ApiError::BadRequest("Email already registered".to_string()));
        }
    }

    let created = create_account(&state, request, role).await?;
    Ok(Json(json!({ "id": created.id, "email": created.email })))
}

pub async fn delete_user(user: CurrentUser, State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    user.require(UserRole::Admin)?;

    if !state.repository.delete_user(id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    info!("Admin {} deleted user {}", user.id(), id);
    Ok(Json(json!({ "ok": true })))
}

pub async fn list_patients(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Vec<UserRecord>>> {
    list_role(user, state, UserRole::Patient).await
}

pub async fn create_patient(
    user: CurrentUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> ApiResult<Json<UserRecord>> {
    create_role(user, state, request, UserRole::Patient).await
}

pub async fn delete_patient(user: CurrentUser, State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    delete_role(user, state, id, UserRole::Patient).await
}

pub async fn list_psychologists(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Vec<UserRecord>>> {
    list_role(user, state, UserRole::Psychologist).await
}

pub async fn create_psychologist(
    user: CurrentUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> ApiResult<Json<UserRecord>> {
    create_role(user, state, request, UserRole::Psychologist).await
}

pub async fn delete_psychologist(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    delete_role(user, state, id, UserRole::Psychologist).await
}

pub async fn assign_patient(
    user: CurrentUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AssignRequest>,
) -> ApiResult<Json<Value>> {
    user.require(UserRole::Admin)?;

    let repo = &state.repository;
    if repo.get_user_with_role(request.patient_id, UserRole::Patient).await?.is_none() {
        return Err(ApiError::NotFound("Patient not found".to_string()));
    }
    if repo
        .get_user_with_role(request.psychologist_id, UserRole::Psychologist)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Psychologist not found".to_string()));
    }

    repo.assign_patient(request.patient_id, request.psychologist_id).await?;
    info!(
        "Patient {} assigned to psychologist {}",
        request.patient_id, request.psychologist_id
    );

    Ok(Json(json!({
        "message": "Patient assigned",
        "patient_id": request.patient_id,
        "psychologist_id": request.psychologist_id,
    })))
}

pub async fn report_stats(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    user.require(UserRole::Admin)?;

    let repo = &state.repository;
    Ok(Json(json!({
        "total_reportes": repo.count_reports().await?,
        "total_usuarios": repo.count_users(None, None).await?,
        "psicologos": repo.count_users(Some(UserRole::Psychologist), None).await?,
        "pacientes": repo.count_users(Some(UserRole::Patient), None).await?,
    })))
}

pub async fn report_summary(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    user.require(UserRole::Admin)?;

    let repo = &state.repository;
    let now = Utc::now();

    let months = last_months(now.date_naive(), SUMMARY_MONTHS);
    let months_since = months.first().map(|m| format!("{}-01", m)).unwrap_or_default();
    let progress = repo.progress_by_month_since(&months_since).await?;
    let progress_by_month: Vec<f64> = months
        .iter()
        .map(|month| {
            progress
                .iter()
                .find(|(m, _)| m == month)
                .map(|(_, avg)| round2(*avg))
                .unwrap_or(0.0)
        })
        .collect();

    let weeks_since = now - Duration::weeks(SUMMARY_WEEKS);
    let starts = repo
        .session_start_times_since(&weeks_since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .await?;
    let sessions_per_week = sessions_per_week(&starts, now);
    let weeks: Vec<String> = (1..=SUMMARY_WEEKS).map(|w| format!("Sem {}", w)).collect();

    let specialties: Map<String, Value> = repo
        .specialty_histogram()
        .await?
        .into_iter()
        .map(|(name, count)| (name, Value::from(count)))
        .collect();

    Ok(Json(json!({
        "total_patients": repo.count_users(Some(UserRole::Patient), None).await?,
        "active_psychologists": repo
            .count_users(Some(UserRole::Psychologist), Some(UserStatus::Active))
            .await?,
        "avg_progress": round2(repo.average_progress().await?),
        "top_psychologist": repo.top_psychologist().await?,
        "months": months,
        "progress_by_month": progress_by_month,
        "specialties": specialties,
        "weeks": weeks,
        "sessions_per_week": sessions_per_week,
    })))
}

pub async fn list_reports(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Vec<ReportListing>>> {
    user.require(UserRole::Admin)?;
    Ok(Json(state.repository.list_report_listings().await?))
}

pub async fn delete_report(user: CurrentUser, State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    user.require(UserRole::Admin)?;

    if !state.repository.delete_report(id).await? {
        return Err(ApiError::NotFound("Report not found".to_string()));
    }
    Ok(Json(json!({ "message": "Report deleted" })))
}

async fn list_role(user: CurrentUser, state: AppState, role: UserRole) -> ApiResult<Json<Vec<UserRecord>>> {
    user.require(UserRole::Admin)?;
    Ok(Json(state.repository.list_users(Some(role)).await?))
}

async fn create_role(
    user: CurrentUser,
    state: AppState,
    request: RegisterRequest,
    role: UserRole,
) -> ApiResult<Json<UserRecord>> {
    user.require(UserRole::Admin)?;
    Ok(Json(create_account(&state, request, role).await?))
}

async fn delete_role(user: CurrentUser, state: AppState, id: i64, role: UserRole) -> ApiResult<Json<Value>> {
    user.require(UserRole::Admin)?;

    if !state.repository.delete_user_with_role(id, role).await? {
        return Err(ApiError::NotFound(format!("No {} with id {}", role, id)));
    }
    info!("Admin {} deleted {} {}", user.id(), role, id);
    Ok(Json(json!({ "ok": true })))
}

/// `YYYY-MM` labels of the `count` months ending with `today`'s, oldest first
pub fn last_months(today: NaiveDate, count: u32) -> Vec<String> {
    let current = today.year() * 12 + today.month0() as i32;
    (0..count as i32)
        .rev()
        .map(|back| {
            let index = current - back;
            format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
        })
        .collect()
}

/// Bucket session start times into the last four 7-day windows before `now`, oldest first
pub fn sessions_per_week(starts: &[String], now: DateTime<Utc>) -> Vec<i64> {
    let mut buckets = vec![0i64; SUMMARY_WEEKS as usize];
    for start in starts {
        let Ok(start) = DateTime::parse_from_rfc3339(start) else {
            continue;
        };
        let age_days = (now - start.with_timezone(&Utc)).num_days();
        if !(0..SUMMARY_WEEKS * 7).contains(&age_days) {
            continue;
        }
        let weeks_ago = (age_days / 7) as usize;
        buckets[SUMMARY_WEEKS as usize - 1 - weeks_ago] += 1;
    }
    buckets
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
