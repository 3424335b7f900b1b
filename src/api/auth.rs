use axum::extract::State;
use axum::Json;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ApiResult, AppState, CurrentUser, JsonBody};
use crate::database::models::{NewUser, UserRecord, UserRole};
use crate::errors::ApiError;

/// Shortest accepted password
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub role: UserRole,
    pub user_id: i64,
    pub username: String,
}

/// Account fields shared by self-registration and admin creation
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dni: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub specialty: Option<String>,
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "EMOTIA backend running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn login(State(state): State<AppState>, JsonBody(request): JsonBody<LoginRequest>) -> ApiResult<Json<LoginResponse>> {
    let login = request
        .username
        .as_deref()
        .or(request.email.as_deref())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Username or email is required".to_string()))?;

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let user = state.repository.find_user_by_login(login).await?.ok_or_else(invalid)?;
    if !state
        .verify_password(request.password, user.password_hash.clone())
        .await?
    {
        warn!("Failed login for '{}'", login);
        return Err(invalid());
    }

    if user.is_blocked() {
        return Err(ApiError::Forbidden("User is blocked".to_string()));
    }

    let access_token = state.tokens.issue(&user)?;
    info!("User {} ({}) logged in", user.id, user.role);

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer",
        role: user.role,
        user_id: user.id,
        username: user.username,
    }))
}

pub async fn register(State(state): State<AppState>, JsonBody(request): JsonBody<RegisterRequest>) -> ApiResult<Json<Value>> {
    let role = request.role.unwrap_or(UserRole::Patient);
    if role == UserRole::Admin {
        return Err(ApiError::BadRequest("Cannot self-register as admin".to_string()));
    }

    let user = create_account(&state, request, role).await?;
    Ok(Json(json!({
        "message": "User registered",
        "id": user.id,
        "username": user.username,
        "role": user.role,
    })))
}

pub async fn me(user: CurrentUser) -> Json<UserRecord> {
    Json(user.0)
}

/// Validate and insert an account with `role`
pub(crate) async fn create_account(state: &AppState, request: RegisterRequest, role: UserRole) -> ApiResult<UserRecord> {
    let email = non_empty(request.email).map(|e| e.to_lowercase());
    let username = non_empty(request.username).or_else(|| email.clone()).ok_or_else(|| {
        ApiError::BadRequest("Username or email is required".to_string())
    })?;

    if let Some(email) = &email {
        if !is_valid_email(email) {
            return Err(ApiError::BadRequest(format!("Invalid email '{}'", email)));
        }
    }

    let password = request
        .password
        .ok_or_else(|| ApiError::BadRequest("Password is required".to_string()))?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must have at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    if state.repository.login_taken(&username, email.as_deref()).await? {
        return Err(ApiError::BadRequest("Username or email already registered".to_string()));
    }

    let password_hash = state.hash_password(password).await?;

    let mut new_user = NewUser::new(username, password_hash, role);
    new_user.email = email;
    new_user.first_name = non_empty(request.first_name);
    new_user.last_name = non_empty(request.last_name);
    new_user.dni = non_empty(request.dni);
    new_user.gender = non_empty(request.gender);
    new_user.birth_date = non_empty(request.birth_date);
    new_user.phone = non_empty(request.phone);
    new_user.address = non_empty(request.address);
    new_user.city = non_empty(request.city);
    new_user.country = non_empty(request.country);
    if role == UserRole::Psychologist {
        new_user.specialty = non_empty(request.specialty);
    }

    let id = state.repository.create_user(&new_user).await?;
    info!("Created {} account {} ('{}')", role, id, new_user.username);

    state
        .repository
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("User {} vanished after insert", id)))
}

/// `local@domain.tld` with no whitespace
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
        }
        None => false,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
