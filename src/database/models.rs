/*!
 * Database entity models and DTOs.
 *
 * These structures map directly to database tables and provide
 * type-safe access to persisted data. Status values keep the Spanish
 * wire strings the desktop and web clients already understand.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Format of `appointments.scheduled_at`
pub const SCHEDULE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Status given to every new report
pub const REPORT_STATUS_ACTIVE: &str = "activo";

/// Current UTC time as stored in timestamp columns
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// User role enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Platform administrator
    Admin,
    /// Psychologist running sessions
    Psychologist,
    /// Patient attending sessions
    Patient,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Psychologist => write!(f, "psychologist"),
            UserRole::Patient => write!(f, "patient"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "psychologist" => Ok(UserRole::Psychologist),
            "patient" => Ok(UserRole::Patient),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserStatus {
    #[default]
    #[serde(rename = "activo")]
    Active,
    #[serde(rename = "inactivo")]
    Inactive,
    #[serde(rename = "bloqueado")]
    Blocked,
    #[serde(rename = "rechazado")]
    Rejected,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "activo"),
            UserStatus::Inactive => write!(f, "inactivo"),
            UserStatus::Blocked => write!(f, "bloqueado"),
            UserStatus::Rejected => write!(f, "rechazado"),
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "activo" => Ok(UserStatus::Active),
            "inactivo" => Ok(UserStatus::Inactive),
            "bloqueado" => Ok(UserStatus::Blocked),
            "rechazado" => Ok(UserStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid user status: {}", s)),
        }
    }
}

/// Appointment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "programada")]
    Scheduled,
    #[serde(rename = "completada")]
    Completed,
    #[serde(rename = "cancelada")]
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pendiente"),
            AppointmentStatus::Scheduled => write!(f, "programada"),
            AppointmentStatus::Completed => write!(f, "completada"),
            AppointmentStatus::Cancelled => write!(f, "cancelada"),
        }
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pendiente" => Ok(AppointmentStatus::Pending),
            "programada" => Ok(AppointmentStatus::Scheduled),
            "completada" => Ok(AppointmentStatus::Completed),
            "cancelada" => Ok(AppointmentStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid appointment status: {}", s)),
        }
    }
}

/// Live session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Frames may still be streamed
    #[serde(rename = "activa")]
    Active,
    /// Ended by the psychologist
    #[serde(rename = "cerrada")]
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "activa"),
            SessionStatus::Closed => write!(f, "cerrada"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "activa" => Ok(SessionStatus::Active),
            "cerrada" => Ok(SessionStatus::Closed),
            _ => Err(anyhow::anyhow!("Invalid session status: {}", s)),
        }
    }
}

/// User record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub dni: Option<String>,
    pub username: String,
    /// bcrypt hash, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub photo_url: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub status: UserStatus,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Psychologists only
    pub specialty: Option<String>,
    /// Patients only: the psychologist in charge
    pub assigned_to: Option<i64>,
}

impl UserRecord {
    /// First and last name joined, empty when neither is set
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }

    /// Full name, or the username when no name is stored
    pub fn display_name(&self) -> String {
        let name = self.full_name();
        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }

    /// `YYYY-MM-DD` part of the creation timestamp
    pub fn created_date(&self) -> &str {
        date_part(&self.created_at)
    }

    pub fn is_blocked(&self) -> bool {
        self.status == UserStatus::Blocked
    }
}

/// Insertable user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub email: Option<String>,
    pub dni: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub specialty: Option<String>,
}

impl NewUser {
    /// Create an active user with only the required fields set
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>, role: UserRole) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            role,
            status: UserStatus::Active,
            email: None,
            dni: None,
            first_name: None,
            last_name: None,
            gender: None,
            birth_date: None,
            phone: None,
            address: None,
            city: None,
            country: None,
            specialty: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }
}

/// Appointment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: i64,
    pub psychologist_id: i64,
    pub patient_id: i64,
    /// Local naive time in `SCHEDULE_FORMAT`
    pub scheduled_at: String,
    pub status: AppointmentStatus,
    /// Therapy progress, 0 to 100
    pub progress: i64,
    /// Topic of the meeting
    pub notes: Option<String>,
    /// `virtual` or `presencial`
    pub mode: String,
    pub created_at: String,
}

impl AppointmentRecord {
    /// `YYYY-MM-DD`
    pub fn date(&self) -> &str {
        date_part(&self.scheduled_at)
    }

    /// `HH:MM`
    pub fn time(&self) -> &str {
        self.scheduled_at.get(11..16).unwrap_or("")
    }
}

/// Insertable appointment
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub psychologist_id: i64,
    pub patient_id: i64,
    pub scheduled_at: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub mode: String,
}

/// Partial appointment update; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct AppointmentUpdate {
    pub scheduled_at: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub progress: Option<i64>,
}

/// Live session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub appointment_id: Option<i64>,
    pub psychologist_id: Option<i64>,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub status: SessionStatus,
}

impl SessionRecord {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Chat message record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub session_id: Option<i64>,
    pub content: String,
    pub sent_at: String,
}

/// Psychologist report record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: i64,
    pub session_id: Option<i64>,
    pub psychologist_id: i64,
    pub patient_id: i64,
    pub summary: String,
    pub progress_percent: i64,
    pub status: String,
    pub created_at: String,
}

/// Insertable report
#[derive(Debug, Clone)]
pub struct NewReport {
    pub session_id: Option<i64>,
    pub psychologist_id: i64,
    pub patient_id: i64,
    pub summary: String,
    pub progress_percent: i64,
}

/// Report joined with the names of both parties, for the admin listing
#[derive(Debug, Clone, Serialize)]
pub struct ReportListing {
    pub id: i64,
    pub patient_name: Option<String>,
    pub psychologist_name: Option<String>,
    pub created_at: String,
    pub progress_percent: i64,
    pub status: String,
}

/// Stored classification result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub session_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub psychologist_id: Option<i64>,
    pub image_name: String,
    pub emotion: String,
    pub confidence: f64,
    pub detected_at: String,
}

/// Insertable detection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDetection {
    #[serde(default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub patient_id: Option<i64>,
    #[serde(default)]
    pub psychologist_id: Option<i64>,
    pub image_name: String,
    pub emotion: String,
    pub confidence: f64,
}

impl NewDetection {
    pub fn new(image_name: impl Into<String>, emotion: impl Into<String>, confidence: f64) -> Self {
        Self {
            image_name: image_name.into(),
            emotion: emotion.into(),
            confidence,
            ..Default::default()
        }
    }
}

fn date_part(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}
