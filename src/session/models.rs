use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::models::{SessionRecord, SessionStatus};

/// Session state as reported by the API
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: i64,
    pub appointment_id: Option<i64>,
    pub psychologist_id: Option<i64>,
    pub status: SessionStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    /// Whole seconds from start to end, or to now while active
    pub duration_secs: Option<i64>,
    /// Prediction sockets currently attached
    pub live_connections: usize,
}

impl SessionInfo {
    /// Create from a database record
    pub fn from_record(record: &SessionRecord, live_connections: usize) -> Self {
        Self {
            session_id: record.id,
            appointment_id: record.appointment_id,
            psychologist_id: record.psychologist_id,
            status: record.status,
            started_at: record.started_at.clone(),
            ended_at: record.ended_at.clone(),
            duration_secs: duration_secs(&record.started_at, record.ended_at.as_deref()),
            live_connections,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

fn duration_secs(started_at: &str, ended_at: Option<&str>) -> Option<i64> {
    let start = DateTime::parse_from_rfc3339(started_at).ok()?.with_timezone(&Utc);
    let end = match ended_at {
        Some(end) => DateTime::parse_from_rfc3339(end).ok()?.with_timezone(&Utc),
        None => Utc::now(),
    };
    Some((end - start).num_seconds().max(0))
}
