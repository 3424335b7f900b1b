/*!
 * Session manager for live session lifecycle.
 *
 * This module handles:
 * - Opening sessions for a psychologist, optionally tied to an appointment
 * - Closing sessions and completing their appointment
 * - Checking that a session can still receive frames
 */

use log::info;

use crate::database::models::SessionRecord;
use crate::database::repository::Repository;
use crate::errors::SessionError;

/// Session manager for handling live session lifecycle
#[derive(Clone)]
pub struct SessionManager {
    /// Repository for database operations
    repo: Repository,
}

impl SessionManager {
    /// Create a new session manager with the given repository
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Get the underlying repository
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Open a session for `psychologist_id`
    ///
    /// When an appointment is given it must exist and belong to the psychologist.
    pub async fn start_session(
        &self,
        psychologist_id: i64,
        appointment_id: Option<i64>,
    ) -> Result<SessionRecord, SessionError> {
        if let Some(appointment_id) = appointment_id {
            let appointment = self
                .repo
                .get_appointment(appointment_id)
                .await?
                .ok_or(SessionError::AppointmentNotFound(appointment_id))?;

            if appointment.psychologist_id != psychologist_id {
                return Err(SessionError::NotOwner);
            }
        }

        let session = self
            .repo
            .create_session(appointment_id, Some(psychologist_id))
            .await?;

        info!(
            "Session {} started by psychologist {} (appointment {:?})",
            session.id, psychologist_id, appointment_id
        );
        Ok(session)
    }

    /// Close a session owned by `psychologist_id`
    pub async fn end_session(
        &self,
        session_id: i64,
        psychologist_id: i64,
    ) -> Result<SessionRecord, SessionError> {
        let session = self.get_session(session_id).await?;

        if session.psychologist_id != Some(psychologist_id) {
            return Err(SessionError::NotOwner);
        }
        if !session.is_active() {
            return Err(SessionError::AlreadyClosed(session_id));
        }

        let closed = self
            .repo
            .close_session(session_id)
            .await?
            .ok_or(SessionError::AlreadyClosed(session_id))?;

        info!("Session {} ended", session_id);
        Ok(closed)
    }

    /// Get a session or fail with `NotFound`
    pub async fn get_session(&self, session_id: i64) -> Result<SessionRecord, SessionError> {
        self.repo
            .get_session(session_id)
            .await?
            .ok_or(SessionError::NotFound(session_id))
    }

    /// Get a session that still accepts frames
    pub async fn require_active(&self, session_id: i64) -> Result<SessionRecord, SessionError> {
        let session = self.get_session(session_id).await?;
        if !session.is_active() {
            return Err(SessionError::AlreadyClosed(session_id));
        }
        Ok(session)
    }
}
