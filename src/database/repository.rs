/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for all database operations,
 * abstracting away the SQL details and providing type-safe access.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::connection::DatabaseConnection;
use super::models::{
    now_timestamp, AppointmentRecord, AppointmentStatus, AppointmentUpdate, DetectionRecord,
    MessageRecord, NewAppointment, NewDetection, NewReport, NewUser, ReportListing, ReportRecord,
    SessionRecord, SessionStatus, UserRecord, UserRole, UserStatus, REPORT_STATUS_ACTIVE,
};

const USER_COLUMNS: &str = "id, dni, username, password_hash, role, first_name, last_name, email, \
     gender, birth_date, photo_url, phone, address, city, country, status, created_at, \
     specialty, assigned_to";

const APPOINTMENT_COLUMNS: &str =
    "id, psychologist_id, patient_id, scheduled_at, status, progress, notes, mode, created_at";

const SESSION_COLUMNS: &str = "id, appointment_id, psychologist_id, started_at, ended_at, status";

const DETECTION_COLUMNS: &str =
    "id, session_id, patient_id, psychologist_id, image_name, emotion, confidence, detected_at";

/// Repository for database operations
#[derive(Clone, Debug)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    fn map_user(row: &Row) -> rusqlite::Result<UserRecord> {
        Ok(UserRecord {
            id: row.get(0)?,
            dni: row.get(1)?,
            username: row.get(2)?,
            password_hash: row.get(3)?,
            role: row
                .get::<_, String>(4)?
                .parse()
                .unwrap_or(UserRole::Patient),
            first_name: row.get(5)?,
            last_name: row.get(6)?,
            email: row.get(7)?,
            gender: row.get(8)?,
            birth_date: row.get(9)?,
            photo_url: row.get(10)?,
            phone: row.get(11)?,
            address: row.get(12)?,
            city: row.get(13)?,
            country: row.get(14)?,
            status: row
                .get::<_, String>(15)?
                .parse()
                .unwrap_or(UserStatus::Active),
            created_at: row.get(16)?,
            specialty: row.get(17)?,
            assigned_to: row.get(18)?,
        })
    }

    /// Insert a user and return its ID
    pub async fn create_user(&self, user: &NewUser) -> Result<i64> {
        let user = user.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO users (
                        username, password_hash, role, status, email, dni, first_name, last_name,
                        gender, birth_date, phone, address, city, country, specialty, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                    "#,
                    params![
                        user.username,
                        user.password_hash,
                        user.role.to_string(),
                        user.status.to_string(),
                        user.email,
                        user.dni,
                        user.first_name,
                        user.last_name,
                        user.gender,
                        user.birth_date,
                        user.phone,
                        user.address,
                        user.city,
                        user.country,
                        user.specialty,
                        now_timestamp(),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                debug!("Created {} user {} ({})", user.role, id, user.username);
                Ok(id)
            })
            .await
    }

    /// Get a user by ID
    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>> {
        self.db
            .execute_async(move |conn| Self::get_user_sync(conn, user_id))
            .await
    }

    /// Get a user by ID (synchronous version for use within transactions)
    fn get_user_sync(conn: &Connection, user_id: i64) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let user = conn.query_row(&sql, [user_id], Self::map_user).optional()?;
        Ok(user)
    }

    /// Get a user by ID only when it has the given role
    pub async fn get_user_with_role(&self, user_id: i64, role: UserRole) -> Result<Option<UserRecord>> {
        Ok(self.get_user(user_id).await?.filter(|u| u.role == role))
    }

    /// Find a user by username or email
    pub async fn find_user_by_login(&self, login: &str) -> Result<Option<UserRecord>> {
        let login = login.trim().to_string();

        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    "SELECT {} FROM users WHERE username = ?1 OR email = ?1 ORDER BY id LIMIT 1",
                    USER_COLUMNS
                );
                let user = conn.query_row(&sql, [login], Self::map_user).optional()?;
                Ok(user)
            })
            .await
    }

    /// Whether an email address is already registered
    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let email = email.trim().to_string();

        self.db
            .execute_async(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE email = ?1",
                    [email],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
    }

    /// Whether a username or email is already taken
    pub async fn login_taken(&self, username: &str, email: Option<&str>) -> Result<bool> {
        let username = username.trim().to_string();
        let email = email.map(|e| e.trim().to_string());

        self.db
            .execute_async(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?1 OR (?2 IS NOT NULL AND (email = ?2 OR username = ?2))",
                    params![username, email],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
    }

    /// List users ordered by ID, optionally restricted to one role
    pub async fn list_users(&self, role: Option<UserRole>) -> Result<Vec<UserRecord>> {
        let role = role.map(|r| r.to_string());

        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    "SELECT {} FROM users WHERE (?1 IS NULL OR role = ?1) ORDER BY id",
                    USER_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let users = stmt
                    .query_map([role], Self::map_user)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(users)
            })
            .await
    }

    /// Delete a user; returns false when no such user exists
    pub async fn delete_user(&self, user_id: i64) -> Result<bool> {
        self.db
            .execute_async(move |conn| {
                let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
                Ok(deleted > 0)
            })
            .await
    }

    /// Delete a user only when it has the given role
    pub async fn delete_user_with_role(&self, user_id: i64, role: UserRole) -> Result<bool> {
        let role = role.to_string();

        self.db
            .execute_async(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM users WHERE id = ?1 AND role = ?2",
                    params![user_id, role],
                )?;
                Ok(deleted > 0)
            })
            .await
    }

    /// Assign a patient to a psychologist
    pub async fn assign_patient(&self, patient_id: i64, psychologist_id: i64) -> Result<bool> {
        self.db
            .execute_async(move |conn| {
                let updated = conn.execute(
                    "UPDATE users SET assigned_to = ?1 WHERE id = ?2 AND role = 'patient'",
                    params![psychologist_id, patient_id],
                )?;
                Ok(updated > 0)
            })
            .await
    }

    /// Patients assigned to a psychologist
    pub async fn list_assigned_patients(&self, psychologist_id: i64) -> Result<Vec<UserRecord>> {
        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    "SELECT {} FROM users WHERE assigned_to = ?1 AND role = 'patient' ORDER BY id",
                    USER_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let users = stmt
                    .query_map([psychologist_id], Self::map_user)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(users)
            })
            .await
    }

    /// Count users, optionally filtered by role and status
    pub async fn count_users(&self, role: Option<UserRole>, status: Option<UserStatus>) -> Result<i64> {
        let role = role.map(|r| r.to_string());
        let status = status.map(|s| s.to_string());

        self.db
            .execute_async(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE (?1 IS NULL OR role = ?1) AND (?2 IS NULL OR status = ?2)",
                    params![role, status],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }

    /// Number of psychologists per specialty
    pub async fn specialty_histogram(&self) -> Result<Vec<(String, i64)>> {
        self.db
            .execute_async(|conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT specialty, COUNT(*) FROM users
                    WHERE role = 'psychologist' AND specialty IS NOT NULL AND specialty != ''
                    GROUP BY specialty
                    ORDER BY COUNT(*) DESC, specialty
                    "#,
                )?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    // =========================================================================
    // Appointment Operations
    // =========================================================================

    fn map_appointment(row: &Row) -> rusqlite::Result<AppointmentRecord> {
        Ok(AppointmentRecord {
            id: row.get(0)?,
            psychologist_id: row.get(1)?,
            patient_id: row.get(2)?,
            scheduled_at: row.get(3)?,
            status: row
                .get::<_, String>(4)?
                .parse()
                .unwrap_or(AppointmentStatus::Pending),
            progress: row.get(5)?,
            notes: row.get(6)?,
            mode: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    /// Insert an appointment and return its ID
    pub async fn create_appointment(&self, appointment: &NewAppointment) -> Result<i64> {
        let appointment = appointment.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO appointments (
                        psychologist_id, patient_id, scheduled_at, status, notes, mode, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        appointment.psychologist_id,
                        appointment.patient_id,
                        appointment.scheduled_at,
                        appointment.status.to_string(),
                        appointment.notes,
                        appointment.mode,
                        now_timestamp(),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// Get an appointment by ID
    pub async fn get_appointment(&self, appointment_id: i64) -> Result<Option<AppointmentRecord>> {
        self.db
            .execute_async(move |conn| {
                let sql = format!("SELECT {} FROM appointments WHERE id = ?1", APPOINTMENT_COLUMNS);
                let appointment = conn
                    .query_row(&sql, [appointment_id], Self::map_appointment)
                    .optional()?;
                Ok(appointment)
            })
            .await
    }

    /// Appointments of a psychologist, earliest first
    pub async fn list_appointments_for_psychologist(&self, psychologist_id: i64) -> Result<Vec<AppointmentRecord>> {
        self.list_appointments_by("psychologist_id", psychologist_id).await
    }

    /// Appointments of a patient, earliest first
    pub async fn list_appointments_for_patient(&self, patient_id: i64) -> Result<Vec<AppointmentRecord>> {
        self.list_appointments_by("patient_id", patient_id).await
    }

    async fn list_appointments_by(&self, column: &'static str, user_id: i64) -> Result<Vec<AppointmentRecord>> {
        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    "SELECT {} FROM appointments WHERE {} = ?1 ORDER BY scheduled_at, id",
                    APPOINTMENT_COLUMNS, column
                );
                let mut stmt = conn.prepare(&sql)?;
                let appointments = stmt
                    .query_map([user_id], Self::map_appointment)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(appointments)
            })
            .await
    }

    /// Apply a partial update; returns false when the appointment does not exist
    pub async fn update_appointment(&self, appointment_id: i64, update: &AppointmentUpdate) -> Result<bool> {
        let update = update.clone();

        self.db
            .execute_async(move |conn| {
                let updated = conn.execute(
                    r#"
                    UPDATE appointments SET
                        scheduled_at = COALESCE(?1, scheduled_at),
                        notes = COALESCE(?2, notes),
                        status = COALESCE(?3, status),
                        progress = COALESCE(?4, progress)
                    WHERE id = ?5
                    "#,
                    params![
                        update.scheduled_at,
                        update.notes,
                        update.status.map(|s| s.to_string()),
                        update.progress,
                        appointment_id,
                    ],
                )?;
                Ok(updated > 0)
            })
            .await
    }

    // =========================================================================
    // Live Session Operations
    // =========================================================================

    fn map_session(row: &Row) -> rusqlite::Result<SessionRecord> {
        Ok(SessionRecord {
            id: row.get(0)?,
            appointment_id: row.get(1)?,
            psychologist_id: row.get(2)?,
            started_at: row.get(3)?,
            ended_at: row.get(4)?,
            status: row
                .get::<_, String>(5)?
                .parse()
                .unwrap_or(SessionStatus::Closed),
        })
    }

    /// Open a new active session
    pub async fn create_session(
        &self,
        appointment_id: Option<i64>,
        psychologist_id: Option<i64>,
    ) -> Result<SessionRecord> {
        self.db
            .execute_async(move |conn| {
                let started_at = now_timestamp();
                conn.execute(
                    "INSERT INTO sessions (appointment_id, psychologist_id, started_at, status)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        appointment_id,
                        psychologist_id,
                        started_at,
                        SessionStatus::Active.to_string()
                    ],
                )?;

                Ok(SessionRecord {
                    id: conn.last_insert_rowid(),
                    appointment_id,
                    psychologist_id,
                    started_at,
                    ended_at: None,
                    status: SessionStatus::Active,
                })
            })
            .await
    }

    /// Get a session by ID
    pub async fn get_session(&self, session_id: i64) -> Result<Option<SessionRecord>> {
        self.db
            .execute_async(move |conn| Self::get_session_sync(conn, session_id))
            .await
    }

    fn get_session_sync(conn: &Connection, session_id: i64) -> Result<Option<SessionRecord>> {
        let sql = format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS);
        let session = conn.query_row(&sql, [session_id], Self::map_session).optional()?;
        Ok(session)
    }

    /// Close an active session and complete its appointment
    ///
    /// Returns the closed session, or `None` when the session was not active.
    pub async fn close_session(&self, session_id: i64) -> Result<Option<SessionRecord>> {
        self.db
            .transaction_async(move |tx| {
                let closed = tx.execute(
                    "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE id = ?3 AND status = ?4",
                    params![
                        SessionStatus::Closed.to_string(),
                        now_timestamp(),
                        session_id,
                        SessionStatus::Active.to_string()
                    ],
                )?;

                if closed == 0 {
                    return Ok(None);
                }

                tx.execute(
                    r#"
                    UPDATE appointments SET status = ?1
                    WHERE id = (SELECT appointment_id FROM sessions WHERE id = ?2)
                    "#,
                    params![AppointmentStatus::Completed.to_string(), session_id],
                )?;

                Self::get_session_sync(tx, session_id)
            })
            .await
    }

    /// Start timestamps of sessions started at or after `since` (RFC 3339)
    pub async fn session_start_times_since(&self, since: &str) -> Result<Vec<String>> {
        let since = since.to_string();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT started_at FROM sessions WHERE started_at >= ?1 ORDER BY started_at",
                )?;
                let rows = stmt
                    .query_map([since], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(rows)
            })
            .await
    }

    // =========================================================================
    // Message Operations
    // =========================================================================

    /// Store a chat message and return its ID
    pub async fn insert_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        session_id: Option<i64>,
        content: &str,
    ) -> Result<i64> {
        let content = content.to_string();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "INSERT INTO messages (sender_id, receiver_id, session_id, content, sent_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![sender_id, receiver_id, session_id, content, now_timestamp()],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// Messages exchanged between two users in either direction, oldest first
    pub async fn chat_history(&self, user_id: i64, peer_id: i64) -> Result<Vec<MessageRecord>> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, sender_id, receiver_id, session_id, content, sent_at
                    FROM messages
                    WHERE (sender_id = ?1 AND receiver_id = ?2)
                       OR (sender_id = ?2 AND receiver_id = ?1)
                    ORDER BY sent_at, id
                    "#,
                )?;
                let messages = stmt
                    .query_map(params![user_id, peer_id], |row| {
                        Ok(MessageRecord {
                            id: row.get(0)?,
                            sender_id: row.get(1)?,
                            receiver_id: row.get(2)?,
                            session_id: row.get(3)?,
                            content: row.get(4)?,
                            sent_at: row.get(5)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(messages)
            })
            .await
    }

    // =========================================================================
    // Report Operations
    // =========================================================================

    /// Insert a report and return its ID
    pub async fn create_report(&self, report: &NewReport) -> Result<i64> {
        let report = report.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO reports (
                        session_id, psychologist_id, patient_id, summary, progress_percent,
                        status, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        report.session_id,
                        report.psychologist_id,
                        report.patient_id,
                        report.summary,
                        report.progress_percent,
                        REPORT_STATUS_ACTIVE,
                        now_timestamp(),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// Reports written by a psychologist, newest first
    pub async fn list_reports_by_psychologist(&self, psychologist_id: i64) -> Result<Vec<ReportRecord>> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, session_id, psychologist_id, patient_id, summary,
                           progress_percent, status, created_at
                    FROM reports WHERE psychologist_id = ?1
                    ORDER BY created_at DESC, id DESC
                    "#,
                )?;
                let reports = stmt
                    .query_map([psychologist_id], |row| {
                        Ok(ReportRecord {
                            id: row.get(0)?,
                            session_id: row.get(1)?,
                            psychologist_id: row.get(2)?,
                            patient_id: row.get(3)?,
                            summary: row.get(4)?,
                            progress_percent: row.get(5)?,
                            status: row.get(6)?,
                            created_at: row.get(7)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(reports)
            })
            .await
    }

    /// All reports with patient and psychologist names
    pub async fn list_report_listings(&self) -> Result<Vec<ReportListing>> {
        self.db
            .execute_async(|conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT r.id,
                           TRIM(COALESCE(pa.first_name, '') || ' ' || COALESCE(pa.last_name, '')),
                           TRIM(COALESCE(ps.first_name, '') || ' ' || COALESCE(ps.last_name, '')),
                           r.created_at, r.progress_percent, r.status,
                           pa.id IS NOT NULL, ps.id IS NOT NULL
                    FROM reports r
                    LEFT JOIN users pa ON pa.id = r.patient_id
                    LEFT JOIN users ps ON ps.id = r.psychologist_id
                    ORDER BY r.created_at DESC, r.id DESC
                    "#,
                )?;
                let listings = stmt
                    .query_map([], |row| {
                        let created_at: String = row.get(3)?;
                        let has_patient: bool = row.get(6)?;
                        let has_psychologist: bool = row.get(7)?;
                        Ok(ReportListing {
                            id: row.get(0)?,
                            patient_name: if has_patient { Some(row.get(1)?) } else { None },
                            psychologist_name: if has_psychologist { Some(row.get(2)?) } else { None },
                            created_at: created_at.get(..10).unwrap_or(&created_at).to_string(),
                            progress_percent: row.get(4)?,
                            status: row.get(5)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(listings)
            })
            .await
    }

    /// Delete a report; returns false when no such report exists
    pub async fn delete_report(&self, report_id: i64) -> Result<bool> {
        self.db
            .execute_async(move |conn| {
                let deleted = conn.execute("DELETE FROM reports WHERE id = ?1", [report_id])?;
                Ok(deleted > 0)
            })
            .await
    }

    pub async fn count_reports(&self) -> Result<i64> {
        self.db
            .execute_async(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?)
            })
            .await
    }

    /// Mean progress over all reports, 0 when there are none
    pub async fn average_progress(&self) -> Result<f64> {
        self.db
            .execute_async(|conn| {
                let avg: Option<f64> = conn.query_row(
                    "SELECT AVG(progress_percent) FROM reports",
                    [],
                    |row| row.get(0),
                )?;
                Ok(avg.unwrap_or(0.0))
            })
            .await
    }

    /// Name of the psychologist with the most reports
    pub async fn top_psychologist(&self) -> Result<Option<String>> {
        self.db
            .execute_async(|conn| {
                let name = conn
                    .query_row(
                        r#"
                        SELECT COALESCE(u.first_name, u.username)
                        FROM reports r JOIN users u ON u.id = r.psychologist_id
                        GROUP BY u.id
                        ORDER BY COUNT(r.id) DESC, u.id
                        LIMIT 1
                        "#,
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(name)
            })
            .await
    }

    /// Average report progress per `YYYY-MM` month for reports created at or after `since`
    pub async fn progress_by_month_since(&self, since: &str) -> Result<Vec<(String, f64)>> {
        let since = since.to_string();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT substr(created_at, 1, 7) AS month, AVG(progress_percent)
                    FROM reports WHERE created_at >= ?1
                    GROUP BY month ORDER BY month
                    "#,
                )?;
                let rows = stmt
                    .query_map([since], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    // =========================================================================
    // Detection Operations
    // =========================================================================

    fn map_detection(row: &Row) -> rusqlite::Result<DetectionRecord> {
        Ok(DetectionRecord {
            id: row.get(0)?,
            session_id: row.get(1)?,
            patient_id: row.get(2)?,
            psychologist_id: row.get(3)?,
            image_name: row.get(4)?,
            emotion: row.get(5)?,
            confidence: row.get(6)?,
            detected_at: row.get(7)?,
        })
    }

    /// Store a detection and return the stored record
    pub async fn insert_detection(&self, detection: &NewDetection) -> Result<DetectionRecord> {
        let detection = detection.clone();

        self.db
            .execute_async(move |conn| {
                let detected_at = now_timestamp();
                conn.execute(
                    r#"
                    INSERT INTO detections (
                        session_id, patient_id, psychologist_id, image_name, emotion,
                        confidence, detected_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        detection.session_id,
                        detection.patient_id,
                        detection.psychologist_id,
                        detection.image_name,
                        detection.emotion,
                        detection.confidence,
                        detected_at,
                    ],
                )?;

                Ok(DetectionRecord {
                    id: conn.last_insert_rowid(),
                    session_id: detection.session_id,
                    patient_id: detection.patient_id,
                    psychologist_id: detection.psychologist_id,
                    image_name: detection.image_name,
                    emotion: detection.emotion,
                    confidence: detection.confidence,
                    detected_at,
                })
            })
            .await
    }

    /// Detections newest first, optionally restricted to one emotion
    pub async fn list_detections(&self, emotion: Option<&str>) -> Result<Vec<DetectionRecord>> {
        let emotion = emotion.map(|e| e.trim().to_lowercase());

        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    "SELECT {} FROM detections WHERE (?1 IS NULL OR emotion = ?1) ORDER BY id DESC",
                    DETECTION_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let detections = stmt
                    .query_map([emotion], Self::map_detection)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(detections)
            })
            .await
    }

    /// Detection count per emotion, optionally for a single patient
    pub async fn emotion_counts(&self, patient_id: Option<i64>) -> Result<Vec<(String, i64)>> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT emotion, COUNT(*) FROM detections
                    WHERE (?1 IS NULL OR patient_id = ?1)
                    GROUP BY emotion ORDER BY emotion
                    "#,
                )?;
                let rows = stmt
                    .query_map([patient_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }
}
