/*!
 * Live session lifecycle.
 *
 * A psychologist opens a session (optionally for an appointment), clients
 * stream frames against its id, and the psychologist closes it, which also
 * completes the appointment.
 */

pub mod manager;
pub mod models;

// Re-export main types
pub use manager::SessionManager;
pub use models::SessionInfo;
