/*!
 * Database module for persistent storage of the clinic's data.
 *
 * This module provides SQLite-based persistence for:
 * - Users (admins, psychologists, patients) and patient assignment
 * - Appointments, live sessions and psychologist reports
 * - Chat messages and emotion detections
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::{DatabaseConnection, DatabaseStats};
pub use repository::Repository;
