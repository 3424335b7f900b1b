/*!
 * # EMOTIA
 *
 * Backend of a telehealth application where psychologists run live video
 * sessions with patients while a facial emotion recognition model annotates
 * the frames in near real time.
 *
 * ## Features
 *
 * - Accounts for admins, psychologists and patients (bcrypt + JWT)
 * - Appointments, psychologist reports and admin statistics
 * - Person-to-person chat over WebSockets with stored history
 * - Per-session prediction relay: frames in, emotion predictions fanned out
 *   to every client watching the session
 * - Pluggable inference: centre-crop or Haar cascade face detection, mock or
 *   ONNX Runtime classifier
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `errors`: Custom error types for the application
 * - `database`: SQLite schema, connection wrapper, records and repository
 * - `auth`: Password hashing and access tokens
 * - `inference`: Frame decoding, face detection, preprocessing, classifiers
 * - `relay`: In-memory fan-out hub, chat and prediction relays, wire protocol
 * - `session`: Live session lifecycle
 * - `api`: axum router, REST handlers and WebSocket endpoints
 * - `app_controller`: Wires everything together and runs the server
 * - `file_utils`: Image discovery for local prediction
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod api;
pub mod app_config;
pub mod app_controller;
pub mod auth;
pub mod database;
pub mod errors;
pub mod file_utils;
pub mod inference;
pub mod relay;
pub mod session;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::Controller;
pub use errors::{ApiError, AuthError, InferenceError, SessionError};
pub use inference::{EmotionPredictor, FrameAnalyzer, Prediction};
