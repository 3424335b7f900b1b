use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Password hashing and token settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Emotion model settings
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Streaming relay settings
    #[serde(default)]
    pub relay: RelayConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Environment variable overriding `auth.jwt_secret`
pub const JWT_SECRET_ENV: &str = "EMOTIA_JWT_SECRET";

/// Environment variable overriding `database.path`
pub const DATABASE_PATH_ENV: &str = "EMOTIA_DATABASE_PATH";

/// HTTP server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding a listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file; the platform data directory is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Authentication configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens (empty means generate one at startup)
    #[serde(default = "String::new")]
    pub jwt_secret: String,

    /// Access token lifetime in minutes
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,

    /// bcrypt work factor
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_minutes: default_token_ttl_minutes(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

/// Classifier backend type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    // @backend: Deterministic classifier without a model file
    #[default]
    Mock,
    // @backend: ONNX Runtime model
    Onnx,
}

impl InferenceBackend {
    // @returns: Lowercase backend identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Mock => "mock".to_string(),
            Self::Onnx => "onnx".to_string(),
        }
    }

    /// Whether this build can run the backend
    pub fn is_available(&self) -> bool {
        match self {
            Self::Mock => true,
            Self::Onnx => cfg!(feature = "onnx"),
        }
    }
}

impl std::fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for InferenceBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "onnx" => Ok(Self::Onnx),
            _ => Err(anyhow!("Invalid inference backend: {}", s)),
        }
    }
}

/// Face detector type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// No detection; the centre square of the frame is used
    #[default]
    CenterCrop,
    /// OpenCV Haar cascade
    HaarCascade,
}

impl DetectorKind {
    /// Whether this build can run the detector
    pub fn is_available(&self) -> bool {
        match self {
            Self::CenterCrop => true,
            Self::HaarCascade => cfg!(feature = "opencv"),
        }
    }
}

/// Emotion model configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InferenceConfig {
    /// Classifier backend
    #[serde(default)]
    pub backend: InferenceBackend,

    /// Model file for the ONNX backend
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Class names file (JSON array or index map); built-in labels when missing
    #[serde(default = "default_labels_path")]
    pub labels_path: PathBuf,

    /// Side length of the square model input
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Apply softmax to the raw model output (for models emitting logits)
    #[serde(default)]
    pub apply_softmax: bool,

    /// Face detector
    #[serde(default)]
    pub detector: DetectorKind,

    /// Haar cascade XML for the `haar_cascade` detector
    #[serde(default = "default_cascade_path")]
    pub cascade_path: PathBuf,

    /// Classify the centre square when no face is found
    #[serde(default = "default_true")]
    pub fallback_center_crop: bool,

    /// Maximum decoded frame size in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: InferenceBackend::default(),
            model_path: default_model_path(),
            labels_path: default_labels_path(),
            input_size: default_input_size(),
            apply_softmax: false,
            detector: DetectorKind::default(),
            cascade_path: default_cascade_path(),
            fallback_center_crop: true,
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

/// Streaming relay configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    /// Close a socket that has been silent this long
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Predictions below this confidence are not broadcast
    #[serde(default)]
    pub min_confidence: f32,

    /// Store every broadcast prediction as a detection row
    #[serde(default = "default_true")]
    pub persist_detections: bool,

    /// Refuse prediction sockets for unknown or closed sessions
    #[serde(default)]
    pub require_active_session: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            min_confidence: 0.0,
            persist_detections: true,
            require_active_session: false,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching `log` crate filter
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_token_ttl_minutes() -> i64 {
    60
}

fn default_bcrypt_cost() -> u32 {
    12
}

fn default_model_path() -> PathBuf {
    PathBuf::from("ia/models/emotion.onnx")
}

fn default_labels_path() -> PathBuf {
    PathBuf::from("ia/models/class_indices.json")
}

fn default_cascade_path() -> PathBuf {
    PathBuf::from("haarcascade_frontalface_default.xml")
}

fn default_input_size() -> u32 {
    48 // FER-style grayscale input
}

fn default_max_frame_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load the configuration file, writing a default one when it does not exist
    pub fn load_or_create<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            let file = File::open(config_path)
                .with_context(|| format!("Failed to open config file: {}", config_path.display()))?;

            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", config_path.display());

        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;

        std::fs::write(config_path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", config_path.display()))?;

        Ok(config)
    }

    /// Apply `EMOTIA_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.trim().is_empty() {
                self.auth.jwt_secret = secret;
            }
        }

        if let Ok(path) = std::env::var(DATABASE_PATH_ENV) {
            if !path.trim().is_empty() {
                self.database.path = Some(PathBuf::from(path));
            }
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(anyhow!("server.host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(anyhow!("server.port must be greater than zero"));
        }

        if self.auth.token_ttl_minutes <= 0 {
            return Err(anyhow!("auth.token_ttl_minutes must be positive"));
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(anyhow!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            ));
        }

        if !(8..=512).contains(&self.inference.input_size) {
            return Err(anyhow!(
                "inference.input_size must be between 8 and 512, got {}",
                self.inference.input_size
            ));
        }
        if self.inference.max_frame_bytes == 0 {
            return Err(anyhow!("inference.max_frame_bytes must be greater than zero"));
        }
        if !self.inference.backend.is_available() {
            return Err(anyhow!(
                "Inference backend '{}' requires building with the `{}` feature",
                self.inference.backend,
                self.inference.backend
            ));
        }
        if !self.inference.detector.is_available() {
            return Err(anyhow!("The haar_cascade detector requires building with the `opencv` feature"));
        }

        if self.relay.idle_timeout_secs == 0 {
            return Err(anyhow!("relay.idle_timeout_secs must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.relay.min_confidence) {
            return Err(anyhow!(
                "relay.min_confidence must be within [0, 1], got {}",
                self.relay.min_confidence
            ));
        }

        Ok(())
    }
}
