/*!
 * Tests for application configuration functionality
 */

use std::path::PathBuf;

use emotia::app_config::{Config, DetectorKind, InferenceBackend, LogLevel, DATABASE_PATH_ENV, JWT_SECRET_ENV};
use tempfile::TempDir;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.server.bind_address(), "127.0.0.1:8000");
    assert!(config.database.path.is_none());
    assert_eq!(config.auth.token_ttl_minutes, 60);
    assert_eq!(config.auth.bcrypt_cost, 12);
    assert!(config.auth.jwt_secret.is_empty());
    assert_eq!(config.inference.backend, InferenceBackend::Mock);
    assert_eq!(config.inference.detector, DetectorKind::CenterCrop);
    assert_eq!(config.inference.input_size, 48);
    assert!(config.inference.fallback_center_crop);
    assert_eq!(config.inference.max_frame_bytes, 2 * 1024 * 1024);
    assert_eq!(config.relay.idle_timeout_secs, 30);
    assert_eq!(config.relay.min_confidence, 0.0);
    assert!(config.relay.persist_detections);
    assert!(!config.relay.require_active_session);
    assert_eq!(config.log_level, LogLevel::Info);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.server.port = 0;
    assert!(config.validate().is_err());
    config.server.port = 8000;

    config.inference.input_size = 4;
    assert!(config.validate().is_err());
    config.inference.input_size = 48;

    config.auth.bcrypt_cost = 3;
    assert!(config.validate().is_err());
    config.auth.bcrypt_cost = 10;

    config.relay.min_confidence = 1.5;
    assert!(config.validate().is_err());
    config.relay.min_confidence = 0.5;

    config.relay.idle_timeout_secs = 0;
    assert!(config.validate().is_err());
    config.relay.idle_timeout_secs = 10;

    config.auth.token_ttl_minutes = 0;
    assert!(config.validate().is_err());
    config.auth.token_ttl_minutes = 5;

    config.inference.max_frame_bytes = 0;
    assert!(config.validate().is_err());
    config.inference.max_frame_bytes = 1024;

    assert!(config.validate().is_ok());
}

#[cfg(not(feature = "onnx"))]
#[test]
fn test_config_validation_withOnnxBackendWithoutFeature_shouldFail() {
    let mut config = Config::default();
    config.inference.backend = InferenceBackend::Onnx;

    let error = config.validate().unwrap_err().to_string();
    assert!(error.contains("onnx"));
}

#[cfg(not(feature = "opencv"))]
#[test]
fn test_config_validation_withHaarDetectorWithoutFeature_shouldFail() {
    let mut config = Config::default();
    config.inference.detector = DetectorKind::HaarCascade;

    assert!(config.validate().is_err());
}

/// Partial files fall back to defaults section by section
#[test]
fn test_deserialize_withPartialJson_shouldFillDefaults() {
    let json = r#"{
        "server": { "port": 9000 },
        "inference": { "backend": "mock", "detector": "center_crop", "input_size": 64 },
        "relay": { "min_confidence": 0.4 },
        "log_level": "debug"
    }"#;

    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.inference.input_size, 64);
    assert_eq!(config.relay.min_confidence, 0.4);
    assert_eq!(config.relay.idle_timeout_secs, 30);
    assert_eq!(config.auth.bcrypt_cost, 12);
    assert_eq!(config.log_level, LogLevel::Debug);
}

#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf.json");

    let created = Config::load_or_create(&path).unwrap();
    assert!(path.exists());

    let loaded = Config::load_or_create(&path).unwrap();
    assert_eq!(loaded.server.port, created.server.port);
    assert_eq!(loaded.inference.labels_path, created.inference.labels_path);
}

#[test]
fn test_loadOrCreate_withInvalidJson_shouldFail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::load_or_create(&path).is_err());
}

#[test]
fn test_applyEnvOverrides_shouldReplaceSecretAndDatabasePath() {
    let mut config = Config::default();

    // Only this test touches these variables
    unsafe {
        std::env::set_var(JWT_SECRET_ENV, "from-env");
        std::env::set_var(DATABASE_PATH_ENV, "/tmp/emotia-env.db");
    }
    config.apply_env_overrides();
    unsafe {
        std::env::remove_var(JWT_SECRET_ENV);
        std::env::remove_var(DATABASE_PATH_ENV);
    }

    assert_eq!(config.auth.jwt_secret, "from-env");
    assert_eq!(config.database.path, Some(PathBuf::from("/tmp/emotia-env.db")));
}

#[test]
fn test_logLevel_toLevelFilter_shouldMatch() {
    assert_eq!(LogLevel::Error.to_level_filter(), log::LevelFilter::Error);
    assert_eq!(LogLevel::Trace.to_level_filter(), log::LevelFilter::Trace);
}
