/*!
 * Common test utilities for the emotia test suite
 */

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::{GrayImage, ImageFormat, Luma};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use emotia::api::{self, AppState};
use emotia::app_config::RelayConfig;
use emotia::auth::{PasswordHasher, TokenService};
use emotia::database::models::{NewUser, UserRecord, UserRole};
use emotia::database::Repository;
use emotia::errors::InferenceError;
use emotia::inference::{FaceBox, FrameAnalyzer, Prediction};

pub const TEST_SECRET: &str = "test-secret";
pub const TEST_PASSWORD: &str = "secret123";

/// What a `ScriptedAnalyzer` answers
#[derive(Debug, Clone)]
pub enum Script {
    Emotion { emotion: String, confidence: f32 },
    NoFace,
    Fail(String),
}

/// Analyzer that skips image decoding and answers from a script
pub struct ScriptedAnalyzer {
    script: Script,
    max_frame_bytes: usize,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            max_frame_bytes: 1 << 20,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn emotion(emotion: &str, confidence: f32) -> Self {
        Self::new(Script::Emotion {
            emotion: emotion.to_string(),
            confidence,
        })
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, image: Vec<u8>) -> Result<Prediction, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if image.is_empty() {
            return Err(InferenceError::ImageDecode("empty image".to_string()));
        }

        match &self.script {
            Script::Emotion { emotion, confidence } => Ok(Prediction {
                emotion: emotion.clone(),
                confidence: *confidence,
                face: FaceBox::new(0, 0, 48, 48),
                face_detected: true,
                scores: BTreeMap::from([(emotion.clone(), *confidence)]),
            }),
            Script::NoFace => Err(InferenceError::NoFaceDetected),
            Script::Fail(message) => Err(InferenceError::Classifier(message.clone())),
        }
    }

    fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

/// State over an in-memory database with a scripted analyzer
pub fn test_state() -> AppState {
    test_state_with(Arc::new(ScriptedAnalyzer::emotion("happy", 0.9)), &RelayConfig::default())
}

pub fn test_state_with(analyzer: Arc<dyn FrameAnalyzer>, relay: &RelayConfig) -> AppState {
    let repository = Repository::new_in_memory().expect("in-memory database");
    AppState::new(
        repository,
        TokenService::new(TEST_SECRET, 60),
        PasswordHasher::new(4),
        analyzer,
        relay,
    )
}

/// Insert a user with `TEST_PASSWORD`
pub async fn create_user(state: &AppState, username: &str, role: UserRole) -> UserRecord {
    let hash = state.hasher.hash(TEST_PASSWORD).expect("hash");
    let user = NewUser::new(username, hash, role).with_email(format!("{}@emotia.com", username));
    let id = state.repository.create_user(&user).await.expect("create user");
    state.repository.get_user(id).await.expect("get user").expect("user exists")
}

pub fn token_for(state: &AppState, user: &UserRecord) -> String {
    state.tokens.issue(user).expect("token")
}

/// Encode a uniform grayscale image
pub fn image_bytes(width: u32, height: u32, value: u8, format: ImageFormat) -> Vec<u8> {
    let img = GrayImage::from_pixel(width, height, Luma([value]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode image");
    out.into_inner()
}

pub fn png_bytes(value: u8) -> Vec<u8> {
    image_bytes(64, 48, value, ImageFormat::Png)
}

/// Drive the router with one request
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, body)
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token, Body::empty(), None)
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    request("DELETE", uri, token, Body::empty(), None)
}

pub fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    request("POST", uri, token, Body::from(body.to_string()), Some("application/json"))
}

pub fn put_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    request("PUT", uri, token, Body::from(body.to_string()), Some("application/json"))
}

/// Multipart upload with a single field
pub fn post_multipart(uri: &str, field: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "emotia-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    request(
        "POST",
        uri,
        None,
        Body::from(body),
        Some(&format!("multipart/form-data; boundary={}", boundary)),
    )
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Body, content_type: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(body).expect("request")
}

/// Router plus the state behind it
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    (api::router(state.clone()), state)
}
