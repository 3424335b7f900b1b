use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::hub::{ConnectionId, SessionHub, Subscription};
use super::protocol::{ClientMessage, ServerMessage};
use crate::app_config::RelayConfig;
use crate::database::models::NewDetection;
use crate::database::Repository;
use crate::errors::InferenceError;
use crate::inference::frame::{check_frame_size, decode_frame};
use crate::inference::{FrameAnalyzer, Prediction};

/// Relay behaviour switches
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// Predictions below this confidence are dropped
    pub min_confidence: f32,
    /// Store broadcast predictions as detections
    pub persist_detections: bool,
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            persist_detections: config.persist_detections,
        }
    }
}

/// The connection a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSender {
    pub session_id: i64,
    pub connection_id: ConnectionId,
    /// Whether `session_id` has a row in the sessions table
    pub session_stored: bool,
    /// Recorded on stored detections
    pub patient_id: Option<i64>,
    pub psychologist_id: Option<i64>,
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Prediction fanned out to this many connections
    Broadcast(usize),
    /// Prediction confidence under the threshold, nothing sent
    BelowThreshold,
    /// No face and no fallback; the sender was told
    NoFace,
    /// Malformed message or failed inference; the sender got an error
    Rejected(String),
    Pong,
}

/// Per-session frame prediction relay
#[derive(Clone)]
pub struct PredictionRelay {
    hub: SessionHub<i64, ServerMessage>,
    analyzer: Arc<dyn FrameAnalyzer>,
    repository: Repository,
    settings: RelaySettings,
    /// Stored frames per session, numbering detection image names
    frames: Arc<Mutex<HashMap<i64, u64>>>,
}

impl PredictionRelay {
    pub fn new(analyzer: Arc<dyn FrameAnalyzer>, repository: Repository, settings: RelaySettings) -> Self {
        Self {
            hub: SessionHub::new(),
            analyzer,
            repository,
            settings,
            frames: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn join(&self, session_id: i64) -> Subscription<ServerMessage> {
        self.hub.join(session_id)
    }

    pub fn leave(&self, session_id: i64, connection_id: ConnectionId) {
        self.hub.leave(&session_id, connection_id);
    }

    /// Connections currently watching a session
    pub fn subscriber_count(&self, session_id: i64) -> usize {
        self.hub.subscriber_count(&session_id)
    }

    /// Sessions with at least one connection
    pub fn active_sessions(&self) -> Vec<i64> {
        self.hub.active_keys()
    }

    /// Handle one JSON text message
    pub async fn handle_client_text(&self, sender: &FrameSender, text: &str) -> FrameOutcome {
        match ClientMessage::parse(text) {
            Ok(ClientMessage::Ping) => {
                self.reply(sender, ServerMessage::Pong);
                FrameOutcome::Pong
            }
            Ok(ClientMessage::Frame { data }) => {
                match decode_frame(&data, self.analyzer.max_frame_bytes()) {
                    Ok(bytes) => self.process(sender, bytes).await,
                    Err(e) => self.reject(sender, e.to_string()),
                }
            }
            Err(message) => self.reject(sender, message),
        }
    }

    /// Handle one binary message carrying raw image bytes
    pub async fn handle_frame_bytes(&self, sender: &FrameSender, bytes: Vec<u8>) -> FrameOutcome {
        if let Err(e) = check_frame_size(bytes.len(), self.analyzer.max_frame_bytes()) {
            return self.reject(sender, e.to_string());
        }
        self.process(sender, bytes).await
    }

    async fn process(&self, sender: &FrameSender, bytes: Vec<u8>) -> FrameOutcome {
        let prediction = match self.analyzer.analyze(bytes).await {
            Ok(prediction) => prediction,
            Err(InferenceError::NoFaceDetected) => {
                self.reply(
                    sender,
                    ServerMessage::NoFace {
                        session_id: sender.session_id,
                    },
                );
                return FrameOutcome::NoFace;
            }
            Err(e) => {
                warn!("Session {}: frame rejected: {}", sender.session_id, e);
                return self.reject(sender, e.to_string());
            }
        };

        if prediction.confidence < self.settings.min_confidence {
            debug!(
                "Session {}: {} at {:.3} below threshold",
                sender.session_id, prediction.emotion, prediction.confidence
            );
            return FrameOutcome::BelowThreshold;
        }

        let delivered = self.hub.broadcast(
            &sender.session_id,
            ServerMessage::prediction(sender.session_id, &prediction),
            None,
        );
        debug!(
            "Session {}: {} ({:.3}) sent to {} connections",
            sender.session_id, prediction.emotion, prediction.confidence, delivered
        );

        if self.settings.persist_detections {
            self.store(sender, &prediction).await;
        }

        FrameOutcome::Broadcast(delivered)
    }

    async fn store(&self, sender: &FrameSender, prediction: &Prediction) {
        let frame = self.next_frame_number(sender.session_id);
        let detection = NewDetection {
            session_id: sender.session_stored.then_some(sender.session_id),
            patient_id: sender.patient_id,
            psychologist_id: sender.psychologist_id,
            image_name: format!("session-{}-frame-{}", sender.session_id, frame),
            emotion: prediction.emotion.clone(),
            confidence: prediction.confidence as f64,
        };

        if let Err(e) = self.repository.insert_detection(&detection).await {
            warn!("Session {}: failed to store detection: {}", sender.session_id, e);
        }
    }

    fn next_frame_number(&self, session_id: i64) -> u64 {
        let mut frames = self.frames.lock();
        let counter = frames.entry(session_id).or_insert(0);
        *counter += 1;
        *counter
    }

    fn reply(&self, sender: &FrameSender, message: ServerMessage) {
        self.hub.send_to(&sender.session_id, sender.connection_id, message);
    }

    fn reject(&self, sender: &FrameSender, message: String) -> FrameOutcome {
        self.reply(sender, ServerMessage::error(message.clone()));
        FrameOutcome::Rejected(message)
    }
}
