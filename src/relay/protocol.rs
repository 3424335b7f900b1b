/*!
 * Wire formats of the two streaming endpoints.
 *
 * The prediction socket speaks `type`-tagged JSON. The chat socket speaks
 * plain text lines understood by the existing web and desktop clients:
 * `status:<user>:online|offline`, `<user>:<text>` and the echo `yo:<text>`.
 */

use serde::{Deserialize, Serialize};

use crate::inference::{FaceBox, Prediction};

/// Messages a client sends on the prediction socket
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Base64 image or data URL
    Frame { data: String },
    Ping,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("invalid message: {}", e))
    }
}

/// Messages the server sends on the prediction socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Prediction {
        session_id: i64,
        emotion: String,
        confidence: f32,
        face: Option<FaceBox>,
        detected_at: String,
    },
    NoFace {
        session_id: i64,
    },
    Error {
        message: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn prediction(session_id: i64, prediction: &Prediction) -> Self {
        Self::Prediction {
            session_id,
            emotion: prediction.emotion.clone(),
            confidence: prediction.confidence,
            face: prediction.face_detected.then_some(prediction.face),
            detected_at: crate::database::models::now_timestamp(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","message":"serialization"}"#.to_string())
    }
}

/// Presence notice sent to a chat peer
pub fn chat_status(user_id: i64, online: bool) -> String {
    format!("status:{}:{}", user_id, if online { "online" } else { "offline" })
}

/// Message as delivered to the receiver
pub fn chat_forward(sender_id: i64, text: &str) -> String {
    format!("{}:{}", sender_id, text)
}

/// Message as echoed back to its sender
pub fn chat_echo(text: &str) -> String {
    format!("yo:{}", text)
}
