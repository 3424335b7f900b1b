/*!
 * Tests for the prediction relay fan-out
 */

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;

use emotia::database::Repository;
use emotia::relay::{FrameOutcome, FrameSender, PredictionRelay, RelaySettings, ServerMessage, Subscription};

use crate::common::{png_bytes, Script, ScriptedAnalyzer};

fn relay_with(script: Script, settings: RelaySettings) -> (PredictionRelay, Repository, Arc<ScriptedAnalyzer>) {
    let repo = Repository::new_in_memory().unwrap();
    let analyzer = Arc::new(ScriptedAnalyzer::new(script));
    let relay = PredictionRelay::new(analyzer.clone(), repo.clone(), settings);
    (relay, repo, analyzer)
}

fn settings() -> RelaySettings {
    RelaySettings {
        min_confidence: 0.0,
        persist_detections: false,
    }
}

fn happy() -> Script {
    Script::Emotion {
        emotion: "happy".to_string(),
        confidence: 0.8,
    }
}

fn sender(session_id: i64, subscription: &Subscription<ServerMessage>) -> FrameSender {
    FrameSender {
        session_id,
        connection_id: subscription.connection_id,
        session_stored: false,
        patient_id: None,
        psychologist_id: None,
    }
}

fn frame_json() -> String {
    format!(r#"{{"type":"frame","data":"{}"}}"#, STANDARD.encode(png_bytes(120)))
}

#[tokio::test]
async fn test_frame_shouldReachEverySubscriberOfSessionOnly() {
    let (relay, _, _) = relay_with(happy(), settings());
    let mut camera = relay.join(1);
    let mut viewer = relay.join(1);
    let mut other_session = relay.join(2);

    let outcome = relay.handle_client_text(&sender(1, &camera), &frame_json()).await;

    assert_eq!(outcome, FrameOutcome::Broadcast(2));
    for subscription in [&mut camera, &mut viewer] {
        match subscription.receiver.try_recv().unwrap() {
            ServerMessage::Prediction {
                session_id, emotion, ..
            } => {
                assert_eq!(session_id, 1);
                assert_eq!(emotion, "happy");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
    assert!(other_session.receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_binaryFrame_shouldBeAnalyzedLikeText() {
    let (relay, _, analyzer) = relay_with(happy(), settings());
    let camera = relay.join(5);

    let outcome = relay.handle_frame_bytes(&sender(5, &camera), png_bytes(10)).await;

    assert_eq!(outcome, FrameOutcome::Broadcast(1));
    assert_eq!(analyzer.calls(), 1);
}

#[tokio::test]
async fn test_droppedSubscriber_shouldBePrunedOnNextBroadcast() {
    let (relay, _, _) = relay_with(happy(), settings());
    let camera = relay.join(3);
    let gone = relay.join(3);
    drop(gone);
    assert_eq!(relay.subscriber_count(3), 2);

    let outcome = relay.handle_client_text(&sender(3, &camera), &frame_json()).await;

    assert_eq!(outcome, FrameOutcome::Broadcast(1));
    assert_eq!(relay.subscriber_count(3), 1);
}

#[tokio::test]
async fn test_malformedMessage_shouldReplyErrorToSenderOnly() {
    let (relay, _, analyzer) = relay_with(happy(), settings());
    let mut camera = relay.join(4);
    let mut viewer = relay.join(4);

    let outcome = relay.handle_client_text(&sender(4, &camera), "{not json").await;

    assert!(matches!(outcome, FrameOutcome::Rejected(_)));
    assert!(matches!(camera.receiver.try_recv().unwrap(), ServerMessage::Error { .. }));
    assert!(viewer.receiver.try_recv().is_err());
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test]
async fn test_invalidBase64_shouldReplyErrorAndKeepSession() {
    let (relay, _, _) = relay_with(happy(), settings());
    let mut camera = relay.join(4);

    let outcome = relay
        .handle_client_text(&sender(4, &camera), r#"{"type":"frame","data":"@@@"}"#)
        .await;

    assert!(matches!(outcome, FrameOutcome::Rejected(_)));
    assert!(matches!(camera.receiver.try_recv().unwrap(), ServerMessage::Error { .. }));
    assert_eq!(relay.subscriber_count(4), 1);
}

#[tokio::test]
async fn test_predictionBelowThreshold_shouldNotBroadcast() {
    let (relay, _, _) = relay_with(
        happy(),
        RelaySettings {
            min_confidence: 0.95,
            persist_detections: false,
        },
    );
    let mut camera = relay.join(6);

    let outcome = relay.handle_client_text(&sender(6, &camera), &frame_json()).await;

    assert_eq!(outcome, FrameOutcome::BelowThreshold);
    assert!(camera.receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_noFace_shouldOnlyTellSender() {
    let (relay, _, _) = relay_with(Script::NoFace, settings());
    let mut camera = relay.join(7);
    let mut viewer = relay.join(7);

    let outcome = relay.handle_client_text(&sender(7, &camera), &frame_json()).await;

    assert_eq!(outcome, FrameOutcome::NoFace);
    assert_eq!(
        camera.receiver.try_recv().unwrap(),
        ServerMessage::NoFace { session_id: 7 }
    );
    assert!(viewer.receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_classifierFailure_shouldReplyErrorToSender() {
    let (relay, _, _) = relay_with(Script::Fail("model crashed".to_string()), settings());
    let mut camera = relay.join(8);

    let outcome = relay.handle_client_text(&sender(8, &camera), &frame_json()).await;

    match outcome {
        FrameOutcome::Rejected(message) => assert!(message.contains("model crashed")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(matches!(camera.receiver.try_recv().unwrap(), ServerMessage::Error { .. }));
}

#[tokio::test]
async fn test_ping_shouldAnswerPong() {
    let (relay, _, _) = relay_with(happy(), settings());
    let mut camera = relay.join(9);

    let outcome = relay.handle_client_text(&sender(9, &camera), r#"{"type":"ping"}"#).await;

    assert_eq!(outcome, FrameOutcome::Pong);
    assert_eq!(camera.receiver.try_recv().unwrap(), ServerMessage::Pong);
}

#[tokio::test]
async fn test_persistDetections_shouldStoreFrameRows() {
    let (relay, repo, _) = relay_with(
        happy(),
        RelaySettings {
            min_confidence: 0.0,
            persist_detections: true,
        },
    );
    let camera = relay.join(11);
    let frame_sender = sender(11, &camera);

    relay.handle_client_text(&frame_sender, &frame_json()).await;
    relay.handle_client_text(&frame_sender, &frame_json()).await;

    let detections = repo.list_detections(None).await.unwrap();
    assert_eq!(detections.len(), 2);
    assert!(detections.iter().all(|d| d.image_name.starts_with("session-11-frame-")));
    assert!(detections.iter().all(|d| d.session_id.is_none()));
    assert_ne!(detections[0].image_name, detections[1].image_name);
}

#[tokio::test]
async fn test_persistDetections_shouldNumberFramesPerSession() {
    let (relay, repo, _) = relay_with(
        happy(),
        RelaySettings {
            min_confidence: 0.0,
            persist_detections: true,
        },
    );
    let first = relay.join(21);
    let second = relay.join(22);

    relay.handle_client_text(&sender(21, &first), &frame_json()).await;
    relay.handle_client_text(&sender(22, &second), &frame_json()).await;
    relay.handle_client_text(&sender(21, &first), &frame_json()).await;

    let mut names: Vec<String> = repo
        .list_detections(None)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.image_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["session-21-frame-1", "session-21-frame-2", "session-22-frame-1"]);
}

#[tokio::test]
async fn test_persistDetections_withStoredSession_shouldLinkSession() {
    let (relay, repo, _) = relay_with(
        happy(),
        RelaySettings {
            min_confidence: 0.0,
            persist_detections: true,
        },
    );
    let session = repo.create_session(None, None).await.unwrap();
    let camera = relay.join(session.id);
    let frame_sender = FrameSender {
        session_stored: true,
        ..sender(session.id, &camera)
    };

    relay.handle_client_text(&frame_sender, &frame_json()).await;

    let detections = repo.list_detections(Some("happy")).await.unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].session_id, Some(session.id));
}

#[tokio::test]
async fn test_leave_shouldForgetEmptySession() {
    let (relay, _, _) = relay_with(happy(), settings());
    let camera = relay.join(12);
    assert_eq!(relay.active_sessions(), vec![12]);

    relay.leave(12, camera.connection_id);

    assert!(relay.active_sessions().is_empty());
}
