/*!
 * Live session flows across the session manager and both relays
 */

use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

use emotia::database::models::UserRole;
use emotia::relay::{FrameOutcome, FrameSender, ServerMessage};

use crate::common::{create_user, get, png_bytes, post_json, send, test_app, token_for};

/// A psychologist opens a session, the camera streams, a viewer watches,
/// and the stored detections end up in the patient's emotion summary.
#[tokio::test]
async fn test_liveSession_shouldFanOutAndFeedPatientSummary() {
    let (app, state) = test_app();
    let psychologist = create_user(&state, "luis", UserRole::Psychologist).await;
    let patient = create_user(&state, "ana", UserRole::Patient).await;
    let psy_token = token_for(&state, &psychologist);

    let (_, started) = send(&app, post_json("/sessions", Some(&psy_token), &json!({}))).await;
    let session_id = started["session_id"].as_i64().unwrap();

    let mut camera = state.predictions.join(session_id);
    let mut viewer = state.predictions.join(session_id);
    let camera_sender = FrameSender {
        session_id,
        connection_id: camera.connection_id,
        session_stored: true,
        patient_id: Some(patient.id),
        psychologist_id: Some(psychologist.id),
    };

    let (_, info) = send(&app, get(&format!("/sessions/{}", session_id), Some(&psy_token))).await;
    assert_eq!(info["live_connections"], 2);

    let frame = format!(
        r#"{{"type":"frame","data":"data:image/png;base64,{}"}}"#,
        STANDARD.encode(png_bytes(90))
    );
    for _ in 0..3 {
        let outcome = state.predictions.handle_client_text(&camera_sender, &frame).await;
        assert_eq!(outcome, FrameOutcome::Broadcast(2));
    }

    for subscription in [&mut camera, &mut viewer] {
        let mut received = 0;
        while let Ok(message) = subscription.receiver.try_recv() {
            assert!(matches!(message, ServerMessage::Prediction { session_id: id, .. } if id == session_id));
            received += 1;
        }
        assert_eq!(received, 3);
    }

    let (status, summary) = send(
        &app,
        get(&format!("/psychologist/emotions/{}", patient.id), Some(&psy_token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["summary"]["happy"], 100.0);

    let detections = state.repository.list_detections(None).await.unwrap();
    assert!(detections.iter().all(|d| d.session_id == Some(session_id)));
    assert!(detections.iter().all(|d| d.psychologist_id == Some(psychologist.id)));

    state.predictions.leave(session_id, camera.connection_id);
    state.predictions.leave(session_id, viewer.connection_id);

    let (status, ended) = send(
        &app,
        post_json(&format!("/sessions/{}/end", session_id), Some(&psy_token), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["live_connections"], 0);
    assert!(ended["duration_secs"].as_i64().unwrap() >= 0);
}

/// Two sessions running at once never see each other's predictions
#[tokio::test]
async fn test_concurrentSessions_shouldStayIsolated() {
    let (_, state) = test_app();
    let first = state.repository.create_session(None, None).await.unwrap();
    let second = state.repository.create_session(None, None).await.unwrap();

    let first_camera = state.predictions.join(first.id);
    let mut second_viewer = state.predictions.join(second.id);
    let sender = FrameSender {
        session_id: first.id,
        connection_id: first_camera.connection_id,
        session_stored: true,
        patient_id: None,
        psychologist_id: None,
    };

    let outcome = state.predictions.handle_frame_bytes(&sender, png_bytes(30)).await;

    assert_eq!(outcome, FrameOutcome::Broadcast(1));
    assert!(second_viewer.receiver.try_recv().is_err());
    assert_eq!(state.predictions.active_sessions().len(), 2);
}

/// Chat messages reach the peer, echo to the sender and show up in history
#[tokio::test]
async fn test_chatConversation_shouldDeliverAndPersist() {
    let (app, state) = test_app();
    let psychologist = create_user(&state, "luis", UserRole::Psychologist).await;
    let patient = create_user(&state, "ana", UserRole::Patient).await;

    let mut psy_side = state.chat.connect(psychologist.id, patient.id);
    let mut patient_side = state.chat.connect(patient.id, psychologist.id);
    assert_eq!(
        psy_side.receiver.try_recv().unwrap(),
        format!("status:{}:online", patient.id)
    );

    let delivered = state
        .chat
        .deliver(patient.id, psychologist.id, patient_side.connection_id, "me siento mejor")
        .await;

    assert_eq!(delivered, 1);
    assert_eq!(
        psy_side.receiver.try_recv().unwrap(),
        format!("{}:me siento mejor", patient.id)
    );
    assert_eq!(patient_side.receiver.try_recv().unwrap(), "yo:me siento mejor");

    state.chat.disconnect(patient.id, psychologist.id, patient_side.connection_id);
    assert!(!state.chat.is_online(patient.id));
    assert_eq!(
        psy_side.receiver.try_recv().unwrap(),
        format!("status:{}:offline", patient.id)
    );

    let (_, history) = send(
        &app,
        get(&format!("/chat/history/{}/{}", psychologist.id, patient.id), None),
    )
    .await;
    assert_eq!(history[0]["content"], "me siento mejor");
    assert_eq!(history[0]["sender_id"], patient.id);
}

/// Ending a session started from a meeting completes that meeting
#[tokio::test]
async fn test_endSession_withAppointment_shouldCompleteMeeting() {
    let (app, state) = test_app();
    let psychologist = create_user(&state, "luis", UserRole::Psychologist).await;
    let patient = create_user(&state, "ana", UserRole::Patient).await;
    let token = token_for(&state, &psychologist);

    let (_, meeting) = send(
        &app,
        post_json(
            "/meetings",
            Some(&token),
            &json!({ "patient_id": patient.id, "date": "2025-06-01", "time": "10:00" }),
        ),
    )
    .await;

    let (status, started) = send(
        &app,
        post_json("/sessions", Some(&token), &json!({ "appointment_id": meeting["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let end_uri = format!("/sessions/{}/end", started["session_id"]);
    let (status, ended) = send(&app, post_json(&end_uri, Some(&token), &json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["appointment_id"], meeting["id"]);

    let (_, meetings) = send(&app, get("/meetings", Some(&token_for(&state, &patient)))).await;
    assert_eq!(meetings[0]["status"], "completada");
}
