//! Integration tests for the HTTP API
//!
//! Drives the router in-process with tower's `oneshot`

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use repwatch::core::{create_router, EngineConfig};
use repwatch::types::{Joint, KeypointFrame};
use serde_json::Value;
use tower::ServiceExt;

fn create_test_router() -> Router {
    create_router(EngineConfig::default())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn new_session(app: &Router, body: &str) -> String {
    let (status, json) = send(app, "POST", "/session/new", Some(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    json["session_id"].as_str().unwrap().to_string()
}

/// Nose at normalized height `y` on a 100x100 frame
fn nose_frame(y: f64) -> String {
    let frame = KeypointFrame::empty(17, 100.0, 100.0).with_joint(Joint::Nose.index(), 50.0, y * 100.0, 0.9);
    serde_json::to_string(&frame).unwrap()
}

const SQUAT_RULE: &str = r#"{"kind":"position","points":["nose"],"axis":"y","range":[0.6,1.0],"confirm_frames":2}"#;

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router();
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["sessions_active"], 0);
}

#[tokio::test]
async fn test_create_session() {
    let app = create_test_router();
    let (status, json) = send(&app, "POST", "/session/new", Some("{}".to_string())).await;

    assert_eq!(status, StatusCode::OK);
    let id = json["session_id"].as_str().unwrap();
    assert_eq!(json["websocket_url"], format!("/ws/{}", id));

    let (status, json) = send(&app, "GET", &format!("/session/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "IDLE");
    assert_eq!(json["phase"], "WAITING_ENTER");
    assert_eq!(json["backend"], "local");
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn test_session_not_found() {
    let app = create_test_router();
    let (status, _) = send(&app, "GET", "/session/nonexistent", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_rule_rejected() {
    let app = create_test_router();
    let id = new_session(&app, &format!(r#"{{"rule":{}}}"#, SQUAT_RULE)).await;

    let bad = r#"{"kind":"angle","points":["left_shoulder","left_elbow"],"range":[0,60]}"#;
    let (status, json) = send(&app, "POST", &format!("/session/{}/rule", id), Some(bad.to_string())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].is_string());

    // The previous rule is gone too
    let (_, json) = send(&app, "GET", &format!("/session/{}", id), None).await;
    assert_eq!(json["rule"], Value::Null);
}

#[tokio::test]
async fn test_frame_rejected_unless_recording() {
    let app = create_test_router();
    let id = new_session(&app, &format!(r#"{{"rule":{}}}"#, SQUAT_RULE)).await;

    let (status, _) = send(&app, "POST", &format!("/session/{}/frame", id), Some(nose_frame(0.8))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_action() {
    let app = create_test_router();
    let id = new_session(&app, "{}").await;

    let (status, _) = send(&app, "POST", &format!("/session/{}/action/jump", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", &format!("/session/{}/action/resume", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_full_session_flow() {
    let app = create_test_router();
    let id = new_session(&app, r#"{"target_reps":1}"#).await;

    let (status, json) = send(&app, "POST", &format!("/session/{}/rule", id), Some(SQUAT_RULE.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["rule"]["kind"], "position");

    let (status, json) = send(&app, "POST", &format!("/session/{}/action/start", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "RECORDING");

    let mut completed_at = None;
    for (i, y) in [0.8, 0.8, 0.2, 0.2].iter().enumerate() {
        let (status, json) = send(&app, "POST", &format!("/session/{}/frame", id), Some(nose_frame(*y))).await;
        assert_eq!(status, StatusCode::OK);
        if json["completed"] == true {
            completed_at = Some(i);
        }
    }
    assert_eq!(completed_at, Some(3));

    // Target reached: the session completed on its own
    let (_, json) = send(&app, "GET", &format!("/session/{}", id), None).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["state"], "COMPLETED");

    let (status, json) = send(&app, "POST", &format!("/session/{}/reset", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);
    assert_eq!(json["state"], "IDLE");
}

#[tokio::test]
async fn test_remote_session_scores() {
    let app = create_test_router();
    let id = new_session(&app, r#"{"backend":"remote"}"#).await;
    send(&app, "POST", &format!("/session/{}/action/start", id), None).await;

    let (status, _) = send(&app, "POST", &format!("/session/{}/frame", id), Some(nose_frame(0.8))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let score = r#"{"reps":2,"distance":0.4,"state":"OUT"}"#;
    let (status, json) = send(&app, "POST", &format!("/session/{}/score", id), Some(score.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["completed"], true);
}
