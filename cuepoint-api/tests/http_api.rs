//! HTTP API tests driving the router in-process

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use cuepoint_api::{create_router, AppState};
use cuepoint_core::test_helpers::ServiceFixtureBuilder;

fn app() -> Router {
    let f = ServiceFixtureBuilder::new().build();
    create_router(AppState {
        capabilities: f.capabilities,
        keyframes: f.keyframes,
        playlists: f.playlists,
        playback: f.playback,
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

async fn start_album(app: &Router, item: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/sessions",
        Some(json!({
            "itemId": item,
            "playlistType": "album",
            "originatorId": "album-1",
            "capability": {
                "deviceId": "tv-1",
                "directPlayProfiles": [{"container": "mp3", "audioCodecs": ["mp3"]}]
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn test_start_and_decide_flow() {
    let app = app();
    let started = start_album(&app, "album-1-track-9").await;
    assert_eq!(started["playlistIndex"], 9);
    assert_eq!(started["playlistTotalCount"], 12);
    assert_eq!(started["capabilityProfileVersion"], 1);
    assert_eq!(started["capabilityVersionMismatch"], false);
    assert_eq!(started["currentItem"]["itemId"], "album-1-track-9");
    assert_eq!(started["nextItem"]["itemId"], "album-1-track-10");

    let session_id = started["sessionId"].as_str().unwrap();
    let (status, decision) = send(
        &app,
        Method::POST,
        &format!("/api/sessions/{session_id}/decision"),
        Some(json!({"status": "ended", "progressMs": 189000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decision["action"], "advance");
    assert_eq!(decision["nextItemId"], "album-1-track-10");
    assert_eq!(decision["playlistIndex"], 10);
}

#[tokio::test]
async fn test_heartbeat_resume_and_stop() {
    let app = app();
    let started = start_album(&app, "album-1-track-0").await;
    let session_id = started["sessionId"].as_str().unwrap();

    let (status, ack) = send(
        &app,
        Method::POST,
        &format!("/api/sessions/{session_id}/heartbeat"),
        Some(json!({"playheadMs": 15000, "state": "paused"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["resumed"], false);

    let (status, details) = send(
        &app,
        Method::POST,
        &format!("/api/sessions/{session_id}/resume"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["playheadMs"], 15000);
    assert_eq!(details["state"], "paused");

    let (status, outcome) = send(
        &app,
        Method::DELETE,
        &format!("/api/sessions/{session_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["success"], true);

    let (status, error) = send(
        &app,
        Method::POST,
        &format!("/api/sessions/{session_id}/heartbeat"),
        Some(json!({"playheadMs": 16000})),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(error["code"], "stale_session");
    assert_eq!(error["status"], 410);
}

#[tokio::test]
async fn test_error_mapping() {
    let app = app();

    let (status, error) = send(
        &app,
        Method::POST,
        "/api/sessions/nope/heartbeat",
        Some(json!({"playheadMs": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], "not_found");

    let started = start_album(&app, "album-1-track-0").await;
    let session_id = started["sessionId"].as_str().unwrap();

    let (status, error) = send(
        &app,
        Method::POST,
        &format!("/api/sessions/{session_id}/decision"),
        Some(json!({"status": "rewinding"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "invalid_input");

    let (status, error) = send(
        &app,
        Method::POST,
        &format!("/api/sessions/{session_id}/decision"),
        Some(json!({"status": "jump", "jumpIndex": 40})),
    )
    .await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(error["code"], "index_out_of_range");

    let (status, error) = send(
        &app,
        Method::POST,
        "/api/capabilities",
        Some(json!({"deviceId": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "invalid_capability");
}

#[tokio::test]
async fn test_capability_declaration_and_lookup() {
    let app = app();
    let declaration = json!({
        "deviceId": "phone-7",
        "name": "Phone",
        "supportsHdr": true,
        "protocols": ["hls"]
    });

    let (status, body) = send(&app, Method::POST, "/api/capabilities", Some(declaration.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capabilityProfileVersion"], 1);

    let (_, body) = send(&app, Method::POST, "/api/capabilities", Some(declaration)).await;
    assert_eq!(body["capabilityProfileVersion"], 2);

    let (status, body) = send(&app, Method::GET, "/api/capabilities/phone-7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);
    assert_eq!(body["profile"]["supportsHdr"], true);

    let (status, _) = send(&app, Method::GET, "/api/capabilities/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_playlist_endpoints() {
    let app = app();
    let (status, cursor) = send(
        &app,
        Method::POST,
        "/api/playlists",
        Some(json!({"playlistType": "album", "originatorId": "album-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cursor["currentIndex"], 0);
    assert_eq!(cursor["totalCount"], 12);
    let id = cursor["generatorId"].as_str().unwrap();

    let (status, chunk) = send(
        &app,
        Method::GET,
        &format!("/api/playlists/{id}/items?startIndex=10&limit=5"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chunk["items"].as_array().unwrap().len(), 2);
    assert_eq!(chunk["startIndex"], 10);
    assert_eq!(chunk["hasMore"], false);

    let (_, nav) = send(&app, Method::POST, &format!("/api/playlists/{id}/next"), None).await;
    assert_eq!(nav["success"], true);
    assert_eq!(nav["currentIndex"], 1);

    let (_, nav) = send(
        &app,
        Method::POST,
        &format!("/api/playlists/{id}/jump"),
        Some(json!({"index": 11})),
    )
    .await;
    assert_eq!(nav["currentIndex"], 11);

    let (_, nav) = send(&app, Method::POST, &format!("/api/playlists/{id}/next"), None).await;
    assert_eq!(nav["success"], false);

    let (_, nav) = send(
        &app,
        Method::PUT,
        &format!("/api/playlists/{id}/repeat"),
        Some(json!({"enabled": true})),
    )
    .await;
    assert_eq!(nav["repeat"], true);

    let (_, nav) = send(&app, Method::POST, &format!("/api/playlists/{id}/next"), None).await;
    assert_eq!(nav["success"], true);
    assert_eq!(nav["currentIndex"], 0);

    let (_, nav) = send(
        &app,
        Method::PUT,
        &format!("/api/playlists/{id}/shuffle"),
        Some(json!({"enabled": true})),
    )
    .await;
    assert_eq!(nav["shuffle"], true);
    assert_eq!(nav["currentItem"]["itemId"], "album-1-track-0");

    let (_, nav) = send(&app, Method::POST, &format!("/api/playlists/{id}/previous"), None).await;
    assert!(nav["success"].is_boolean());

    let (status, _) = send(&app, Method::GET, "/api/playlists/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_items_after_jump_report_cursor_and_flags() {
    let app = app();
    let (_, cursor) = send(
        &app,
        Method::POST,
        "/api/playlists",
        Some(json!({
            "playlistType": "explicit",
            "itemIds": [
                "album-1-track-0",
                "album-1-track-1",
                "album-1-track-2",
                "album-1-track-3",
                "album-1-track-4"
            ],
            "repeat": true
        })),
    )
    .await;
    let id = cursor["generatorId"].as_str().unwrap();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/playlists/{id}/jump"),
        Some(json!({"index": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, chunk) = send(
        &app,
        Method::GET,
        &format!("/api/playlists/{id}/items?startIndex=0&limit=10"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chunk["items"].as_array().unwrap().len(), 5);
    assert_eq!(chunk["currentIndex"], 2);
    assert_eq!(chunk["totalCount"], 5);
    assert_eq!(chunk["hasMore"], false);
    assert_eq!(chunk["repeat"], true);
    assert_eq!(chunk["shuffle"], false);
    assert_eq!(chunk["items"][2]["itemId"], "album-1-track-2");
}

#[tokio::test]
async fn test_keyframe_endpoints() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/media-parts/p1/seek?targetMs=7000", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keyframeMs"], 7000);
    assert_eq!(body["hasGopIndex"], false);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/media-parts/p1/keyframes",
        Some(json!({"keyframesMs": [0, 2000, 6000], "lastGopDurationMs": 2500})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keyframeCount"], 3);

    let (_, body) = send(&app, Method::GET, "/api/media-parts/p1/seek?targetMs=7000", None).await;
    assert_eq!(body["keyframeMs"], 6000);
    assert_eq!(body["gopDurationMs"], 2500);
    assert_eq!(body["hasGopIndex"], true);
    assert_eq!(body["originalTargetMs"], 7000);

    let (status, body) = send(&app, Method::GET, "/api/media-parts/p1/seek?targetMs=-1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");

    let (status, _) = send(&app, Method::DELETE, "/api/media-parts/p1/keyframes", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::DELETE, "/api/media-parts/p1/keyframes", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
