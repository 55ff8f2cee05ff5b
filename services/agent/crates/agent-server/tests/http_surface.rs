//! Requests that never reach the task pipeline.

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use serverspy_agent::server;
use serverspy_agent::state::AppState;
use serverspy_agent::upload::UploadConnector;
use serverspy_common::AgentConfig;

struct NoUpload;

impl UploadConnector for NoUpload {
    type Stream = tokio::io::Sink;

    async fn connect(&self) -> io::Result<tokio::io::Sink> {
        Err(io::Error::other("uploads disabled in tests"))
    }

    fn target(&self) -> String {
        "none".into()
    }
}

fn router(splash: bool) -> axum::Router {
    let config = AgentConfig {
        // Nothing listens here; any outbound call would fail loudly.
        api_base: "http://127.0.0.1:9".into(),
        splash,
        ..AgentConfig::default()
    };
    server::router(Arc::new(AppState::new(config, NoUpload).unwrap()))
}

#[tokio::test]
async fn request_without_task_id_gets_splash_page() {
    let response = router(true)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&bytes).contains("ServerSpy Agent"));
}

#[tokio::test]
async fn splash_disabled_answers_not_found() {
    let response = router(false)
        .oneshot(Request::builder().uri("/index.php").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_probe_is_ok() {
    let response = router(true)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn any_method_and_path_reach_the_pipeline() {
    let response = router(true)
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/some/deep/path?x=1")
                .header("taskid", "bogus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "TaskId is not in valid format.");
}
