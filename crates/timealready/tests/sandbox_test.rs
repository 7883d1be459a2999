//! Integration tests for the REST sandbox validator against a mock server

use std::time::Duration;

use coordination::escalation::{
    DependencyFile, FixValidator, ValidationError, ValidationRequest,
};
use coordination::trace::parse_structure;
use serde_json::json;
use timealready::config::SandboxEndpoint;
use timealready::sandbox::{HttpSandboxValidator, SandboxError};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TRACE: &str = "Traceback (most recent call last):\n  File \"app.py\", line 3, in main\n    total = 1 / 0\nZeroDivisionError: division by zero";

fn request() -> ValidationRequest {
    let error = parse_structure(TRACE).unwrap();
    ValidationRequest::new(
        &error,
        "total = 0\n",
        vec![DependencyFile {
            path: "utils.py".into(),
            content: "X = 1\n".into(),
        }],
    )
}

fn validator(server: &MockServer) -> HttpSandboxValidator {
    let endpoint = SandboxEndpoint {
        url: server.uri(),
        api_key: Some("test-key".into()),
    };
    HttpSandboxValidator::new(&endpoint, Duration::from_secs(5)).unwrap()
}

async fn mount_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sandboxes"))
        .and(header("X-API-Key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sb-1" })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_upload(server: &MockServer, file: &str, content: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path("/sandboxes/sb-1/files"))
        .and(body_json(json!({ "path": file, "content": content })))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_execute(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/sandboxes/sb-1/execute"))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_delete(server: &MockServer) {
    Mock::given(method("DELETE"))
        .and(path("/sandboxes/sb-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

/// Test: dependencies and candidate are uploaded, a clean run passes
#[tokio::test]
async fn test_clean_execution_passes() {
    let server = MockServer::start().await;
    mount_create(&server).await;
    mount_upload(&server, "utils.py", "X = 1\n", 200).await;
    mount_upload(&server, "app.py", "total = 0\n", 200).await;
    mount_execute(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "stdout": "module imported\nfix appears to work\n",
            "stderr": "",
            "error": null
        })),
    )
    .await;
    mount_delete(&server).await;

    let outcome = validator(&server).validate(&request()).await.unwrap();
    assert!(outcome.success);
    assert!(outcome.output.contains("fix appears to work"));
    assert!(outcome.error.is_none());
}

/// Test: a failed dependency upload is skipped, not fatal
#[tokio::test]
async fn test_failed_dependency_upload_is_tolerated() {
    let server = MockServer::start().await;
    mount_create(&server).await;
    mount_upload(&server, "utils.py", "X = 1\n", 500).await;
    mount_upload(&server, "app.py", "total = 0\n", 200).await;
    mount_execute(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "stdout": "ok" })),
    )
    .await;
    mount_delete(&server).await;

    let outcome = validator(&server).validate(&request()).await.unwrap();
    assert!(outcome.success);
}

/// Test: an execution error is a failed validation, sandbox still deleted
#[tokio::test]
async fn test_execution_error_fails_validation() {
    let server = MockServer::start().await;
    mount_create(&server).await;
    mount_upload(&server, "utils.py", "X = 1\n", 200).await;
    mount_upload(&server, "app.py", "total = 0\n", 200).await;
    mount_execute(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "stdout": "same error still occurs: division by zero",
            "stderr": "Traceback ...",
            "error": "ZeroDivisionError: division by zero"
        })),
    )
    .await;
    mount_delete(&server).await;

    let outcome = validator(&server).validate(&request()).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("ZeroDivisionError: division by zero")
    );
    assert!(outcome.output.contains("same error still occurs"));
    assert!(outcome.output.contains("Traceback"));
}

/// Test: a sandbox fault surfaces as an error and the sandbox is still deleted
#[tokio::test]
async fn test_execute_fault_still_deletes_sandbox() {
    let server = MockServer::start().await;
    mount_create(&server).await;
    mount_upload(&server, "utils.py", "X = 1\n", 200).await;
    mount_upload(&server, "app.py", "total = 0\n", 200).await;
    mount_execute(&server, ResponseTemplate::new(502).set_body_string("bad gateway")).await;
    mount_delete(&server).await;

    let err = validator(&server).validate(&request()).await.unwrap_err();
    assert!(matches!(err, ValidationError::Protocol(ref m) if m.contains("502")));
}

/// Test: a validation abandoned by an outer timeout still deletes its sandbox
#[tokio::test]
async fn test_timed_out_validation_deletes_sandbox() {
    let server = MockServer::start().await;
    mount_create(&server).await;
    mount_upload(&server, "utils.py", "X = 1\n", 200).await;
    mount_upload(&server, "app.py", "total = 0\n", 200).await;
    mount_execute(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "stdout": "ok" }))
            .set_delay(Duration::from_secs(3)),
    )
    .await;
    mount_delete(&server).await;

    let validator = validator(&server);
    let req = request();
    let timed_out = tokio::time::timeout(Duration::from_millis(500), validator.validate(&req)).await;
    assert!(timed_out.is_err());

    let mut deleted = false;
    for _ in 0..50 {
        let received = server.received_requests().await.unwrap();
        if received.iter().any(|r| r.method.to_string() == "DELETE") {
            deleted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(deleted, "abandoned sandbox was never deleted");
}

/// Test: a rejected create never reaches upload or delete
#[tokio::test]
async fn test_create_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandboxes"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = validator(&server).validate(&request()).await.unwrap_err();
    assert!(matches!(err, ValidationError::Protocol(_)));
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
}

/// Test: a validator cannot be built without a key
#[test]
fn test_missing_key() {
    let endpoint = SandboxEndpoint {
        url: "http://localhost:1".into(),
        api_key: None,
    };
    let err = HttpSandboxValidator::new(&endpoint, Duration::from_secs(1))
        .err()
        .unwrap();
    assert!(matches!(err, SandboxError::MissingKey));
}
