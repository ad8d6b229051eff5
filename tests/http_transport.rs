//! HTTP adapter against a mock server: wire format and error classification

use ai_edit_pipeline::client::{HttpClientBuilder, RemoteAiClient, StaticCredential};
use ai_edit_pipeline::error_code::ErrorKind;
use ai_edit_pipeline::transport::http::REQUEST_ID_HEADER;
use ai_edit_pipeline::transport::HttpRemoteClient;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn client_for(server: &ServerGuard) -> HttpRemoteClient {
    HttpClientBuilder::new()
        .base_url(server.url())
        .credential(Arc::new(StaticCredential::new("test-key")))
        .max_payload_bytes(1024)
        .build()
        .expect("client builds")
}

#[tokio::test]
async fn test_analyze_sends_base64_and_bearer() {
    let mut server = Server::new_async().await;
    let image = Bytes::from_static(b"\xFF\xD8\xFFjpeg");
    let mock = server
        .mock("POST", "/v1/analyze")
        .match_header("authorization", "Bearer test-key")
        .match_header(REQUEST_ID_HEADER, Matcher::Any)
        .match_body(Matcher::PartialJson(serde_json::json!({
            "image": STANDARD.encode(&image),
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text":"a red car on a street"}"#)
        .create_async()
        .await;

    let text = client_for(&server).analyze(&image, TIMEOUT).await.unwrap();

    assert_eq!(text, "a red car on a street");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_generate_decodes_image() {
    let mut server = Server::new_async().await;
    let edited = b"edited-image-bytes";
    let mock = server
        .mock("POST", "/v1/generate")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "prompt": "make it blue",
            "mask": STANDARD.encode(b"mask"),
        })))
        .with_status(200)
        .with_body(format!(r#"{{"image":"{}"}}"#, STANDARD.encode(edited)))
        .create_async()
        .await;

    let out = client_for(&server)
        .generate(
            &Bytes::from_static(b"image"),
            Some(&Bytes::from_static(b"mask")),
            "  make it blue ",
            TIMEOUT,
        )
        .await
        .unwrap();

    assert_eq!(out.as_ref(), edited);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let cases = [
        (401, ErrorKind::Auth),
        (403, ErrorKind::Auth),
        (413, ErrorKind::PayloadTooLarge),
        (400, ErrorKind::Validation),
        (408, ErrorKind::TransientNetwork),
        (429, ErrorKind::TransientNetwork),
        (500, ErrorKind::TransientNetwork),
        (503, ErrorKind::TransientNetwork),
        (504, ErrorKind::TransientNetwork),
    ];

    for (status, expected) in cases {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/analyze")
            .with_status(status)
            .with_body("upstream said no")
            .create_async()
            .await;

        let err = client_for(&server)
            .analyze(&Bytes::from_static(b"image"), TIMEOUT)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), expected, "status {status}");
        let ctx = err.context().expect("classified errors carry context");
        assert_eq!(ctx.status_code, Some(status as u16));
        assert!(ctx.request_id.is_some());
    }
}

#[tokio::test]
async fn test_malformed_body_is_transient() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/analyze")
        .with_status(200)
        .with_body("<html>gateway hiccup</html>")
        .create_async()
        .await;

    let err = client_for(&server)
        .analyze(&Bytes::from_static(b"image"), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_oversized_payload_never_hits_the_network() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/analyze")
        .expect(0)
        .create_async()
        .await;

    let err = client_for(&server)
        .analyze(&Bytes::from(vec![0u8; 2048]), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_prompt_never_hits_the_network() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/generate")
        .expect(0)
        .create_async()
        .await;

    let err = client_for(&server)
        .generate(&Bytes::from_static(b"image"), None, "   ", TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let client = HttpClientBuilder::new()
        .base_url("http://127.0.0.1:1")
        .credential(Arc::new(StaticCredential::new("test-key")))
        .build()
        .unwrap();

    let err = client
        .analyze(&Bytes::from_static(b"image"), TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind(),
        ErrorKind::TransientNetwork | ErrorKind::Timeout
    ));
    assert!(err.is_retryable());
}
