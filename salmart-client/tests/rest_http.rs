//! RestClient against a one-shot local HTTP server.

use std::time::Duration;

use salmart_client::{ApiRequest, ApiTransport, RestClient, Session};
use salmart_core::SalmartError;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve one request with `status` and `body`; yields the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if request_complete(&raw) {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&raw).into_owned()
    });

    (base_url, handle)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..head_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= head_end + 4 + content_length
}

fn client(base_url: &str, token: Option<&str>) -> RestClient {
    let session = match token {
        Some(token) => Session::with_token(token),
        None => Session::anonymous(),
    };
    RestClient::with_base_url(base_url, Duration::from_secs(5), session).unwrap()
}

#[tokio::test]
async fn test_get_sends_query_and_bearer_token() {
    let (base_url, server) = serve_once("200 OK", r#"[{"id":"p1"}]"#).await;
    let body = client(&base_url, Some("tok-123"))
        .fetch_json(ApiRequest::get("/posts").with_query("category", "electronics"))
        .await
        .unwrap();

    assert_eq!(body, json!([{ "id": "p1" }]));
    let raw = server.await.unwrap().to_lowercase();
    assert!(raw.starts_with("get /posts?category=electronics http/1.1"));
    assert!(raw.contains("authorization: bearer tok-123"));
}

#[tokio::test]
async fn test_anonymous_session_sends_no_authorization() {
    let (base_url, server) = serve_once("200 OK", "{}").await;
    client(&base_url, None)
        .fetch_json(ApiRequest::get("/users/suggestions"))
        .await
        .unwrap();

    let raw = server.await.unwrap().to_lowercase();
    assert!(!raw.contains("authorization:"));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let (base_url, server) = serve_once("200 OK", r#"{"likes":["u1"]}"#).await;
    let body = client(&base_url, Some("t"))
        .fetch_json(ApiRequest::post("/posts/p1/like", json!({ "action": "like" })))
        .await
        .unwrap();

    assert_eq!(body["likes"], json!(["u1"]));
    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /posts/p1/like"));
    assert!(raw.ends_with(r#"{"action":"like"}"#));
}

#[tokio::test]
async fn test_error_status_carries_server_message() {
    let (base_url, _server) = serve_once("404 Not Found", r#"{"message":"Post not found"}"#).await;
    let err = client(&base_url, None)
        .fetch_json(ApiRequest::get("/posts/p404"))
        .await
        .unwrap_err();

    match err {
        SalmartError::Api(api) => {
            assert_eq!(api.status, 404);
            assert_eq!(api.message, "Post not found");
            assert!(api.is_not_found());
        }
        other => panic!("Expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unparseable_error_body_falls_back_to_status_text() {
    let (base_url, _server) = serve_once("502 Bad Gateway", "<html>upstream</html>").await;
    let err = client(&base_url, None)
        .fetch_json(ApiRequest::get("/posts"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.user_message(), "Bad Gateway");
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let (base_url, _server) = serve_once("200 OK", "").await;
    let body = client(&base_url, Some("t"))
        .fetch_json(ApiRequest::post("/follow/u2", json!({})))
        .await
        .unwrap();
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_malformed_success_body_is_decode_error() {
    let (base_url, _server) = serve_once("200 OK", "{not json").await;
    let err = client(&base_url, None)
        .fetch_json(ApiRequest::get("/posts"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SalmartError::Network(salmart_core::NetworkError::Decode { .. })
    ));
}
