use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use brainsight::config::RelaySettings;
use brainsight::detect::{BackendResponse, BackendTransport, DetectionClient, RequestFormat};
use brainsight::relay::{RelayHandle, RelayServer, DETECT_PATH};
use brainsight::DetectError;

struct QueueTransport {
    replies: Mutex<Vec<BackendResponse>>,
    calls: Arc<AtomicUsize>,
}

impl BackendTransport for QueueTransport {
    fn post_json(&self, _body: &[u8]) -> Result<BackendResponse, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(DetectError::Transport {
                reason: "no scripted reply".to_string(),
            });
        }
        Ok(replies.remove(0))
    }
}

fn spawn_relay(replies: Vec<(u16, &str)>) -> Result<(RelayHandle, Arc<AtomicUsize>)> {
    let calls = Arc::new(AtomicUsize::new(0));
    let transport = QueueTransport {
        replies: Mutex::new(
            replies
                .into_iter()
                .map(|(status, body)| BackendResponse {
                    status,
                    body: body.to_string(),
                })
                .collect(),
        ),
        calls: calls.clone(),
    };
    let client = DetectionClient::new(Box::new(transport), RequestFormat::Messages, "test-model", 256);
    let handle = RelayServer::new(
        RelaySettings {
            addr: "127.0.0.1:0".to_string(),
        },
        client,
    )
    .spawn()?;
    Ok((handle, calls))
}

fn send(addr: SocketAddr, request: &str) -> Result<(String, String)> {
    let mut stream = TcpStream::connect(addr)?;
    stream.write_all(request.as_bytes())?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let head = parts.next().unwrap_or_default().to_string();
    let body = parts.next().unwrap_or_default().to_string();
    Ok((head, body))
}

fn post_detect(addr: SocketAddr, body: &str) -> Result<(String, String)> {
    let request = format!(
        "POST {DETECT_PATH} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nx-client-info: relay-test\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    send(addr, &request)
}

fn messages_body(text: &str) -> String {
    serde_json::json!({ "content": [{ "type": "text", "text": text }] }).to_string()
}

#[test]
fn preflight_and_health_carry_cors_headers() -> Result<()> {
    let (handle, calls) = spawn_relay(vec![])?;

    let (head, body) = send(
        handle.addr,
        "OPTIONS /detect-objects HTTP/1.1\r\nHost: localhost\r\n\r\n",
    )?;
    assert!(head.starts_with("HTTP/1.1 200"));
    assert!(head.contains("Access-Control-Allow-Origin: *"));
    assert!(head.contains(
        "Access-Control-Allow-Headers: authorization, x-client-info, apikey, content-type"
    ));
    assert!(body.is_empty());

    let (head, body) = send(handle.addr, "GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(head.starts_with("HTTP/1.1 200"));
    assert!(head.contains("Access-Control-Allow-Origin: *"));
    let json: Value = serde_json::from_str(&body)?;
    assert_eq!(json["status"], "ok");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    handle.stop()
}

#[test]
fn detect_returns_parsed_result() -> Result<()> {
    let reply = messages_body(
        "```json\n{\"objects\":[{\"name\":\"plant\",\"confidence\":0.93}],\"explanation\":\"Green shapes resolve into a plant.\"}\n```",
    );
    let (handle, calls) = spawn_relay(vec![(200, &reply)])?;

    let (head, body) = post_detect(
        handle.addr,
        r#"{"imageData":"data:image/png;base64,iVBORw0KGgo="}"#,
    )?;
    assert!(head.starts_with("HTTP/1.1 200"), "{head}");
    assert!(head.contains("Content-Type: application/json"));
    let json: Value = serde_json::from_str(&body)?;
    assert_eq!(json["objects"][0]["name"], "plant");
    assert!((json["objects"][0]["confidence"].as_f64().unwrap() - 0.93).abs() < 1e-6);
    assert_eq!(json["explanation"], "Green shapes resolve into a plant.");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.stop()
}

#[test]
fn upstream_failures_map_to_relay_statuses() -> Result<()> {
    let (handle, _) = spawn_relay(vec![
        (429, r#"{"error":"too many"}"#),
        (401, r#"{"error":{"message":"invalid x-api-key"}}"#),
        (503, "overloaded"),
    ])?;
    let image = r#"{"imageData":"data:image/jpeg;base64,/9j/4AAQ"}"#;

    let (head, body) = post_detect(handle.addr, image)?;
    assert!(head.starts_with("HTTP/1.1 429"), "{head}");
    let json: Value = serde_json::from_str(&body)?;
    assert_eq!(
        json["error"],
        "Rate limit exceeded. Please try again in a moment."
    );

    let (head, body) = post_detect(handle.addr, image)?;
    assert!(head.starts_with("HTTP/1.1 401"), "{head}");
    let json: Value = serde_json::from_str(&body)?;
    assert_eq!(
        json["error"],
        "API authentication failed. Please check your API key."
    );

    let (head, body) = post_detect(handle.addr, image)?;
    assert!(head.starts_with("HTTP/1.1 500"), "{head}");
    let json: Value = serde_json::from_str(&body)?;
    assert_eq!(json["error"], "upstream error: 503 - overloaded");

    handle.stop()
}

#[test]
fn bad_requests_are_rejected_before_the_backend() -> Result<()> {
    let (handle, calls) = spawn_relay(vec![])?;

    let (head, body) = post_detect(handle.addr, r#"{"image":"nope"}"#)?;
    assert!(head.starts_with("HTTP/1.1 400"), "{head}");
    let json: Value = serde_json::from_str(&body)?;
    assert!(json["error"].as_str().unwrap().contains("invalid request body"));

    let (head, _) = post_detect(handle.addr, r#"{"imageData":"data:image/png;base64,"}"#)?;
    assert!(head.starts_with("HTTP/1.1 400"), "{head}");

    let (head, _) = send(handle.addr, "GET /detect-objects HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(head.starts_with("HTTP/1.1 405"), "{head}");

    let (head, _) = send(handle.addr, "GET /elsewhere HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(head.starts_with("HTTP/1.1 404"), "{head}");
    assert!(head.contains("Access-Control-Allow-Origin: *"));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    handle.stop()
}

#[test]
fn rejects_unparseable_listen_address() {
    let client = DetectionClient::new(
        Box::new(QueueTransport {
            replies: Mutex::new(Vec::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        RequestFormat::Relay,
        "test-model",
        256,
    );
    let settings = RelaySettings {
        addr: "localhost-without-port".to_string(),
    };
    let err = RelayServer::new(settings, client).spawn().unwrap_err();
    assert!(err.to_string().contains("invalid relay addr"));
}
