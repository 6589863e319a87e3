//! Detection relay.
//!
//! Server-side half of the pipeline for browser-style clients: accepts
//! `{ "imageData": "<data URL>" }`, calls the vision backend with a credential
//! that never leaves this process, and answers with the parsed
//! `DetectionResult`. Every response allows cross-origin callers.
//!
//! Requests are handled one at a time on the accept thread, so the detection
//! client never sees overlapping calls.

mod http;

use anyhow::{anyhow, Result};
use rand::RngCore;
use serde::Deserialize;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::RelaySettings;
use crate::detect::DetectionClient;
use crate::encoding::ImageEncoding;
use crate::error::DetectError;
use http::{read_request, write_error, write_json_response, write_response, ReadError};

pub const DETECT_PATH: &str = "/detect-objects";

const RATE_LIMIT_ERROR: &str = "Rate limit exceeded. Please try again in a moment.";
const AUTH_ERROR: &str = "API authentication failed. Please check your API key.";

#[derive(Debug)]
pub struct RelayHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("relay server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct RelayServer {
    settings: RelaySettings,
    client: DetectionClient,
}

impl RelayServer {
    pub fn new(settings: RelaySettings, client: DetectionClient) -> Self {
        Self { settings, client }
    }

    pub fn spawn(self) -> Result<RelayHandle> {
        let configured_addr: SocketAddr = self
            .settings
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid relay addr '{}': {}", self.settings.addr, e))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let client = self.client;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_relay(listener, &client, shutdown_thread) {
                log::error!("detection relay stopped: {}", err);
            }
        });

        Ok(RelayHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_relay(
    listener: TcpListener,
    client: &DetectionClient,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, client) {
                    log::warn!("relay request failed: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DetectRequest {
    #[serde(rename = "imageData")]
    image_data: String,
}

fn handle_connection(mut stream: TcpStream, client: &DetectionClient) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request_id = request_id();
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(ReadError::TooLarge) => {
            write_error(&mut stream, 413, "request too large")?;
            return Ok(());
        }
        Err(ReadError::Malformed(err)) => {
            write_error(&mut stream, 400, "malformed request")?;
            return Err(err);
        }
    };

    if request.method == "OPTIONS" {
        write_response(&mut stream, 200, None, &[])?;
        return Ok(());
    }
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            write_json_response(&mut stream, 200, br#"{"status":"ok"}"#)?;
            return Ok(());
        }
        ("POST", DETECT_PATH) => {}
        (_, "/health") | (_, DETECT_PATH) => {
            write_error(&mut stream, 405, "method not allowed")?;
            return Ok(());
        }
        _ => {
            write_error(&mut stream, 404, "not found")?;
            return Ok(());
        }
    }

    log::info!(
        "relay[{}]: processing image for object detection (client {})",
        request_id,
        request
            .headers
            .get("x-client-info")
            .map(String::as_str)
            .unwrap_or("unknown")
    );
    let encoding = match decode_detect_request(&request.body) {
        Ok(encoding) => encoding,
        Err(err) => {
            log::warn!("relay[{}]: rejected request: {}", request_id, err);
            write_error(&mut stream, 400, &err.to_string())?;
            return Ok(());
        }
    };

    match client.detect(&encoding) {
        Ok(result) => {
            let payload = serde_json::to_vec(&result)?;
            write_json_response(&mut stream, 200, &payload)?;
        }
        Err(err) => {
            log::error!("relay[{}]: detection failed: {}", request_id, err);
            let (status, message) = error_response(&err);
            write_error(&mut stream, status, &message)?;
        }
    }
    Ok(())
}

fn decode_detect_request(body: &[u8]) -> Result<ImageEncoding> {
    let request: DetectRequest =
        serde_json::from_slice(body).map_err(|e| anyhow!("invalid request body: {}", e))?;
    ImageEncoding::from_data_url(&request.image_data)
}

/// Status and message the relay reports for a failed detection.
fn error_response(err: &DetectError) -> (u16, String) {
    match err {
        DetectError::RateLimited { .. } => (429, RATE_LIMIT_ERROR.to_string()),
        DetectError::Authentication { .. } => (401, AUTH_ERROR.to_string()),
        DetectError::QuotaExhausted { message } => (402, message.clone()),
        DetectError::Backend { status, body } => {
            (500, format!("upstream error: {} - {}", status, body))
        }
        DetectError::AlreadyProcessing | DetectError::Transport { .. } => (500, err.to_string()),
    }
}

fn request_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
