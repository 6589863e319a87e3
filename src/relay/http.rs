use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::capture::MAX_UPLOAD_BYTES;

const MAX_HEADER_BYTES: usize = 16 * 1024;
/// Room for the largest accepted upload as a base64 data URL inside the JSON
/// envelope.
pub(crate) const MAX_BODY_BYTES: usize =
    (MAX_UPLOAD_BYTES as usize).div_ceil(3) * 4 + 64 * 1024;

pub(crate) const CORS_ALLOW_ORIGIN: &str = "*";
pub(crate) const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) body: Vec<u8>,
}

#[derive(Debug)]
pub(crate) enum ReadError {
    TooLarge,
    Malformed(anyhow::Error),
}

impl From<std::io::Error> for ReadError {
    fn from(err: std::io::Error) -> Self {
        ReadError::Malformed(err.into())
    }
}

pub(crate) fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, ReadError> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(ReadError::TooLarge);
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(ReadError::Malformed(anyhow!("connection closed before headers")));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| ReadError::Malformed(anyhow!("empty request")))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ReadError::Malformed(anyhow!("missing method")))?;
    let raw_path = parts
        .next()
        .ok_or_else(|| ReadError::Malformed(anyhow!("missing path")))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ReadError::Malformed(anyhow!("invalid content-length")))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(ReadError::TooLarge);
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(ReadError::Malformed(anyhow!("connection closed mid-body")));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

pub(crate) fn write_json_response(stream: &mut TcpStream, status: u16, body: &[u8]) -> Result<()> {
    write_response(stream, status, Some("application/json"), body)
}

pub(crate) fn write_error(stream: &mut TcpStream, status: u16, message: &str) -> Result<()> {
    let body = serde_json::to_vec(&serde_json::json!({ "error": message }))?;
    write_json_response(stream, status, &body)
}

/// Every response carries the CORS headers, including preflight answers.
pub(crate) fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        401 => "HTTP/1.1 401 Unauthorized",
        402 => "HTTP/1.1 402 Payment Required",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        429 => "HTTP/1.1 429 Too Many Requests",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let mut header = format!(
        "{status_line}\r\nAccess-Control-Allow-Origin: {CORS_ALLOW_ORIGIN}\r\nAccess-Control-Allow-Headers: {CORS_ALLOW_HEADERS}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n",
        len = body.len()
    );
    if let Some(content_type) = content_type {
        header.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}
