//! Detection client: one stateless request per image, typed outcomes.
//!
//! The client refuses a second call while one is outstanding instead of
//! queueing it. Each backend status maps to exactly one terminal outcome; retry
//! policy belongs to the caller.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::parser::{LenientParser, ResultParser};
use super::request::{error_message, response_text, MessagesRequest, RelayRequest, RequestFormat};
use super::result::DetectionResult;
use crate::config::BackendSettings;
use crate::encoding::ImageEncoding;
use crate::error::DetectError;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const RATE_LIMIT_MESSAGE: &str = "rate limit exceeded, retry shortly";

/// Raw HTTP outcome. Non-2xx statuses are responses, not transport errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP seam. Implementations return `DetectError::Transport` only when no
/// status was received (connect failure, timeout, broken body).
pub trait BackendTransport: Send + Sync {
    fn post_json(&self, body: &[u8]) -> Result<BackendResponse, DetectError>;
}

/// Secret credential. Redacted in `Debug`, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiCredential(String);

impl ApiCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiCredential(<redacted>)")
    }
}

/// How the credential is presented to the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    /// `x-api-key` + `anthropic-version`, for a Messages API.
    #[default]
    XApiKey,
    /// `Authorization: Bearer`, for a relay.
    Bearer,
    None,
}

/// Blocking `ureq` transport to a single endpoint.
pub struct UreqTransport {
    agent: ureq::Agent,
    url: String,
    scheme: AuthScheme,
    credential: Option<ApiCredential>,
}

impl UreqTransport {
    /// `timeout` of `None` keeps the transport's default behavior.
    pub fn new(
        url: impl Into<String>,
        scheme: AuthScheme,
        credential: Option<ApiCredential>,
        timeout: Option<Duration>,
    ) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            url: url.into(),
            scheme,
            credential,
        }
    }
}

impl BackendTransport for UreqTransport {
    fn post_json(&self, body: &[u8]) -> Result<BackendResponse, DetectError> {
        let mut request = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json");
        if let Some(credential) = &self.credential {
            request = match self.scheme {
                AuthScheme::XApiKey => request
                    .set("x-api-key", credential.expose())
                    .set("anthropic-version", ANTHROPIC_VERSION),
                AuthScheme::Bearer => {
                    request.set("Authorization", &format!("Bearer {}", credential.expose()))
                }
                AuthScheme::None => request,
            };
        }

        let response = match request.send_bytes(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                return Err(DetectError::Transport {
                    reason: err.to_string(),
                })
            }
        };
        let status = response.status();
        let body = response
            .into_string()
            .map_err(|err| DetectError::Transport {
                reason: format!("read response body: {}", err),
            })?;
        Ok(BackendResponse { status, body })
    }
}

/// Sends encodings to the backend and parses replies.
///
/// Holds its own transport and parser; nothing is shared across clients.
pub struct DetectionClient {
    transport: Box<dyn BackendTransport>,
    parser: Box<dyn ResultParser>,
    format: RequestFormat,
    model: String,
    max_tokens: u32,
    in_flight: AtomicBool,
}

impl DetectionClient {
    pub fn new(
        transport: Box<dyn BackendTransport>,
        format: RequestFormat,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            transport,
            parser: Box::new(LenientParser),
            format,
            model: model.into(),
            max_tokens,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Build a `ureq`-backed client. The credential is read from the
    /// environment variable named in the settings, never from the file.
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        let credential = match settings.auth {
            AuthScheme::None => None,
            _ => {
                let secret = std::env::var(&settings.api_key_env)
                    .ok()
                    .filter(|value| !value.trim().is_empty())
                    .ok_or_else(|| anyhow!("{} is not configured", settings.api_key_env))?;
                Some(ApiCredential::new(secret.trim()))
            }
        };
        let transport = UreqTransport::new(
            settings.url.clone(),
            settings.auth,
            credential,
            settings.timeout,
        );
        Ok(Self::new(
            Box::new(transport),
            settings.format,
            settings.model.clone(),
            settings.max_tokens,
        ))
    }

    /// Swap the reply parser, e.g. for a strict structured-output mode.
    pub fn with_parser(mut self, parser: Box<dyn ResultParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one detection. Fails fast with `AlreadyProcessing` if another call
    /// on this client has not returned yet.
    pub fn detect(&self, encoding: &ImageEncoding) -> Result<DetectionResult, DetectError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(DetectError::AlreadyProcessing)?;

        let body = self.request_body(encoding)?;
        log::info!(
            "detect: sending {} bytes ({}, digest {})",
            encoding.len(),
            encoding.mime(),
            encoding.digest_hex()
        );
        let response = self.transport.post_json(&body)?;
        self.interpret(response)
    }

    fn request_body(&self, encoding: &ImageEncoding) -> Result<Vec<u8>, DetectError> {
        let encoded = match self.format {
            RequestFormat::Messages => serde_json::to_vec(&MessagesRequest::new(
                &self.model,
                self.max_tokens,
                encoding,
            )),
            RequestFormat::Relay => serde_json::to_vec(&RelayRequest::new(encoding)),
        };
        encoded.map_err(|err| DetectError::Transport {
            reason: format!("serialize request: {}", err),
        })
    }

    fn interpret(&self, response: BackendResponse) -> Result<DetectionResult, DetectError> {
        let BackendResponse { status, body } = response;
        match status {
            200..=299 => {
                let text = response_text(&body);
                log::debug!("detect: model reply: {}", text);
                let result = self.parser.parse(&text);
                log::info!("detect: {} objects", result.objects().len());
                Ok(result)
            }
            429 => {
                log::warn!("detect: backend rate limited the request");
                Err(DetectError::RateLimited {
                    message: RATE_LIMIT_MESSAGE.to_string(),
                })
            }
            401 | 403 => {
                log::error!("detect: backend rejected credentials ({}): {}", status, body);
                Err(DetectError::Authentication {
                    status,
                    message: error_message(&body),
                })
            }
            402 => {
                log::warn!("detect: backend credits exhausted: {}", body);
                Err(DetectError::QuotaExhausted {
                    message: error_message(&body),
                })
            }
            _ => {
                log::error!("detect: backend error {}: {}", status, body);
                Err(DetectError::Backend { status, body })
            }
        }
    }
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
