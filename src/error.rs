//! Error taxonomy for the capture-to-detection pipeline.
//!
//! Capture-side and backend-side failures are typed so presentation can tell a
//! retryable hiccup from a misconfigured deployment. Result parsing has no error
//! type: malformed model output is absorbed into a fallback result.

use thiserror::Error;

use crate::session::{Phase, SessionEvent};

/// Failures while acquiring or encoding an image.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("could not access camera {device}: {reason}")]
    MediaAccess { device: String, reason: String },
    #[error("no active camera stream or frame available")]
    NoActiveStream,
    #[error("could not read {origin}: {reason}")]
    UnreadableFile { origin: String, reason: String },
    #[error("could not encode captured frame: {reason}")]
    FrameEncode { reason: String },
}

/// Terminal outcome of a single detection call. Never retried internally.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("a detection request is already in flight")]
    AlreadyProcessing,
    #[error("{message}")]
    RateLimited { message: String },
    #[error("backend authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },
    #[error("backend credits exhausted: {message}")]
    QuotaExhausted { message: String },
    #[error("backend error {status}: {body}")]
    Backend { status: u16, body: String },
    #[error("transport failure: {reason}")]
    Transport { reason: String },
}

impl DetectError {
    /// Authentication failures mean the deployment credential is wrong; the
    /// session cannot recover by retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DetectError::Authentication { .. })
    }

    /// HTTP status behind this outcome, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DetectError::RateLimited { .. } => Some(429),
            DetectError::QuotaExhausted { .. } => Some(402),
            DetectError::Authentication { status, .. } | DetectError::Backend { status, .. } => {
                Some(*status)
            }
            DetectError::AlreadyProcessing | DetectError::Transport { .. } => None,
        }
    }
}

/// A phase change the session state machine does not allow. This is a caller
/// bug, not something to show the user as a recoverable failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid session transition: {event:?} while {from:?}")]
pub struct TransitionError {
    pub from: Phase,
    pub event: SessionEvent,
}

/// Umbrella error returned by `Session` operations.
#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("session halted: {reason}")]
    Halted { reason: String },
}
