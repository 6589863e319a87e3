//! Capture session state.
//!
//! `CaptureSession` is a plain value; every phase change goes through
//! [`transition`], so the state machine can be exercised without a camera or
//! a backend. `Session` wires the state to a `MediaAcquirer` and a
//! `DetectionClient` and is what presentation drives.

use anyhow::Result;
use std::io::Read;

use crate::capture::{encode_upload, MediaAcquirer, StreamInfo};
use crate::config::BrainsightConfig;
use crate::detect::{DetectionClient, DetectionResult};
use crate::encoding::ImageEncoding;
use crate::error::{CaptureError, DetectError, PerceptionError, TransitionError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Streaming,
    Capturing,
    /// Reached only after a fatal backend failure.
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    StreamStarted,
    StreamStopped,
    DetectionStarted,
    DetectionSucceeded,
    DetectionFailed { fatal: bool },
}

/// Phase plus the latest successful result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureSession {
    phase: Phase,
    last_result: Option<DetectionResult>,
    /// Phase to return to when the in-flight detection settles.
    resume: Phase,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_result(&self) -> Option<&DetectionResult> {
        self.last_result.as_ref()
    }
}

/// Apply one event. `result` is consumed only by `DetectionSucceeded`.
///
/// Allowed moves:
/// - Idle -> Streaming (stream started), Streaming -> Idle (stream stopped)
/// - Idle | Streaming -> Capturing (detection started)
/// - Capturing -> previous phase (detection settled), or Error when fatal
/// - Error -> Error on stream stop (device release stays possible)
pub fn transition(
    session: &CaptureSession,
    event: SessionEvent,
    result: Option<DetectionResult>,
) -> Result<CaptureSession, TransitionError> {
    let invalid = || TransitionError {
        from: session.phase,
        event,
    };
    let mut next = session.clone();
    match (session.phase, event) {
        (Phase::Idle, SessionEvent::StreamStarted) => next.phase = Phase::Streaming,
        (Phase::Streaming, SessionEvent::StreamStopped) => next.phase = Phase::Idle,
        (Phase::Error, SessionEvent::StreamStopped) => {}
        (from @ (Phase::Idle | Phase::Streaming), SessionEvent::DetectionStarted) => {
            next.resume = from;
            next.phase = Phase::Capturing;
        }
        (Phase::Capturing, SessionEvent::DetectionSucceeded) => {
            next.last_result = Some(result.ok_or_else(invalid)?);
            next.phase = session.resume;
        }
        (Phase::Capturing, SessionEvent::DetectionFailed { fatal }) => {
            next.phase = if fatal { Phase::Error } else { session.resume };
        }
        _ => return Err(invalid()),
    }
    if next.phase != Phase::Capturing {
        next.resume = Phase::Idle;
    }
    Ok(next)
}

type Observer = Box<dyn FnMut(&CaptureSession) + Send>;

/// One capture surface: camera, detection client and observable state.
///
/// Dropping the session releases the camera.
pub struct Session {
    state: CaptureSession,
    acquirer: MediaAcquirer,
    client: DetectionClient,
    halted: Option<String>,
    observer: Option<Observer>,
}

impl Session {
    pub fn new(acquirer: MediaAcquirer, client: DetectionClient) -> Self {
        Self {
            state: CaptureSession::new(),
            acquirer,
            client,
            halted: None,
            observer: None,
        }
    }

    pub fn from_config(cfg: &BrainsightConfig) -> Result<Self> {
        let acquirer = MediaAcquirer::from_settings(&cfg.camera)?;
        let client = DetectionClient::from_settings(&cfg.backend)?;
        Ok(Self::new(acquirer, client))
    }

    /// Called after every state change.
    pub fn set_observer(&mut self, observer: impl FnMut(&CaptureSession) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn state(&self) -> &CaptureSession {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn last_result(&self) -> Option<&DetectionResult> {
        self.state.last_result()
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.acquirer.stream_info()
    }

    pub fn start_stream(&mut self) -> Result<StreamInfo, PerceptionError> {
        self.ensure_not_halted()?;
        if let Some(info) = self.acquirer.stream_info() {
            return Ok(info);
        }
        if self.state.phase != Phase::Idle {
            return Err(TransitionError {
                from: self.state.phase,
                event: SessionEvent::StreamStarted,
            }
            .into());
        }
        let info = self.acquirer.start_stream()?;
        self.apply(SessionEvent::StreamStarted, None)?;
        Ok(info)
    }

    /// No-op when nothing is streaming.
    pub fn stop_stream(&mut self) -> Result<(), PerceptionError> {
        if !self.acquirer.stop_stream() {
            return Ok(());
        }
        self.apply(SessionEvent::StreamStopped, None)?;
        Ok(())
    }

    pub fn capture_frame(&mut self) -> Result<ImageEncoding, PerceptionError> {
        if self.state.phase != Phase::Streaming {
            return Err(CaptureError::NoActiveStream.into());
        }
        Ok(self.acquirer.capture_frame()?)
    }

    pub fn encode_upload(
        &self,
        reader: impl Read,
        declared: Option<&str>,
        origin: &str,
    ) -> Result<ImageEncoding, PerceptionError> {
        Ok(encode_upload(reader, declared, origin)?)
    }

    /// Detect objects in `encoding` and store the result.
    ///
    /// Failures leave `last_result` untouched. An authentication failure halts
    /// the session and releases the camera.
    pub fn detect(&mut self, encoding: &ImageEncoding) -> Result<&DetectionResult, PerceptionError> {
        self.ensure_not_halted()?;
        if self.state.phase == Phase::Capturing || self.client.is_processing() {
            return Err(DetectError::AlreadyProcessing.into());
        }
        self.apply(SessionEvent::DetectionStarted, None)?;

        match self.client.detect(encoding) {
            Ok(result) => {
                self.apply(SessionEvent::DetectionSucceeded, Some(result))?;
                self.state
                    .last_result()
                    .ok_or_else(|| PerceptionError::Halted {
                        reason: "detection result missing after success".to_string(),
                    })
            }
            Err(err) => {
                let fatal = err.is_fatal();
                self.apply(SessionEvent::DetectionFailed { fatal }, None)?;
                if fatal {
                    self.halted = Some(err.to_string());
                    if self.acquirer.stop_stream() {
                        self.apply(SessionEvent::StreamStopped, None)?;
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Capture the current frame and detect on it.
    pub fn capture_and_detect(&mut self) -> Result<&DetectionResult, PerceptionError> {
        let encoding = self.capture_frame()?;
        self.detect(&encoding)
    }

    fn ensure_not_halted(&self) -> Result<(), PerceptionError> {
        match &self.halted {
            Some(reason) => Err(PerceptionError::Halted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn apply(
        &mut self,
        event: SessionEvent,
        result: Option<DetectionResult>,
    ) -> Result<(), TransitionError> {
        self.state = transition(&self.state, event, result)?;
        log::debug!("session: {:?} -> {:?}", event, self.state.phase);
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.state);
        }
        Ok(())
    }
}
