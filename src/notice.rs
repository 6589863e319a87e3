//! User-facing notifications.
//!
//! Every pipeline outcome maps to a short `Notice`; presentation decides how to
//! show it (toast, stderr line, status bar).

use serde::Serialize;

use crate::detect::DetectionResult;
use crate::error::{CaptureError, DetectError, PerceptionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Destructive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notice {
    fn new(title: &str, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            severity,
        }
    }

    pub fn detection_complete(result: &DetectionResult) -> Self {
        Self::new(
            "Detection Complete",
            format!("Found {} objects", result.objects().len()),
            Severity::Info,
        )
    }
}

impl From<&CaptureError> for Notice {
    fn from(err: &CaptureError) -> Self {
        match err {
            CaptureError::MediaAccess { .. } => Notice::new(
                "Camera Error",
                "Could not access camera. Please check permissions.",
                Severity::Destructive,
            ),
            CaptureError::NoActiveStream => Notice::new(
                "Camera Not Ready",
                "Start the camera and wait for the preview before capturing.",
                Severity::Warning,
            ),
            CaptureError::UnreadableFile { .. } => Notice::new(
                "Upload Failed",
                "Could not read the selected file.",
                Severity::Destructive,
            ),
            CaptureError::FrameEncode { .. } => Notice::new(
                "Capture Failed",
                "Could not encode the captured frame.",
                Severity::Destructive,
            ),
        }
    }
}

impl From<&DetectError> for Notice {
    fn from(err: &DetectError) -> Self {
        match err {
            DetectError::AlreadyProcessing => Notice::new(
                "Still Processing",
                "Wait for the current detection to finish.",
                Severity::Warning,
            ),
            DetectError::RateLimited { .. } => Notice::new(
                "Detection Failed",
                "Rate limit exceeded. Please try again in a moment.",
                Severity::Destructive,
            ),
            DetectError::Authentication { .. } => Notice::new(
                "Detection Unavailable",
                "API authentication failed. Please check your API key.",
                Severity::Destructive,
            ),
            DetectError::QuotaExhausted { .. } => Notice::new(
                "Detection Failed",
                "Credits exhausted. Please add funds to continue.",
                Severity::Destructive,
            ),
            DetectError::Backend { status, .. } => Notice::new(
                "Detection Failed",
                format!("The detection service returned an error ({status})."),
                Severity::Destructive,
            ),
            DetectError::Transport { .. } => Notice::new(
                "Detection Failed",
                "Could not reach the detection service.",
                Severity::Destructive,
            ),
        }
    }
}

impl From<&PerceptionError> for Notice {
    fn from(err: &PerceptionError) -> Self {
        match err {
            PerceptionError::Capture(err) => err.into(),
            PerceptionError::Detect(err) => err.into(),
            PerceptionError::Transition(_) => Notice::new(
                "Unexpected State",
                "That action is not available right now.",
                Severity::Warning,
            ),
            PerceptionError::Halted { .. } => Notice::new(
                "Detection Unavailable",
                "The detection service is misconfigured. Restart after fixing the API key.",
                Severity::Destructive,
            ),
        }
    }
}
