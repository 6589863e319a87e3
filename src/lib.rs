//! Brainsight
//!
//! Capture a still image from a camera or an upload, send it to a remote
//! vision model, and turn the model's free-form reply into a typed
//! "objects + explanation" result.
//!
//! # Pipeline
//!
//! Media Acquirer -> `ImageEncoding` -> Detection Client -> raw reply ->
//! Result Parser -> `DetectionResult` -> Session State -> presentation.
//!
//! # Module Structure
//!
//! - `capture`: camera backends, still encoding, upload encoding
//! - `detect`: backend protocol, detection client, tolerant reply parser
//! - `session`: phase state machine and the `Session` that drives it
//! - `relay`: server-side relay holding the backend credential
//! - `config`: file + environment configuration
//! - `notice`: user-facing notifications for every outcome

pub mod capture;
pub mod config;
pub mod detect;
pub mod encoding;
pub mod error;
pub mod notice;
pub mod relay;
pub mod session;

pub use capture::{FacingMode, MediaAcquirer, StreamInfo, StreamPreferences};
pub use config::BrainsightConfig;
pub use detect::{parse, DetectedObject, DetectionClient, DetectionResult, ResultParser};
pub use encoding::{ImageEncoding, ImageMime};
pub use error::{CaptureError, DetectError, PerceptionError, TransitionError};
pub use notice::{Notice, Severity};
pub use session::{transition, CaptureSession, Phase, Session, SessionEvent};
