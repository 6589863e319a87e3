//! Media acquisition.
//!
//! This module provides the camera side of the pipeline:
//! - `MediaAcquirer`: owns at most one live video track and encodes stills
//! - Camera backends: synthetic (`stub://`) and V4L2 (feature: camera-v4l2)
//! - Upload encoding for user-selected files
//!
//! The acquirer is the only owner of a device handle. A track is released on
//! `stop_stream` and again on drop, so no handle outlives the capture surface.

mod frame;
pub mod synthetic;
mod upload;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::CameraSettings;
use crate::encoding::ImageEncoding;
use crate::error::CaptureError;

pub use frame::{encode_jpeg, RgbFrame};
pub(crate) use frame::rgb24_len;
pub use synthetic::SyntheticCamera;
pub use upload::{encode_upload, encode_upload_path};
pub(crate) use upload::MAX_UPLOAD_BYTES;
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

/// Which way the requested camera should face.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera, pointed at the scene.
    #[default]
    Environment,
    User,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamPreferences {
    pub facing: FacingMode,
    pub width: u32,
    pub height: u32,
}

/// Opens tracks on a camera device.
pub trait CameraBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Open a live track. Permission or device failures map to
    /// `CaptureError::MediaAccess`.
    fn open(&mut self, prefs: &StreamPreferences) -> Result<Box<dyn VideoTrack>, CaptureError>;
}

/// A live video track. Dropping a track must release the device.
pub trait VideoTrack: Send {
    fn label(&self) -> &str;

    /// Latest frame at native resolution, or `None` while the video has not
    /// produced its first frame yet.
    fn read_frame(&mut self) -> Result<Option<RgbFrame>, CaptureError>;

    /// Release the device. Must be safe to call more than once.
    fn stop(&mut self);
}

/// Description of the live source exposed to presentation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub label: String,
    pub facing: FacingMode,
}

/// Owns the camera handle and produces still encodings on demand.
pub struct MediaAcquirer {
    backend: Box<dyn CameraBackend>,
    prefs: StreamPreferences,
    jpeg_quality: u8,
    track: Option<Box<dyn VideoTrack>>,
}

impl MediaAcquirer {
    pub fn new(backend: Box<dyn CameraBackend>, prefs: StreamPreferences, jpeg_quality: u8) -> Self {
        Self {
            backend,
            prefs,
            jpeg_quality,
            track: None,
        }
    }

    pub fn from_settings(settings: &CameraSettings) -> Result<Self> {
        let prefs = StreamPreferences {
            facing: settings.facing,
            width: settings.width,
            height: settings.height,
        };
        Ok(Self::new(
            open_backend(settings)?,
            prefs,
            settings.jpeg_quality,
        ))
    }

    pub fn is_streaming(&self) -> bool {
        self.track.is_some()
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.track.as_ref().map(|track| StreamInfo {
            label: track.label().to_string(),
            facing: self.prefs.facing,
        })
    }

    /// Open the camera. While already streaming this returns the existing
    /// stream and never opens a second handle.
    pub fn start_stream(&mut self) -> Result<StreamInfo, CaptureError> {
        if let Some(info) = self.stream_info() {
            log::debug!("start_stream: already streaming from {}", info.label);
            return Ok(info);
        }
        let track = self.backend.open(&self.prefs).map_err(|err| {
            log::warn!("start_stream: {} backend failed: {}", self.backend.name(), err);
            err
        })?;
        log::info!(
            "start_stream: streaming from {} ({:?})",
            track.label(),
            self.prefs.facing
        );
        self.track = Some(track);
        self.stream_info().ok_or(CaptureError::NoActiveStream)
    }

    /// Release the track. Returns false (and does nothing) when no stream is
    /// active.
    pub fn stop_stream(&mut self) -> bool {
        match self.track.take() {
            Some(mut track) => {
                track.stop();
                log::info!("stop_stream: released {}", track.label());
                true
            }
            None => false,
        }
    }

    /// Encode the current frame as JPEG at native resolution.
    pub fn capture_frame(&mut self) -> Result<ImageEncoding, CaptureError> {
        let track = self.track.as_mut().ok_or(CaptureError::NoActiveStream)?;
        let frame = track.read_frame()?.ok_or(CaptureError::NoActiveStream)?;
        let encoding = encode_jpeg(&frame, self.jpeg_quality)?;
        log::debug!(
            "capture_frame: {}x{} -> {} bytes",
            frame.width,
            frame.height,
            encoding.len()
        );
        Ok(encoding)
    }
}

impl Drop for MediaAcquirer {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

/// Pick a backend for the configured device: `stub://...` is synthetic,
/// anything else needs the `camera-v4l2` feature.
pub fn open_backend(settings: &CameraSettings) -> Result<Box<dyn CameraBackend>> {
    if settings.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::from_uri(&settings.device)?));
    }
    #[cfg(feature = "camera-v4l2")]
    {
        Ok(Box::new(V4l2Camera::new(
            settings.device.clone(),
            settings.front_device.clone(),
        )))
    }
    #[cfg(not(feature = "camera-v4l2"))]
    {
        Err(anyhow::anyhow!(
            "camera device '{}' requires the camera-v4l2 feature",
            settings.device
        ))
    }
}
