//! Synthetic camera for tests and demos.
//!
//! `stub://<name>` opens a deterministic gradient source. Two names simulate
//! open failures: `stub://denied` (permission refused) and `stub://missing`
//! (no device). A `?warmup=N` suffix makes the first N reads return no frame,
//! like a video element that has not loaded yet.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{rgb24_len, CameraBackend, RgbFrame, StreamPreferences, VideoTrack};
use crate::error::CaptureError;

pub struct SyntheticCamera {
    uri: String,
    name: String,
    warmup_frames: u32,
    open_tracks: Arc<AtomicUsize>,
}

impl SyntheticCamera {
    pub fn from_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic camera uri must start with stub://"))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut warmup_frames = 0;
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            match pair.split_once('=') {
                Some(("warmup", value)) => {
                    warmup_frames = value
                        .parse()
                        .map_err(|_| anyhow!("warmup must be a frame count, got '{}'", value))?;
                }
                _ => return Err(anyhow!("unknown synthetic camera option '{}'", pair)),
            }
        }
        Ok(Self {
            uri: uri.to_string(),
            name: if name.is_empty() { "camera" } else { name }.to_string(),
            warmup_frames,
            open_tracks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Live count of tracks opened and not yet released.
    pub fn open_tracks(&self) -> Arc<AtomicUsize> {
        self.open_tracks.clone()
    }
}

impl CameraBackend for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&mut self, prefs: &StreamPreferences) -> Result<Box<dyn VideoTrack>, CaptureError> {
        let reason = match self.name.as_str() {
            "denied" => Some("permission denied"),
            "missing" => Some("no camera device found"),
            _ => None,
        };
        if let Some(reason) = reason {
            return Err(CaptureError::MediaAccess {
                device: self.uri.clone(),
                reason: reason.to_string(),
            });
        }
        self.open_tracks.fetch_add(1, Ordering::SeqCst);
        log::info!("SyntheticCamera: opened {} ({:?})", self.uri, prefs.facing);
        Ok(Box::new(SyntheticTrack {
            label: format!("synthetic:{}", self.name),
            width: prefs.width,
            height: prefs.height,
            warmup_remaining: self.warmup_frames,
            frame_count: 0,
            open_tracks: Some(self.open_tracks.clone()),
        }))
    }
}

struct SyntheticTrack {
    label: String,
    width: u32,
    height: u32,
    warmup_remaining: u32,
    frame_count: u64,
    open_tracks: Option<Arc<AtomicUsize>>,
}

impl SyntheticTrack {
    fn generate_pixels(&self) -> Result<Vec<u8>, CaptureError> {
        let len = rgb24_len(self.width, self.height).ok_or_else(|| CaptureError::FrameEncode {
            reason: format!("{}x{} frame is too large", self.width, self.height),
        })?;
        let mut pixels = vec![0u8; len];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + self.frame_count) % 256) as u8;
        }
        Ok(pixels)
    }
}

impl VideoTrack for SyntheticTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn read_frame(&mut self) -> Result<Option<RgbFrame>, CaptureError> {
        if self.open_tracks.is_none() {
            return Err(CaptureError::NoActiveStream);
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return Ok(None);
        }
        self.frame_count += 1;
        Ok(Some(RgbFrame {
            pixels: self.generate_pixels()?,
            width: self.width,
            height: self.height,
        }))
    }

    fn stop(&mut self) {
        if let Some(counter) = self.open_tracks.take() {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticTrack {
    fn drop(&mut self) {
        self.stop();
    }
}
