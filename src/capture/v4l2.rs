//! V4L2 camera backend.
//!
//! Opens a local device node (e.g. /dev/video0) with a memory-mapped RGB3
//! stream. The rear/front choice is a pair of configured device paths, since
//! V4L2 has no notion of facing.

use ouroboros::self_referencing;

use super::{rgb24_len, CameraBackend, FacingMode, RgbFrame, StreamPreferences, VideoTrack};
use crate::error::CaptureError;

const MMAP_BUFFERS: u32 = 4;

pub struct V4l2Camera {
    rear_device: String,
    front_device: Option<String>,
}

impl V4l2Camera {
    pub fn new(rear_device: String, front_device: Option<String>) -> Self {
        Self {
            rear_device,
            front_device,
        }
    }

    fn device_for(&self, facing: FacingMode) -> &str {
        match (facing, self.front_device.as_deref()) {
            (FacingMode::User, Some(front)) => front,
            _ => &self.rear_device,
        }
    }
}

impl CameraBackend for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn open(&mut self, prefs: &StreamPreferences) -> Result<Box<dyn VideoTrack>, CaptureError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = self.device_for(prefs.facing).to_string();
        let media_access = |reason: String| CaptureError::MediaAccess {
            device: path.clone(),
            reason,
        };

        let device = v4l::Device::with_path(&path).map_err(|err| media_access(err.to_string()))?;
        let mut format = device
            .format()
            .map_err(|err| media_access(format!("read format: {}", err)))?;
        format.width = prefs.width;
        format.height = prefs.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Camera: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .map_err(|err| media_access(format!("read format: {}", err)))?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(media_access(format!(
                "device does not support RGB3 (negotiated {})",
                format.fourcc
            )));
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
            },
        }
        .try_build()
        .map_err(|err| media_access(format!("create buffer stream: {}", err)))?;

        log::info!(
            "V4l2Camera: opened {} ({}x{})",
            path,
            format.width,
            format.height
        );
        Ok(Box::new(V4l2Track {
            label: path,
            width: format.width,
            height: format.height,
            state: Some(state),
        }))
    }
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct V4l2Track {
    label: String,
    width: u32,
    height: u32,
    state: Option<V4l2State>,
}

impl VideoTrack for V4l2Track {
    fn label(&self) -> &str {
        &self.label
    }

    fn read_frame(&mut self) -> Result<Option<RgbFrame>, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let expected =
            rgb24_len(self.width, self.height).ok_or_else(|| CaptureError::FrameEncode {
                reason: format!("{}x{} frame is too large", self.width, self.height),
            })?;
        let state = self.state.as_mut().ok_or(CaptureError::NoActiveStream)?;
        let pixels = state.with_mut(|fields| {
            fields
                .stream
                .next()
                .map(|(buf, _meta)| buf.get(..expected).map(<[u8]>::to_vec))
        });
        match pixels {
            Ok(Some(pixels)) => Ok(Some(RgbFrame {
                pixels,
                width: self.width,
                height: self.height,
            })),
            // Short buffer: the driver has not delivered a full frame yet.
            Ok(None) => Ok(None),
            Err(err) => Err(CaptureError::MediaAccess {
                device: self.label.clone(),
                reason: format!("capture frame: {}", err),
            }),
        }
    }

    fn stop(&mut self) {
        if self.state.take().is_some() {
            log::debug!("V4l2Camera: closed {}", self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_prefers_front_device() {
        let camera = V4l2Camera::new("/dev/video0".into(), Some("/dev/video2".into()));
        assert_eq!(camera.device_for(FacingMode::User), "/dev/video2");
        assert_eq!(camera.device_for(FacingMode::Environment), "/dev/video0");

        let single = V4l2Camera::new("/dev/video0".into(), None);
        assert_eq!(single.device_for(FacingMode::User), "/dev/video0");
    }
}
