//! Image encodings handed from capture to detection.
//!
//! An `ImageEncoding` is a compressed image plus the MIME tag the backend will
//! see. The tag is always one of the types the vision backend accepts; anything
//! else collapses to `image/jpeg` at construction time.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

/// MIME types accepted by the vision backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageMime {
    #[default]
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/gif")]
    Gif,
    #[serde(rename = "image/webp")]
    Webp,
}

impl ImageMime {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Gif => "image/gif",
            ImageMime::Webp => "image/webp",
        }
    }

    /// Recognize a declared content type such as `image/png` or `IMAGE/JPG; q=1`.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let essence = declared.split(';').next().unwrap_or(declared).trim();
        let subtype = essence
            .to_ascii_lowercase()
            .strip_prefix("image/")?
            .to_string();
        Self::from_subtype(&subtype)
    }

    /// Declared type when recognized, `image/jpeg` otherwise.
    pub fn or_default(declared: Option<&str>) -> Self {
        declared.and_then(Self::from_declared).unwrap_or_default()
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::from_subtype(&ext.to_ascii_lowercase())
    }

    fn from_subtype(subtype: &str) -> Option<Self> {
        match subtype {
            "jpeg" | "jpg" | "pjpeg" => Some(ImageMime::Jpeg),
            "png" => Some(ImageMime::Png),
            "gif" => Some(ImageMime::Gif),
            "webp" => Some(ImageMime::Webp),
            _ => None,
        }
    }

    pub(crate) fn from_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageMime::Jpeg),
            image::ImageFormat::Png => Some(ImageMime::Png),
            image::ImageFormat::Gif => Some(ImageMime::Gif),
            image::ImageFormat::WebP => Some(ImageMime::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compressed image bytes plus their MIME tag.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageEncoding {
    bytes: Vec<u8>,
    mime: ImageMime,
}

impl ImageEncoding {
    pub fn new(bytes: Vec<u8>, mime: ImageMime) -> Self {
        Self { bytes, mime }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` form used by browser-style clients.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }

    /// Accepts either a data URL or a bare base64 payload.
    ///
    /// The MIME tag comes from a `data:image/<type>;base64` prefix when one is
    /// present and recognized; otherwise it is `image/jpeg`.
    pub fn from_data_url(value: &str) -> Result<Self> {
        static DATA_URL_RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = DATA_URL_RE
            .get_or_init(|| regex::Regex::new(r"^data:image/(\w+);base64").unwrap());

        let mime = if value.starts_with("data:") {
            re.captures(value)
                .and_then(|caps| caps.get(1))
                .and_then(|subtype| ImageMime::from_extension(subtype.as_str()))
                .unwrap_or_default()
        } else {
            ImageMime::Jpeg
        };
        let payload = match value.split_once(',') {
            Some((_, payload)) => payload,
            None => value,
        };
        let bytes = BASE64
            .decode(payload.trim())
            .context("decode base64 image payload")?;
        if bytes.is_empty() {
            return Err(anyhow!("image payload is empty"));
        }
        Ok(Self { bytes, mime })
    }

    /// Short digest for log correlation. Never log the payload itself.
    pub fn digest_hex(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        hex::encode(&digest[..6])
    }
}

impl fmt::Debug for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageEncoding")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}
