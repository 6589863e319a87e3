use std::io::Read;
use std::path::Path;

use crate::encoding::{ImageEncoding, ImageMime};
use crate::error::CaptureError;

pub(crate) const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Read a user-selected file fully and tag it for the backend.
///
/// The declared type is kept when it is a recognized image type. Without a
/// declaration the bytes are sniffed; everything else is tagged `image/jpeg`.
pub fn encode_upload(
    reader: impl Read,
    declared: Option<&str>,
    origin: &str,
) -> Result<ImageEncoding, CaptureError> {
    let unreadable = |reason: String| CaptureError::UnreadableFile {
        origin: origin.to_string(),
        reason,
    };

    let mut bytes = Vec::new();
    reader
        .take(MAX_UPLOAD_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| unreadable(err.to_string()))?;
    if bytes.is_empty() {
        return Err(unreadable("file is empty".to_string()));
    }
    if bytes.len() as u64 > MAX_UPLOAD_BYTES {
        return Err(unreadable(format!(
            "file exceeds {} bytes",
            MAX_UPLOAD_BYTES
        )));
    }

    let mime = match declared {
        Some(declared) => ImageMime::or_default(Some(declared)),
        None => image::guess_format(&bytes)
            .ok()
            .and_then(ImageMime::from_format)
            .unwrap_or_default(),
    };
    log::debug!("encode_upload: {} ({} bytes, {})", origin, bytes.len(), mime);
    Ok(ImageEncoding::new(bytes, mime))
}

/// Path variant: the declared type comes from the file extension.
pub fn encode_upload_path(path: &Path) -> Result<ImageEncoding, CaptureError> {
    let origin = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|err| CaptureError::UnreadableFile {
        origin: origin.clone(),
        reason: err.to_string(),
    })?;
    let declared = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageMime::from_extension)
        .map(ImageMime::as_str);
    encode_upload(file, declared, &origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn declared_image_type_is_preserved() {
        let encoding = encode_upload(&b"GIF89a..."[..], Some("image/gif"), "a.gif").unwrap();
        assert_eq!(encoding.mime(), ImageMime::Gif);
        assert_eq!(encoding.bytes(), b"GIF89a...");
    }

    #[test]
    fn unrecognized_declaration_defaults_to_jpeg() {
        let encoding = encode_upload(PNG_MAGIC, Some("application/octet-stream"), "blob").unwrap();
        assert_eq!(encoding.mime(), ImageMime::Jpeg);
    }

    #[test]
    fn undeclared_bytes_are_sniffed() {
        let encoding = encode_upload(PNG_MAGIC, None, "blob").unwrap();
        assert_eq!(encoding.mime(), ImageMime::Png);
    }

    #[test]
    fn empty_file_is_unreadable() {
        let err = encode_upload(&b""[..], Some("image/png"), "empty.png").unwrap_err();
        assert!(matches!(err, CaptureError::UnreadableFile { .. }));
    }

    #[test]
    fn missing_path_is_unreadable() {
        let err = encode_upload_path(Path::new("/nonexistent/brainsight/photo.jpg")).unwrap_err();
        assert!(matches!(err, CaptureError::UnreadableFile { .. }));
    }
}
