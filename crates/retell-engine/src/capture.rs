use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::error::CoachError;

/// Opaque encoded bitmap ready for transmission to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePayload {
    pub mime_type: String,
    pub data: String,
}

const JPEG_QUALITY: u8 = 92;

/// Encodes the pixels currently shown to the user. Feedback must grade the
/// image the user actually saw, so the in-memory bitmap is captured rather
/// than any re-fetched copy. Pure transformation: no I/O, no network.
pub fn capture_inline_payload(image: Option<&DynamicImage>) -> Result<InlinePayload, CoachError> {
    let Some(image) = image else {
        return Err(CoachError::Capture("no image is loaded".to_string()));
    };
    if image.width() == 0 || image.height() == 0 {
        return Err(CoachError::Capture(
            "image has not finished loading".to_string(),
        ));
    }

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut bytes), JPEG_QUALITY);
    image
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|err| CoachError::Capture(format!("jpeg encode failed: {err}")))?;

    Ok(InlinePayload {
        mime_type: "image/jpeg".to_string(),
        data: BASE64.encode(bytes),
    })
}
