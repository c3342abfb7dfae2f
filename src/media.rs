//! Answer attachments: base64 transport and image downscaling.
//!
//! Photos are shrunk so the longest side is at most `MAX_IMAGE_DIMENSION`
//! before they are sent to the model. JPEG output uses `JPEG_QUALITY`.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, ImageFormat};
use tracing::{debug, instrument};

use crate::error::MediaError;

pub const MAX_IMAGE_DIMENSION: u32 = 1024;
pub const JPEG_QUALITY: u8 = 90;
pub const DEFAULT_AUDIO_MIME: &str = "audio/webm";

/// Binary payload plus its media type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaAttachment {
  pub mime_type: String,
  pub bytes: Vec<u8>,
}

impl MediaAttachment {
  pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self { mime_type: mime_type.into(), bytes }
  }

  /// Decode a base64 payload; a `data:<mime>;base64,` prefix is accepted and stripped.
  /// An empty `mime_type` is taken from that prefix when present.
  pub fn from_base64(mime_type: &str, data: &str) -> Result<Self, MediaError> {
    let (url_mime, payload) = match data.split_once(',') {
      Some((head, rest)) if head.starts_with("data:") => {
        let mime = head["data:".len()..].split(';').next().unwrap_or_default();
        (mime, rest)
      }
      _ => ("", data),
    };
    let bytes = STANDARD.decode(payload.trim())?;
    if bytes.is_empty() {
      return Err(MediaError::Empty);
    }
    let mime = if mime_type.is_empty() { url_mime } else { mime_type };
    Ok(Self::new(mime, bytes))
  }

  pub fn to_base64(&self) -> String {
    STANDARD.encode(&self.bytes)
  }
}

/// Target size keeping the aspect ratio, longest side capped.
pub fn scaled_dimensions(width: u32, height: u32) -> (u32, u32) {
  let max = MAX_IMAGE_DIMENSION;
  if width > height {
    if width > max {
      let h = (height as f64 * (max as f64 / width as f64)).round() as u32;
      return (max, h.max(1));
    }
  } else if height > max {
    let w = (width as f64 * (max as f64 / height as f64)).round() as u32;
    return (w.max(1), max);
  }
  (width, height)
}

/// Downscale and re-encode a photo. PNG stays PNG; everything else becomes JPEG.
#[instrument(level = "debug", skip(original), fields(mime = %original.mime_type, in_bytes = original.bytes.len()))]
pub fn downscale_image(original: &MediaAttachment) -> Result<MediaAttachment, MediaError> {
  let format = image::guess_format(&original.bytes)?;
  let img = image::load_from_memory_with_format(&original.bytes, format)?;
  let (w, h) = scaled_dimensions(img.width(), img.height());
  let img = if (w, h) != (img.width(), img.height()) {
    img.resize_exact(w, h, FilterType::Triangle)
  } else {
    img
  };

  let mut out = Vec::new();
  let mime = if format == ImageFormat::Png {
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    "image/png"
  } else {
    let mut enc = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    enc.encode_image(&img.to_rgb8())?;
    "image/jpeg"
  };

  debug!(target: "quest_trainer", width = w, height = h, out_bytes = out.len(), "Image prepared for grading");
  Ok(MediaAttachment::new(mime, out))
}
