//! Image encoding and data-URL plumbing
//!
//! The capture primitive hands frames over as data URLs and the finished
//! composite leaves the pipeline the same way, so this module owns both
//! directions: decoding a payload into a premultiplied pixmap, and encoding
//! a pixmap back into PNG/JPEG bytes wrapped in a data URL.

use crate::error::{Error, RenderError, Result};
use base64::Engine as _;
use std::io::Cursor;
use tiny_skia::Pixmap;

/// Encoded output format for the final composite
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
  Png,
  /// JPEG with quality 0-100
  Jpeg(u8),
}

impl Default for OutputFormat {
  fn default() -> Self {
    OutputFormat::Png
  }
}

impl OutputFormat {
  pub fn mime_type(&self) -> &'static str {
    match self {
      OutputFormat::Png => "image/png",
      OutputFormat::Jpeg(_) => "image/jpeg",
    }
  }
}

/// Encodes a pixmap into the requested format.
///
/// tiny-skia stores premultiplied alpha; the codec expects straight alpha,
/// so every pixel is demultiplied on the way out.
pub fn encode_image(pixmap: &Pixmap, format: OutputFormat) -> Result<Vec<u8>> {
  let width = pixmap.width();
  let height = pixmap.height();

  let mut rgba_data = Vec::with_capacity((width * height * 4) as usize);
  for pixel in pixmap.pixels() {
    let color = pixel.demultiply();
    rgba_data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
  }

  let mut buffer = Vec::new();
  match format {
    OutputFormat::Png => {
      let img = image::RgbaImage::from_raw(width, height, rgba_data).ok_or_else(|| {
        Error::Render(RenderError::EncodeFailed {
          format: "PNG".to_string(),
          reason: "failed to create RGBA image".to_string(),
        })
      })?;
      let mut cursor = Cursor::new(&mut buffer);
      img
        .write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|e| {
          Error::Render(RenderError::EncodeFailed {
            format: "PNG".to_string(),
            reason: e.to_string(),
          })
        })?;
    }
    OutputFormat::Jpeg(quality) => {
      // JPEG has no alpha channel
      let rgb_data: Vec<u8> = rgba_data
        .chunks_exact(4)
        .flat_map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect();
      let rgb_img = image::RgbImage::from_raw(width, height, rgb_data).ok_or_else(|| {
        Error::Render(RenderError::EncodeFailed {
          format: "JPEG".to_string(),
          reason: "failed to create RGB image".to_string(),
        })
      })?;
      let mut cursor = Cursor::new(&mut buffer);
      let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
      rgb_img.write_with_encoder(encoder).map_err(|e| {
        Error::Render(RenderError::EncodeFailed {
          format: "JPEG".to_string(),
          reason: e.to_string(),
        })
      })?;
    }
  }

  Ok(buffer)
}

/// Encodes a pixmap and wraps it in a `data:` URL.
pub fn encode_data_url(pixmap: &Pixmap, format: OutputFormat) -> Result<String> {
  let bytes = encode_image(pixmap, format)?;
  let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
  Ok(format!("data:{};base64,{}", format.mime_type(), payload))
}

/// Extracts the raw bytes from a base64 `data:` URL.
///
/// Capture payloads are always base64-encoded images; anything else is a
/// malformed frame.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
  let rest = url.strip_prefix("data:").ok_or_else(|| {
    Error::Render(RenderError::DecodeFailed {
      reason: "payload is not a data URL".to_string(),
    })
  })?;

  let comma = rest.find(',').ok_or_else(|| {
    Error::Render(RenderError::DecodeFailed {
      reason: "data URL has no payload separator".to_string(),
    })
  })?;

  let header = &rest[..comma];
  if !header.ends_with(";base64") {
    return Err(Error::Render(RenderError::DecodeFailed {
      reason: "capture payload is not base64-encoded".to_string(),
    }));
  }

  base64::engine::general_purpose::STANDARD
    .decode(&rest[comma + 1..])
    .map_err(|e| {
      Error::Render(RenderError::DecodeFailed {
        reason: format!("invalid base64: {}", e),
      })
    })
}

/// Decodes encoded image bytes (PNG or JPEG, format-sniffed) into a
/// premultiplied pixmap.
pub fn decode_pixmap(bytes: &[u8]) -> Result<Pixmap> {
  let decoded = image::load_from_memory(bytes).map_err(|e| {
    Error::Render(RenderError::DecodeFailed {
      reason: e.to_string(),
    })
  })?;
  let rgba = decoded.to_rgba8();
  let (width, height) = rgba.dimensions();

  let mut pixmap = Pixmap::new(width, height).ok_or(Error::Render(
    RenderError::CanvasUnavailable { width, height },
  ))?;
  for (dst, src) in pixmap
    .pixels_mut()
    .iter_mut()
    .zip(rgba.as_raw().chunks_exact(4))
  {
    *dst = tiny_skia::ColorU8::from_rgba(src[0], src[1], src[2], src[3]).premultiply();
  }

  Ok(pixmap)
}

/// Decodes a capture primitive payload (data URL) into a pixmap.
pub fn decode_frame(data_url: &str) -> Result<Pixmap> {
  decode_pixmap(&decode_data_url(data_url)?)
}
