//! Segment compositing
//!
//! Takes the ordered per-segment captures and composes the single tall
//! output image. Pure function of its inputs: no page access, no global
//! state. Segments arrive in top-to-bottom document order and are drawn in
//! that order; where a clamped tail overlaps the previous segment, the later
//! draw simply overwrites the same document rows with identical content.

use crate::color::Rgba;
use crate::error::{Error, RenderError, Result};
use crate::page::PageMetrics;
use crate::plan::StitchPlan;
use log::debug;
use tiny_skia::{FilterQuality, IntRect, Pixmap, PixmapPaint, Transform};

/// One captured viewport with the scroll offset it was taken at
#[derive(Debug, Clone)]
pub struct CaptureSegment {
  pub image: Pixmap,
  pub scroll_y: f32,
  pub is_first: bool,
  pub is_last: bool,
}

/// Composites `segments` onto a canvas sized by `plan`.
///
/// Each segment contributes `min(viewport_height, document_height -
/// scroll_y)` CSS rows, drawn at `scroll_y * dpr * scale`; segments whose
/// slice is empty (a fully redundant clamped tail) are skipped. The canvas
/// starts white so undrawn rows of a degenerate input stay opaque.
pub fn stitch(
  segments: &[CaptureSegment],
  metrics: &PageMetrics,
  plan: &StitchPlan,
) -> Result<Pixmap> {
  let mut canvas = Pixmap::new(plan.canvas_width, plan.canvas_height).ok_or(Error::Render(
    RenderError::CanvasUnavailable {
      width: plan.canvas_width,
      height: plan.canvas_height,
    },
  ))?;
  canvas.fill(Rgba::WHITE.to_skia());

  let dpr = f64::from(metrics.device_pixel_ratio);
  let scale = plan.scale as f32;

  let mut paint = PixmapPaint::default();
  paint.quality = if plan.is_downscaled() {
    FilterQuality::Bilinear
  } else {
    FilterQuality::Nearest
  };

  for segment in segments {
    let slice_css = metrics
      .viewport_height
      .min(metrics.document_height - segment.scroll_y);
    if slice_css <= 0.0 {
      debug!("skipping redundant segment at scroll {}", segment.scroll_y);
      continue;
    }

    let slice_px = (f64::from(slice_css) * dpr).round() as u32;
    if slice_px == 0 {
      continue;
    }

    let dest_y = (f64::from(segment.scroll_y) * dpr * plan.scale).round() as f32;
    let transform = Transform::from_scale(scale, scale).post_translate(0.0, dest_y);

    if slice_px < segment.image.height() {
      let rect = IntRect::from_xywh(0, 0, segment.image.width(), slice_px).ok_or(
        Error::Render(RenderError::CanvasUnavailable {
          width: segment.image.width(),
          height: slice_px,
        }),
      )?;
      let cropped = segment.image.clone_rect(rect).ok_or(Error::Render(
        RenderError::CanvasUnavailable {
          width: segment.image.width(),
          height: slice_px,
        },
      ))?;
      canvas.draw_pixmap(0, 0, cropped.as_ref(), &paint, transform, None);
    } else {
      canvas.draw_pixmap(0, 0, segment.image.as_ref(), &paint, transform, None);
    }
  }

  Ok(canvas)
}
