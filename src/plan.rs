//! Segment and stitch planning
//!
//! Two derive-once plans cover an export. [`SegmentPlan`] turns the document
//! height into the ordered scroll offsets the orchestrator visits, clamping
//! the tail so the last capture never scrolls past the end. [`StitchPlan`]
//! turns the CSS-pixel page into concrete output-canvas dimensions, applying
//! the platform's hard canvas limits by downscaling. The pipeline only ever
//! downsamples; small pages pass through at scale 1 exactly.

use crate::page::PageMetrics;

/// Largest canvas edge the platform will allocate, in device pixels.
pub const MAX_CANVAS_DIM: u32 = 16_384;

/// Largest canvas area the platform will allocate, in device pixels squared.
pub const MAX_CANVAS_AREA: u64 = 268_000_000;

/// Ordered scroll offsets covering the document, one per segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
  offsets: Vec<f32>,
  viewport_height: f32,
  document_height: f32,
}

impl SegmentPlan {
  /// Computes the offsets for one export pass.
  ///
  /// `segment_count = max(1, ceil(document_height / viewport_height))`;
  /// each offset is `min(i * viewport_height, document_height -
  /// viewport_height)` clamped to zero. The tail offset repeating an earlier
  /// value is valid clamping, not an off-by-one; the stitcher draws only the
  /// slice of each segment that maps to new document rows.
  pub fn for_metrics(metrics: &PageMetrics) -> Self {
    let viewport_height = metrics.viewport_height.max(1.0);
    let document_height = metrics.document_height.max(0.0);
    let count = ((document_height / viewport_height).ceil() as usize).max(1);

    let max_offset = (document_height - viewport_height).max(0.0);
    let offsets = (0..count)
      .map(|i| (i as f32 * viewport_height).min(max_offset))
      .collect();

    Self {
      offsets,
      viewport_height,
      document_height,
    }
  }

  pub fn offsets(&self) -> &[f32] {
    &self.offsets
  }

  /// Number of segments; always at least one.
  pub fn len(&self) -> usize {
    self.offsets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.offsets.is_empty()
  }

  /// Document rows a segment captured at `scroll_y` contributes to the
  /// output: `min(viewport_height, document_height - scroll_y)`. Zero or
  /// negative means the segment is fully redundant and is skipped.
  pub fn slice_height(&self, scroll_y: f32) -> f32 {
    self.viewport_height.min(self.document_height - scroll_y)
  }
}

/// Output canvas geometry derived from the page metrics and platform limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StitchPlan {
  /// Full-resolution width in device pixels, before clamping
  pub raw_width: f64,
  /// Full-resolution height in device pixels, before clamping
  pub raw_height: f64,
  /// Downscale factor applied to fit the platform limits; never above 1
  pub scale: f64,
  pub canvas_width: u32,
  pub canvas_height: u32,
}

impl StitchPlan {
  /// Plan for the stitched full-page image: viewport width by document
  /// height.
  pub fn for_metrics(metrics: &PageMetrics) -> Self {
    Self::for_size(
      metrics.viewport_width,
      metrics.document_height,
      metrics.device_pixel_ratio,
    )
  }

  /// Plan for an arbitrary CSS-pixel area at the given pixel ratio.
  ///
  /// Also used by the placeholder generator, which sizes itself to the
  /// measured document and must obey the same canvas caps.
  pub fn for_size(css_width: f32, css_height: f32, device_pixel_ratio: f32) -> Self {
    let raw_width = (f64::from(css_width) * f64::from(device_pixel_ratio)).max(1.0);
    let raw_height = (f64::from(css_height) * f64::from(device_pixel_ratio)).max(1.0);

    let area_limit = (MAX_CANVAS_AREA as f64 / (raw_width * raw_height)).sqrt();
    let dim_limit_w = f64::from(MAX_CANVAS_DIM) / raw_width;
    let dim_limit_h = f64::from(MAX_CANVAS_DIM) / raw_height;
    let scale = 1.0_f64.min(area_limit).min(dim_limit_w).min(dim_limit_h);

    let mut canvas_width = ((raw_width * scale).round() as u32).clamp(1, MAX_CANVAS_DIM);
    let mut canvas_height = ((raw_height * scale).round() as u32).clamp(1, MAX_CANVAS_DIM);

    // Rounding both axes up can nudge the product past the area cap.
    if u64::from(canvas_width) * u64::from(canvas_height) > MAX_CANVAS_AREA {
      if canvas_width >= canvas_height {
        canvas_width = (MAX_CANVAS_AREA / u64::from(canvas_height)) as u32;
      } else {
        canvas_height = (MAX_CANVAS_AREA / u64::from(canvas_width)) as u32;
      }
    }

    Self {
      raw_width,
      raw_height,
      scale,
      canvas_width,
      canvas_height,
    }
  }

  /// True when the plan had to shrink the output below full resolution.
  pub fn is_downscaled(&self) -> bool {
    self.scale < 1.0
  }
}
