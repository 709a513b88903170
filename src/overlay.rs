//! Annotation overlay compositing
//!
//! Draws the annotation markers and their comment text onto the stitched
//! image. Records arrive from the UI context already positioned: document
//! coordinates for page-anchored annotations, viewport coordinates for
//! `isFixed` ones (those are placed within the first viewport, the one spot
//! they appear exactly once in a full-page composite). The overlay never
//! mutates the records.

use crate::color::Rgba;
use crate::error::Result;
use crate::geometry::Rect;
use crate::page::PageMetrics;
use crate::plan::StitchPlan;
use crate::text_layout::{truncate_text, wrap_text, TextMeasurer};
use crate::text_render::FontStore;
use serde::{Deserialize, Serialize};
use tiny_skia::{Paint, PathBuilder, Pixmap, Rect as SkiaRect, Stroke, Transform};

/// One annotation as supplied by the UI context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
  pub id: String,
  pub x: f32,
  pub y: f32,
  #[serde(default)]
  pub is_fixed: bool,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub comment: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bounding_box: Option<BoundingBox>,
}

/// Optional element bounds an annotation was attached to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl From<BoundingBox> for Rect {
  fn from(value: BoundingBox) -> Self {
    Rect::from_xywh(value.x, value.y, value.width, value.height)
  }
}

/// Parses the annotation list as sent over the messaging transport.
pub fn parse_annotations(json: &str) -> Result<Vec<AnnotationRecord>> {
  Ok(serde_json::from_str(json)?)
}

/// Overlay drawing parameters, in CSS pixels
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayConfig {
  pub marker_radius: f32,
  pub comment_box_width: f32,
  pub font_size: f32,
  pub max_comment_lines: usize,
}

impl Default for OverlayConfig {
  fn default() -> Self {
    Self {
      marker_radius: 11.0,
      comment_box_width: 220.0,
      font_size: 12.0,
      max_comment_lines: 4,
    }
  }
}

fn category_color(category: &str) -> Rgba {
  match category {
    "bug" | "issue" => Rgba::rgb(220, 38, 38),
    "design" => Rgba::rgb(147, 51, 234),
    "question" => Rgba::rgb(37, 99, 235),
    "suggestion" | "idea" => Rgba::rgb(22, 163, 74),
    _ => Rgba::rgb(71, 85, 105),
  }
}

/// Composites `annotations` onto `pixmap` in place.
///
/// Coordinates scale by `dpr * plan.scale`, matching the page content under
/// them. Markers are numbered in list order starting at 1. Comments wrap to
/// the configured box width and are cut at `max_comment_lines` with an
/// ellipsis. Without a usable font, markers are still drawn and text is
/// skipped.
pub fn render_overlay(
  pixmap: &mut Pixmap,
  annotations: &[AnnotationRecord],
  metrics: &PageMetrics,
  plan: &StitchPlan,
  fonts: &FontStore,
  config: &OverlayConfig,
) {
  let scale = metrics.device_pixel_ratio * plan.scale as f32;

  for (index, annotation) in annotations.iter().enumerate() {
    let cx = annotation.x * scale;
    let cy = annotation.y * scale;
    let radius = config.marker_radius * scale;
    let color = category_color(&annotation.category);

    draw_marker(pixmap, cx, cy, radius, color);

    let label = (index + 1).to_string();
    if let Some(mut painter) = fonts.painter(config.font_size * scale) {
      let label_x = cx - painter.width_of(&label) / 2.0;
      let label_y = cy + painter.ascent() / 2.0;
      painter.draw_line(pixmap, &label, label_x, label_y, Rgba::WHITE);
    }

    if !annotation.comment.trim().is_empty() {
      draw_comment_box(pixmap, annotation, cx, cy, radius, color, fonts, config, scale);
    }
  }
}

fn draw_marker(pixmap: &mut Pixmap, cx: f32, cy: f32, radius: f32, color: Rgba) {
  let Some(circle) = PathBuilder::from_circle(cx, cy, radius.max(1.0)) else {
    return;
  };

  let mut fill = Paint::default();
  fill.set_color(color.to_skia());
  fill.anti_alias = true;
  pixmap.fill_path(
    &circle,
    &fill,
    tiny_skia::FillRule::Winding,
    Transform::identity(),
    None,
  );

  // White ring keeps the marker visible over same-hued page content.
  let mut ring = Paint::default();
  ring.set_color(Rgba::WHITE.to_skia());
  ring.anti_alias = true;
  let stroke = Stroke {
    width: (radius * 0.18).max(1.0),
    ..Default::default()
  };
  pixmap.stroke_path(&circle, &ring, &stroke, Transform::identity(), None);
}

#[allow(clippy::too_many_arguments)]
fn draw_comment_box(
  pixmap: &mut Pixmap,
  annotation: &AnnotationRecord,
  cx: f32,
  cy: f32,
  radius: f32,
  color: Rgba,
  fonts: &FontStore,
  config: &OverlayConfig,
  scale: f32,
) {
  let Some(mut painter) = fonts.painter(config.font_size * scale) else {
    return;
  };

  let padding = 6.0 * scale;
  let box_width = config.comment_box_width * scale;
  let inner_width = box_width - padding * 2.0;
  if inner_width <= 0.0 {
    return;
  }

  let mut lines = wrap_text(&painter, &annotation.comment, inner_width);
  if lines.len() > config.max_comment_lines {
    lines.truncate(config.max_comment_lines);
    if let Some(last) = lines.last_mut() {
      let mut flagged = last.clone();
      flagged.push('\u{2026}');
      *last = if painter.width_of(&flagged) <= inner_width {
        flagged
      } else {
        truncate_text(&painter, &flagged, inner_width)
      };
    }
  }
  if lines.is_empty() {
    return;
  }

  let line_height = painter.line_height();
  let box_height = line_height * lines.len() as f32 + padding * 2.0;

  // Prefer the right side of the marker; flip left when it would run off
  // the canvas.
  let gap = radius + 6.0 * scale;
  let mut box_x = cx + gap;
  if box_x + box_width > pixmap.width() as f32 {
    box_x = (cx - gap - box_width).max(0.0);
  }
  let box_y = (cy - radius).max(0.0);

  let Some(rect) = SkiaRect::from_xywh(box_x, box_y, box_width, box_height) else {
    return;
  };

  let mut background = Paint::default();
  background.set_color(Rgba::WHITE.with_alpha(235).to_skia());
  background.anti_alias = true;
  let path = PathBuilder::from_rect(rect);
  pixmap.fill_path(
    &path,
    &background,
    tiny_skia::FillRule::Winding,
    Transform::identity(),
    None,
  );

  let mut border = Paint::default();
  border.set_color(color.to_skia());
  border.anti_alias = true;
  let stroke = Stroke {
    width: 1.0_f32.max(scale),
    ..Default::default()
  };
  pixmap.stroke_path(&path, &border, &stroke, Transform::identity(), None);

  let mut baseline = box_y + padding + painter.ascent();
  for line in &lines {
    painter.draw_line(pixmap, line, box_x + padding, baseline, Rgba::rgb(31, 41, 55));
    baseline += line_height;
  }
}
