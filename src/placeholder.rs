//! Placeholder image generation
//!
//! Terminal fallback of the export chain: when neither full-page nor
//! viewport capture produced an image, the export still resolves with a
//! diagnostic card so the download step always has valid bytes. Sized to
//! the measured document (viewport when unmeasured), clamped through the
//! same canvas caps as a real stitch.

use crate::color::Rgba;
use crate::error::{Error, RenderError, Result};
use crate::page::PageMetrics;
use crate::plan::StitchPlan;
use crate::text_layout::{truncate_text, TextMeasurer};
use crate::text_render::FontStore;
use tiny_skia::{Paint, PathBuilder, Pixmap, Rect as SkiaRect, Stroke, Transform};

const BACKGROUND: Rgba = Rgba::rgb(243, 244, 246);
const BORDER: Rgba = Rgba::rgb(209, 213, 219);
const TITLE_COLOR: Rgba = Rgba::rgb(55, 65, 81);
const SUBTITLE_COLOR: Rgba = Rgba::rgb(107, 114, 128);

const TITLE_SIZE: f32 = 17.0;
const SUBTITLE_SIZE: f32 = 13.0;

/// Renders the diagnostic fallback card.
///
/// `message` is the headline ("Screenshot unavailable"), `subtitle` carries
/// the failure detail. Text lines are centered and truncated to the canvas
/// width; with no usable font the card is just the framed background, which
/// still satisfies the caller's "always an image" contract.
pub fn render_placeholder(
  metrics: &PageMetrics,
  fonts: &FontStore,
  message: &str,
  subtitle: &str,
) -> Result<Pixmap> {
  let css_width = if metrics.document_width > 0.0 {
    metrics.document_width
  } else {
    metrics.viewport_width.max(1.0)
  };
  let css_height = if metrics.document_height > 0.0 {
    metrics.document_height
  } else {
    metrics.viewport_height.max(1.0)
  };

  let plan = StitchPlan::for_size(css_width, css_height, metrics.device_pixel_ratio);
  let mut pixmap = Pixmap::new(plan.canvas_width, plan.canvas_height).ok_or(Error::Render(
    RenderError::CanvasUnavailable {
      width: plan.canvas_width,
      height: plan.canvas_height,
    },
  ))?;
  pixmap.fill(BACKGROUND.to_skia());

  draw_frame(&mut pixmap);
  draw_caption(&mut pixmap, fonts, metrics, &plan, message, subtitle);

  Ok(pixmap)
}

fn draw_frame(pixmap: &mut Pixmap) {
  let width = pixmap.width() as f32;
  let height = pixmap.height() as f32;
  let inset = 0.5;
  let Some(rect) = SkiaRect::from_xywh(inset, inset, width - inset * 2.0, height - inset * 2.0)
  else {
    return;
  };

  let mut paint = Paint::default();
  paint.set_color(BORDER.to_skia());
  paint.anti_alias = false;

  let path = PathBuilder::from_rect(rect);
  let stroke = Stroke {
    width: 1.0,
    ..Default::default()
  };
  pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}

fn draw_caption(
  pixmap: &mut Pixmap,
  fonts: &FontStore,
  metrics: &PageMetrics,
  plan: &StitchPlan,
  message: &str,
  subtitle: &str,
) {
  // Text sizes track the same device scaling as the canvas itself.
  let px_scale = metrics.device_pixel_ratio * plan.scale as f32;
  let width = pixmap.width() as f32;
  let max_text_width = (width - 32.0 * px_scale).max(8.0);
  let center_y = pixmap.height() as f32 / 2.0;

  let title = fonts.painter(TITLE_SIZE * px_scale);
  let line_gap = title
    .as_ref()
    .map(|p| p.line_height())
    .unwrap_or(TITLE_SIZE * px_scale);

  if let Some(mut painter) = title {
    let text = truncate_text(&painter, message, max_text_width);
    if !text.is_empty() {
      let x = (width - painter.width_of(&text)) / 2.0;
      painter.draw_line(pixmap, &text, x, center_y - line_gap * 0.4, TITLE_COLOR);
    }
  }

  if let Some(mut painter) = fonts.painter(SUBTITLE_SIZE * px_scale) {
    let text = truncate_text(&painter, subtitle, max_text_width);
    if !text.is_empty() {
      let x = (width - painter.width_of(&text)) / 2.0;
      painter.draw_line(pixmap, &text, x, center_y + line_gap * 0.8, SUBTITLE_COLOR);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::plan::{MAX_CANVAS_AREA, MAX_CANVAS_DIM};

  #[test]
  fn placeholder_matches_document_size() {
    let metrics = PageMetrics::new(800.0, 1200.0, 800.0, 600.0, 1.0);
    let pixmap =
      render_placeholder(&metrics, &FontStore::empty(), "Screenshot unavailable", "x").unwrap();
    assert_eq!((pixmap.width(), pixmap.height()), (800, 1200));
  }

  #[test]
  fn unmeasured_document_falls_back_to_viewport() {
    let metrics = PageMetrics::new(0.0, 0.0, 1024.0, 768.0, 1.0);
    let pixmap = render_placeholder(&metrics, &FontStore::empty(), "m", "s").unwrap();
    assert_eq!((pixmap.width(), pixmap.height()), (1024, 768));
  }

  #[test]
  fn placeholder_obeys_canvas_caps() {
    let metrics = PageMetrics::new(4000.0, 900_000.0, 1280.0, 800.0, 2.0);
    let pixmap = render_placeholder(&metrics, &FontStore::empty(), "m", "s").unwrap();
    assert!(pixmap.width() <= MAX_CANVAS_DIM);
    assert!(pixmap.height() <= MAX_CANVAS_DIM);
    assert!(u64::from(pixmap.width()) * u64::from(pixmap.height()) <= MAX_CANVAS_AREA);
  }

  #[test]
  fn background_is_painted() {
    let metrics = PageMetrics::new(100.0, 100.0, 100.0, 100.0, 1.0);
    let pixmap = render_placeholder(&metrics, &FontStore::empty(), "m", "s").unwrap();
    let p = pixmap.pixel(50, 50).unwrap().demultiply();
    assert_eq!((p.red(), p.green(), p.blue()), (243, 244, 246));
  }

  #[test]
  fn caption_renders_when_fonts_exist() {
    let metrics = PageMetrics::new(600.0, 400.0, 600.0, 400.0, 1.0);
    let fonts = FontStore::system();
    let pixmap =
      render_placeholder(&metrics, &fonts, "Screenshot unavailable", "capture failed").unwrap();
    if fonts.has_face() {
      let darker = pixmap
        .pixels()
        .iter()
        .any(|p| p.demultiply().red() < 200);
      assert!(darker, "caption should darken some pixels");
    }
  }
}
