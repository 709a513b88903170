//! Export orchestration
//!
//! [`Exporter`] turns "capture this page" into a terminal [`CaptureOutcome`],
//! trying progressively cheaper strategies: stitched full-page capture,
//! then a single viewport capture, then the synthetic placeholder. Every
//! failure path resolves to a degraded-but-valid outcome; the one deliberate
//! exception is a missing activeTab permission, which is returned unchanged
//! because no fallback can succeed without it — the caller re-requests the
//! permission and retries the whole export.
//!
//! One export runs at a time per page. Segment capture is strictly
//! sequential: the primitive can only capture the visible viewport, so each
//! segment needs a real scroll and repaint wait first, and the host rate
//! limit is global so parallel calls would only trade progress for
//! rate-limit failures.

use crate::capture::{RateLimitConfig, RateLimitedClient, ViewportCapture};
use crate::clock::{Clock, SystemClock};
use crate::color::Rgba;
use crate::error::{Error, RenderError, Result};
use crate::image_output::{encode_data_url, OutputFormat};
use crate::mask::{Edge, LayoutQuery, MaskConfig, StickyMasker};
use crate::overlay::{render_overlay, AnnotationRecord, OverlayConfig};
use crate::page::{with_scroll_restore, PageSurface};
use crate::placeholder::render_placeholder;
use crate::plan::{SegmentPlan, StitchPlan};
use crate::stitch::{stitch, CaptureSegment};
use crate::text_render::FontStore;
use log::warn;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::Pixmap;

/// Which strategy produced the final image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
  Full,
  Viewport,
  Placeholder,
}

/// Terminal result of one export
///
/// `error` is populated even on a degraded-but-successful outcome so the UI
/// can show a non-blocking "screenshot may be incomplete" warning instead of
/// failing the export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
  pub data_url: String,
  pub mode: CaptureMode,
  pub is_placeholder: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl CaptureOutcome {
  fn full(data_url: String) -> Self {
    Self {
      data_url,
      mode: CaptureMode::Full,
      is_placeholder: false,
      error: None,
    }
  }

  fn viewport(data_url: String, error: String) -> Self {
    Self {
      data_url,
      mode: CaptureMode::Viewport,
      is_placeholder: false,
      error: Some(error),
    }
  }

  fn placeholder(data_url: String, error: String) -> Self {
    Self {
      data_url,
      mode: CaptureMode::Placeholder,
      is_placeholder: true,
      error: Some(error),
    }
  }
}

/// Export-wide tuning
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
  /// Fixed wait after each scroll's repaint, letting layout settle
  pub settle_delay: Duration,
  /// Render a synthetic image instead of touching the capture primitive;
  /// used by harnesses without a real capture surface
  pub synthetic_capture: bool,
  pub output_format: OutputFormat,
  pub overlay: OverlayConfig,
}

impl Default for ExportConfig {
  fn default() -> Self {
    Self {
      settle_delay: Duration::from_millis(150),
      synthetic_capture: false,
      output_format: OutputFormat::Png,
      overlay: OverlayConfig::default(),
    }
  }
}

/// Drives one page's export end to end
pub struct Exporter {
  page: Box<dyn PageSurface>,
  layout: Box<dyn LayoutQuery>,
  client: RateLimitedClient,
  masker: StickyMasker,
  fonts: FontStore,
  clock: Arc<dyn Clock>,
  config: ExportConfig,
}

impl Exporter {
  /// Exporter over the real system clock and system fonts.
  pub fn new(
    page: Box<dyn PageSurface>,
    layout: Box<dyn LayoutQuery>,
    primitive: Box<dyn ViewportCapture>,
  ) -> Self {
    Self::with_clock(page, layout, primitive, Arc::new(SystemClock))
  }

  /// Exporter over an injected clock; the capture client shares it.
  pub fn with_clock(
    page: Box<dyn PageSurface>,
    layout: Box<dyn LayoutQuery>,
    primitive: Box<dyn ViewportCapture>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      client: RateLimitedClient::new(primitive, Arc::clone(&clock)),
      page,
      layout,
      masker: StickyMasker::new(),
      fonts: FontStore::system(),
      clock,
      config: ExportConfig::default(),
    }
  }

  pub fn with_config(mut self, config: ExportConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_capture_config(mut self, config: RateLimitConfig) -> Self {
    self.client = self.client.with_config(config);
    self
  }

  pub fn with_mask_config(mut self, config: MaskConfig) -> Self {
    self.masker = StickyMasker::with_config(config);
    self
  }

  pub fn with_fonts(mut self, fonts: FontStore) -> Self {
    self.fonts = fonts;
    self
  }

  /// Captures the full page with no annotation overlay.
  pub fn capture_full_page(&mut self) -> Result<CaptureOutcome> {
    self.capture_annotated(&[])
  }

  /// Captures the full page and composites `annotations` onto the result.
  ///
  /// Resolves to a degraded outcome on failure instead of erroring; the
  /// only errors returned are the permission failure (so the caller can
  /// re-request activeTab and retry) and canvas allocation failure while
  /// painting the terminal placeholder.
  pub fn capture_annotated(&mut self, annotations: &[AnnotationRecord]) -> Result<CaptureOutcome> {
    if self.config.synthetic_capture {
      return self.synthetic_outcome();
    }

    let full_error = match self.try_full_page(annotations) {
      Ok(data_url) => return Ok(CaptureOutcome::full(data_url)),
      Err(err) if err.is_permission_required() => return Err(err),
      Err(err) => err,
    };
    warn!("full-page capture failed ({full_error}); falling back to viewport capture");

    match self.try_viewport() {
      Ok(data_url) => Ok(CaptureOutcome::viewport(data_url, full_error.to_string())),
      Err(err) if err.is_permission_required() => Err(err),
      Err(viewport_error) => {
        warn!("viewport capture failed ({viewport_error}); producing placeholder");
        self.placeholder_outcome(viewport_error)
      }
    }
  }

  fn try_full_page(&mut self, annotations: &[AnnotationRecord]) -> Result<String> {
    let metrics = self.page.metrics();
    let segment_plan = SegmentPlan::for_metrics(&metrics);
    let stitch_plan = StitchPlan::for_metrics(&metrics);

    let Self {
      page,
      layout,
      client,
      masker,
      clock,
      config,
      fonts,
    } = self;

    let offsets = segment_plan.offsets();
    let last_index = offsets.len() - 1;

    let segments = with_scroll_restore(page.as_mut(), |page| {
      let mut segments = Vec::with_capacity(offsets.len());
      for (index, &scroll_y) in offsets.iter().enumerate() {
        page.scroll_to(0.0, scroll_y)?;
        page.wait_for_repaint();
        clock.sleep(config.settle_delay);

        // Seam edges only: the top edge of the first segment and the
        // bottom edge of the last one show chrome exactly once already.
        let mut snapshots = Vec::new();
        if index > 0 {
          snapshots.extend(masker.hide(layout.as_mut(), Edge::Top));
        }
        if index < last_index {
          snapshots.extend(masker.hide(layout.as_mut(), Edge::Bottom));
        }

        let frame = client.capture();
        masker.restore(layout.as_mut(), snapshots);

        segments.push(CaptureSegment {
          image: frame?,
          scroll_y,
          is_first: index == 0,
          is_last: index == last_index,
        });
      }
      Ok(segments)
    })?;

    let mut stitched = stitch(&segments, &metrics, &stitch_plan)?;
    if !annotations.is_empty() {
      render_overlay(
        &mut stitched,
        annotations,
        &metrics,
        &stitch_plan,
        fonts,
        &config.overlay,
      );
    }
    encode_data_url(&stitched, config.output_format)
  }

  fn try_viewport(&mut self) -> Result<String> {
    let frame = self.client.capture()?;
    encode_data_url(&frame, self.config.output_format)
  }

  fn placeholder_outcome(&mut self, error: Error) -> Result<CaptureOutcome> {
    let metrics = self.page.metrics();
    let message = error.to_string();
    let pixmap = render_placeholder(&metrics, &self.fonts, "Screenshot unavailable", &message)?;
    let data_url = encode_data_url(&pixmap, self.config.output_format)?;
    Ok(CaptureOutcome::placeholder(data_url, message))
  }

  /// Deterministic stand-in for harnesses that stub capture entirely: a
  /// banded full-page canvas built from the real plans, tagged as a full
  /// capture so downstream handling stays on the normal path.
  fn synthetic_outcome(&mut self) -> Result<CaptureOutcome> {
    let metrics = self.page.metrics();
    let segment_plan = SegmentPlan::for_metrics(&metrics);
    let stitch_plan = StitchPlan::for_metrics(&metrics);

    let mut pixmap = Pixmap::new(stitch_plan.canvas_width, stitch_plan.canvas_height).ok_or(
      Error::Render(RenderError::CanvasUnavailable {
        width: stitch_plan.canvas_width,
        height: stitch_plan.canvas_height,
      }),
    )?;
    pixmap.fill(Rgba::rgb(226, 232, 240).to_skia());

    let band_height =
      f64::from(metrics.viewport_height) * f64::from(metrics.device_pixel_ratio) * stitch_plan.scale;
    for (index, &scroll_y) in segment_plan.offsets().iter().enumerate() {
      if index % 2 == 0 {
        continue;
      }
      let y = f64::from(scroll_y) * f64::from(metrics.device_pixel_ratio) * stitch_plan.scale;
      if let Some(rect) = tiny_skia::Rect::from_xywh(
        0.0,
        y as f32,
        pixmap.width() as f32,
        band_height.max(1.0) as f32,
      ) {
        let mut paint = tiny_skia::Paint::default();
        paint.set_color(Rgba::rgb(203, 213, 225).to_skia());
        let path = tiny_skia::PathBuilder::from_rect(rect);
        pixmap.fill_path(
          &path,
          &paint,
          tiny_skia::FillRule::Winding,
          tiny_skia::Transform::identity(),
          None,
        );
      }
    }

    let data_url = encode_data_url(&pixmap, self.config.output_format)?;
    Ok(CaptureOutcome::full(data_url))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::capture::{CaptureErrorCode, CaptureResponse};
  use crate::geometry::{Point, Rect, Size};
  use crate::image_output::decode_frame;
  use crate::mask::{CssPosition, ElementId, StyleProperty};
  use crate::page::PageMetrics;
  use std::sync::Mutex;

  struct FakePage {
    metrics: PageMetrics,
    scroll: Arc<Mutex<Point>>,
  }

  impl PageSurface for FakePage {
    fn metrics(&self) -> PageMetrics {
      self.metrics
    }

    fn scroll_position(&self) -> Point {
      *self.scroll.lock().unwrap()
    }

    fn scroll_to(&mut self, x: f32, y: f32) -> Result<()> {
      *self.scroll.lock().unwrap() = Point::new(x, y);
      Ok(())
    }

    fn wait_for_repaint(&mut self) {}
  }

  /// Layout with nothing anchored; the masker finds no candidates.
  struct BareLayout;

  impl LayoutQuery for BareLayout {
    fn viewport_size(&self) -> Size {
      Size::new(100.0, 100.0)
    }

    fn elements_at(&self, _point: Point) -> Vec<ElementId> {
      Vec::new()
    }

    fn parent(&self, _element: ElementId) -> Option<ElementId> {
      None
    }

    fn position(&self, _element: ElementId) -> CssPosition {
      CssPosition::Static
    }

    fn bounding_box(&self, _element: ElementId) -> Rect {
      Rect::from_xywh(0.0, 0.0, 0.0, 0.0)
    }

    fn inline_style(&self, _element: ElementId, _property: StyleProperty) -> Option<String> {
      None
    }

    fn set_inline_style(
      &mut self,
      _element: ElementId,
      _property: StyleProperty,
      _value: Option<&str>,
    ) {
    }
  }

  struct ScriptedCapture {
    responses: Vec<CaptureResponse>,
    calls: Arc<Mutex<usize>>,
  }

  impl ViewportCapture for ScriptedCapture {
    fn request_viewport_capture(&mut self) -> CaptureResponse {
      let mut calls = self.calls.lock().unwrap();
      let response = self
        .responses
        .get(*calls)
        .cloned()
        .unwrap_or_else(|| CaptureResponse::failed("script exhausted", None));
      *calls += 1;
      response
    }
  }

  fn frame_url(width: u32, height: u32) -> String {
    let mut pixmap = Pixmap::new(width, height).unwrap();
    pixmap.fill(Rgba::rgb(80, 120, 200).to_skia());
    encode_data_url(&pixmap, OutputFormat::Png).unwrap()
  }

  fn fast_config() -> ExportConfig {
    ExportConfig {
      settle_delay: Duration::ZERO,
      ..ExportConfig::default()
    }
  }

  fn fast_rate_limits() -> RateLimitConfig {
    RateLimitConfig {
      min_interval: Duration::ZERO,
      rate_limit_backoff: Duration::ZERO,
      retry_delay: Duration::ZERO,
      max_retries: 2,
    }
  }

  fn exporter_with(
    metrics: PageMetrics,
    responses: Vec<CaptureResponse>,
  ) -> (Exporter, Arc<Mutex<Point>>, Arc<Mutex<usize>>) {
    let scroll = Arc::new(Mutex::new(Point::ZERO));
    let calls = Arc::new(Mutex::new(0));
    let page = FakePage {
      metrics,
      scroll: Arc::clone(&scroll),
    };
    let primitive = ScriptedCapture {
      responses,
      calls: Arc::clone(&calls),
    };
    let exporter = Exporter::new(Box::new(page), Box::new(BareLayout), Box::new(primitive))
      .with_config(fast_config())
      .with_capture_config(fast_rate_limits())
      .with_fonts(FontStore::empty());
    (exporter, scroll, calls)
  }

  fn single_viewport_metrics() -> PageMetrics {
    PageMetrics::new(100.0, 100.0, 100.0, 100.0, 1.0)
  }

  #[test]
  fn single_segment_page_captures_full() {
    let (mut exporter, scroll, calls) =
      exporter_with(single_viewport_metrics(), vec![CaptureResponse::ok(frame_url(100, 100))]);

    let outcome = exporter.capture_full_page().unwrap();
    assert_eq!(outcome.mode, CaptureMode::Full);
    assert!(!outcome.is_placeholder);
    assert!(outcome.error.is_none());
    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(*scroll.lock().unwrap(), Point::ZERO);

    let image = decode_frame(&outcome.data_url).unwrap();
    assert_eq!((image.width(), image.height()), (100, 100));
  }

  #[test]
  fn permission_failure_propagates_without_fallback() {
    let (mut exporter, _, calls) = exporter_with(
      single_viewport_metrics(),
      vec![CaptureResponse::failed(
        "activeTab missing",
        Some(CaptureErrorCode::ActiveTabRequired),
      )],
    );

    let err = exporter.capture_full_page().unwrap_err();
    assert!(err.is_permission_required());
    assert_eq!(*calls.lock().unwrap(), 1, "no fallback capture expected");
  }

  #[test]
  fn generic_failure_falls_back_to_viewport() {
    // Full-page attempt burns 3 tries, then the viewport fallback succeeds.
    let mut responses = vec![
      CaptureResponse::failed("boom", None),
      CaptureResponse::failed("boom", None),
      CaptureResponse::failed("boom", None),
    ];
    responses.push(CaptureResponse::ok(frame_url(100, 100)));

    let (mut exporter, scroll, calls) = exporter_with(single_viewport_metrics(), responses);
    let outcome = exporter.capture_full_page().unwrap();

    assert_eq!(outcome.mode, CaptureMode::Viewport);
    assert!(outcome.error.as_deref().unwrap_or("").contains("boom"));
    assert_eq!(*calls.lock().unwrap(), 4);
    assert_eq!(*scroll.lock().unwrap(), Point::ZERO);
  }

  #[test]
  fn total_failure_resolves_to_placeholder() {
    let (mut exporter, _, _) = exporter_with(single_viewport_metrics(), Vec::new());
    let outcome = exporter.capture_full_page().unwrap();

    assert_eq!(outcome.mode, CaptureMode::Placeholder);
    assert!(outcome.is_placeholder);
    assert!(outcome.error.is_some());
    let image = decode_frame(&outcome.data_url).unwrap();
    assert_eq!((image.width(), image.height()), (100, 100));
  }

  #[test]
  fn synthetic_mode_skips_the_primitive() {
    let (mut exporter, _, calls) = exporter_with(single_viewport_metrics(), Vec::new());
    exporter.config.synthetic_capture = true;

    let outcome = exporter.capture_full_page().unwrap();
    assert_eq!(outcome.mode, CaptureMode::Full);
    assert_eq!(*calls.lock().unwrap(), 0);
    assert!(decode_frame(&outcome.data_url).is_ok());
  }

  #[test]
  fn outcome_serializes_in_wire_shape() {
    let outcome = CaptureOutcome::viewport("data:image/png;base64,xyz".to_string(), "why".to_string());
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["mode"], "viewport");
    assert_eq!(json["isPlaceholder"], false);
    assert_eq!(json["dataUrl"], "data:image/png;base64,xyz");
    assert_eq!(json["error"], "why");
  }
}
