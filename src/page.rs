//! Page surface abstraction
//!
//! The exporter reaches the live document exclusively through [`PageSurface`]:
//! one read of the document/viewport metrics per export, scroll get/set, and
//! a repaint wait between a scroll and the capture that follows it. Keeping
//! this a trait lets the whole pipeline run against synthetic pages in tests.

use crate::error::Result;
use crate::geometry::Point;

/// Document and viewport measurements, read once per export
///
/// Immutable for the duration of one capture pass; a page that resizes
/// mid-export produces a best-effort image, same as the live product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetrics {
  pub document_width: f32,
  pub document_height: f32,
  pub viewport_width: f32,
  pub viewport_height: f32,
  pub device_pixel_ratio: f32,
}

impl PageMetrics {
  pub fn new(
    document_width: f32,
    document_height: f32,
    viewport_width: f32,
    viewport_height: f32,
    device_pixel_ratio: f32,
  ) -> Self {
    Self {
      document_width,
      document_height,
      viewport_width,
      viewport_height,
      // A zero or negative ratio would collapse every plan to nothing.
      device_pixel_ratio: if device_pixel_ratio > 0.0 {
        device_pixel_ratio
      } else {
        1.0
      },
    }
  }
}

/// The scrollable document the exporter paginates over
///
/// Only the document's own scroll is driven; nested scroll containers are
/// not paginated.
pub trait PageSurface {
  /// Reads the current document/viewport measurements.
  fn metrics(&self) -> PageMetrics;

  /// Current scroll offset of the document.
  fn scroll_position(&self) -> Point;

  /// Scrolls the document to the given offset.
  fn scroll_to(&mut self, x: f32, y: f32) -> Result<()>;

  /// Blocks until the surface has had a chance to repaint after a scroll
  /// (one animation frame on a real page). The fixed settle delay on top of
  /// this belongs to the orchestrator's config.
  fn wait_for_repaint(&mut self);
}

/// Runs `body` and restores the original scroll position afterwards,
/// whichever way `body` exits.
///
/// The scroll position is a shared resource owned by the exporter for the
/// duration of one export; this is the acquire/run/always-release shape that
/// guarantees it is handed back. A failure inside `body` wins over a failure
/// to restore.
pub fn with_scroll_restore<T>(
  page: &mut dyn PageSurface,
  body: impl FnOnce(&mut dyn PageSurface) -> Result<T>,
) -> Result<T> {
  let original = page.scroll_position();
  let result = body(page);
  let restored = page.scroll_to(original.x, original.y);
  match result {
    Ok(value) => restored.map(|_| value),
    Err(err) => Err(err),
  }
}
