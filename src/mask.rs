//! Sticky-element masking
//!
//! Fixed and sticky chrome (nav bars, cookie footers) stays glued to the
//! viewport while the document scrolls underneath, so a naive segment
//! capture repeats it at every seam of the stitched image. Before each
//! segment the orchestrator asks this module to hide the chrome touching the
//! seam edges, and to restore it immediately after the capture.
//!
//! Detection samples a handful of probe points along the edge and walks the
//! element stack (and each element's ancestor chain) under every probe. The
//! geometry itself comes through the [`LayoutQuery`] trait so the decision
//! logic runs against synthetic layouts in tests; on a real page the
//! implementation sits on elementsFromPoint/getComputedStyle equivalents.

use crate::geometry::{Point, Rect, Size};
use rustc_hash::FxHashSet;

/// Which viewport edge is being prepared for a seam
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
  Top,
  Bottom,
}

/// Computed CSS position of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssPosition {
  Static,
  Relative,
  Absolute,
  Fixed,
  Sticky,
}

impl CssPosition {
  /// Fixed and sticky elements stay anchored to the viewport during scroll.
  pub fn is_viewport_anchored(self) -> bool {
    matches!(self, CssPosition::Fixed | CssPosition::Sticky)
  }
}

/// Opaque handle to a DOM element held by the layout query implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// The three inline style properties forced while an element is masked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleProperty {
  Visibility,
  Opacity,
  PointerEvents,
}

impl StyleProperty {
  pub fn css_name(self) -> &'static str {
    match self {
      StyleProperty::Visibility => "visibility",
      StyleProperty::Opacity => "opacity",
      StyleProperty::PointerEvents => "pointer-events",
    }
  }

  fn masked_value(self) -> &'static str {
    match self {
      StyleProperty::Visibility => "hidden",
      StyleProperty::Opacity => "0",
      StyleProperty::PointerEvents => "none",
    }
  }
}

/// Read/write access to page layout and inline styles
///
/// The masker's only window onto the document. `elements_at` returns the
/// full stack under a point in z-order, topmost first, mirroring the
/// platform's hit-testing order.
pub trait LayoutQuery {
  fn viewport_size(&self) -> Size;

  /// Every element under the point, topmost first.
  fn elements_at(&self, point: Point) -> Vec<ElementId>;

  fn parent(&self, element: ElementId) -> Option<ElementId>;

  fn position(&self, element: ElementId) -> CssPosition;

  /// Bounding box in viewport coordinates.
  fn bounding_box(&self, element: ElementId) -> Rect;

  /// Current inline value of the property, if one is authored.
  fn inline_style(&self, element: ElementId, property: StyleProperty) -> Option<String>;

  /// Sets the inline property; `None` removes it.
  fn set_inline_style(&mut self, element: ElementId, property: StyleProperty, value: Option<&str>);

  /// The annotation UI's own root must never be masked.
  fn is_overlay_root(&self, _element: ElementId) -> bool {
    false
  }
}

/// Restore record for one masked element
///
/// Captures the authored inline values (absent means the property was not
/// set, and will be removed again on restore). Lifetime is one segment:
/// created right before its capture, consumed right after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSnapshot {
  pub element: ElementId,
  pub visibility: Option<String>,
  pub opacity: Option<String>,
  pub pointer_events: Option<String>,
}

/// Detection thresholds for edge chrome
///
/// The defaults reject small fixed widgets (floating action buttons,
/// off-edge cookie prompts) while catching full-width sticky bars. They are
/// empirically tuned, not load-bearing; adjust per deployment if needed.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskConfig {
  /// Candidate must span at least this fraction of the viewport width
  pub min_width_ratio: f32,
  /// Candidate must be at most this fraction of the viewport height
  pub max_height_ratio: f32,
  /// Maximum gap between the candidate's box and the sampled edge
  pub edge_tolerance: f32,
  /// Probe distance inward from the sampled edge
  pub probe_inset: f32,
  /// Horizontal probe positions as fractions of the viewport width
  pub probe_fractions: [f32; 3],
}

impl Default for MaskConfig {
  fn default() -> Self {
    Self {
      min_width_ratio: 0.6,
      max_height_ratio: 0.4,
      edge_tolerance: 2.0,
      probe_inset: 2.0,
      probe_fractions: [0.1, 0.5, 0.9],
    }
  }
}

/// Hides and restores viewport-anchored chrome at segment seams
#[derive(Debug, Clone, Default)]
pub struct StickyMasker {
  config: MaskConfig,
}

impl StickyMasker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(config: MaskConfig) -> Self {
    Self { config }
  }

  /// Hides every qualifying element along `edge` and returns the restore
  /// records. Call [`StickyMasker::restore`] with the returned snapshots as
  /// soon as the segment capture completes, success or not.
  pub fn hide(&self, layout: &mut dyn LayoutQuery, edge: Edge) -> Vec<StyleSnapshot> {
    let viewport = layout.viewport_size();
    if viewport.is_empty() {
      return Vec::new();
    }

    let probe_y = match edge {
      Edge::Top => self.config.probe_inset,
      Edge::Bottom => viewport.height - self.config.probe_inset,
    };

    let mut visited: FxHashSet<ElementId> = FxHashSet::default();
    let mut snapshots = Vec::new();

    for fraction in self.config.probe_fractions {
      let probe = Point::new(viewport.width * fraction, probe_y);
      for element in layout.elements_at(probe) {
        let mut node = Some(element);
        while let Some(current) = node {
          node = layout.parent(current);
          if !visited.insert(current) {
            // Ancestors of a visited node were already walked.
            break;
          }
          if !layout.position(current).is_viewport_anchored() {
            continue;
          }
          if layout.is_overlay_root(current) {
            continue;
          }
          if !self.qualifies(layout.bounding_box(current), edge, viewport) {
            continue;
          }
          snapshots.push(mask_element(layout, current));
        }
      }
    }

    snapshots
  }

  /// Replays the authored inline values captured by [`StickyMasker::hide`].
  ///
  /// Safe to call with an empty set; replaying the same snapshots twice is a
  /// no-op the second time.
  pub fn restore(&self, layout: &mut dyn LayoutQuery, snapshots: Vec<StyleSnapshot>) {
    for snapshot in snapshots {
      layout.set_inline_style(
        snapshot.element,
        StyleProperty::Visibility,
        snapshot.visibility.as_deref(),
      );
      layout.set_inline_style(
        snapshot.element,
        StyleProperty::Opacity,
        snapshot.opacity.as_deref(),
      );
      layout.set_inline_style(
        snapshot.element,
        StyleProperty::PointerEvents,
        snapshot.pointer_events.as_deref(),
      );
    }
  }

  fn qualifies(&self, rect: Rect, edge: Edge, viewport: Size) -> bool {
    if rect.width < viewport.width * self.config.min_width_ratio {
      return false;
    }
    if rect.height > viewport.height * self.config.max_height_ratio {
      return false;
    }
    let gap = match edge {
      Edge::Top => rect.y.abs(),
      Edge::Bottom => (viewport.height - rect.bottom()).abs(),
    };
    gap <= self.config.edge_tolerance
  }
}

fn mask_element(layout: &mut dyn LayoutQuery, element: ElementId) -> StyleSnapshot {
  let snapshot = StyleSnapshot {
    element,
    visibility: layout.inline_style(element, StyleProperty::Visibility),
    opacity: layout.inline_style(element, StyleProperty::Opacity),
    pointer_events: layout.inline_style(element, StyleProperty::PointerEvents),
  };
  for property in [
    StyleProperty::Visibility,
    StyleProperty::Opacity,
    StyleProperty::PointerEvents,
  ] {
    layout.set_inline_style(element, property, Some(property.masked_value()));
  }
  snapshot
}
