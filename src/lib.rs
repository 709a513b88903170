//! Full-page capture and composite export pipeline
//!
//! Turns a live, scrollable page into a single downloadable image: the page
//! is paginated into viewport-height segments, each segment is captured
//! through a rate-limited host primitive, fixed/sticky chrome is hidden at
//! the seams, and the segments are stitched onto one size-clamped canvas
//! with annotation markers composited on top.
//!
//! ```text
//! PageSurface ──▶ SegmentPlan ──▶ scroll + settle ──▶ RateLimitedClient
//!                                       │                    │
//!                                 StickyMasker          ViewportCapture
//!                                       │                    │
//!                                       └──▶ CaptureSegment ◀┘
//!                                                 │
//!                            StitchPlan ──▶ stitch ──▶ overlay ──▶ data URL
//! ```
//!
//! The host browser surface is reached exclusively through traits
//! ([`PageSurface`], [`LayoutQuery`], [`ViewportCapture`], [`Clock`]), so
//! the whole pipeline runs against synthetic pages in tests. Degradation is
//! built in: a failed full-page pass falls back to a single viewport
//! capture, and a failed viewport capture to a diagnostic placeholder; the
//! export always resolves with an image.

pub mod capture;
pub mod clock;
pub mod color;
pub mod error;
pub mod geometry;
pub mod image_output;
pub mod mask;
pub mod orchestrator;
pub mod overlay;
pub mod page;
pub mod placeholder;
pub mod plan;
pub mod stitch;
pub mod text_layout;
pub mod text_render;

pub use capture::{
  CaptureErrorCode, CaptureResponse, RateLimitConfig, RateLimitedClient, ViewportCapture,
};
pub use clock::{Clock, SystemClock};
pub use color::Rgba;
pub use error::{CaptureError, Error, PageError, RenderError, Result};
pub use geometry::{Point, Rect, Size};
pub use image_output::OutputFormat;
pub use mask::{Edge, LayoutQuery, MaskConfig, StickyMasker, StyleSnapshot};
pub use orchestrator::{CaptureMode, CaptureOutcome, ExportConfig, Exporter};
pub use overlay::{AnnotationRecord, OverlayConfig};
pub use page::{PageMetrics, PageSurface};
pub use plan::{SegmentPlan, StitchPlan, MAX_CANVAS_AREA, MAX_CANVAS_DIM};
pub use stitch::CaptureSegment;
pub use text_render::FontStore;

// Re-export the pixel buffer type captures and composites are made of.
pub use tiny_skia::Pixmap;
