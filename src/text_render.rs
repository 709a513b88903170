//! Font loading and text rasterization
//!
//! Overlay labels and placeholder captions are short runs of UI text, so the
//! renderer maps chars to glyphs by codepoint and advances horizontally; no
//! bidi or complex shaping. Glyph outlines come from `ttf-parser` in font
//! design units (y-up) and are converted to tiny-skia paths once per glyph,
//! then reused through a small cache.
//!
//! A missing system font never fails the pipeline: [`FontStore::painter`]
//! returns `None` and callers skip their text, keeping the placeholder
//! contract ("never fails") intact.

use crate::color::Rgba;
use crate::text_layout::TextMeasurer;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Transform};
use ttf_parser::GlyphId;

/// Owned font binary plus the face index inside it
#[derive(Debug, Clone)]
struct FaceData {
  data: Arc<Vec<u8>>,
  index: u32,
}

/// Source of the single UI face used for overlay and placeholder text
#[derive(Debug, Clone, Default)]
pub struct FontStore {
  face: Option<FaceData>,
}

impl FontStore {
  /// Loads the system sans-serif face.
  ///
  /// Scans the platform font directories through fontdb and keeps the bytes
  /// of the best sans-serif match. Returns an empty store when the system
  /// has no usable face.
  pub fn system() -> Self {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    let query = fontdb::Query {
      families: &[fontdb::Family::SansSerif],
      weight: fontdb::Weight::NORMAL,
      stretch: fontdb::Stretch::Normal,
      style: fontdb::Style::Normal,
    };

    let face = db.query(&query).and_then(|id| {
      db.with_face_data(id, |data, index| FaceData {
        data: Arc::new(data.to_vec()),
        index,
      })
    });

    Self { face }
  }

  /// Uses the given font binary instead of a system face.
  ///
  /// Returns an empty store when the bytes are not a parseable face.
  pub fn from_font_data(data: Vec<u8>) -> Self {
    let face = ttf_parser::Face::parse(&data, 0).is_ok().then(|| FaceData {
      data: Arc::new(data),
      index: 0,
    });
    Self { face }
  }

  /// A store with no face; painters are unavailable and text is skipped.
  pub fn empty() -> Self {
    Self { face: None }
  }

  pub fn has_face(&self) -> bool {
    self.face.is_some()
  }

  /// Creates a painter at the given pixel size, or `None` without a face.
  pub fn painter(&self, size: f32) -> Option<TextPainter<'_>> {
    let face_data = self.face.as_ref()?;
    let face = ttf_parser::Face::parse(&face_data.data, face_data.index).ok()?;
    Some(TextPainter::new(face, size))
  }
}

/// Measures and rasterizes single lines of text at one fixed size
pub struct TextPainter<'a> {
  face: ttf_parser::Face<'a>,
  size: f32,
  scale: f32,
  glyph_cache: FxHashMap<u16, Option<Path>>,
}

impl<'a> TextPainter<'a> {
  fn new(face: ttf_parser::Face<'a>, size: f32) -> Self {
    let units_per_em = face.units_per_em().max(1);
    Self {
      face,
      size,
      scale: size / units_per_em as f32,
      glyph_cache: FxHashMap::default(),
    }
  }

  pub fn size(&self) -> f32 {
    self.size
  }

  /// Distance from the baseline up to the top of the tallest glyphs.
  pub fn ascent(&self) -> f32 {
    self.face.ascender() as f32 * self.scale
  }

  /// Distance from the baseline down to the lowest descenders (positive).
  pub fn descent(&self) -> f32 {
    -(self.face.descender() as f32) * self.scale
  }

  /// Recommended baseline-to-baseline distance.
  pub fn line_height(&self) -> f32 {
    let gap = self.face.line_gap() as f32 * self.scale;
    self.ascent() + self.descent() + gap
  }

  /// Advance width of a whole line.
  pub fn line_width(&self, text: &str) -> f32 {
    text.chars().map(|ch| self.advance_of(ch)).sum()
  }

  fn advance_of(&self, ch: char) -> f32 {
    match self.face.glyph_index(ch) {
      Some(glyph) => self
        .face
        .glyph_hor_advance(glyph)
        .map(|advance| advance as f32 * self.scale)
        .unwrap_or(0.0),
      // No glyph: reserve half an em so layout stays stable.
      None => self.size * 0.5,
    }
  }

  /// Draws one line with its left edge at `x` and its baseline at `y`.
  pub fn draw_line(&mut self, pixmap: &mut Pixmap, text: &str, x: f32, y: f32, color: Rgba) {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;

    let mut pen_x = x;
    for ch in text.chars() {
      let Some(glyph) = self.face.glyph_index(ch) else {
        pen_x += self.size * 0.5;
        continue;
      };

      if let Some(path) = self.glyph_path(glyph) {
        // Outlines are y-up design units; flip and scale to pixels.
        let transform = Transform::from_scale(self.scale, -self.scale).post_translate(pen_x, y);
        pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
      }

      pen_x += self
        .face
        .glyph_hor_advance(glyph)
        .map(|advance| advance as f32 * self.scale)
        .unwrap_or(0.0);
    }
  }

  fn glyph_path(&mut self, glyph: GlyphId) -> Option<Path> {
    if let Some(cached) = self.glyph_cache.get(&glyph.0) {
      return cached.clone();
    }
    let built = build_glyph_path(&self.face, glyph);
    self.glyph_cache.insert(glyph.0, built.clone());
    built
  }
}

impl TextMeasurer for TextPainter<'_> {
  fn width_of(&self, text: &str) -> f32 {
    self.line_width(text)
  }
}

/// Converts ttf-parser outline callbacks into a tiny-skia path.
struct OutlinePathBuilder {
  builder: PathBuilder,
}

impl ttf_parser::OutlineBuilder for OutlinePathBuilder {
  fn move_to(&mut self, x: f32, y: f32) {
    self.builder.move_to(x, y);
  }

  fn line_to(&mut self, x: f32, y: f32) {
    self.builder.line_to(x, y);
  }

  fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
    self.builder.quad_to(x1, y1, x, y);
  }

  fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
    self.builder.cubic_to(x1, y1, x2, y2, x, y);
  }

  fn close(&mut self) {
    self.builder.close();
  }
}

fn build_glyph_path(face: &ttf_parser::Face<'_>, glyph: GlyphId) -> Option<Path> {
  let mut outline = OutlinePathBuilder {
    builder: PathBuilder::new(),
  };
  face.outline_glyph(glyph, &mut outline)?;
  outline.builder.finish()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_store_has_no_painter() {
    let store = FontStore::empty();
    assert!(!store.has_face());
    assert!(store.painter(14.0).is_none());
  }

  #[test]
  fn invalid_font_data_yields_empty_store() {
    let store = FontStore::from_font_data(vec![0, 1, 2, 3]);
    assert!(!store.has_face());
  }

  #[test]
  fn system_store_measures_monotonically_when_present() {
    let store = FontStore::system();
    let Some(painter) = store.painter(16.0) else {
      // Headless environments without fonts still pass; drawing is skipped
      // there at runtime too.
      return;
    };
    let short = painter.line_width("hi");
    let long = painter.line_width("hi there");
    assert!(long > short);
    assert!(painter.ascent() > 0.0);
    assert!(painter.line_height() >= painter.ascent());
  }

  #[test]
  fn drawing_marks_pixels_when_a_face_exists() {
    let store = FontStore::system();
    let Some(mut painter) = store.painter(24.0) else {
      return;
    };
    let mut pixmap = Pixmap::new(120, 40).unwrap();
    pixmap.fill(Rgba::WHITE.to_skia());
    painter.draw_line(&mut pixmap, "Ag", 4.0, 30.0, Rgba::BLACK);
    let touched = pixmap
      .pixels()
      .iter()
      .any(|p| p.demultiply().red() < 250);
    assert!(touched, "expected glyph coverage on the canvas");
  }
}
