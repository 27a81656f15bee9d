//! Glyph caching and text runs
//!
//! Rasterized glyph bitmaps are supplied by the text stack (font loading
//! and hinting live outside this crate) and packed into per-mode atlas
//! textures. The graphics layer draws runs as textured quads out of the
//! atlas, optionally through the combined mask-plus-glyph shader.

use glint_core::Rectangle;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::device::{Device, GpuError, PixelFormat, TextureId};

/// Glyph rasterization mode for a strike
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AaMode {
    Greyscale,
    /// Subpixel coverage, three horizontal samples per pixel
    Lcd,
}

/// A font at a fixed size and mode
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FontStrike {
    pub font_id: u64,
    pub size: f32,
    pub aa_mode: AaMode,
}

impl FontStrike {
    /// The greyscale twin of this strike, for paths that cannot take the
    /// LCD route
    pub fn to_greyscale(self) -> Self {
        Self {
            aa_mode: AaMode::Greyscale,
            ..self
        }
    }
}

/// A positioned glyph within a run (offsets relative to the run origin)
#[derive(Clone, Copy, Debug)]
pub struct PositionedGlyph {
    pub glyph_id: u32,
    pub x: f32,
    pub y: f32,
}

/// A shaped run of glyphs in one strike
#[derive(Clone, Debug)]
pub struct GlyphRun {
    pub strike: FontStrike,
    pub glyphs: Vec<PositionedGlyph>,
}

/// Caller-provided glyph coverage bitmap
///
/// Greyscale data is `width * height` bytes; LCD data is
/// `width * 3 * height` bytes (RGB triples).
#[derive(Clone, Debug)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    /// Offset from the pen position to the bitmap's top-left corner
    pub left: f32,
    pub top: f32,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct GlyphKey {
    font_id: u64,
    glyph_id: u32,
    size_bits: u32,
}

impl GlyphKey {
    fn new(strike: &FontStrike, glyph_id: u32) -> Self {
        Self {
            font_id: strike.font_id,
            glyph_id,
            size_bits: strike.size.to_bits(),
        }
    }
}

/// Placement of a glyph inside the atlas
#[derive(Clone, Copy, Debug)]
pub struct GlyphLoc {
    /// Atlas texel rectangle
    pub region: Rectangle,
    pub left: f32,
    pub top: f32,
}

const ATLAS_SIZE: u32 = 1024;
const SHELF_PAD: u32 = 1;

/// A shelf-packed glyph atlas for one [`AaMode`]
pub struct GlyphCache {
    mode: AaMode,
    tex: Option<TextureId>,
    map: FxHashMap<GlyphKey, Option<GlyphLoc>>,
    next_x: u32,
    next_y: u32,
    row_height: u32,
}

impl GlyphCache {
    pub fn new(mode: AaMode) -> Self {
        Self {
            mode,
            tex: None,
            map: FxHashMap::default(),
            next_x: 0,
            next_y: 0,
            row_height: 0,
        }
    }

    fn format(&self) -> PixelFormat {
        match self.mode {
            AaMode::Greyscale => PixelFormat::Alpha8,
            // LCD triples are expanded to RGBA on upload
            AaMode::Lcd => PixelFormat::Rgba8,
        }
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.tex
    }

    /// Whether `tex` is this cache's atlas (the super-shader predicate)
    pub fn owns_texture(&self, tex: TextureId) -> bool {
        self.tex == Some(tex)
    }

    fn ensure_texture<D: Device>(&mut self, device: &mut D) -> Result<TextureId, GpuError> {
        if let Some(tex) = self.tex {
            return Ok(tex);
        }
        let tex = device.create_texture(self.format(), ATLAS_SIZE, ATLAS_SIZE)?;
        device.lock_texture(tex);
        self.tex = Some(tex);
        Ok(tex)
    }

    fn allocate(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        let w = width + SHELF_PAD;
        let h = height + SHELF_PAD;
        if w > ATLAS_SIZE {
            return None;
        }
        if self.next_x + w > ATLAS_SIZE {
            self.next_x = 0;
            self.next_y += self.row_height;
            self.row_height = 0;
        }
        if self.next_y + h > ATLAS_SIZE {
            return None;
        }
        let pos = (self.next_x, self.next_y);
        self.next_x += w;
        self.row_height = self.row_height.max(h);
        Some(pos)
    }

    /// Register a rasterized glyph bitmap, uploading it into the atlas
    pub fn register<D: Device>(
        &mut self,
        device: &mut D,
        strike: &FontStrike,
        glyph_id: u32,
        bitmap: &GlyphBitmap,
    ) -> Result<(), GpuError> {
        let key = GlyphKey::new(strike, glyph_id);
        if self.map.contains_key(&key) {
            return Ok(());
        }
        let tex = self.ensure_texture(device)?;
        let Some((x, y)) = self.allocate(bitmap.width, bitmap.height) else {
            warn!(
                glyph = glyph_id,
                font = strike.font_id,
                "glyph atlas full, glyph will not render"
            );
            self.map.insert(key, None);
            return Ok(());
        };
        let region = Rectangle::new(x as i32, y as i32, bitmap.width as i32, bitmap.height as i32);
        match self.mode {
            AaMode::Greyscale => device.upload_texture(tex, region, &bitmap.data)?,
            AaMode::Lcd => {
                let mut rgba = Vec::with_capacity(bitmap.data.len() / 3 * 4);
                for px in bitmap.data.chunks_exact(3) {
                    rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
                device.upload_texture(tex, region, &rgba)?;
            }
        }
        self.map.insert(
            key,
            Some(GlyphLoc {
                region,
                left: bitmap.left,
                top: bitmap.top,
            }),
        );
        Ok(())
    }

    /// Look up a registered glyph; unregistered glyphs return `None` and
    /// are skipped by the renderer
    pub fn lookup(&self, strike: &FontStrike, glyph_id: u32) -> Option<GlyphLoc> {
        match self.map.get(&GlyphKey::new(strike, glyph_id)) {
            Some(loc) => *loc,
            None => {
                warn!(
                    glyph = glyph_id,
                    font = strike.font_id,
                    "glyph not registered, skipping"
                );
                None
            }
        }
    }

    /// Forget everything (device loss); the texture is returned for
    /// disposal
    pub fn reset(&mut self) -> Option<TextureId> {
        self.map.clear();
        self.next_x = 0;
        self.next_y = 0;
        self.row_height = 0;
        self.tex.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shelf_allocation_wraps_rows() {
        let mut c = GlyphCache::new(AaMode::Greyscale);
        let (x0, y0) = c.allocate(600, 20).unwrap();
        assert_eq!((x0, y0), (0, 0));
        let (x1, y1) = c.allocate(600, 10).unwrap();
        assert_eq!(x1, 0);
        assert!(y1 > 0);
    }

    #[test]
    fn test_allocation_fails_when_full() {
        let mut c = GlyphCache::new(AaMode::Greyscale);
        assert!(c.allocate(ATLAS_SIZE + 1, 4).is_none());
        // fill vertically
        while c.allocate(ATLAS_SIZE - SHELF_PAD, 100).is_some() {}
        assert!(c.allocate(ATLAS_SIZE - SHELF_PAD, 100).is_none());
    }

    #[test]
    fn test_greyscale_twin() {
        let s = FontStrike {
            font_id: 7,
            size: 13.0,
            aa_mode: AaMode::Lcd,
        };
        assert_eq!(s.to_greyscale().aa_mode, AaMode::Greyscale);
        assert_eq!(s.to_greyscale().size, 13.0);
    }
}
