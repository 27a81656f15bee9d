//! Paint setup
//!
//! Translates a [`Paint`] into what a draw call needs: an optional paint
//! transform mapping user-space positions into gradient/pattern space, an
//! optional unit-1 texture (gradient LUT or pattern image), and shader
//! constants. Gradient LUTs are one-row lookup textures cached by stop-list
//! hash; pattern textures are cached by source-image identity.

use std::num::NonZeroUsize;
use std::sync::Arc;

use glint_core::{Affine2D, Color, Gradient, ImagePattern, Paint, Point, RectBounds};
use lru::LruCache;
use tracing::trace;

use crate::device::{Device, GpuError, PixelFormat, TextureId};

/// Gradients with more stops than this cannot ride the LUT shaders and
/// fall back to software paint evaluation
pub const MULTI_MAX_FRACTIONS: usize = 12;

/// Texels in a gradient lookup texture
const LUT_SIZE: u32 = 256;

const LUT_CACHE_CAP: usize = 64;
const PATTERN_CACHE_CAP: usize = 32;

/// Number of shader constants mirrored per draw state
pub const NUM_CONSTANTS: usize = 12;

/// Constant indices fed by paint setup (the lower slots belong to the
/// analytic mask shaders)
pub const CONST_RADIAL_FOCUS: usize = 8;
pub const CONST_RADIAL_DENOM: usize = 9;

/// Everything a draw call needs to sample a paint
pub struct PaintConfig {
    /// Maps user-space vertex positions into paint space for `tex1`;
    /// `None` for solid colors (no unit-1 coordinates needed)
    pub paint_tx: Option<Affine2D>,
    /// Unit-1 texture (gradient LUT or pattern image)
    pub texture: Option<TextureId>,
    pub consts: [f32; NUM_CONSTANTS],
}

impl PaintConfig {
    fn solid() -> Self {
        Self {
            paint_tx: None,
            texture: None,
            consts: [0.0; NUM_CONSTANTS],
        }
    }
}

/// Caches for paint-derived textures, owned by the shader context
pub struct PaintHelper {
    luts: LruCache<u64, TextureId>,
    patterns: LruCache<usize, TextureId>,
}

impl PaintHelper {
    pub fn new() -> Self {
        Self {
            luts: LruCache::new(NonZeroUsize::new(LUT_CACHE_CAP).unwrap()),
            patterns: LruCache::new(NonZeroUsize::new(PATTERN_CACHE_CAP).unwrap()),
        }
    }

    /// True when the gradient has too many stops for the LUT shaders
    pub fn is_complex(paint: &Paint) -> bool {
        paint
            .gradient()
            .map(|g| g.num_stops() > MULTI_MAX_FRACTIONS)
            .unwrap_or(false)
    }

    /// Resolve a paint into its draw-call configuration
    pub fn configure<D: Device>(
        &mut self,
        device: &mut D,
        paint: &Paint,
        bounds: &RectBounds,
    ) -> Result<PaintConfig, GpuError> {
        match paint {
            Paint::Color(_) => Ok(PaintConfig::solid()),
            Paint::LinearGradient {
                start,
                end,
                gradient,
            } => {
                let p0 = resolve_point(*start, gradient.proportional, bounds);
                let p1 = resolve_point(*end, gradient.proportional, bounds);
                let tex = self.lut_texture(device, gradient)?;
                Ok(PaintConfig {
                    paint_tx: Some(linear_transform(p0, p1)),
                    texture: Some(tex),
                    consts: [0.0; NUM_CONSTANTS],
                })
            }
            Paint::RadialGradient {
                center,
                focus_angle,
                focus_distance,
                radius,
                gradient,
            } => {
                let c = resolve_point(*center, gradient.proportional, bounds);
                let r = if gradient.proportional {
                    radius * bounds.width().max(bounds.height()).max(1e-6) * 0.5
                } else {
                    *radius
                };
                let tex = self.lut_texture(device, gradient)?;
                let fx = focus_distance.clamp(-0.99, 0.99);
                let mut consts = [0.0; NUM_CONSTANTS];
                consts[CONST_RADIAL_FOCUS] = fx;
                consts[CONST_RADIAL_DENOM] = 1.0 - fx.abs() * fx.abs();
                Ok(PaintConfig {
                    paint_tx: Some(radial_transform(c, r, *focus_angle)),
                    texture: Some(tex),
                    consts,
                })
            }
            Paint::ImagePattern(pattern) => {
                let tex = self.pattern_texture(device, pattern)?;
                Ok(PaintConfig {
                    paint_tx: Some(pattern_transform(pattern, bounds)),
                    texture: Some(tex),
                    consts: [0.0; NUM_CONSTANTS],
                })
            }
        }
    }

    /// LUT texture for a gradient, creating and caching it on first use.
    /// LUT textures stay locked for the lifetime of the cache slot.
    fn lut_texture<D: Device>(
        &mut self,
        device: &mut D,
        gradient: &Gradient,
    ) -> Result<TextureId, GpuError> {
        let key = gradient.content_hash();
        if let Some(&tex) = self.luts.get(&key) {
            return Ok(tex);
        }
        let mut data = Vec::with_capacity(LUT_SIZE as usize * 4);
        for i in 0..LUT_SIZE {
            let t = i as f32 / (LUT_SIZE - 1) as f32;
            let c = gradient.color_at(t);
            let pm = Color::new(c.r * c.a, c.g * c.a, c.b * c.a, c.a);
            data.extend_from_slice(&pm.to_rgba8());
        }
        let tex = device.create_texture(PixelFormat::Rgba8, LUT_SIZE, 1)?;
        device.upload_texture(
            tex,
            glint_core::Rectangle::new(0, 0, LUT_SIZE as i32, 1),
            &data,
        )?;
        device.lock_texture(tex);
        trace!(key, "created gradient LUT texture");
        if let Some((_, old)) = self.luts.push(key, tex) {
            if old != tex {
                device.unlock_texture(old);
                device.dispose_texture(old);
            }
        }
        Ok(tex)
    }

    fn pattern_texture<D: Device>(
        &mut self,
        device: &mut D,
        pattern: &ImagePattern,
    ) -> Result<TextureId, GpuError> {
        let key = Arc::as_ptr(&pattern.image) as usize;
        if let Some(&tex) = self.patterns.get(&key) {
            return Ok(tex);
        }
        let img = &pattern.image;
        let tex = device.create_texture(PixelFormat::Rgba8, img.width, img.height)?;
        device.upload_texture(
            tex,
            glint_core::Rectangle::new(0, 0, img.width as i32, img.height as i32),
            &img.pixels,
        )?;
        device.lock_texture(tex);
        if let Some((_, old)) = self.patterns.push(key, tex) {
            if old != tex {
                device.unlock_texture(old);
                device.dispose_texture(old);
            }
        }
        Ok(tex)
    }

    /// Software paint evaluation for gradients the LUT shaders cannot
    /// express. Returns the non-premultiplied color at a user-space point.
    pub fn evaluate(paint: &Paint, x: f32, y: f32, bounds: &RectBounds) -> Color {
        match paint {
            Paint::Color(c) => *c,
            Paint::LinearGradient {
                start,
                end,
                gradient,
            } => {
                let p0 = resolve_point(*start, gradient.proportional, bounds);
                let p1 = resolve_point(*end, gradient.proportional, bounds);
                let t = linear_transform(p0, p1)
                    .transform_point(Point::new(x, y))
                    .x;
                gradient.color_at(t)
            }
            Paint::RadialGradient {
                center,
                focus_angle,
                focus_distance,
                radius,
                gradient,
            } => {
                let c = resolve_point(*center, gradient.proportional, bounds);
                let r = if gradient.proportional {
                    radius * bounds.width().max(bounds.height()).max(1e-6) * 0.5
                } else {
                    *radius
                };
                let p = radial_transform(c, r, *focus_angle).transform_point(Point::new(x, y));
                let fx = focus_distance.clamp(-0.99, 0.99);
                let denom = (1.0 - fx * fx).max(1e-4);
                let t = ((p.x - fx).hypot(p.y)) / denom;
                gradient.color_at(t)
            }
            Paint::ImagePattern(pattern) => {
                let p = pattern_transform(pattern, bounds).transform_point(Point::new(x, y));
                let img = &pattern.image;
                let px = ((p.x.rem_euclid(1.0)) * img.width as f32) as u32 % img.width.max(1);
                let py = ((p.y.rem_euclid(1.0)) * img.height as f32) as u32 % img.height.max(1);
                let i = ((py * img.width + px) * 4) as usize;
                Color::from_rgba8(
                    img.pixels[i],
                    img.pixels[i + 1],
                    img.pixels[i + 2],
                    img.pixels[i + 3],
                )
            }
        }
    }

    /// Release all cached textures (context disposal)
    pub fn clear<D: Device>(&mut self, device: &mut D) {
        for (_, tex) in self.luts.iter() {
            device.unlock_texture(*tex);
            device.dispose_texture(*tex);
        }
        for (_, tex) in self.patterns.iter() {
            device.unlock_texture(*tex);
            device.dispose_texture(*tex);
        }
        self.luts.clear();
        self.patterns.clear();
    }
}

impl Default for PaintHelper {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_point(p: Point, proportional: bool, bounds: &RectBounds) -> Point {
    if proportional {
        Point::new(
            bounds.min_x + p.x * bounds.width(),
            bounds.min_y + p.y * bounds.height(),
        )
    } else {
        p
    }
}

/// Transform mapping a user-space point to its fraction `t` along the
/// gradient axis (in the x output; y is unused)
fn linear_transform(p0: Point, p1: Point) -> Affine2D {
    let dx = p1.x - p0.x;
    let dy = p1.y - p0.y;
    let len2 = dx * dx + dy * dy;
    if len2 <= 0.0 || !len2.is_finite() {
        return Affine2D::ZERO_SCALE;
    }
    let a = dx / len2;
    let c = dy / len2;
    Affine2D::new(a, 0.0, c, 0.0, -(p0.x * a + p0.y * c), 0.0)
}

/// Transform mapping a user-space point into unit-circle space: the
/// gradient circle becomes the unit circle with the focus on the +x axis
fn radial_transform(center: Point, radius: f32, focus_angle_rad: f32) -> Affine2D {
    if radius <= 0.0 || !radius.is_finite() {
        return Affine2D::ZERO_SCALE;
    }
    let rot = Affine2D::rotation(-focus_angle_rad);
    let scale = Affine2D::scale(1.0 / radius, 1.0 / radius);
    let trans = Affine2D::translation(-center.x, -center.y);
    rot.concat(&scale.concat(&trans))
}

/// Transform mapping a user-space point to pattern-cell coordinates
fn pattern_transform(pattern: &ImagePattern, bounds: &RectBounds) -> Affine2D {
    let (x, y, w, h) = if pattern.proportional {
        (
            bounds.min_x + pattern.x * bounds.width(),
            bounds.min_y + pattern.y * bounds.height(),
            pattern.width * bounds.width(),
            pattern.height * bounds.height(),
        )
    } else {
        (pattern.x, pattern.y, pattern.width, pattern.height)
    };
    if w <= 0.0 || h <= 0.0 {
        return Affine2D::ZERO_SCALE;
    }
    Affine2D::scale(1.0 / w, 1.0 / h).concat(&Affine2D::translation(-x, -y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_core::{GradientStop, SpreadMethod};

    fn stops(n: usize) -> Vec<GradientStop> {
        (0..n)
            .map(|i| GradientStop {
                offset: i as f32 / (n - 1) as f32,
                color: Color::BLACK,
            })
            .collect()
    }

    #[test]
    fn test_complex_threshold() {
        let simple = Paint::LinearGradient {
            start: Point::ZERO,
            end: Point::new(1.0, 0.0),
            gradient: Gradient::new(stops(MULTI_MAX_FRACTIONS), SpreadMethod::Pad, false),
        };
        let complex = Paint::LinearGradient {
            start: Point::ZERO,
            end: Point::new(1.0, 0.0),
            gradient: Gradient::new(stops(MULTI_MAX_FRACTIONS + 1), SpreadMethod::Pad, false),
        };
        assert!(!PaintHelper::is_complex(&simple));
        assert!(PaintHelper::is_complex(&complex));
    }

    #[test]
    fn test_linear_transform_endpoints() {
        let tx = linear_transform(Point::new(10.0, 0.0), Point::new(20.0, 0.0));
        assert!((tx.transform_point(Point::new(10.0, 0.0)).x - 0.0).abs() < 1e-6);
        assert!((tx.transform_point(Point::new(20.0, 0.0)).x - 1.0).abs() < 1e-6);
        assert!((tx.transform_point(Point::new(15.0, 33.0)).x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_linear_collapses() {
        let tx = linear_transform(Point::new(5.0, 5.0), Point::new(5.0, 5.0));
        assert_eq!(tx, Affine2D::ZERO_SCALE);
    }

    #[test]
    fn test_radial_transform_maps_circle_edge() {
        let tx = radial_transform(Point::new(50.0, 50.0), 10.0, 0.0);
        let p = tx.transform_point(Point::new(60.0, 50.0));
        assert!((p.x - 1.0).abs() < 1e-5);
        assert!(p.y.abs() < 1e-5);
    }

    #[test]
    fn test_proportional_resolution() {
        let b = RectBounds::from_rect(100.0, 200.0, 50.0, 10.0);
        let p = resolve_point(Point::new(0.5, 1.0), true, &b);
        assert_eq!(p, Point::new(125.0, 210.0));
    }
}
