//! Paint types
//!
//! A `Paint` describes how covered pixels are colored: a solid color, a
//! linear or radial gradient, or a tiled image pattern. Gradients carry
//! shared stop lists (`Arc<[GradientStop]>`) so that paints stay cheap to
//! clone per draw call.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::color::Color;
use crate::geometry::Point;

/// How gradient coordinates outside [0, 1] are mapped back into range
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpreadMethod {
    #[default]
    Pad,
    Reflect,
    Repeat,
}

impl SpreadMethod {
    /// Packed paint-option code used in shader-slot keys and name suffixes
    pub fn option_code(&self) -> u32 {
        match self {
            SpreadMethod::Pad => 0,
            SpreadMethod::Reflect => 1,
            SpreadMethod::Repeat => 2,
        }
    }

    pub fn name_suffix(&self) -> &'static str {
        match self {
            SpreadMethod::Pad => "_PAD",
            SpreadMethod::Reflect => "_REFLECT",
            SpreadMethod::Repeat => "_REPEAT",
        }
    }
}

/// A gradient stop
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientStop {
    /// Offset along the gradient axis, 0.0 to 1.0
    pub offset: f32,
    pub color: Color,
}

/// Shared gradient description (geometry differs per paint variant)
#[derive(Clone, Debug, PartialEq)]
pub struct Gradient {
    pub stops: Arc<[GradientStop]>,
    pub spread: SpreadMethod,
    /// When set, geometry coordinates are fractions of the shape bounding
    /// box instead of absolute user-space coordinates.
    pub proportional: bool,
}

impl Gradient {
    pub fn new(stops: Vec<GradientStop>, spread: SpreadMethod, proportional: bool) -> Self {
        Self {
            stops: stops.into(),
            spread,
            proportional,
        }
    }

    pub fn num_stops(&self) -> usize {
        self.stops.len()
    }

    /// Stable hash of the stop list and spread method, for LUT-texture
    /// cache keys. Offsets and channels hash by bit pattern.
    pub fn content_hash(&self) -> u64 {
        let mut h = std::collections::hash_map::DefaultHasher::new();
        for stop in self.stops.iter() {
            stop.offset.to_bits().hash(&mut h);
            stop.color.r.to_bits().hash(&mut h);
            stop.color.g.to_bits().hash(&mut h);
            stop.color.b.to_bits().hash(&mut h);
            stop.color.a.to_bits().hash(&mut h);
        }
        self.spread.hash(&mut h);
        h.finish()
    }

    /// Evaluate the gradient color at a (spread-adjusted) fraction
    pub fn color_at(&self, t: f32) -> Color {
        let t = match self.spread {
            SpreadMethod::Pad => t.clamp(0.0, 1.0),
            SpreadMethod::Repeat => t.rem_euclid(1.0),
            SpreadMethod::Reflect => {
                let t = t.rem_euclid(2.0);
                if t > 1.0 {
                    2.0 - t
                } else {
                    t
                }
            }
        };
        let stops = &self.stops;
        if stops.is_empty() {
            return Color::TRANSPARENT;
        }
        if t <= stops[0].offset {
            return stops[0].color;
        }
        for w in stops.windows(2) {
            if t <= w[1].offset {
                let span = w[1].offset - w[0].offset;
                let f = if span > 0.0 { (t - w[0].offset) / span } else { 1.0 };
                return Color::lerp(w[0].color, w[1].color, f);
            }
        }
        stops[stops.len() - 1].color
    }
}

/// Source pixels for an image pattern (RGBA8, row-major)
#[derive(Debug)]
pub struct PatternImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

/// A tiled image pattern paint
#[derive(Clone, Debug)]
pub struct ImagePattern {
    pub image: Arc<PatternImage>,
    /// Pattern cell origin and size (user space, or fractions when
    /// proportional)
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub proportional: bool,
}

impl PartialEq for ImagePattern {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
            && self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.proportional == other.proportional
    }
}

/// Paint type discriminant with the packed codes used for shader keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PaintType {
    Color,
    LinearGradient,
    RadialGradient,
    ImagePattern,
}

impl PaintType {
    /// Packed code, `paint_type << 2` is folded into the shader-slot index
    pub fn code(&self) -> u32 {
        match self {
            PaintType::Color => 0,
            PaintType::LinearGradient => 1,
            PaintType::RadialGradient => 2,
            PaintType::ImagePattern => 3,
        }
    }

    /// Shader-name fragment for this paint type
    pub fn name(&self) -> &'static str {
        match self {
            PaintType::Color => "Color",
            PaintType::LinearGradient => "LinearGradient",
            PaintType::RadialGradient => "RadialGradient",
            PaintType::ImagePattern => "ImagePattern",
        }
    }

    pub fn is_gradient(&self) -> bool {
        matches!(self, PaintType::LinearGradient | PaintType::RadialGradient)
    }

    pub fn is_image_pattern(&self) -> bool {
        matches!(self, PaintType::ImagePattern)
    }
}

/// How covered pixels are colored
#[derive(Clone, Debug, PartialEq)]
pub enum Paint {
    Color(Color),
    LinearGradient {
        start: Point,
        end: Point,
        gradient: Gradient,
    },
    RadialGradient {
        center: Point,
        /// Focus offset from the center, as a fraction of the radius
        focus_angle: f32,
        focus_distance: f32,
        radius: f32,
        gradient: Gradient,
    },
    ImagePattern(ImagePattern),
}

impl Paint {
    pub fn paint_type(&self) -> PaintType {
        match self {
            Paint::Color(_) => PaintType::Color,
            Paint::LinearGradient { .. } => PaintType::LinearGradient,
            Paint::RadialGradient { .. } => PaintType::RadialGradient,
            Paint::ImagePattern(_) => PaintType::ImagePattern,
        }
    }

    /// Packed paint-option code (spread method for gradients, 0 otherwise)
    pub fn option_code(&self) -> u32 {
        match self.gradient() {
            Some(g) => g.spread.option_code(),
            None => 0,
        }
    }

    pub fn gradient(&self) -> Option<&Gradient> {
        match self {
            Paint::LinearGradient { gradient, .. } => Some(gradient),
            Paint::RadialGradient { gradient, .. } => Some(gradient),
            _ => None,
        }
    }

    /// True when sampling this paint requires a bound texture
    /// (gradient LUT or pattern image)
    pub fn uses_texture(&self) -> bool {
        !matches!(self, Paint::Color(_))
    }

    /// True when paint coordinates are fractions of the shape bounds
    pub fn is_proportional(&self) -> bool {
        match self {
            Paint::Color(_) => false,
            Paint::LinearGradient { gradient, .. } => gradient.proportional,
            Paint::RadialGradient { gradient, .. } => gradient.proportional,
            Paint::ImagePattern(p) => p.proportional,
        }
    }

    pub fn is_opaque(&self) -> bool {
        match self {
            Paint::Color(c) => c.is_opaque(),
            Paint::LinearGradient { gradient, .. } | Paint::RadialGradient { gradient, .. } => {
                gradient.stops.iter().all(|s| s.color.is_opaque())
            }
            Paint::ImagePattern(_) => false,
        }
    }
}

impl From<Color> for Paint {
    fn from(c: Color) -> Self {
        Paint::Color(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_stop(spread: SpreadMethod) -> Gradient {
        Gradient::new(
            vec![
                GradientStop {
                    offset: 0.0,
                    color: Color::BLACK,
                },
                GradientStop {
                    offset: 1.0,
                    color: Color::WHITE,
                },
            ],
            spread,
            false,
        )
    }

    #[test]
    fn test_color_at_midpoint() {
        let g = two_stop(SpreadMethod::Pad);
        let c = g.color_at(0.5);
        assert!((c.r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_spread_reflect_wraps_back() {
        let g = two_stop(SpreadMethod::Reflect);
        let c = g.color_at(1.25);
        assert!((c.r - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_content_hash_distinguishes_spread() {
        let a = two_stop(SpreadMethod::Pad);
        let b = two_stop(SpreadMethod::Repeat);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_option_code_packing() {
        let p = Paint::LinearGradient {
            start: Point::ZERO,
            end: Point::new(1.0, 0.0),
            gradient: two_stop(SpreadMethod::Repeat),
        };
        assert_eq!(p.paint_type().code(), 1);
        assert_eq!(p.option_code(), 2);
    }
}
