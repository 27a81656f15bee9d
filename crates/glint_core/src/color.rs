//! Color types and utilities

/// RGBA color with f32 components (0.0 to 1.0), non-premultiplied
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Color = Color::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Color = Color::new(0.0, 0.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Create from u8 components (0-255)
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }

    /// Multiply alpha and return new color
    pub fn with_extra_alpha(self, extra: f32) -> Self {
        Self {
            a: self.a * extra,
            ..self
        }
    }

    /// Apply `pow(component, e)` to the color channels and alpha.
    ///
    /// LCD text composites in a gamma-adjusted space; the text color is
    /// pre-adjusted on the CPU before being handed to the shader.
    pub fn powed(self, e: f32) -> Self {
        Self {
            r: self.r.powf(e),
            g: self.g.powf(e),
            b: self.b.powf(e),
            a: self.a.powf(e),
        }
    }

    /// Premultiplied [r, g, b, a] suitable for vertex colors
    pub fn to_premultiplied(&self) -> [f32; 4] {
        [self.r * self.a, self.g * self.a, self.b * self.a, self.a]
    }

    /// Convert to u8 array [r, g, b, a]
    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            (self.g.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            (self.b.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            (self.a.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        ]
    }

    /// Component-wise linear interpolation
    pub fn lerp(a: Color, b: Color, t: f32) -> Color {
        Color::new(
            a.r + (b.r - a.r) * t,
            a.g + (b.g - a.g) * t,
            a.b + (b.b - a.b) * t,
            a.a + (b.a - a.a) * t,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_premultiplied() {
        let c = Color::new(1.0, 0.5, 0.0, 0.5);
        assert_eq!(c.to_premultiplied(), [0.5, 0.25, 0.0, 0.5]);
    }

    #[test]
    fn test_lerp_endpoints() {
        assert_eq!(Color::lerp(Color::RED, Color::BLUE, 0.0), Color::RED);
        assert_eq!(Color::lerp(Color::RED, Color::BLUE, 1.0), Color::BLUE);
    }
}
