//! 2D affine transforms
//!
//! The element layout matches the conventional column-vector form:
//!
//! ```text
//! | a  c  tx |   | x |
//! | b  d  ty | * | y |
//! | 0  0   1 |   | 1 |
//! ```
//!
//! stored as `elements = [a, b, c, d, tx, ty]`.

use crate::geometry::{Point, RectBounds};

/// A 2D affine transform
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Affine2D {
    pub elements: [f32; 6],
}

impl Default for Affine2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2D {
    pub const IDENTITY: Affine2D = Affine2D {
        elements: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };

    pub const fn new(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self {
            elements: [a, b, c, d, tx, ty],
        }
    }

    pub const fn translation(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn rotation(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    /// A transform that collapses everything to the origin.
    ///
    /// Substituted for the inverse of a non-invertible transform so that a
    /// failed inversion produces an empty render instead of an error.
    pub const ZERO_SCALE: Affine2D = Affine2D {
        elements: [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    };

    #[inline]
    pub fn a(&self) -> f32 {
        self.elements[0]
    }
    #[inline]
    pub fn b(&self) -> f32 {
        self.elements[1]
    }
    #[inline]
    pub fn c(&self) -> f32 {
        self.elements[2]
    }
    #[inline]
    pub fn d(&self) -> f32 {
        self.elements[3]
    }
    #[inline]
    pub fn tx(&self) -> f32 {
        self.elements[4]
    }
    #[inline]
    pub fn ty(&self) -> f32 {
        self.elements[5]
    }

    pub fn is_identity(&self) -> bool {
        self.elements == Self::IDENTITY.elements
    }

    /// True when the transform only translates (or is the identity)
    pub fn is_translate_or_identity(&self) -> bool {
        let [a, b, c, d, ..] = self.elements;
        a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0
    }

    /// `self * other` (apply `other` first, then `self`)
    pub fn concat(&self, other: &Affine2D) -> Affine2D {
        let [a1, b1, c1, d1, tx1, ty1] = self.elements;
        let [a2, b2, c2, d2, tx2, ty2] = other.elements;
        Affine2D::new(
            a1 * a2 + c1 * b2,
            b1 * a2 + d1 * b2,
            a1 * c2 + c1 * d2,
            b1 * c2 + d1 * d2,
            a1 * tx2 + c1 * ty2 + tx1,
            b1 * tx2 + d1 * ty2 + ty1,
        )
    }

    pub fn determinant(&self) -> f32 {
        let [a, b, c, d, ..] = self.elements;
        a * d - b * c
    }

    /// Inverse transform, or `None` when the matrix is singular
    pub fn invert(&self) -> Option<Affine2D> {
        let [a, b, c, d, tx, ty] = self.elements;
        let det = a * d - b * c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine2D::new(
            d * inv,
            -b * inv,
            -c * inv,
            a * inv,
            (c * ty - d * tx) * inv,
            (b * tx - a * ty) * inv,
        ))
    }

    pub fn transform_point(&self, p: Point) -> Point {
        let [a, b, c, d, tx, ty] = self.elements;
        Point::new(a * p.x + c * p.y + tx, b * p.x + d * p.y + ty)
    }

    /// Transform a direction vector (ignores translation)
    pub fn delta_transform(&self, dx: f32, dy: f32) -> (f32, f32) {
        let [a, b, c, d, ..] = self.elements;
        (a * dx + c * dy, b * dx + d * dy)
    }

    /// Axis-aligned bounds of the transformed bounds
    pub fn transform_bounds(&self, bounds: &RectBounds) -> RectBounds {
        if bounds.is_empty() {
            return RectBounds::EMPTY;
        }
        let corners = [
            self.transform_point(Point::new(bounds.min_x, bounds.min_y)),
            self.transform_point(Point::new(bounds.max_x, bounds.min_y)),
            self.transform_point(Point::new(bounds.min_x, bounds.max_y)),
            self.transform_point(Point::new(bounds.max_x, bounds.max_y)),
        ];
        let mut out = RectBounds::EMPTY;
        for p in corners {
            out.add_point(p.x, p.y);
        }
        out
    }

    /// Equality of the linear part only.
    ///
    /// Mask textures are position-independent: two transforms that differ
    /// only in translation rasterize a shape to identical coverage, so the
    /// mask cache keys on this comparison.
    pub fn equals_ignore_translation(&self, other: &Affine2D) -> bool {
        self.elements[..4] == other.elements[..4]
    }

    /// Translation delta `self - other`
    pub fn translation_delta(&self, other: &Affine2D) -> (f32, f32) {
        (self.tx() - other.tx(), self.ty() - other.ty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_translation_then_scale() {
        let t = Affine2D::scale(2.0, 2.0).concat(&Affine2D::translation(3.0, 4.0));
        let p = t.transform_point(Point::new(1.0, 1.0));
        assert_eq!(p, Point::new(8.0, 10.0));
    }

    #[test]
    fn test_invert_round_trips() {
        let t = Affine2D::rotation(0.7).concat(&Affine2D::translation(5.0, -2.0));
        let inv = t.invert().unwrap();
        let p = inv.transform_point(t.transform_point(Point::new(3.0, 9.0)));
        assert!((p.x - 3.0).abs() < 1e-4);
        assert!((p.y - 9.0).abs() < 1e-4);
    }

    #[test]
    fn test_invert_singular_is_none() {
        assert!(Affine2D::scale(0.0, 1.0).invert().is_none());
        assert!(Affine2D::ZERO_SCALE.invert().is_none());
    }

    #[test]
    fn test_equals_ignore_translation() {
        let a = Affine2D::rotation(0.3).concat(&Affine2D::translation(1.0, 2.0));
        let b = Affine2D::rotation(0.3).concat(&Affine2D::translation(-7.0, 9.0));
        assert!(a.equals_ignore_translation(&b));
        assert!(!a.equals_ignore_translation(&Affine2D::rotation(0.31)));
    }

    #[test]
    fn test_transform_bounds_rotation() {
        let b = RectBounds::from_rect(0.0, 0.0, 10.0, 0.0);
        let t = Affine2D::rotation(std::f32::consts::FRAC_PI_2);
        let tb = t.transform_bounds(&b);
        assert!((tb.height() - 10.0).abs() < 1e-4);
    }
}
