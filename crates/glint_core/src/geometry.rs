//! Geometric primitives

/// A 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 2D size
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Floating-point axis-aligned bounds (min/max box)
///
/// Used for shape bounds, transformed bounds, and texture coordinate
/// rectangles. An empty bounds has `max < min` on at least one axis.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct RectBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Default for RectBounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl RectBounds {
    /// The canonical empty bounds
    pub const EMPTY: RectBounds = RectBounds {
        min_x: 0.0,
        min_y: 0.0,
        max_x: -1.0,
        max_y: -1.0,
    };

    pub const fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounds from an origin and extent
    pub fn from_rect(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn is_empty(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    /// Grow the bounds outward on every side
    pub fn grown(&self, pad: f32) -> Self {
        Self::new(
            self.min_x - pad,
            self.min_y - pad,
            self.max_x + pad,
            self.max_y + pad,
        )
    }

    pub fn union(&self, other: &RectBounds) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn intersection(&self, other: &RectBounds) -> Self {
        Self::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        )
    }

    pub fn add_point(&mut self, x: f32, y: f32) {
        if self.is_empty() {
            *self = Self::new(x, y, x, y);
        } else {
            self.min_x = self.min_x.min(x);
            self.min_y = self.min_y.min(y);
            self.max_x = self.max_x.max(x);
            self.max_y = self.max_y.max(y);
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// An integer device-space rectangle (clip rects, texture regions)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The smallest integer rectangle covering the given bounds
    pub fn from_bounds(b: &RectBounds) -> Self {
        if b.is_empty() {
            return Self::default();
        }
        let x = b.min_x.floor() as i32;
        let y = b.min_y.floor() as i32;
        Self {
            x,
            y,
            width: (b.max_x.ceil() as i32 - x).max(0),
            height: (b.max_y.ceil() as i32 - y).max(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn intersection(&self, other: &Rectangle) -> Rectangle {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        Rectangle::new(x, y, (x2 - x).max(0), (y2 - y).max(0))
    }

    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_union_with_empty() {
        let a = RectBounds::from_rect(10.0, 10.0, 5.0, 5.0);
        assert_eq!(RectBounds::EMPTY.union(&a), a);
        assert_eq!(a.union(&RectBounds::EMPTY), a);
    }

    #[test]
    fn test_bounds_intersection_disjoint_is_empty() {
        let a = RectBounds::from_rect(0.0, 0.0, 10.0, 10.0);
        let b = RectBounds::from_rect(20.0, 20.0, 10.0, 10.0);
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn test_rectangle_from_bounds_rounds_outward() {
        let b = RectBounds::new(0.2, 0.7, 10.4, 11.1);
        let r = Rectangle::from_bounds(&b);
        assert_eq!(r, Rectangle::new(0, 0, 11, 12));
    }

    #[test]
    fn test_rectangle_intersection_clamps_to_zero() {
        let a = Rectangle::new(0, 0, 10, 10);
        let b = Rectangle::new(30, 30, 5, 5);
        assert!(a.intersection(&b).is_empty());
    }
}
