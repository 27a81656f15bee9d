//! Shape geometry
//!
//! Shapes are plain data with structural equality: the mask cache compares
//! shapes (together with stroke and the linear part of the transform) to
//! decide whether two nodes can share a rasterized coverage mask.

use crate::geometry::{Point, RectBounds};

/// A path segment verb; points are consumed from the companion point list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathVerb {
    /// 1 point
    MoveTo,
    /// 1 point
    LineTo,
    /// 2 points: control, end
    QuadTo,
    /// 3 points: control1, control2, end
    CubicTo,
    /// 0 points
    Close,
}

/// A verb/point-list path
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    verbs: Vec<PathVerb>,
    points: Vec<Point>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(&mut self, x: f32, y: f32) -> &mut Self {
        self.verbs.push(PathVerb::MoveTo);
        self.points.push(Point::new(x, y));
        self
    }

    pub fn line_to(&mut self, x: f32, y: f32) -> &mut Self {
        self.verbs.push(PathVerb::LineTo);
        self.points.push(Point::new(x, y));
        self
    }

    pub fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) -> &mut Self {
        self.verbs.push(PathVerb::QuadTo);
        self.points.push(Point::new(cx, cy));
        self.points.push(Point::new(x, y));
        self
    }

    pub fn cubic_to(&mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) -> &mut Self {
        self.verbs.push(PathVerb::CubicTo);
        self.points.push(Point::new(c1x, c1y));
        self.points.push(Point::new(c2x, c2y));
        self.points.push(Point::new(x, y));
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.verbs.push(PathVerb::Close);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    pub fn verbs(&self) -> &[PathVerb] {
        &self.verbs
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Control-point bounding box (a conservative bound for the curve)
    pub fn bounds(&self) -> RectBounds {
        let mut b = RectBounds::EMPTY;
        for p in &self.points {
            b.add_point(p.x, p.y);
        }
        b
    }
}

/// Device-agnostic geometry handed to the rendering core
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Rectangle with elliptical corner arcs; `arc_w == arc_h == 0` is a
    /// plain rectangle
    RoundRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        arc_w: f32,
        arc_h: f32,
    },
    Ellipse {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Path(Path),
}

impl Shape {
    pub fn rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Shape::RoundRect {
            x,
            y,
            width,
            height,
            arc_w: 0.0,
            arc_h: 0.0,
        }
    }

    pub fn bounds(&self) -> RectBounds {
        match self {
            Shape::RoundRect {
                x,
                y,
                width,
                height,
                ..
            }
            | Shape::Ellipse {
                x,
                y,
                width,
                height,
            } => RectBounds::from_rect(*x, *y, *width, *height),
            Shape::Line { x1, y1, x2, y2 } => {
                let mut b = RectBounds::EMPTY;
                b.add_point(*x1, *y1);
                b.add_point(*x2, *y2);
                b
            }
            Shape::Path(p) => p.bounds(),
        }
    }
}

impl From<Path> for Shape {
    fn from(p: Path) -> Self {
        Shape::Path(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_structural_equality() {
        let mut a = Path::new();
        a.move_to(0.0, 0.0).line_to(10.0, 0.0).line_to(10.0, 10.0).close();
        let mut b = Path::new();
        b.move_to(0.0, 0.0).line_to(10.0, 0.0).line_to(10.0, 10.0).close();
        assert_eq!(a, b);
        b.line_to(0.0, 10.0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_line_bounds_normalized() {
        let s = Shape::Line {
            x1: 10.0,
            y1: 5.0,
            x2: 2.0,
            y2: 8.0,
        };
        let b = s.bounds();
        assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (2.0, 5.0, 10.0, 8.0));
    }
}
