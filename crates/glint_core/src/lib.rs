//! Glint Core Types
//!
//! This crate provides the device-agnostic value types consumed by the
//! rendering core:
//!
//! - **Geometry**: points, float bounds, integer device rectangles
//! - **Transforms**: 2D affine transforms with cache-friendly equality
//! - **Paints**: solid colors, linear/radial gradients, image patterns
//! - **Shapes**: round rects, ellipses, lines, and verb/point paths
//! - **Strokes**: width, cap, join, dash, and stroke-placement style
//!
//! Nothing in this crate touches the GPU; everything is plain data with
//! structural equality so that the mask cache can key on it.

pub mod color;
pub mod composite;
pub mod geometry;
pub mod paint;
pub mod shape;
pub mod stroke;
pub mod transform;

pub use color::Color;
pub use composite::CompositeMode;
pub use geometry::{Point, RectBounds, Rectangle, Size};
pub use paint::{Gradient, GradientStop, ImagePattern, Paint, PaintType, PatternImage, SpreadMethod};
pub use shape::{Path, PathVerb, Shape};
pub use stroke::{BasicStroke, LineCap, LineJoin, StrokeStyle};
pub use transform::Affine2D;
