//! Vertex layout and the quad batching buffer
//!
//! Every draw op in the core reduces to textured quads. The vertex buffer
//! accumulates them until a state change (or an explicit flush) submits the
//! batch to the device in one `draw_quads` call.

use bytemuck::{Pod, Zeroable};
use glint_core::{Affine2D, Color, Point};

/// One vertex of a quad batch
///
/// `tex0` addresses the mask/content texture on unit 0; `tex1` either
/// addresses the paint texture on unit 1 or carries per-primitive auxiliary
/// values for the prim-shader mask types.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 4],
    pub tex0: [f32; 2],
    pub tex1: [f32; 2],
}

/// Default capacity, in quads, reserved up front
const INITIAL_QUADS: usize = 256;

/// Accumulates quad geometry between flushes
///
/// All `add_*` methods stamp the current color (set via [`set_color`]) onto
/// every emitted vertex. Quads are emitted as two triangles in the fixed
/// order UL, UR, LL / LL, UR, LR so that backends can draw them as a plain
/// triangle list.
///
/// [`set_color`]: VertexBuffer::set_color
pub struct VertexBuffer {
    vertices: Vec<Vertex>,
    color: [f32; 4],
}

impl Default for VertexBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl VertexBuffer {
    pub fn new() -> Self {
        Self {
            vertices: Vec::with_capacity(INITIAL_QUADS * 6),
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }

    /// Set the per-vertex color for subsequent quads, premultiplied
    pub fn set_color(&mut self, color: Color, extra_alpha: f32) {
        let a = color.a * extra_alpha;
        self.color = [color.r * a, color.g * a, color.b * a, a];
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn num_quads(&self) -> usize {
        self.vertices.len() / 6
    }

    /// Drain the accumulated vertices for submission
    pub fn take(&mut self) -> Vec<Vertex> {
        std::mem::take(&mut self.vertices)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    fn push_quad_corners(&mut self, corners: [Vertex; 4]) {
        let [ul, ur, ll, lr] = corners;
        self.vertices.extend_from_slice(&[ul, ur, ll, ll, ur, lr]);
    }

    fn corner(&self, x: f32, y: f32, t0: [f32; 2], t1: [f32; 2]) -> Vertex {
        Vertex {
            pos: [x, y],
            color: self.color,
            tex0: t0,
            tex1: t1,
        }
    }

    /// Solid axis-aligned quad, no texture coordinates
    pub fn add_quad(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.add_quad_tex(x1, y1, x2, y2, 0.0, 0.0, 0.0, 0.0);
    }

    /// Axis-aligned quad with unit-0 texture coordinates
    #[allow(clippy::too_many_arguments)]
    pub fn add_quad_tex(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        u1: f32,
        v1: f32,
        u2: f32,
        v2: f32,
    ) {
        self.push_quad_corners([
            self.corner(x1, y1, [u1, v1], [0.0, 0.0]),
            self.corner(x2, y1, [u2, v1], [0.0, 0.0]),
            self.corner(x1, y2, [u1, v2], [0.0, 0.0]),
            self.corner(x2, y2, [u2, v2], [0.0, 0.0]),
        ]);
    }

    /// Axis-aligned quad with independent unit-0 and unit-1 coordinates
    #[allow(clippy::too_many_arguments)]
    pub fn add_quad_tex2(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        u1: f32,
        v1: f32,
        u2: f32,
        v2: f32,
        p1: f32,
        q1: f32,
        p2: f32,
        q2: f32,
    ) {
        self.push_quad_corners([
            self.corner(x1, y1, [u1, v1], [p1, q1]),
            self.corner(x2, y1, [u2, v1], [p2, q1]),
            self.corner(x1, y2, [u1, v2], [p1, q2]),
            self.corner(x2, y2, [u2, v2], [p2, q2]),
        ]);
    }

    /// Axis-aligned quad with unit-0 coordinates and unit-1 coordinates
    /// derived by mapping the vertex position through `paint_tx`
    #[allow(clippy::too_many_arguments)]
    pub fn add_quad_paint(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        u1: f32,
        v1: f32,
        u2: f32,
        v2: f32,
        paint_tx: &Affine2D,
    ) {
        let t1 = |x: f32, y: f32| {
            let p = paint_tx.transform_point(Point::new(x, y));
            [p.x, p.y]
        };
        self.push_quad_corners([
            self.corner(x1, y1, [u1, v1], t1(x1, y1)),
            self.corner(x2, y1, [u2, v1], t1(x2, y1)),
            self.corner(x1, y2, [u1, v2], t1(x1, y2)),
            self.corner(x2, y2, [u2, v2], t1(x2, y2)),
        ]);
    }

    /// Parallelogram with per-corner positions and unit-0 coordinates, and
    /// a constant unit-1 value (auxiliary prim-shader data)
    pub fn add_mapped_pgram(
        &mut self,
        pts: [[f32; 2]; 4],
        uvs: [[f32; 2]; 4],
        aux: [f32; 2],
    ) {
        self.push_quad_corners([
            self.corner(pts[0][0], pts[0][1], uvs[0], aux),
            self.corner(pts[1][0], pts[1][1], uvs[1], aux),
            self.corner(pts[2][0], pts[2][1], uvs[2], aux),
            self.corner(pts[3][0], pts[3][1], uvs[3], aux),
        ]);
    }

    /// Parallelogram with per-corner positions and unit-0 coordinates, and
    /// unit-1 coordinates produced by mapping `paint_pts` through `paint_tx`
    pub fn add_mapped_pgram_paint(
        &mut self,
        pts: [[f32; 2]; 4],
        uvs: [[f32; 2]; 4],
        paint_pts: [[f32; 2]; 4],
        paint_tx: &Affine2D,
    ) {
        let map = |p: [f32; 2]| {
            let q = paint_tx.transform_point(Point::new(p[0], p[1]));
            [q.x, q.y]
        };
        self.push_quad_corners([
            self.corner(pts[0][0], pts[0][1], uvs[0], map(paint_pts[0])),
            self.corner(pts[1][0], pts[1][1], uvs[1], map(paint_pts[1])),
            self.corner(pts[2][0], pts[2][1], uvs[2], map(paint_pts[2])),
            self.corner(pts[3][0], pts[3][1], uvs[3], map(paint_pts[3])),
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_emits_two_triangles() {
        let mut vb = VertexBuffer::new();
        vb.add_quad(0.0, 0.0, 10.0, 10.0);
        assert_eq!(vb.num_quads(), 1);
        let v = vb.vertices();
        assert_eq!(v.len(), 6);
        // shared edge: LL and UR appear in both triangles
        assert_eq!(v[1].pos, v[4].pos);
        assert_eq!(v[2].pos, v[3].pos);
    }

    #[test]
    fn test_color_premultiplied() {
        let mut vb = VertexBuffer::new();
        vb.set_color(Color::new(1.0, 0.5, 0.0, 0.5), 0.5);
        vb.add_quad(0.0, 0.0, 1.0, 1.0);
        let c = vb.vertices()[0].color;
        assert!((c[3] - 0.25).abs() < 1e-6);
        assert!((c[0] - 0.25).abs() < 1e-6);
        assert!((c[1] - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_take_drains() {
        let mut vb = VertexBuffer::new();
        vb.add_quad(0.0, 0.0, 1.0, 1.0);
        let batch = vb.take();
        assert_eq!(batch.len(), 6);
        assert!(vb.is_empty());
    }

    #[test]
    fn test_paint_mapping() {
        let mut vb = VertexBuffer::new();
        let tx = Affine2D::scale(0.1, 0.1);
        vb.add_quad_paint(0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 1.0, 1.0, &tx);
        let v = vb.vertices();
        assert_eq!(v[0].tex1, [0.0, 0.0]);
        assert_eq!(v[5].tex1, [1.0, 1.0]);
    }
}
