//! Software shape rasterization
//!
//! Shapes that have no analytic shader path are tessellated with lyon and
//! accumulated into an 8-bit coverage mask. The mask is uploaded to an
//! alpha texture and drawn as a textured quad by the graphics layer.

use glint_core::{
    BasicStroke, LineCap, LineJoin, Path, PathVerb, Rectangle, Shape, StrokeStyle, Affine2D,
};
use lyon::math::{point, vector, Angle, Box2D, Point as LPoint};
use lyon::path::builder::BorderRadii;
use lyon::path::iterator::PathIterator;
use lyon::path::{Path as LyonPath, Winding};
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillTessellator, FillVertex, LineCap as LyonCap,
    LineJoin as LyonJoin, StrokeOptions, StrokeTessellator, StrokeVertex, VertexBuffers,
};
use tracing::trace;

/// Supersampling grid edge for antialiased masks
const SS: u32 = 4;
const FLATTEN_TOLERANCE: f32 = 0.1;

/// A rasterized coverage mask in device space
#[derive(Clone, Debug)]
pub struct MaskData {
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: u32,
    pub height: u32,
    /// Row-major 8-bit coverage, `width * height` bytes
    pub alpha: Vec<u8>,
}

impl MaskData {
    pub fn num_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

fn lyon_path(shape: &Shape, xform: &Affine2D) -> LyonPath {
    let mut b = LyonPath::builder();
    match shape {
        Shape::RoundRect {
            x,
            y,
            width,
            height,
            arc_w,
            arc_h,
        } => {
            let rect = Box2D::new(point(*x, *y), point(x + width, y + height));
            if *arc_w <= 0.0 || *arc_h <= 0.0 {
                b.add_rectangle(&rect, Winding::Positive);
            } else {
                // lyon radii are circular; use the mean of the two arc radii
                let r = (arc_w + arc_h) * 0.25;
                b.add_rounded_rectangle(
                    &rect,
                    &BorderRadii::new(r.min(width * 0.5).min(height * 0.5)),
                    Winding::Positive,
                );
            }
        }
        Shape::Ellipse {
            x,
            y,
            width,
            height,
        } => {
            b.add_ellipse(
                point(x + width * 0.5, y + height * 0.5),
                vector(width * 0.5, height * 0.5),
                Angle::radians(0.0),
                Winding::Positive,
            );
        }
        Shape::Line { x1, y1, x2, y2 } => {
            b.begin(point(*x1, *y1));
            b.line_to(point(*x2, *y2));
            b.end(false);
        }
        Shape::Path(p) => {
            append_path(&mut b, p);
        }
    }
    let path = b.build();
    transform_path(&path, xform)
}

fn append_path(b: &mut lyon::path::path::Builder, p: &Path) {
    let pts = p.points();
    let mut i = 0;
    let mut open = false;
    for verb in p.verbs() {
        match verb {
            PathVerb::MoveTo => {
                if open {
                    b.end(false);
                }
                b.begin(point(pts[i].x, pts[i].y));
                open = true;
                i += 1;
            }
            PathVerb::LineTo => {
                b.line_to(point(pts[i].x, pts[i].y));
                i += 1;
            }
            PathVerb::QuadTo => {
                b.quadratic_bezier_to(point(pts[i].x, pts[i].y), point(pts[i + 1].x, pts[i + 1].y));
                i += 2;
            }
            PathVerb::CubicTo => {
                b.cubic_bezier_to(
                    point(pts[i].x, pts[i].y),
                    point(pts[i + 1].x, pts[i + 1].y),
                    point(pts[i + 2].x, pts[i + 2].y),
                );
                i += 3;
            }
            PathVerb::Close => {
                b.close();
                open = false;
            }
        }
    }
    if open {
        b.end(false);
    }
}

fn transform_path(path: &LyonPath, xform: &Affine2D) -> LyonPath {
    if *xform == Affine2D::IDENTITY {
        return path.clone();
    }
    let e = &xform.elements;
    let tx = lyon::geom::Transform::new(e[0], e[1], e[2], e[3], e[4], e[5]);
    path.clone().transformed(&tx)
}

/// Break a path into dash segments by flattening. An approximation of true
/// arc-length dashing, adequate at mask resolution.
fn dash_path(path: &LyonPath, dash: &[f32], phase: f32) -> LyonPath {
    let mut b = LyonPath::builder();
    let total: f32 = dash.iter().sum();
    if total <= 0.0 {
        return path.clone();
    }
    let mut dist = phase.rem_euclid(total);
    let mut idx = 0;
    while dist >= dash[idx] {
        dist -= dash[idx];
        idx = (idx + 1) % dash.len();
    }
    let mut state = DashState {
        idx,
        on: idx % 2 == 0,
        remaining: dash[idx] - dist,
        open: false,
    };
    let mut last: Option<LPoint> = None;
    for evt in path.iter().flattened(FLATTEN_TOLERANCE) {
        use lyon::path::Event;
        match evt {
            Event::Begin { at } => last = Some(at),
            Event::Line { from, to } => {
                state.advance(&mut b, from, to, dash);
                last = Some(to);
            }
            Event::End { first, close, .. } => {
                if close {
                    if let Some(l) = last {
                        state.advance(&mut b, l, first, dash);
                    }
                }
                if state.open {
                    b.end(false);
                    state.open = false;
                }
                last = None;
            }
            _ => {}
        }
    }
    if state.open {
        b.end(false);
    }
    b.build()
}

struct DashState {
    idx: usize,
    on: bool,
    remaining: f32,
    open: bool,
}

impl DashState {
    fn advance(
        &mut self,
        b: &mut lyon::path::path::Builder,
        from: LPoint,
        to: LPoint,
        dash: &[f32],
    ) {
        let mut from = from;
        let mut seg_len = (to - from).length();
        while seg_len > 0.0 {
            let step = seg_len.min(self.remaining);
            let t = step / seg_len;
            let mid = from.lerp(to, t);
            if self.on {
                if !self.open {
                    b.begin(from);
                    self.open = true;
                }
                b.line_to(mid);
            }
            self.remaining -= step;
            seg_len -= step;
            from = mid;
            if self.remaining <= 0.0 {
                if self.on && self.open {
                    b.end(false);
                    self.open = false;
                }
                self.idx = (self.idx + 1) % dash.len();
                self.on = !self.on;
                self.remaining = dash[self.idx];
            }
        }
    }
}

fn stroke_options(stroke: &BasicStroke, width_override: Option<f32>) -> StrokeOptions {
    StrokeOptions::default()
        .with_line_width(width_override.unwrap_or(stroke.width))
        .with_line_cap(match stroke.cap {
            LineCap::Butt => LyonCap::Butt,
            LineCap::Round => LyonCap::Round,
            LineCap::Square => LyonCap::Square,
        })
        .with_line_join(match stroke.join {
            LineJoin::Miter => LyonJoin::Miter,
            LineJoin::Round => LyonJoin::Round,
            LineJoin::Bevel => LyonJoin::Bevel,
        })
        .with_miter_limit(stroke.miter_limit.max(1.0))
        .with_tolerance(FLATTEN_TOLERANCE)
}

type Mesh = VertexBuffers<[f32; 2], u32>;

fn tessellate_fill(path: &LyonPath) -> Option<Mesh> {
    let mut mesh: Mesh = VertexBuffers::new();
    let mut tess = FillTessellator::new();
    let opts = FillOptions::default().with_tolerance(FLATTEN_TOLERANCE);
    tess.tessellate_path(
        path,
        &opts,
        &mut BuffersBuilder::new(&mut mesh, |v: FillVertex| v.position().to_array()),
    )
    .ok()?;
    Some(mesh)
}

fn tessellate_stroke(path: &LyonPath, opts: &StrokeOptions) -> Option<Mesh> {
    let mut mesh: Mesh = VertexBuffers::new();
    let mut tess = StrokeTessellator::new();
    tess.tessellate_path(
        path,
        opts,
        &mut BuffersBuilder::new(&mut mesh, |v: StrokeVertex| v.position().to_array()),
    )
    .ok()?;
    Some(mesh)
}

fn mesh_bounds(mesh: &Mesh) -> Option<(f32, f32, f32, f32)> {
    let mut it = mesh.vertices.iter();
    let first = it.next()?;
    let mut b = (first[0], first[1], first[0], first[1]);
    for v in it {
        b.0 = b.0.min(v[0]);
        b.1 = b.1.min(v[1]);
        b.2 = b.2.max(v[0]);
        b.3 = b.3.max(v[1]);
    }
    Some(b)
}

/// Accumulate supersampled triangle coverage into `cov` over `rect`
fn accumulate(mesh: &Mesh, rect: Rectangle, samples: u32, cov: &mut [u16]) {
    let w = rect.width as i64;
    for tri in mesh.indices.chunks_exact(3) {
        let a = mesh.vertices[tri[0] as usize];
        let b = mesh.vertices[tri[1] as usize];
        let c = mesh.vertices[tri[2] as usize];
        let min_x = a[0].min(b[0]).min(c[0]).floor() as i64;
        let max_x = a[0].max(b[0]).max(c[0]).ceil() as i64;
        let min_y = a[1].min(b[1]).min(c[1]).floor() as i64;
        let max_y = a[1].max(b[1]).max(c[1]).ceil() as i64;
        let x0 = min_x.max(rect.x as i64);
        let x1 = max_x.min(rect.x as i64 + w);
        let y0 = min_y.max(rect.y as i64);
        let y1 = max_y.min(rect.y as i64 + rect.height as i64);
        let area = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
        if area == 0.0 {
            continue;
        }
        let sign = area.signum();
        let edge = |p0: [f32; 2], p1: [f32; 2], x: f32, y: f32| {
            sign * ((p1[0] - p0[0]) * (y - p0[1]) - (p1[1] - p0[1]) * (x - p0[0]))
        };
        for py in y0..y1 {
            for px in x0..x1 {
                let base = ((py - rect.y as i64) * w + (px - rect.x as i64)) as usize;
                let mut hits = 0u16;
                for sy in 0..samples {
                    for sx in 0..samples {
                        let x = px as f32 + (sx as f32 + 0.5) / samples as f32;
                        let y = py as f32 + (sy as f32 + 0.5) / samples as f32;
                        if edge(a, b, x, y) >= 0.0
                            && edge(b, c, x, y) >= 0.0
                            && edge(c, a, x, y) >= 0.0
                        {
                            hits += 1;
                        }
                    }
                }
                // triangles from one tessellation never overlap, so a plain
                // saturating add keeps shared-edge samples from doubling up
                let total = samples * samples;
                cov[base] = (cov[base] + hits).min(total as u16);
            }
        }
    }
}

fn rasterize_mesh(mesh: &Mesh, clip: Option<Rectangle>, antialiased: bool) -> Option<MaskData> {
    let (min_x, min_y, max_x, max_y) = mesh_bounds(mesh)?;
    let mut rect = Rectangle::new(
        min_x.floor() as i32,
        min_y.floor() as i32,
        (max_x.ceil() - min_x.floor()) as i32,
        (max_y.ceil() - min_y.floor()) as i32,
    );
    if let Some(clip) = clip {
        rect = rect.intersection(&clip);
    }
    if rect.is_empty() {
        return None;
    }
    let samples = if antialiased { SS } else { 1 };
    let mut cov = vec![0u16; rect.width as usize * rect.height as usize];
    accumulate(mesh, rect, samples, &mut cov);
    let total = (samples * samples) as u32;
    let alpha = cov
        .iter()
        .map(|&c| ((c as u32 * 255 + total / 2) / total) as u8)
        .collect();
    Some(MaskData {
        origin_x: rect.x,
        origin_y: rect.y,
        width: rect.width as u32,
        height: rect.height as u32,
        alpha,
    })
}

/// Rasterize a filled shape under `xform`, clipped to `clip`
pub fn rasterize_fill(
    shape: &Shape,
    xform: &Affine2D,
    clip: Option<Rectangle>,
    antialiased: bool,
) -> Option<MaskData> {
    let path = lyon_path(shape, xform);
    let mesh = tessellate_fill(&path)?;
    trace!(
        tris = mesh.indices.len() / 3,
        "tessellated fill for mask rasterization"
    );
    rasterize_mesh(&mesh, clip, antialiased)
}

/// Rasterize a stroked shape under `xform`, clipped to `clip`
///
/// Inner and outer stroke styles are produced by combining a
/// double-width centered stroke with the fill coverage.
pub fn rasterize_stroke(
    shape: &Shape,
    stroke: &BasicStroke,
    xform: &Affine2D,
    clip: Option<Rectangle>,
    antialiased: bool,
) -> Option<MaskData> {
    let mut path = lyon_path(shape, xform);
    // stroke in device space; scale the width by the mean transform scale
    let scale = ((xform.elements[0].hypot(xform.elements[1])
        + xform.elements[2].hypot(xform.elements[3]))
        * 0.5)
        .max(1e-6);
    let device_width = stroke.width * scale;
    if stroke.is_dashed() {
        path = dash_path(&path, &stroke.dash, stroke.dash_phase);
    }
    match stroke.style {
        StrokeStyle::Centered => {
            let mesh = tessellate_stroke(&path, &stroke_options(stroke, Some(device_width)))?;
            rasterize_mesh(&mesh, clip, antialiased)
        }
        StrokeStyle::Inner | StrokeStyle::Outer => {
            let smesh =
                tessellate_stroke(&path, &stroke_options(stroke, Some(device_width * 2.0)))?;
            let stroke_mask = rasterize_mesh(&smesh, clip, antialiased)?;
            let srect = Rectangle::new(
                stroke_mask.origin_x,
                stroke_mask.origin_y,
                stroke_mask.width as i32,
                stroke_mask.height as i32,
            );
            let fill_mask = match tessellate_fill(&path) {
                Some(fmesh) => rasterize_mesh(&fmesh, Some(srect), antialiased),
                None => None,
            };
            Some(combine_styled(stroke_mask, fill_mask, stroke.style))
        }
    }
}

/// `inner = stroke AND fill`, `outer = stroke AND NOT fill`
fn combine_styled(mut stroke: MaskData, fill: Option<MaskData>, style: StrokeStyle) -> MaskData {
    let Some(fill) = fill else {
        if style == StrokeStyle::Inner {
            stroke.alpha.fill(0);
        }
        return stroke;
    };
    for y in 0..stroke.height as i32 {
        for x in 0..stroke.width as i32 {
            let idx = (y as usize) * stroke.width as usize + x as usize;
            let fx = x + stroke.origin_x - fill.origin_x;
            let fy = y + stroke.origin_y - fill.origin_y;
            let f = if fx >= 0 && fy >= 0 && (fx as u32) < fill.width && (fy as u32) < fill.height {
                fill.alpha[(fy as usize) * fill.width as usize + fx as usize]
            } else {
                0
            };
            let s = stroke.alpha[idx];
            stroke.alpha[idx] = match style {
                StrokeStyle::Inner => s.min(f),
                StrokeStyle::Outer => s.saturating_sub(f),
                StrokeStyle::Centered => s,
            };
        }
    }
    stroke
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_rect_full_coverage_interior() {
        let m = rasterize_fill(
            &Shape::rect(0.0, 0.0, 8.0, 8.0),
            &Affine2D::IDENTITY,
            None,
            true,
        )
        .unwrap();
        assert_eq!((m.origin_x, m.origin_y), (0, 0));
        assert_eq!((m.width, m.height), (8, 8));
        // center pixel is fully covered
        let c = m.alpha[4 * 8 + 4];
        assert_eq!(c, 255);
    }

    #[test]
    fn test_clip_limits_mask() {
        let m = rasterize_fill(
            &Shape::rect(0.0, 0.0, 100.0, 100.0),
            &Affine2D::IDENTITY,
            Some(Rectangle::new(10, 10, 20, 20)),
            true,
        )
        .unwrap();
        assert_eq!((m.origin_x, m.origin_y), (10, 10));
        assert_eq!((m.width, m.height), (20, 20));
    }

    #[test]
    fn test_translated_transform_moves_origin() {
        let m = rasterize_fill(
            &Shape::rect(0.0, 0.0, 8.0, 8.0),
            &Affine2D::translation(20.0, 30.0),
            None,
            true,
        )
        .unwrap();
        assert_eq!((m.origin_x, m.origin_y), (20, 30));
    }

    #[test]
    fn test_stroke_line_has_coverage() {
        let m = rasterize_stroke(
            &Shape::Line {
                x1: 2.0,
                y1: 5.0,
                x2: 18.0,
                y2: 5.0,
            },
            &BasicStroke::new(2.0),
            &Affine2D::IDENTITY,
            None,
            true,
        )
        .unwrap();
        assert!(m.alpha.iter().any(|&a| a > 200));
    }

    #[test]
    fn test_non_aa_is_binary() {
        let m = rasterize_fill(
            &Shape::Ellipse {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            &Affine2D::IDENTITY,
            None,
            false,
        )
        .unwrap();
        assert!(m.alpha.iter().all(|&a| a == 0 || a == 255));
    }

    #[test]
    fn test_inner_stroke_stays_inside_fill() {
        let shape = Shape::rect(4.0, 4.0, 16.0, 16.0);
        let stroke = BasicStroke::new(4.0).with_style(StrokeStyle::Inner);
        let m = rasterize_stroke(&shape, &stroke, &Affine2D::IDENTITY, None, false).unwrap();
        // nothing outside the outline
        for y in 0..m.height as i32 {
            for x in 0..m.width as i32 {
                let px = x + m.origin_x;
                let py = y + m.origin_y;
                let a = m.alpha[(y as usize) * m.width as usize + x as usize];
                if a > 0 {
                    assert!((4..20).contains(&px) && (4..20).contains(&py));
                }
            }
        }
    }
}
