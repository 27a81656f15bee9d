//! The geometry-emitting graphics layer
//!
//! A `ShaderGraphics` wraps the shader context with per-draw state (paint,
//! stroke, transform, clip, composite) and turns fill/draw/texture/text
//! calls into validated quad batches. Strategy selection mirrors the cost
//! ladder: precomputed ramp textures for small axis-aligned primitives,
//! analytic mask shaders for the rest of the well-behaved cases, and
//! rasterized masks (optionally cached) for everything else.

use glint_core::{
    Affine2D, BasicStroke, Color, CompositeMode, LineCap, LineJoin, Paint, Point, RectBounds,
    Rectangle, Shape, StrokeStyle,
};
use smallvec::{smallvec, SmallVec};
use tracing::warn;

use crate::context::{DrawOp, ShaderContext};
use crate::device::{Device, GpuError, PixelFormat, TargetId, TextureId};
use crate::glyph::{AaMode, GlyphRun};
use crate::mask_cache::{CachingShapeRep, MaskResult};
use crate::mask_type::MaskType;
use crate::paint_helper::PaintHelper;
use crate::prim_tex::cell_span;
use crate::rasterizer::{rasterize_fill, rasterize_stroke};

const WHITE_PAINT: Paint = Paint::Color(Color::WHITE);

/// Radii closer than this are treated as a circle (cheaper shader)
const CIRCLE_EPSILON: f32 = 0.01;
/// Arcs smaller than half a pixel degrade rounded shapes to pgrams
const MIN_ARC: f32 = 0.5;

/// Per-target drawing facade over a [`ShaderContext`]
pub struct ShaderGraphics<'a, D: Device> {
    ctx: &'a mut ShaderContext<D>,
    target: TargetId,
    target_width: u32,
    target_height: u32,
    msaa: bool,
    transform: Affine2D,
    paint: Paint,
    stroke: BasicStroke,
    composite: CompositeMode,
    clip: Option<Rectangle>,
    extra_alpha: f32,
    antialiased: bool,
    depth_test: bool,
}

impl<'a, D: Device> ShaderGraphics<'a, D> {
    pub fn new(ctx: &'a mut ShaderContext<D>, target: TargetId) -> Result<Self, GpuError> {
        let info = ctx
            .device()
            .target_info(target)
            .ok_or(GpuError::InvalidHandle)?;
        Ok(Self {
            ctx,
            target,
            target_width: info.width,
            target_height: info.height,
            msaa: info.msaa,
            transform: Affine2D::IDENTITY,
            paint: Paint::Color(Color::BLACK),
            stroke: BasicStroke::default(),
            composite: CompositeMode::SrcOver,
            clip: None,
            extra_alpha: 1.0,
            antialiased: true,
            depth_test: false,
        })
    }

    // ── draw state ──────────────────────────────────────────────────────

    pub fn set_paint(&mut self, paint: Paint) {
        self.paint = paint;
    }

    pub fn paint(&self) -> &Paint {
        &self.paint
    }

    pub fn set_stroke(&mut self, stroke: BasicStroke) {
        self.stroke = stroke;
    }

    pub fn stroke(&self) -> &BasicStroke {
        &self.stroke
    }

    pub fn set_transform(&mut self, xform: Affine2D) {
        self.transform = xform;
    }

    pub fn transform(&self) -> &Affine2D {
        &self.transform
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.transform = self.transform.concat(&Affine2D::translation(dx, dy));
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.transform = self.transform.concat(&Affine2D::scale(sx, sy));
    }

    pub fn set_composite_mode(&mut self, mode: CompositeMode) {
        self.composite = mode;
    }

    pub fn composite_mode(&self) -> CompositeMode {
        self.composite
    }

    pub fn set_clip_rect(&mut self, clip: Option<Rectangle>) {
        self.clip = clip;
    }

    pub fn clip_rect(&self) -> Option<Rectangle> {
        self.clip
    }

    pub fn set_extra_alpha(&mut self, alpha: f32) {
        self.extra_alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn set_antialiased(&mut self, aa: bool) {
        self.antialiased = aa;
    }

    pub fn set_depth_test(&mut self, depth_test: bool) {
        self.depth_test = depth_test;
    }

    pub fn context(&mut self) -> &mut ShaderContext<D> {
        self.ctx
    }

    pub fn flush(&mut self) {
        self.ctx.flush();
    }

    // ── borrow splitting ────────────────────────────────────────────────

    /// Context plus a draw op with the device transform left at identity
    /// (geometry emitted in device space)
    fn parts(&mut self) -> (&mut ShaderContext<D>, DrawOp<'_>) {
        (
            &mut *self.ctx,
            DrawOp {
                target: self.target,
                xform: &Affine2D::IDENTITY,
                paint: &self.paint,
                extra_alpha: self.extra_alpha,
                composite: self.composite,
                clip: self.clip,
                depth_test: self.depth_test,
            },
        )
    }

    /// Context plus a draw op carrying the current transform (geometry
    /// emitted in user space, transformed on the device)
    fn parts_xform(&mut self) -> (&mut ShaderContext<D>, DrawOp<'_>) {
        (
            &mut *self.ctx,
            DrawOp {
                target: self.target,
                xform: &self.transform,
                paint: &self.paint,
                extra_alpha: self.extra_alpha,
                composite: self.composite,
                clip: self.clip,
                depth_test: self.depth_test,
            },
        )
    }

    fn fringe_pad(&self) -> f32 {
        -self.ctx.settings().fringe_factor
    }

    // ── clear ───────────────────────────────────────────────────────────

    /// Replace the whole target with a color (ignores clip, paint and
    /// composite)
    pub fn clear(&mut self, color: Color) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let (w, h) = (self.target_width as f32, self.target_height as f32);
        let bounds = RectBounds::from_rect(0.0, 0.0, w, h);
        let paint = Paint::Color(color);
        let op = DrawOp {
            target: self.target,
            xform: &Affine2D::IDENTITY,
            paint: &paint,
            extra_alpha: 1.0,
            composite: CompositeMode::Src,
            clip: None,
            depth_test: self.depth_test,
        };
        self.ctx
            .validate_paint_op(&op, MaskType::Solid, None, &bounds, &[])?;
        self.ctx.vb().add_quad(0.0, 0.0, w, h);
        self.ctx.flush();
        Ok(())
    }

    // ── fills ───────────────────────────────────────────────────────────

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) -> Result<(), GpuError> {
        self.fill_round_rect(x, y, w, h, 0.0, 0.0)
    }

    pub fn fill_round_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        arc_w: f32,
        arc_h: f32,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() || w <= 0.0 || h <= 0.0 {
            return Ok(());
        }
        let shape = Shape::RoundRect {
            x,
            y,
            width: w,
            height: h,
            arc_w,
            arc_h,
        };
        if PaintHelper::is_complex(&self.paint) {
            return self.render_with_complex_paint(&shape, None);
        }
        // sub-half-pixel arcs render as a plain rect
        let (arc_w, arc_h) = if arc_w < MIN_ARC || arc_h < MIN_ARC {
            (0.0, 0.0)
        } else {
            (arc_w.min(w), arc_h.min(h))
        };
        if self.transform.is_translate_or_identity() {
            let dx = x + self.transform.tx();
            let dy = y + self.transform.ty();
            if !self.antialiased {
                return self.fill_solid_quad(dx, dy, dx + w, dy + h, x, y, w, h);
            }
            if arc_w == 0.0 {
                let max = self.ctx.rect_texture_max_size()? as f32;
                if w + 1.0 <= max && h + 1.0 <= max {
                    return self.fill_prim_rect(dx, dy, w, h, x, y);
                }
            }
            return self.fill_rrect_analytic(dx, dy, w, h, arc_w, arc_h, x, y);
        }
        if arc_w == 0.0 && self.antialiased {
            // arbitrary transforms keep rects on the fast path as pgrams
            return self.fill_pgram(x, y, w, h);
        }
        if !self.antialiased && arc_w == 0.0 {
            return self.fill_quad(x, y, x + w, y + h);
        }
        self.render_shape_uncached(&shape, None)
    }

    pub fn fill_ellipse(&mut self, x: f32, y: f32, w: f32, h: f32) -> Result<(), GpuError> {
        if self.ctx.is_disposed() || w <= 0.0 || h <= 0.0 {
            return Ok(());
        }
        let shape = Shape::Ellipse {
            x,
            y,
            width: w,
            height: h,
        };
        if PaintHelper::is_complex(&self.paint) {
            return self.render_with_complex_paint(&shape, None);
        }
        if self.transform.is_translate_or_identity() && self.antialiased {
            let dx = x + self.transform.tx();
            let dy = y + self.transform.ty();
            return self.fill_oval_analytic(dx, dy, w, h, x, y);
        }
        self.render_shape_uncached(&shape, None)
    }

    /// Fill an axis-aligned quad without edge antialiasing (user-space
    /// coordinates, device transform applied by the GPU)
    pub fn fill_quad(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let (x1, x2) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (y1, y2) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        let bounds = RectBounds::new(x1, y1, x2, y2);
        if PaintHelper::is_complex(&self.paint) {
            return self.render_with_complex_paint(&Shape::rect(x1, y1, x2 - x1, y2 - y1), None);
        }
        let (ctx, op) = self.parts_xform();
        let ptx = ctx.validate_paint_op(&op, MaskType::Solid, None, &bounds, &[])?;
        match ptx {
            Some(t) => ctx
                .vb()
                .add_quad_paint(x1, y1, x2, y2, 0.0, 0.0, 0.0, 0.0, &t),
            None => ctx.vb().add_quad(x1, y1, x2, y2),
        }
        Ok(())
    }

    /// Erase a user-space quad region to transparent, regardless of the
    /// current paint and composite mode
    pub fn clear_quad(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), GpuError> {
        let saved_composite = self.composite;
        let saved_paint = std::mem::replace(&mut self.paint, WHITE_PAINT);
        self.composite = CompositeMode::Clear;
        let result = self.fill_quad(x1, y1, x2, y2);
        self.composite = saved_composite;
        self.paint = saved_paint;
        result
    }

    /// Non-AA solid fill in device space
    #[allow(clippy::too_many_arguments)]
    fn fill_solid_quad(
        &mut self,
        dx1: f32,
        dy1: f32,
        dx2: f32,
        dy2: f32,
        ux: f32,
        uy: f32,
        uw: f32,
        uh: f32,
    ) -> Result<(), GpuError> {
        let bounds = RectBounds::from_rect(ux, uy, uw, uh);
        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let (ctx, op) = self.parts();
        let ptx = ctx.validate_paint_op(&op, MaskType::Solid, None, &bounds, &[])?;
        match ptx.map(|t| t.concat(&dev_inv)) {
            Some(t) => ctx
                .vb()
                .add_quad_paint(dx1, dy1, dx2, dy2, 0.0, 0.0, 0.0, 0.0, &t),
            None => ctx.vb().add_quad(dx1, dy1, dx2, dy2),
        }
        Ok(())
    }

    /// Small axis-aligned rect through the ramp texture: one quad, the
    /// half-texel gap provides the fringe
    fn fill_prim_rect(
        &mut self,
        dx: f32,
        dy: f32,
        w: f32,
        h: f32,
        ux: f32,
        uy: f32,
    ) -> Result<(), GpuError> {
        let (tex, size) = {
            let rt = self.ctx.rect_prim_texture()?;
            (rt.tex, rt.size)
        };
        let pad = self.fringe_pad();
        let cw = (w + 2.0 * pad).ceil() as u32;
        let ch = (h + 2.0 * pad).ceil() as u32;
        let (u0, u1) = cell_span(cw, w + 2.0 * pad, size);
        let (v0, v1) = cell_span(ch, h + 2.0 * pad, size);
        let bounds = RectBounds::from_rect(ux, uy, w, h);
        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let (ctx, op) = self.parts();
        let ptx = ctx.validate_paint_op(&op, MaskType::Texture, Some(tex), &bounds, &[])?;
        let (x1, y1, x2, y2) = (dx - pad, dy - pad, dx + w + pad, dy + h + pad);
        match ptx.map(|t| t.concat(&dev_inv)) {
            Some(t) => ctx.vb().add_quad_paint(x1, y1, x2, y2, u0, v0, u1, v1, &t),
            None => ctx.vb().add_quad_tex(x1, y1, x2, y2, u0, v0, u1, v1),
        }
        Ok(())
    }

    /// Axis-aligned rounded rect (or large plain rect) through the
    /// analytic shader; `tc0` carries pixel offsets from the center
    #[allow(clippy::too_many_arguments)]
    fn fill_rrect_analytic(
        &mut self,
        dx: f32,
        dy: f32,
        w: f32,
        h: f32,
        arc_w: f32,
        arc_h: f32,
        ux: f32,
        uy: f32,
    ) -> Result<(), GpuError> {
        let pad = self.fringe_pad();
        let consts = [w * 0.5, h * 0.5, arc_w * 0.5, arc_h * 0.5];
        let bounds = RectBounds::from_rect(ux, uy, w, h);
        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let (cx, cy) = (dx + w * 0.5, dy + h * 0.5);
        let (hx, hy) = (w * 0.5 + pad, h * 0.5 + pad);
        let (ctx, op) = self.parts();
        let ptx = ctx.validate_paint_op(&op, MaskType::FillRoundRect, None, &bounds, &consts)?;
        emit_centered_quad(ctx, cx, cy, hx, hy, ptx.map(|t| t.concat(&dev_inv)));
        Ok(())
    }

    /// Axis-aligned ellipse through the circle/ellipse analytic shaders,
    /// or the oval ramp texture when small enough
    fn fill_oval_analytic(
        &mut self,
        dx: f32,
        dy: f32,
        w: f32,
        h: f32,
        ux: f32,
        uy: f32,
    ) -> Result<(), GpuError> {
        let pad = self.fringe_pad();
        let bounds = RectBounds::from_rect(ux, uy, w, h);
        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);

        let (oval_tex, oval_size, oval_max) = {
            let ot = self.ctx.oval_prim_texture()?;
            (ot.tex, ot.size, ot.max_cell)
        };
        let cw = w.ceil() as u32;
        let ch = h.ceil() as u32;
        if cw <= oval_max && ch <= oval_max && cw > 0 && ch > 0 {
            let (u0, u1) = cell_span(cw, w, oval_size);
            let (v0, v1) = cell_span(ch, h, oval_size);
            let (ctx, op) = self.parts();
            let ptx =
                ctx.validate_paint_op(&op, MaskType::Texture, Some(oval_tex), &bounds, &[])?;
            let (x1, y1, x2, y2) = (dx - pad, dy - pad, dx + w + pad, dy + h + pad);
            match ptx.map(|t| t.concat(&dev_inv)) {
                Some(t) => ctx.vb().add_quad_paint(x1, y1, x2, y2, u0, v0, u1, v1, &t),
                None => ctx.vb().add_quad_tex(x1, y1, x2, y2, u0, v0, u1, v1),
            }
            return Ok(());
        }

        let rx = w * 0.5;
        let ry = h * 0.5;
        let (mask, consts): (MaskType, SmallVec<[f32; 8]>) = if (rx - ry).abs() < CIRCLE_EPSILON {
            (MaskType::FillCircle, smallvec![rx])
        } else {
            (MaskType::FillEllipse, smallvec![rx, ry])
        };
        let (cx, cy) = (dx + rx, dy + ry);
        let (ctx, op) = self.parts();
        let ptx = ctx.validate_paint_op(&op, mask, None, &bounds, &consts)?;
        emit_centered_quad(ctx, cx, cy, rx + pad, ry + pad, ptx.map(|t| t.concat(&dev_inv)));
        Ok(())
    }

    /// Rect fill under an arbitrary transform: CPU-map the corners and
    /// ride the pgram shader with ramp-texture coverage
    fn fill_pgram(&mut self, x: f32, y: f32, w: f32, h: f32) -> Result<(), GpuError> {
        let bounds = RectBounds::from_rect(x, y, w, h);
        let xform = self.transform;
        let center = xform.transform_point(Point::new(x + w * 0.5, y + h * 0.5));
        let e1 = xform.delta_transform(w * 0.5, 0.0);
        let e2 = xform.delta_transform(0.0, h * 0.5);
        self.emit_pgram(center, e1, e2, bounds)
    }

    /// Emit a device-space pgram through coverage textures: a single ramp
    /// cell when the footprint fits, otherwise sliced sampling of the wrap
    /// texture so the fringe stays one pixel wide
    fn emit_pgram(
        &mut self,
        c: Point,
        (e1x, e1y): (f32, f32),
        (e2x, e2y): (f32, f32),
        bounds: RectBounds,
    ) -> Result<(), GpuError> {
        let len1 = (e1x * e1x + e1y * e1y).sqrt();
        let len2 = (e2x * e2x + e2y * e2y).sqrt();
        let cross = e1x * e2y - e1y * e2x;
        if cross == 0.0 || len1 == 0.0 || len2 == 0.0 {
            return Ok(());
        }
        // expand each half-axis so the coverage ramp lands outside the
        // exact outline
        let pad = self.fringe_pad();
        let f1 = (len1 + pad) / len1;
        let f2 = (len2 + pad) / len2;
        let (e1x, e1y) = (e1x * f1, e1y * f1);
        let (e2x, e2y) = (e2x * f2, e2y * f2);
        let pw = 2.0 * (len1 + pad);
        let ph = 2.0 * (len2 + pad);

        let (tex, size, max) = {
            let rt = self.ctx.rect_prim_texture()?;
            (rt.tex, rt.size, rt.max_cell as f32)
        };
        let (mask_tex, xs, ys): (TextureId, AxisSlices, AxisSlices) = if pw <= max && ph <= max {
            let (u0, u1) = cell_span(pw.ceil() as u32, pw, size);
            let (v0, v1) = cell_span(ph.ceil() as u32, ph, size);
            (
                tex,
                smallvec![(0.0, 1.0, u0, u1)],
                smallvec![(0.0, 1.0, v0, v1)],
            )
        } else {
            let (wrap_tex, wrap_size) = {
                let wt = self.ctx.wrap_rect_texture()?;
                (wt.tex, wt.size as f32)
            };
            (
                wrap_tex,
                wrap_slices(pw, wrap_size),
                wrap_slices(ph, wrap_size),
            )
        };

        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let (ctx, op) = self.parts();
        let ptx = ctx.validate_paint_op(&op, MaskType::FillPgram, Some(mask_tex), &bounds, &[])?;
        let ptx = ptx.map(|t| t.concat(&dev_inv));
        let corner = |a: f32, b: f32| {
            let sa = 2.0 * a - 1.0;
            let sb = 2.0 * b - 1.0;
            [c.x + sa * e1x + sb * e2x, c.y + sa * e1y + sb * e2y]
        };
        for &(ta, tb, u0, u1) in &xs {
            for &(sa, sb, v0, v1) in &ys {
                let pts = [
                    corner(ta, sa),
                    corner(tb, sa),
                    corner(ta, sb),
                    corner(tb, sb),
                ];
                let uvs = [[u0, v0], [u1, v0], [u0, v1], [u1, v1]];
                match &ptx {
                    Some(t) => ctx.vb().add_mapped_pgram_paint(pts, uvs, pts, t),
                    None => ctx.vb().add_mapped_pgram(pts, uvs, [0.0, 0.0]),
                }
            }
        }
        Ok(())
    }

    // ── strokes ─────────────────────────────────────────────────────────

    pub fn draw_rect(&mut self, x: f32, y: f32, w: f32, h: f32) -> Result<(), GpuError> {
        self.draw_round_rect(x, y, w, h, 0.0, 0.0)
    }

    pub fn draw_round_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        arc_w: f32,
        arc_h: f32,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() || w < 0.0 || h < 0.0 {
            return Ok(());
        }
        let shape = Shape::RoundRect {
            x,
            y,
            width: w,
            height: h,
            arc_w,
            arc_h,
        };
        if PaintHelper::is_complex(&self.paint) {
            let stroke = self.stroke.clone();
            return self.render_with_complex_paint(&shape, Some(&stroke));
        }
        if !can_use_stroke_shader(&self.stroke)
            || !self.transform.is_translate_or_identity()
            || !self.antialiased
        {
            let stroke = self.stroke.clone();
            return self.render_shape_uncached(&shape, Some(&stroke));
        }
        let dx = x + self.transform.tx();
        let dy = y + self.transform.ty();
        let (arc_w, arc_h) = if arc_w < MIN_ARC || arc_h < MIN_ARC {
            (0.0, 0.0)
        } else {
            (arc_w.min(w), arc_h.min(h))
        };
        let d = stroke_dims(&self.stroke, w, h, arc_w, arc_h);
        let bounds = RectBounds::from_rect(x, y, w, h);
        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let (cx, cy) = (dx + w * 0.5, dy + h * 0.5);
        let pad = self.fringe_pad();
        let (hx, hy) = (d.outer_w * 0.5 + pad, d.outer_h * 0.5 + pad);

        let (mask, consts): (MaskType, SmallVec<[f32; 8]>) = if d.inner_w <= 0.0 || d.inner_h <= 0.0 {
            // stroke swallowed the hole; degrade to the fill shader
            (
                MaskType::FillRoundRect,
                smallvec![
                    d.outer_w * 0.5,
                    d.outer_h * 0.5,
                    d.outer_arc_w * 0.5,
                    d.outer_arc_h * 0.5,
                ],
            )
        } else if d.inner_arc_w < MIN_ARC || d.inner_arc_h < MIN_ARC {
            // inner curvature collapsed; inner edge is a plain pgram
            (
                MaskType::DrawSemiRoundRect,
                smallvec![
                    d.outer_w * 0.5,
                    d.outer_h * 0.5,
                    d.outer_arc_w * 0.5,
                    d.outer_arc_h * 0.5,
                    d.inner_w * 0.5,
                    d.inner_h * 0.5,
                ],
            )
        } else {
            (
                MaskType::DrawRoundRect,
                smallvec![
                    d.outer_w * 0.5,
                    d.outer_h * 0.5,
                    d.outer_arc_w * 0.5,
                    d.outer_arc_h * 0.5,
                    d.inner_w * 0.5,
                    d.inner_h * 0.5,
                    d.inner_arc_w * 0.5,
                    d.inner_arc_h * 0.5,
                ],
            )
        };
        let (ctx, op) = self.parts();
        let ptx = ctx.validate_paint_op(&op, mask, None, &bounds, &consts)?;
        emit_centered_quad(ctx, cx, cy, hx, hy, ptx.map(|t| t.concat(&dev_inv)));
        Ok(())
    }

    pub fn draw_ellipse(&mut self, x: f32, y: f32, w: f32, h: f32) -> Result<(), GpuError> {
        if self.ctx.is_disposed() || w < 0.0 || h < 0.0 {
            return Ok(());
        }
        let shape = Shape::Ellipse {
            x,
            y,
            width: w,
            height: h,
        };
        if PaintHelper::is_complex(&self.paint) {
            let stroke = self.stroke.clone();
            return self.render_with_complex_paint(&shape, Some(&stroke));
        }
        if !can_use_stroke_shader(&self.stroke)
            || !self.transform.is_translate_or_identity()
            || !self.antialiased
        {
            let stroke = self.stroke.clone();
            return self.render_shape_uncached(&shape, Some(&stroke));
        }
        let dx = x + self.transform.tx();
        let dy = y + self.transform.ty();
        let expand = self.stroke.width * self.stroke.expansion_factor();
        let shrink = self.stroke.width - expand;
        let orx = w * 0.5 + expand;
        let ory = h * 0.5 + expand;
        let irx = w * 0.5 - shrink;
        let iry = h * 0.5 - shrink;
        let bounds = RectBounds::from_rect(x, y, w, h);
        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let (cx, cy) = (dx + w * 0.5, dy + h * 0.5);
        let pad = self.fringe_pad();

        let circle = (orx - ory).abs() < CIRCLE_EPSILON;
        let (mask, consts): (MaskType, SmallVec<[f32; 8]>) = if irx <= 0.0 || iry <= 0.0 {
            if circle {
                (MaskType::FillCircle, smallvec![orx])
            } else {
                (MaskType::FillEllipse, smallvec![orx, ory])
            }
        } else if circle {
            (MaskType::DrawCircle, smallvec![orx, irx])
        } else {
            (MaskType::DrawEllipse, smallvec![orx, ory, 0.0, 0.0, irx, iry])
        };
        let (ctx, op) = self.parts();
        let ptx = ctx.validate_paint_op(&op, mask, None, &bounds, &consts)?;
        emit_centered_quad(ctx, cx, cy, orx + pad, ory + pad, ptx.map(|t| t.concat(&dev_inv)));
        Ok(())
    }

    pub fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let shape = Shape::Line { x1, y1, x2, y2 };
        if PaintHelper::is_complex(&self.paint) {
            let stroke = self.stroke.clone();
            return self.render_with_complex_paint(&shape, Some(&stroke));
        }
        if self.stroke.is_dashed() || self.stroke.cap == LineCap::Round || !self.antialiased {
            let stroke = self.stroke.clone();
            return self.render_shape_uncached(&shape, Some(&stroke));
        }
        // a stroked segment with butt or square caps is a parallelogram
        let dx = x2 - x1;
        let dy = y2 - y1;
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            return Ok(());
        }
        let half_w = self.stroke.width * 0.5;
        let cap_ext = match self.stroke.cap {
            LineCap::Square => half_w,
            _ => 0.0,
        };
        let (ux, uy) = (dx / len, dy / len);
        let (nx, ny) = (-uy, ux);
        // pgram centered on the segment midpoint, in user space
        let cx = (x1 + x2) * 0.5;
        let cy = (y1 + y2) * 0.5;
        let he1 = (ux * (len * 0.5 + cap_ext), uy * (len * 0.5 + cap_ext));
        let he2 = (nx * half_w, ny * half_w);
        self.fill_user_pgram(cx, cy, he1, he2, shape.bounds())
    }

    /// Fill a user-space pgram given center and half-edge vectors
    fn fill_user_pgram(
        &mut self,
        cx: f32,
        cy: f32,
        he1: (f32, f32),
        he2: (f32, f32),
        bounds: RectBounds,
    ) -> Result<(), GpuError> {
        let xform = self.transform;
        let c = xform.transform_point(Point::new(cx, cy));
        let e1 = xform.delta_transform(he1.0, he1.1);
        let e2 = xform.delta_transform(he2.0, he2.1);
        self.emit_pgram(c, e1, e2, bounds)
    }

    // ── shapes ──────────────────────────────────────────────────────────

    /// Fill an arbitrary shape through a rasterized (and possibly cached)
    /// coverage mask
    pub fn fill_shape(
        &mut self,
        rep: Option<&mut CachingShapeRep>,
        shape: &Shape,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        if PaintHelper::is_complex(&self.paint) {
            return self.render_with_complex_paint(shape, None);
        }
        self.render_shape(rep, shape, None)
    }

    /// Stroke an arbitrary shape through a rasterized mask
    pub fn draw_shape(
        &mut self,
        rep: Option<&mut CachingShapeRep>,
        shape: &Shape,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let stroke = self.stroke.clone();
        if PaintHelper::is_complex(&self.paint) {
            return self.render_with_complex_paint(shape, Some(&stroke));
        }
        self.render_shape(rep, shape, Some(&stroke))
    }

    fn render_shape_uncached(
        &mut self,
        shape: &Shape,
        stroke: Option<&BasicStroke>,
    ) -> Result<(), GpuError> {
        self.render_shape(None, shape, stroke)
    }

    fn render_shape(
        &mut self,
        rep: Option<&mut CachingShapeRep>,
        shape: &Shape,
        stroke: Option<&BasicStroke>,
    ) -> Result<(), GpuError> {
        let xform = self.transform;
        let clip = self.clip;
        let aa = self.antialiased;
        let result = match rep {
            Some(rep) => {
                let (cache, device) = self.ctx.mask_parts();
                rep.mask_for(cache, device, shape, stroke, &xform, clip, aa)
            }
            None => {
                let mask = match stroke {
                    Some(s) => rasterize_stroke(shape, s, &xform, clip, aa),
                    None => rasterize_fill(shape, &xform, clip, aa),
                };
                match mask {
                    Some(m) => MaskResult::Uncached(m),
                    None => MaskResult::Empty,
                }
            }
        };
        self.draw_mask_result(result, shape.bounds())
    }

    fn draw_mask_result(
        &mut self,
        result: MaskResult,
        user_bounds: RectBounds,
    ) -> Result<(), GpuError> {
        let (tex, x, y, w, h) = match result {
            MaskResult::Empty => return Ok(()),
            MaskResult::Cached {
                tex,
                x,
                y,
                width,
                height,
            } => (tex, x, y, width, height),
            MaskResult::Uncached(mask) => {
                let (tex, ..) = self.ctx.upload_scratch_mask(&mask)?;
                (
                    tex,
                    mask.origin_x as f32,
                    mask.origin_y as f32,
                    mask.width,
                    mask.height,
                )
            }
        };
        let info = self
            .ctx
            .device()
            .texture_info(tex)
            .ok_or(GpuError::InvalidHandle)?;
        let u1 = w as f32 / info.physical_width as f32;
        let v1 = h as f32 / info.physical_height as f32;
        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let (ctx, op) = self.parts();
        let ptx =
            ctx.validate_paint_op(&op, MaskType::AlphaTexture, Some(tex), &user_bounds, &[])?;
        let (x2, y2) = (x + w as f32, y + h as f32);
        match ptx.map(|t| t.concat(&dev_inv)) {
            Some(t) => ctx.vb().add_quad_paint(x, y, x2, y2, 0.0, 0.0, u1, v1, &t),
            None => ctx.vb().add_quad_tex(x, y, x2, y2, 0.0, 0.0, u1, v1),
        }
        // the scratch texture is reused by the next uncached mask
        ctx.flush();
        Ok(())
    }

    /// Gradients with too many stops for the LUT shaders: rasterize the
    /// mask, evaluate the paint on the CPU, and draw the result as an
    /// RGBA texture
    fn render_with_complex_paint(
        &mut self,
        shape: &Shape,
        stroke: Option<&BasicStroke>,
    ) -> Result<(), GpuError> {
        let xform = self.transform;
        let mask = match stroke {
            Some(s) => rasterize_stroke(shape, s, &xform, self.clip, self.antialiased),
            None => rasterize_fill(shape, &xform, self.clip, self.antialiased),
        };
        let Some(mask) = mask else {
            return Ok(());
        };
        let bounds = shape.bounds();
        let inv = xform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let mut pixels = Vec::with_capacity(mask.alpha.len() * 4);
        for py in 0..mask.height {
            for px in 0..mask.width {
                let a = mask.alpha[(py * mask.width + px) as usize];
                if a == 0 {
                    pixels.extend_from_slice(&[0, 0, 0, 0]);
                    continue;
                }
                let dev_x = mask.origin_x as f32 + px as f32 + 0.5;
                let dev_y = mask.origin_y as f32 + py as f32 + 0.5;
                let u = inv.transform_point(Point::new(dev_x, dev_y));
                let c = PaintHelper::evaluate(&self.paint, u.x, u.y, &bounds);
                let cov = a as f32 / 255.0;
                let alpha = c.a * cov;
                let pm = Color::new(c.r * alpha, c.g * alpha, c.b * alpha, alpha);
                pixels.extend_from_slice(&pm.to_rgba8());
            }
        }
        let tex = {
            let device = self.ctx.device_mut();
            let tex = device.create_texture(PixelFormat::Rgba8, mask.width, mask.height)?;
            device.upload_texture(
                tex,
                Rectangle::new(0, 0, mask.width as i32, mask.height as i32),
                &pixels,
            )?;
            tex
        };
        let info = match self.ctx.device().texture_info(tex) {
            Some(info) => info,
            None => {
                self.ctx.device_mut().dispose_texture(tex);
                return Err(GpuError::InvalidHandle);
            }
        };
        let u1 = mask.width as f32 / info.physical_width as f32;
        let v1 = mask.height as f32 / info.physical_height as f32;
        let paint = WHITE_PAINT;
        let op = DrawOp {
            target: self.target,
            xform: &Affine2D::IDENTITY,
            paint: &paint,
            extra_alpha: self.extra_alpha,
            composite: self.composite,
            clip: self.clip,
            depth_test: self.depth_test,
        };
        if let Err(e) =
            self.ctx
                .validate_paint_op(&op, MaskType::Texture, Some(tex), &bounds, &[])
        {
            self.ctx.device_mut().dispose_texture(tex);
            return Err(e);
        }
        let (x, y) = (mask.origin_x as f32, mask.origin_y as f32);
        self.ctx.vb().add_quad_tex(
            x,
            y,
            x + mask.width as f32,
            y + mask.height as f32,
            0.0,
            0.0,
            u1,
            v1,
        );
        self.ctx.flush();
        self.ctx.device_mut().dispose_texture(tex);
        Ok(())
    }

    // ── alpha-mask fills ────────────────────────────────────────────────

    /// Fill a device-space rect with the current paint modulated by an
    /// optional alpha mask texture. `interpolate` treats the mask as a
    /// difference mask (coverage below one half maps to zero).
    #[allow(clippy::too_many_arguments)]
    pub fn fill_alpha_mask(
        &mut self,
        mask_tex: Option<TextureId>,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        mask_uv: RectBounds,
        interpolate: bool,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let mask = match (mask_tex, interpolate) {
            (None, _) => MaskType::AlphaOne,
            (Some(_), false) => MaskType::AlphaTexture,
            (Some(_), true) => MaskType::AlphaTextureDiff,
        };
        let bounds = RectBounds::from_rect(x, y, w, h);
        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let dx = x + self.transform.tx();
        let dy = y + self.transform.ty();
        let (ctx, op) = self.parts();
        let ptx = ctx.validate_paint_op(&op, mask, mask_tex, &bounds, &[])?;
        match ptx.map(|t| t.concat(&dev_inv)) {
            Some(t) => ctx.vb().add_quad_paint(
                dx,
                dy,
                dx + w,
                dy + h,
                mask_uv.min_x,
                mask_uv.min_y,
                mask_uv.max_x,
                mask_uv.max_y,
                &t,
            ),
            None => ctx.vb().add_quad_tex(
                dx,
                dy,
                dx + w,
                dy + h,
                mask_uv.min_x,
                mask_uv.min_y,
                mask_uv.max_x,
                mask_uv.max_y,
            ),
        }
        Ok(())
    }

    // ── textures ────────────────────────────────────────────────────────

    /// Draw a texture's content region to a destination rect (texel source
    /// coordinates)
    #[allow(clippy::too_many_arguments)]
    pub fn draw_texture_region(
        &mut self,
        tex: TextureId,
        dx1: f32,
        dy1: f32,
        dx2: f32,
        dy2: f32,
        sx1: f32,
        sy1: f32,
        sx2: f32,
        sy2: f32,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let info = self
            .ctx
            .device()
            .texture_info(tex)
            .ok_or(GpuError::InvalidHandle)?;
        let pw = info.physical_width as f32;
        let ph = info.physical_height as f32;
        self.draw_texture_raw(tex, dx1, dy1, dx2, dy2, sx1 / pw, sy1 / ph, sx2 / pw, sy2 / ph)
    }

    pub fn draw_texture(
        &mut self,
        tex: TextureId,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let info = self
            .ctx
            .device()
            .texture_info(tex)
            .ok_or(GpuError::InvalidHandle)?;
        self.draw_texture_region(
            tex,
            x,
            y,
            x + w,
            y + h,
            0.0,
            0.0,
            info.content_width as f32,
            info.content_height as f32,
        )
    }

    /// Draw with pre-normalized texture coordinates (user-space geometry)
    #[allow(clippy::too_many_arguments)]
    pub fn draw_texture_raw(
        &mut self,
        tex: TextureId,
        dx1: f32,
        dy1: f32,
        dx2: f32,
        dy2: f32,
        u1: f32,
        v1: f32,
        u2: f32,
        v2: f32,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let bounds = RectBounds::new(dx1, dy1, dx2, dy2);
        let paint = WHITE_PAINT;
        let op = DrawOp {
            target: self.target,
            xform: &self.transform,
            paint: &paint,
            extra_alpha: self.extra_alpha,
            composite: self.composite,
            clip: self.clip,
            depth_test: self.depth_test,
        };
        self.ctx
            .validate_paint_op(&op, MaskType::Texture, Some(tex), &bounds, &[])?;
        self.ctx
            .vb()
            .add_quad_tex(dx1, dy1, dx2, dy2, u1, v1, u2, v2);
        Ok(())
    }

    /// Draw a texture onto an arbitrary quad (corner positions in user
    /// space, normalized texture coordinates per corner)
    pub fn draw_mapped_texture_raw(
        &mut self,
        tex: TextureId,
        pts: [[f32; 2]; 4],
        uvs: [[f32; 2]; 4],
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let mut bounds = RectBounds::EMPTY;
        for p in pts {
            bounds.add_point(p[0], p[1]);
        }
        let paint = WHITE_PAINT;
        let op = DrawOp {
            target: self.target,
            xform: &self.transform,
            paint: &paint,
            extra_alpha: self.extra_alpha,
            composite: self.composite,
            clip: self.clip,
            depth_test: self.depth_test,
        };
        self.ctx
            .validate_paint_op(&op, MaskType::Texture, Some(tex), &bounds, &[])?;
        self.ctx.vb().add_mapped_pgram(pts, uvs, [0.0, 0.0]);
        Ok(())
    }

    /// Horizontal 3-slice: fixed-width caps, stretched middle
    #[allow(clippy::too_many_arguments)]
    pub fn draw_texture_3slice_h(
        &mut self,
        tex: TextureId,
        dx1: f32,
        dy1: f32,
        dx2: f32,
        dy2: f32,
        cap_w: f32,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let info = self
            .ctx
            .device()
            .texture_info(tex)
            .ok_or(GpuError::InvalidHandle)?;
        let sw = info.content_width as f32;
        let sh = info.content_height as f32;
        let cap = cap_w.min((dx2 - dx1) * 0.5).min(sw * 0.5);
        self.draw_texture_region(tex, dx1, dy1, dx1 + cap, dy2, 0.0, 0.0, cap, sh)?;
        self.draw_texture_region(tex, dx1 + cap, dy1, dx2 - cap, dy2, cap, 0.0, sw - cap, sh)?;
        self.draw_texture_region(tex, dx2 - cap, dy1, dx2, dy2, sw - cap, 0.0, sw, sh)
    }

    /// Vertical 3-slice: fixed-height caps, stretched middle
    #[allow(clippy::too_many_arguments)]
    pub fn draw_texture_3slice_v(
        &mut self,
        tex: TextureId,
        dx1: f32,
        dy1: f32,
        dx2: f32,
        dy2: f32,
        cap_h: f32,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let info = self
            .ctx
            .device()
            .texture_info(tex)
            .ok_or(GpuError::InvalidHandle)?;
        let sw = info.content_width as f32;
        let sh = info.content_height as f32;
        let cap = cap_h.min((dy2 - dy1) * 0.5).min(sh * 0.5);
        self.draw_texture_region(tex, dx1, dy1, dx2, dy1 + cap, 0.0, 0.0, sw, cap)?;
        self.draw_texture_region(tex, dx1, dy1 + cap, dx2, dy2 - cap, 0.0, cap, sw, sh - cap)?;
        self.draw_texture_region(tex, dx1, dy2 - cap, dx2, dy2, 0.0, sh - cap, sw, sh)
    }

    /// 9-slice: fixed corners, stretched edges and center
    #[allow(clippy::too_many_arguments)]
    pub fn draw_texture_9slice(
        &mut self,
        tex: TextureId,
        dx1: f32,
        dy1: f32,
        dx2: f32,
        dy2: f32,
        cap_w: f32,
        cap_h: f32,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let info = self
            .ctx
            .device()
            .texture_info(tex)
            .ok_or(GpuError::InvalidHandle)?;
        let sw = info.content_width as f32;
        let sh = info.content_height as f32;
        let cw = cap_w.min((dx2 - dx1) * 0.5).min(sw * 0.5);
        let ch = cap_h.min((dy2 - dy1) * 0.5).min(sh * 0.5);
        let cols = [
            (dx1, dx1 + cw, 0.0, cw),
            (dx1 + cw, dx2 - cw, cw, sw - cw),
            (dx2 - cw, dx2, sw - cw, sw),
        ];
        let rows = [
            (dy1, dy1 + ch, 0.0, ch),
            (dy1 + ch, dy2 - ch, ch, sh - ch),
            (dy2 - ch, dy2, sh - ch, sh),
        ];
        for &(ry1, ry2, sy1, sy2) in &rows {
            for &(cx1, cx2, sx1, sx2) in &cols {
                self.draw_texture_region(tex, cx1, ry1, cx2, ry2, sx1, sy1, sx2, sy2)?;
            }
        }
        Ok(())
    }

    /// Planar video frame draw. Panics on formats without a plane layout;
    /// video decoders only hand this call textures they created for it.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_multi_texture(
        &mut self,
        planes: &[TextureId],
        format: PixelFormat,
        dx1: f32,
        dy1: f32,
        dx2: f32,
        dy2: f32,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        if format != PixelFormat::MultiYCbCr420 {
            panic!("unsupported multitexture format {format:?}");
        }
        let has_alpha = planes.len() > 3;
        let scale = |info: crate::device::TextureInfo| {
            // sample up to the last texel center, not the padded edge
            (
                (info.content_width.saturating_sub(1)) as f32 / info.physical_width as f32,
                (info.content_height.saturating_sub(1)) as f32 / info.physical_height as f32,
            )
        };
        let luma_info = self
            .ctx
            .device()
            .texture_info(planes[0])
            .ok_or(GpuError::InvalidHandle)?;
        let chroma_info = self
            .ctx
            .device()
            .texture_info(planes[1])
            .ok_or(GpuError::InvalidHandle)?;
        let (lsx, lsy) = scale(luma_info);
        let (csx, csy) = scale(chroma_info);
        let consts = [lsx, lsy, csx, csy];
        let textures = [
            Some(planes[0]),
            Some(planes[1]),
            Some(planes[2]),
            if has_alpha { Some(planes[3]) } else { None },
        ];
        let name = if has_alpha { "YCbCrAlpha" } else { "YCbCr" };
        let (ctx, op) = self.parts_xform();
        ctx.validate_special_op(&op, name, &textures, &consts)?;
        ctx.vb().add_quad_tex(dx1, dy1, dx2, dy2, 0.0, 0.0, 1.0, 1.0);
        Ok(())
    }

    /// Draw RGBA pixels modulated by an alpha mask (both device-space
    /// rects with normalized source coordinates)
    #[allow(clippy::too_many_arguments)]
    pub fn draw_pixels_masked(
        &mut self,
        img: TextureId,
        mask: TextureId,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        img_uv: RectBounds,
        mask_uv: RectBounds,
    ) -> Result<(), GpuError> {
        self.draw_masked_common(img, mask, x, y, w, h, img_uv, mask_uv, "MaskTexture")
    }

    /// Like [`draw_pixels_masked`], but the mask is a difference mask from
    /// two incremental renders
    ///
    /// [`draw_pixels_masked`]: ShaderGraphics::draw_pixels_masked
    #[allow(clippy::too_many_arguments)]
    pub fn mask_interpolate_pixels(
        &mut self,
        img: TextureId,
        mask: TextureId,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        img_uv: RectBounds,
        mask_uv: RectBounds,
    ) -> Result<(), GpuError> {
        self.draw_masked_common(
            img,
            mask,
            x,
            y,
            w,
            h,
            img_uv,
            mask_uv,
            "MaskInterpolateTexture",
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_masked_common(
        &mut self,
        img: TextureId,
        mask: TextureId,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        img_uv: RectBounds,
        mask_uv: RectBounds,
        shader: &'static str,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        let textures = [Some(mask), Some(img), None, None];
        let (ctx, op) = self.parts();
        ctx.validate_special_op(&op, shader, &textures, &[])?;
        ctx.vb().add_quad_tex2(
            x,
            y,
            x + w,
            y + h,
            mask_uv.min_x,
            mask_uv.min_y,
            mask_uv.max_x,
            mask_uv.max_y,
            img_uv.min_x,
            img_uv.min_y,
            img_uv.max_x,
            img_uv.max_y,
        );
        Ok(())
    }

    /// MSAA targets have no sampleable view, so effects that read the
    /// destination back cannot run against them
    pub fn can_read_back(&self) -> bool {
        !self.msaa
    }

    /// The sampleable texture of the bound target, for readback-style
    /// effects. MSAA targets cannot be sampled and return `None`.
    pub fn read_back_texture(&mut self) -> Option<TextureId> {
        if self.ctx.is_disposed() {
            return None;
        }
        self.ctx.flush();
        self.ctx.device().target_texture(self.target)
    }

    // ── text ────────────────────────────────────────────────────────────

    /// Draw a shaped glyph run at a user-space origin.
    ///
    /// LCD strikes take the two-pass subpixel path only under a narrow set
    /// of conditions (solid color, source-over, no depth, no MSAA);
    /// anything else silently downgrades to the greyscale twin strike.
    pub fn draw_glyph_run(&mut self, run: &GlyphRun, x: f32, y: f32) -> Result<(), GpuError> {
        if self.ctx.is_disposed() || run.glyphs.is_empty() {
            return Ok(());
        }
        let lcd_ok = run.strike.aa_mode == AaMode::Lcd
            && self.composite == CompositeMode::SrcOver
            && matches!(self.paint, Paint::Color(_))
            && !self.depth_test
            && !self.msaa;
        if run.strike.aa_mode == AaMode::Lcd && !lcd_ok {
            let mut grey = run.clone();
            grey.strike = run.strike.to_greyscale();
            return self.draw_glyph_run(&grey, x, y);
        }
        if lcd_ok {
            return self.draw_glyph_run_lcd(run, x, y);
        }
        self.draw_glyph_run_grey(run, x, y, None)
    }

    /// Greyscale glyph quads straight out of the atlas; when `region` is
    /// set (and allowed), the combined mask shader clips glyphs by a
    /// region mask in one pass
    fn draw_glyph_run_grey(
        &mut self,
        run: &GlyphRun,
        x: f32,
        y: f32,
        region: Option<(TextureId, RectBounds, RectBounds)>,
    ) -> Result<(), GpuError> {
        let strike = run.strike.to_greyscale();
        let quads = self.collect_glyph_quads(run, &strike, x, y)?;
        let Some((atlas, quads)) = quads else {
            return Ok(());
        };
        if let Some((region_tex, region_rect, region_uv)) = region {
            if self.ctx.super_shader_allowed() && self.ctx.is_glyph_cache_texture(atlas) {
                let (ctx, op) = self.parts();
                ctx.validate_super_op(&op, region_tex, atlas)?;
                for q in &quads {
                    // unit 0 samples the region, unit 1 the glyph
                    let ru = map_into(q.x1, region_rect.min_x, region_rect.max_x, region_uv);
                    let ru2 = map_into(q.x2, region_rect.min_x, region_rect.max_x, region_uv);
                    let rv = map_into_y(q.y1, region_rect.min_y, region_rect.max_y, region_uv);
                    let rv2 = map_into_y(q.y2, region_rect.min_y, region_rect.max_y, region_uv);
                    ctx.vb().add_quad_tex2(
                        q.x1, q.y1, q.x2, q.y2, ru, rv, ru2, rv2, q.u1, q.v1, q.u2, q.v2,
                    );
                }
                return Ok(());
            }
        }
        let bounds = RectBounds::from_rect(x, y, 0.0, 0.0);
        let dev_inv = self.transform.invert().unwrap_or(Affine2D::ZERO_SCALE);
        let (ctx, op) = self.parts();
        let ptx = ctx.validate_paint_op(&op, MaskType::AlphaTexture, Some(atlas), &bounds, &[])?;
        let ptx = ptx.map(|t| t.concat(&dev_inv));
        for q in &quads {
            match &ptx {
                Some(t) => ctx
                    .vb()
                    .add_quad_paint(q.x1, q.y1, q.x2, q.y2, q.u1, q.v1, q.u2, q.v2, t),
                None => ctx
                    .vb()
                    .add_quad_tex(q.x1, q.y1, q.x2, q.y2, q.u1, q.v1, q.u2, q.v2),
            }
        }
        Ok(())
    }

    /// Glyphs clipped by a region alpha mask (selection highlights, caret
    /// regions) through the combined shader when possible
    #[allow(clippy::too_many_arguments)]
    pub fn draw_masked_glyph_run(
        &mut self,
        run: &GlyphRun,
        x: f32,
        y: f32,
        region_tex: TextureId,
        region_rect: RectBounds,
        region_uv: RectBounds,
    ) -> Result<(), GpuError> {
        if self.ctx.is_disposed() {
            return Ok(());
        }
        self.draw_glyph_run_grey(run, x, y, Some((region_tex, region_rect, region_uv)))
    }

    fn draw_glyph_run_lcd(&mut self, run: &GlyphRun, x: f32, y: f32) -> Result<(), GpuError> {
        let Paint::Color(text_color) = self.paint else {
            return self.draw_glyph_run_grey(run, x, y, None);
        };
        let quads = self.collect_glyph_quads(run, &run.strike, x, y)?;
        let Some((atlas, quads)) = quads else {
            return Ok(());
        };
        // pass 1: blit per-channel coverage into the LCD scratch buffer
        let lcd_target = self.ctx.lcd_buffer(self.target_width, self.target_height)?;
        let mut area = RectBounds::EMPTY;
        for q in &quads {
            area.add_point(q.x1, q.y1);
            area.add_point(q.x2, q.y2);
        }
        // the scratch buffer is pooled across runs; wipe stale coverage
        // from the area this run touches before blitting into it
        let clear_paint = Paint::Color(Color::TRANSPARENT);
        let clear_op = DrawOp {
            target: lcd_target,
            xform: &Affine2D::IDENTITY,
            paint: &clear_paint,
            extra_alpha: 1.0,
            composite: CompositeMode::Src,
            clip: None,
            depth_test: false,
        };
        self.ctx
            .validate_paint_op(&clear_op, MaskType::Solid, None, &area, &[])?;
        self.ctx
            .vb()
            .add_quad(area.min_x, area.min_y, area.max_x, area.max_y);

        let paint = WHITE_PAINT;
        let op = DrawOp {
            target: lcd_target,
            xform: &Affine2D::IDENTITY,
            paint: &paint,
            extra_alpha: 1.0,
            composite: CompositeMode::Src,
            clip: None,
            depth_test: false,
        };
        self.ctx
            .validate_paint_op(&op, MaskType::Texture, Some(atlas), &area, &[])?;
        for q in &quads {
            self.ctx
                .vb()
                .add_quad_tex(q.x1, q.y1, q.x2, q.y2, q.u1, q.v1, q.u2, q.v2);
        }
        self.ctx.flush();

        // pass 2: composite the buffer onto the target with the
        // gamma-adjusted text color
        let lcd_tex = self
            .ctx
            .device()
            .target_texture(lcd_target)
            .ok_or(GpuError::InvalidHandle)?;
        let lcd_info = self
            .ctx
            .device()
            .texture_info(lcd_tex)
            .ok_or(GpuError::InvalidHandle)?;
        let (bw, bh) = (
            lcd_info.physical_width as f32,
            lcd_info.physical_height as f32,
        );
        let (ctx, op) = self.parts();
        ctx.validate_lcd_op(&op, lcd_tex, text_color)?;
        ctx.vb().add_quad_tex(
            area.min_x,
            area.min_y,
            area.max_x,
            area.max_y,
            area.min_x / bw,
            area.min_y / bh,
            area.max_x / bw,
            area.max_y / bh,
        );
        ctx.flush();
        Ok(())
    }

    /// Resolve a run to device-space atlas quads; unregistered glyphs are
    /// skipped
    fn collect_glyph_quads(
        &mut self,
        run: &GlyphRun,
        strike: &crate::glyph::FontStrike,
        x: f32,
        y: f32,
    ) -> Result<Option<(TextureId, Vec<GlyphQuad>)>, GpuError> {
        let origin = self.transform.transform_point(Point::new(x, y));
        if !self.transform.is_translate_or_identity() {
            warn!("glyph runs ignore rotation and scale; drawing axis-aligned");
        }
        let cache = self.ctx.glyph_cache(strike.aa_mode);
        let Some(atlas) = cache.texture() else {
            return Ok(None);
        };
        let info = self
            .ctx
            .device()
            .texture_info(atlas)
            .ok_or(GpuError::InvalidHandle)?;
        let (aw, ah) = (info.physical_width as f32, info.physical_height as f32);
        // LCD atlas texels are three subpixel samples wide
        let x_div = if strike.aa_mode == AaMode::Lcd { 3.0 } else { 1.0 };
        let cache = self.ctx.glyph_cache(strike.aa_mode);
        let mut quads = Vec::with_capacity(run.glyphs.len());
        for g in &run.glyphs {
            let Some(loc) = cache.lookup(strike, g.glyph_id) else {
                continue;
            };
            let gx = (origin.x + g.x + loc.left).round();
            let gy = (origin.y + g.y + loc.top).round();
            let gw = loc.region.width as f32 / x_div;
            let gh = loc.region.height as f32;
            quads.push(GlyphQuad {
                x1: gx,
                y1: gy,
                x2: gx + gw,
                y2: gy + gh,
                u1: loc.region.x as f32 / aw,
                v1: loc.region.y as f32 / ah,
                u2: (loc.region.x + loc.region.width) as f32 / aw,
                v2: (loc.region.y + loc.region.height) as f32 / ah,
            });
        }
        if quads.is_empty() {
            return Ok(None);
        }
        Ok(Some((atlas, quads)))
    }
}

struct GlyphQuad {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    u1: f32,
    v1: f32,
    u2: f32,
    v2: f32,
}

fn emit_centered_quad<D: Device>(
    ctx: &mut ShaderContext<D>,
    cx: f32,
    cy: f32,
    hx: f32,
    hy: f32,
    ptx: Option<Affine2D>,
) {
    let (x1, y1, x2, y2) = (cx - hx, cy - hy, cx + hx, cy + hy);
    // tc0 carries pixel offsets from the primitive center
    match ptx {
        Some(t) => ctx
            .vb()
            .add_quad_paint(x1, y1, x2, y2, -hx, -hy, hx, hy, &t),
        None => ctx.vb().add_quad_tex(x1, y1, x2, y2, -hx, -hy, hx, hy),
    }
}

/// Per-axis pgram slices: (start fraction, end fraction, u start, u end)
type AxisSlices = SmallVec<[(f32, f32, f32, f32); 3]>;

/// Slice one pgram axis for wrap-texture sampling. Short axes split in two
/// so each half samples its border ramp at one texel per pixel; longer axes
/// get fixed-size caps around a stretched interior slice.
fn wrap_slices(extent: f32, tex_size: f32) -> AxisSlices {
    let s = tex_size;
    let interior = s - 1.0;
    if extent <= interior {
        let h = extent * 0.5;
        smallvec![
            (0.0, 0.5, 0.5 / s, (0.5 + h) / s),
            (0.5, 1.0, (s - 0.5 - h) / s, (s - 0.5) / s),
        ]
    } else {
        let cap = s * 0.5;
        let f = cap / extent;
        let mid = (0.5 + cap) / s;
        smallvec![
            (0.0, f, 0.5 / s, mid),
            (f, 1.0 - f, mid, mid),
            (1.0 - f, 1.0, (s - 0.5 - cap) / s, (s - 0.5) / s),
        ]
    }
}

/// Map a device x coordinate into a region's normalized span
fn map_into(x: f32, min: f32, max: f32, uv: RectBounds) -> f32 {
    if max <= min {
        return uv.min_x;
    }
    uv.min_x + (x - min) / (max - min) * (uv.max_x - uv.min_x)
}

fn map_into_y(y: f32, min: f32, max: f32, uv: RectBounds) -> f32 {
    if max <= min {
        return uv.min_y;
    }
    uv.min_y + (y - min) / (max - min) * (uv.max_y - uv.min_y)
}

/// Whether the analytic outline shaders can express this stroke
fn can_use_stroke_shader(s: &BasicStroke) -> bool {
    !s.is_dashed()
        && (s.style == StrokeStyle::Inner
            || s.join == LineJoin::Round
            || (s.join == LineJoin::Miter && s.miter_limit >= std::f32::consts::SQRT_2))
}

struct StrokeDims {
    outer_w: f32,
    outer_h: f32,
    outer_arc_w: f32,
    outer_arc_h: f32,
    inner_w: f32,
    inner_h: f32,
    inner_arc_w: f32,
    inner_arc_h: f32,
}

/// Outer and inner rounded-rect dimensions for a stroked rect
fn stroke_dims(stroke: &BasicStroke, w: f32, h: f32, arc_w: f32, arc_h: f32) -> StrokeDims {
    let expand = stroke.width * stroke.expansion_factor();
    let shrink = stroke.width - expand;
    StrokeDims {
        outer_w: w + 2.0 * expand,
        outer_h: h + 2.0 * expand,
        outer_arc_w: if arc_w > 0.0 { arc_w + 2.0 * expand } else { 0.0 },
        outer_arc_h: if arc_h > 0.0 { arc_h + 2.0 * expand } else { 0.0 },
        inner_w: w - 2.0 * shrink,
        inner_h: h - 2.0 * shrink,
        inner_arc_w: (arc_w - 2.0 * shrink).max(0.0),
        inner_arc_h: (arc_h - 2.0 * shrink).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_shader_eligibility() {
        let plain = BasicStroke::new(2.0).with_join(LineJoin::Round);
        assert!(can_use_stroke_shader(&plain));

        let dashed = plain.clone().with_dash(vec![4.0, 2.0], 0.0);
        assert!(!can_use_stroke_shader(&dashed));

        let sharp_miter = BasicStroke::new(2.0); // miter limit 10, above sqrt(2)
        assert!(can_use_stroke_shader(&sharp_miter));

        let mut tight = BasicStroke::new(2.0);
        tight.miter_limit = 1.0;
        assert!(!can_use_stroke_shader(&tight));

        let mut inner_tight = BasicStroke::new(2.0).with_style(StrokeStyle::Inner);
        inner_tight.miter_limit = 1.0;
        assert!(can_use_stroke_shader(&inner_tight));
    }

    #[test]
    fn test_stroke_dims_centered() {
        let d = stroke_dims(&BasicStroke::new(4.0), 20.0, 10.0, 0.0, 0.0);
        assert_eq!(d.outer_w, 24.0);
        assert_eq!(d.inner_w, 16.0);
        assert_eq!(d.inner_h, 6.0);
    }

    #[test]
    fn test_stroke_dims_inner_collapse() {
        // wide stroke closes the hole
        let d = stroke_dims(&BasicStroke::new(8.0), 20.0, 10.0, 0.0, 0.0);
        assert!(d.inner_h <= 0.0);
    }

    #[test]
    fn test_stroke_dims_arc_growth() {
        let d = stroke_dims(&BasicStroke::new(2.0), 20.0, 20.0, 6.0, 6.0);
        assert_eq!(d.outer_arc_w, 8.0);
        assert_eq!(d.inner_arc_w, 4.0);
    }

    #[test]
    fn test_wrap_slices_short_axis_splits_in_two() {
        let slices = wrap_slices(20.0, 32.0);
        assert_eq!(slices.len(), 2);
        // the halves meet in the middle and cover the full axis
        assert_eq!(slices[0].1, 0.5);
        assert_eq!(slices[1].0, 0.5);
        assert_eq!(slices[0].0, 0.0);
        assert_eq!(slices[1].1, 1.0);
        // one texel per pixel: 10px half maps 10 texels of the 32 ramp
        assert!((slices[0].3 - slices[0].2) * 32.0 - 10.0 < 1e-4);
    }

    #[test]
    fn test_wrap_slices_long_axis_has_stretched_interior() {
        let slices = wrap_slices(200.0, 32.0);
        assert_eq!(slices.len(), 3);
        // interior slice samples a single opaque texel column
        assert_eq!(slices[1].2, slices[1].3);
        // caps stay at a fixed pixel size regardless of extent
        assert!((slices[0].1 * 200.0 - 16.0).abs() < 1e-4);
        assert!(((1.0 - slices[2].0) * 200.0 - 16.0).abs() < 1e-4);
    }
}
