//! The state-validating shader context
//!
//! All drawing funnels through [`ShaderContext::validate_paint_op`], which
//! mirrors the committed GPU state and pushes only the differences to the
//! device. Every mirrored state transition flushes the pending vertex batch
//! first, so quads always draw under the state that was current when they
//! were emitted.
//!
//! Check order matters: the shader is resolved first because binding a new
//! program invalidates the device transform, which is re-sent afterwards.

use std::sync::mpsc::{channel, Receiver, Sender};

use glint_core::{Affine2D, Color, CompositeMode, Paint, RectBounds, Rectangle};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::device::{Camera, Device, DeviceMode, GpuError, PixelFormat, ShaderId, TargetId, TextureId};
use crate::glyph::{AaMode, GlyphCache};
use crate::mask_cache::{CachingShapeRep, DisposerRecord, MaskCache};
use crate::mask_type::{MaskType, SHADER_SLOTS};
use crate::paint_helper::{PaintHelper, NUM_CONSTANTS};
use crate::prim_tex::{OvalPrimTexture, RectPrimTexture, WrapRectTexture};
use crate::rasterizer::MaskData;
use crate::settings::GraphicsSettings;
use crate::vertex::VertexBuffer;

/// Per-draw parameters shared by every validation entry point
pub struct DrawOp<'a> {
    pub target: TargetId,
    pub xform: &'a Affine2D,
    pub paint: &'a Paint,
    pub extra_alpha: f32,
    pub composite: CompositeMode,
    pub clip: Option<Rectangle>,
    pub depth_test: bool,
}

/// Mirror of the state committed to the device
struct State {
    last_shader: Option<ShaderId>,
    render_target: Option<TargetId>,
    camera: Option<Camera>,
    transform: Affine2D,
    transform_valid: bool,
    /// `None` means unknown (forces one set_clip_rect)
    clip: Option<Option<Rectangle>>,
    composite: Option<CompositeMode>,
    textures: [Option<TextureId>; crate::device::MAX_TEXTURE_UNITS],
    constants: [f32; NUM_CONSTANTS],
    mode: DeviceMode,
    depth_test: bool,
}

impl State {
    fn new() -> Self {
        Self {
            last_shader: None,
            render_target: None,
            camera: None,
            transform: Affine2D::IDENTITY,
            transform_valid: false,
            clip: None,
            composite: None,
            textures: [None; crate::device::MAX_TEXTURE_UNITS],
            // NaN sentinels guarantee the first comparison fails
            constants: [f32::NAN; NUM_CONSTANTS],
            mode: DeviceMode::TwoD,
            depth_test: false,
        }
    }

    /// Forget everything except the bound target (mode boundary, target
    /// switch)
    fn invalidate(&mut self) {
        self.last_shader = None;
        self.camera = None;
        self.transform_valid = false;
        self.clip = None;
        self.composite = None;
        self.textures = [None; crate::device::MAX_TEXTURE_UNITS];
        self.constants = [f32::NAN; NUM_CONSTANTS];
    }
}

fn consts_equal(a: &[f32; NUM_CONSTANTS], b: &[f32; NUM_CONSTANTS]) -> bool {
    a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// The rendering core's face to a backend device
///
/// Owns the device, the quad batch, the shader slot arrays, the mask and
/// glyph caches, and the disposer queue. One context serves one render
/// thread; none of this is synchronized.
pub struct ShaderContext<D: Device> {
    device: D,
    vb: VertexBuffer,
    settings: GraphicsSettings,
    state: State,
    stock_shaders: Vec<Option<ShaderId>>,
    alpha_test_shaders: Vec<Option<ShaderId>>,
    special_shaders: FxHashMap<&'static str, ShaderId>,
    external_shader: Option<ShaderId>,
    paint_helper: PaintHelper,
    rect_tex: Option<RectPrimTexture>,
    oval_tex: Option<OvalPrimTexture>,
    wrap_tex: Option<WrapRectTexture>,
    mask_cache: MaskCache,
    grey_glyphs: GlyphCache,
    lcd_glyphs: GlyphCache,
    lcd_buffer: Option<(TargetId, u32, u32)>,
    scratch_mask: Option<(TextureId, u32, u32)>,
    disposer_tx: Sender<DisposerRecord>,
    disposer_rx: Receiver<DisposerRecord>,
    disposed: bool,
}

impl<D: Device> ShaderContext<D> {
    pub fn new(device: D, settings: GraphicsSettings) -> Self {
        let (disposer_tx, disposer_rx) = channel();
        let mask_cache = MaskCache::new(settings.mask_cache_pixel_budget);
        info!(
            prim_tex = settings.prim_texture_size,
            budget = settings.mask_cache_pixel_budget,
            "created shader context"
        );
        Self {
            device,
            vb: VertexBuffer::new(),
            settings,
            state: State::new(),
            stock_shaders: vec![None; SHADER_SLOTS],
            alpha_test_shaders: vec![None; SHADER_SLOTS],
            special_shaders: FxHashMap::default(),
            external_shader: None,
            paint_helper: PaintHelper::new(),
            rect_tex: None,
            oval_tex: None,
            wrap_tex: None,
            mask_cache,
            grey_glyphs: GlyphCache::new(AaMode::Greyscale),
            lcd_glyphs: GlyphCache::new(AaMode::Lcd),
            lcd_buffer: None,
            scratch_mask: None,
            disposer_tx,
            disposer_rx,
            disposed: false,
        }
    }

    pub fn settings(&self) -> &GraphicsSettings {
        &self.settings
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn mask_cache(&self) -> &MaskCache {
        &self.mask_cache
    }

    pub fn glyph_cache(&self, mode: AaMode) -> &GlyphCache {
        match mode {
            AaMode::Greyscale => &self.grey_glyphs,
            AaMode::Lcd => &self.lcd_glyphs,
        }
    }

    pub fn glyph_cache_mut(&mut self, mode: AaMode) -> (&mut GlyphCache, &mut D) {
        let cache = match mode {
            AaMode::Greyscale => &mut self.grey_glyphs,
            AaMode::Lcd => &mut self.lcd_glyphs,
        };
        (cache, &mut self.device)
    }

    /// A new shape rep wired to this context's disposer queue
    pub fn create_shape_rep(&self) -> CachingShapeRep {
        CachingShapeRep::new(self.disposer_tx.clone())
    }

    /// Internal access for the graphics layer: mask cache plus device with
    /// disjoint borrows
    pub(crate) fn mask_parts(&mut self) -> (&mut MaskCache, &mut D) {
        (&mut self.mask_cache, &mut self.device)
    }

    // ── batching ────────────────────────────────────────────────────────

    /// Submit the pending quad batch under the committed state
    pub fn flush(&mut self) {
        if self.vb.is_empty() {
            return;
        }
        let batch = self.vb.take();
        self.device.draw_quads(&batch);
    }

    pub(crate) fn vb(&mut self) -> &mut VertexBuffer {
        &mut self.vb
    }

    // ── shader selection ────────────────────────────────────────────────

    fn stock_shader(
        &mut self,
        mask: MaskType,
        paint: &Paint,
        alpha_test: bool,
    ) -> Result<ShaderId, GpuError> {
        let slot = mask.slot_index(paint.paint_type(), paint.option_code());
        let existing = if alpha_test {
            self.alpha_test_shaders[slot]
        } else {
            self.stock_shaders[slot]
        };
        if let Some(id) = existing {
            if self.device.shader_valid(id) {
                return Ok(id);
            }
        }
        let name = mask.shader_name(paint, alpha_test);
        debug!(%name, slot, "creating stock shader");
        let id = self.device.create_stock_shader(&name)?;
        let arr = if alpha_test {
            &mut self.alpha_test_shaders
        } else {
            &mut self.stock_shaders
        };
        arr[slot] = Some(id);
        Ok(id)
    }

    fn special_shader(&mut self, name: &'static str) -> Result<ShaderId, GpuError> {
        let existing = self.special_shaders.get(name).copied();
        if let Some(id) = existing {
            if self.device.shader_valid(id) {
                return Ok(id);
            }
            self.special_shaders.remove(name);
        }
        let id = self.device.create_stock_shader(name)?;
        self.special_shaders.insert(name, id);
        Ok(id)
    }

    /// Route every subsequent draw through a caller-managed shader.
    /// The caller owns its constants and textures; the context still
    /// validates target, transform, clip and composite.
    pub fn set_external_shader(&mut self, shader: Option<ShaderId>) {
        if self.external_shader != shader {
            self.flush();
            self.external_shader = shader;
            // force a rebind on the next validation
            self.state.last_shader = None;
        }
    }

    // ── state validation ────────────────────────────────────────────────

    /// Draws against a disposed context are silent no-ops; teardown can
    /// race late scene pulses
    fn check_disposed(&self) -> bool {
        if self.disposed {
            warn!("draw after context disposal");
        }
        self.disposed
    }

    fn set_render_target(&mut self, target: TargetId, depth_test: bool) -> Result<(), GpuError> {
        if self.state.render_target == Some(target) && self.state.depth_test == depth_test {
            return Ok(());
        }
        self.flush();
        let info = self
            .device
            .target_info(target)
            .ok_or(GpuError::InvalidHandle)?;
        self.device.bind_target(target, depth_test);
        self.state.render_target = Some(target);
        self.state.depth_test = depth_test;
        self.state.invalidate();
        let camera = Camera::ortho(info.width as f32, info.height as f32);
        self.device.set_projection(&camera);
        self.state.camera = Some(camera);
        Ok(())
    }

    /// Cross the 2D/3D pipeline boundary, invalidating all mirrored state
    pub fn set_device_mode(&mut self, mode: DeviceMode) {
        if self.state.mode == mode {
            return;
        }
        self.flush();
        self.device.set_device_parameters(mode);
        self.state.mode = mode;
        self.state.invalidate();
        self.state.render_target = None;
    }

    fn apply_shader(&mut self, shader: ShaderId) {
        if self.state.last_shader != Some(shader) {
            self.flush();
            self.device.bind_shader(shader);
            self.state.last_shader = Some(shader);
            // program change loses the transform uniform
            self.state.transform_valid = false;
        }
    }

    fn apply_transform(&mut self, xform: &Affine2D) {
        if !self.state.transform_valid || self.state.transform != *xform {
            self.flush();
            self.device.set_transform(xform);
            self.state.transform = *xform;
            self.state.transform_valid = true;
        }
    }

    fn apply_clip(&mut self, clip: Option<Rectangle>) {
        if self.state.clip != Some(clip) {
            self.flush();
            self.device.set_clip_rect(clip);
            self.state.clip = Some(clip);
        }
    }

    fn apply_composite(&mut self, mode: CompositeMode) {
        if self.state.composite != Some(mode) {
            self.flush();
            self.device.set_composite_mode(mode);
            self.state.composite = Some(mode);
        }
    }

    fn apply_texture(&mut self, unit: usize, tex: Option<TextureId>) {
        if self.state.textures[unit] != tex {
            self.flush();
            self.device.bind_texture(unit, tex);
            self.state.textures[unit] = tex;
        }
    }

    fn apply_constants(&mut self, shader: ShaderId, consts: &[f32; NUM_CONSTANTS]) {
        if !consts_equal(&self.state.constants, consts) {
            self.flush();
            self.device.set_shader_constant(shader, "consts", consts);
            self.state.constants = *consts;
        }
    }

    fn validate_common(
        &mut self,
        op: &DrawOp<'_>,
        shader: ShaderId,
        mask_tex: Option<TextureId>,
        paint_tex: Option<TextureId>,
        consts: &[f32; NUM_CONSTANTS],
    ) {
        self.apply_shader(shader);
        self.apply_transform(op.xform);
        self.apply_clip(op.clip);
        self.apply_composite(op.composite);
        self.apply_texture(0, mask_tex);
        self.apply_texture(1, paint_tex);
        self.apply_constants(shader, consts);
    }

    /// Validate state for one paint-driven draw op and set the vertex
    /// color. Returns the paint transform for emitters that map unit-1
    /// coordinates per vertex.
    pub fn validate_paint_op(
        &mut self,
        op: &DrawOp<'_>,
        mask: MaskType,
        mask_tex: Option<TextureId>,
        bounds: &RectBounds,
        mask_consts: &[f32],
    ) -> Result<Option<Affine2D>, GpuError> {
        if self.check_disposed() {
            return Ok(None);
        }
        self.drain_disposer();
        self.set_render_target(op.target, op.depth_test)?;

        let config = self
            .paint_helper
            .configure(&mut self.device, op.paint, bounds)?;

        let shader = match self.external_shader {
            Some(ext) => ext,
            None => self.stock_shader(mask, op.paint, op.depth_test)?,
        };

        let mut consts = config.consts;
        debug_assert!(mask_consts.len() <= 8);
        consts[..mask_consts.len()].copy_from_slice(mask_consts);

        self.validate_common(op, shader, mask_tex, config.texture, &consts);

        match op.paint {
            Paint::Color(c) => self.vb.set_color(*c, op.extra_alpha),
            _ => self.vb.set_color(Color::WHITE, op.extra_alpha),
        }
        Ok(config.paint_tx)
    }

    /// Validate state for a named special shader with explicit texture
    /// bindings (video planes, masked pixel blits)
    pub fn validate_special_op(
        &mut self,
        op: &DrawOp<'_>,
        name: &'static str,
        textures: &[Option<TextureId>; crate::device::MAX_TEXTURE_UNITS],
        mask_consts: &[f32],
    ) -> Result<(), GpuError> {
        if self.check_disposed() {
            return Ok(());
        }
        self.drain_disposer();
        self.set_render_target(op.target, op.depth_test)?;
        let shader = self.special_shader(name)?;
        let mut consts = [0.0; NUM_CONSTANTS];
        debug_assert!(mask_consts.len() <= 8);
        consts[..mask_consts.len()].copy_from_slice(mask_consts);
        self.validate_common(op, shader, textures[0], textures[1], &consts);
        for (unit, tex) in textures.iter().enumerate().skip(2) {
            self.apply_texture(unit, *tex);
        }
        match op.paint {
            Paint::Color(c) => self.vb.set_color(*c, op.extra_alpha),
            _ => self.vb.set_color(Color::WHITE, op.extra_alpha),
        }
        Ok(())
    }

    /// Validate state for the combined region-mask-plus-glyph shader
    /// (solid paints only; unit 0 is the region mask, unit 1 the glyph
    /// atlas, and that order is load-bearing)
    pub fn validate_super_op(
        &mut self,
        op: &DrawOp<'_>,
        region_tex: TextureId,
        glyph_tex: TextureId,
    ) -> Result<(), GpuError> {
        if self.check_disposed() {
            return Ok(());
        }
        debug_assert!(matches!(op.paint, Paint::Color(_)));
        self.drain_disposer();
        self.set_render_target(op.target, op.depth_test)?;
        let shader = self.special_shader("Super_Color")?;
        let consts = [0.0; NUM_CONSTANTS];
        self.validate_common(op, shader, Some(region_tex), Some(glyph_tex), &consts);
        match op.paint {
            Paint::Color(c) => self.vb.set_color(*c, op.extra_alpha),
            _ => self.vb.set_color(Color::WHITE, op.extra_alpha),
        }
        Ok(())
    }

    /// Validate state for the LCD final pass (samples the LCD scratch
    /// buffer, solid gamma-adjusted color)
    pub fn validate_lcd_op(
        &mut self,
        op: &DrawOp<'_>,
        lcd_tex: TextureId,
        text_color: Color,
    ) -> Result<(), GpuError> {
        if self.check_disposed() {
            return Ok(());
        }
        self.drain_disposer();
        self.set_render_target(op.target, op.depth_test)?;
        let shader = self.special_shader("LCD_Color")?;
        let consts = [0.0; NUM_CONSTANTS];
        self.validate_common(op, shader, Some(lcd_tex), None, &consts);
        let adjusted = text_color.powed(1.0 / self.settings.lcd_gamma);
        self.vb.set_color(adjusted, op.extra_alpha);
        Ok(())
    }

    /// Whether the super shader may combine this mask texture with glyphs
    pub fn is_glyph_cache_texture(&self, tex: TextureId) -> bool {
        self.grey_glyphs.owns_texture(tex) || self.lcd_glyphs.owns_texture(tex)
    }

    pub fn super_shader_allowed(&self) -> bool {
        self.settings.super_shader
    }

    // ── prim textures ───────────────────────────────────────────────────

    pub fn rect_prim_texture(&mut self) -> Result<&RectPrimTexture, GpuError> {
        if self.rect_tex.is_none() {
            let t = RectPrimTexture::create(&mut self.device, self.settings.prim_texture_size)?;
            self.rect_tex = Some(t);
        }
        Ok(self.rect_tex.as_ref().unwrap())
    }

    pub fn oval_prim_texture(&mut self) -> Result<&OvalPrimTexture, GpuError> {
        if self.oval_tex.is_none() {
            let t = OvalPrimTexture::create(&mut self.device, self.settings.prim_texture_size)?;
            self.oval_tex = Some(t);
        }
        Ok(self.oval_tex.as_ref().unwrap())
    }

    pub fn wrap_rect_texture(&mut self) -> Result<&WrapRectTexture, GpuError> {
        if self.wrap_tex.is_none() {
            let t = WrapRectTexture::create(&mut self.device)?;
            self.wrap_tex = Some(t);
        }
        Ok(self.wrap_tex.as_ref().unwrap())
    }

    /// Largest whole-pixel rect drawable through the ramp texture
    pub fn rect_texture_max_size(&mut self) -> Result<u32, GpuError> {
        Ok(self.rect_prim_texture()?.max_cell)
    }

    // ── scratch mask ────────────────────────────────────────────────────

    /// Upload a one-shot mask into the shared scratch texture, growing it
    /// as needed. Returns the texture and its physical dimensions.
    pub fn upload_scratch_mask(
        &mut self,
        mask: &MaskData,
    ) -> Result<(TextureId, u32, u32), GpuError> {
        let need_w = mask.width.next_power_of_two();
        let need_h = mask.height.next_power_of_two();
        let recreate = match self.scratch_mask {
            Some((_, w, h)) => w < need_w || h < need_h,
            None => true,
        };
        if recreate {
            if let Some((old, ..)) = self.scratch_mask.take() {
                // the scratch may be bound and batched; flush first
                self.flush();
                self.apply_texture(0, None);
                self.device.unlock_texture(old);
                self.device.dispose_texture(old);
            }
            let w = need_w.max(64);
            let h = need_h.max(64);
            let tex = self.device.create_texture(PixelFormat::Alpha8, w, h)?;
            self.device.lock_texture(tex);
            self.scratch_mask = Some((tex, w, h));
        }
        let (tex, w, h) = self.scratch_mask.unwrap();
        // an upload into a texture quads may still reference
        self.flush();
        self.device.upload_texture(
            tex,
            Rectangle::new(0, 0, mask.width as i32, mask.height as i32),
            &mask.alpha,
        )?;
        Ok((tex, w, h))
    }

    // ── LCD buffer ──────────────────────────────────────────────────────

    /// Scratch render target for the LCD glyph pass, sized to cover the
    /// bound target
    pub fn lcd_buffer(&mut self, min_w: u32, min_h: u32) -> Result<TargetId, GpuError> {
        let recreate = match self.lcd_buffer {
            Some((_, w, h)) => w < min_w || h < min_h,
            None => true,
        };
        if recreate {
            if let Some((old, ..)) = self.lcd_buffer.take() {
                self.device.dispose_render_target(old);
            }
            let w = min_w.next_power_of_two();
            let h = min_h.next_power_of_two();
            let target = self.device.create_render_target(w, h, false)?;
            self.lcd_buffer = Some((target, w, h));
        }
        Ok(self.lcd_buffer.unwrap().0)
    }

    // ── disposer ────────────────────────────────────────────────────────

    /// Drain deferred releases queued by reps that died off the render
    /// thread
    pub fn drain_disposer(&mut self) {
        while let Ok(record) = self.disposer_rx.try_recv() {
            if let Some(tex) = self.mask_cache.unref_by_record(&record) {
                self.device.unlock_texture(tex);
                self.device.dispose_texture(tex);
            }
        }
    }

    /// Tear down every GPU resource this context owns. Further draws are
    /// silent no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.flush();
        self.drain_disposer();
        for tex in self.mask_cache.clear() {
            self.device.unlock_texture(tex);
            self.device.dispose_texture(tex);
        }
        self.paint_helper.clear(&mut self.device);
        for arr in [&mut self.stock_shaders, &mut self.alpha_test_shaders] {
            for slot in arr.iter_mut() {
                if let Some(id) = slot.take() {
                    self.device.dispose_shader(id);
                }
            }
        }
        for (_, id) in self.special_shaders.drain() {
            self.device.dispose_shader(id);
        }
        if let Some(t) = self.rect_tex.take() {
            self.device.unlock_texture(t.tex);
            self.device.dispose_texture(t.tex);
        }
        if let Some(t) = self.oval_tex.take() {
            self.device.unlock_texture(t.tex);
            self.device.dispose_texture(t.tex);
        }
        if let Some(t) = self.wrap_tex.take() {
            self.device.unlock_texture(t.tex);
            self.device.dispose_texture(t.tex);
        }
        if let Some((tex, ..)) = self.scratch_mask.take() {
            self.device.unlock_texture(tex);
            self.device.dispose_texture(tex);
        }
        if let Some((target, ..)) = self.lcd_buffer.take() {
            self.device.dispose_render_target(target);
        }
        if let Some(tex) = self.grey_glyphs.reset() {
            self.device.unlock_texture(tex);
            self.device.dispose_texture(tex);
        }
        if let Some(tex) = self.lcd_glyphs.reset() {
            self.device.unlock_texture(tex);
            self.device.dispose_texture(tex);
        }
        self.disposed = true;
        info!("disposed shader context");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
