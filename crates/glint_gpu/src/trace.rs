//! Recording device backend
//!
//! `TraceDevice` implements [`Device`] against in-memory tables and records
//! every call as a [`TraceEvent`]. Tests drive the context and graphics
//! layers against it and assert on the exact device traffic: which state
//! hooks fired, in what order, and how many quads each flush carried.
//!
//! It also simulates the two failure modes the context must survive:
//! shader invalidation (slots are recreated lazily) and lost texture
//! surfaces (cached masks are re-rasterized).

use glint_core::{Affine2D, CompositeMode, Rectangle};
use slotmap::SlotMap;

use crate::device::{
    bytes_per_pixel, Camera, Device, DeviceMode, GpuError, PixelFormat, ShaderId, TargetId,
    TargetInfo, TextureId, TextureInfo,
};
use crate::shaders::stock_shader_source;
use crate::vertex::Vertex;

/// One recorded device call
#[derive(Clone, Debug, PartialEq)]
pub enum TraceEvent {
    CreateTexture(TextureId),
    UploadTexture(TextureId),
    DisposeTexture(TextureId),
    CreateShader(String),
    DisposeShader(ShaderId),
    SetConstants(ShaderId),
    BindTarget(TargetId),
    BindShader(ShaderId),
    SetProjection,
    SetTransform(Affine2D),
    SetClip(Option<Rectangle>),
    SetComposite(CompositeMode),
    BindTexture(usize, Option<TextureId>),
    SetDeviceParameters(DeviceMode),
    /// Vertex count of a submitted batch
    DrawQuads(usize),
}

struct TraceTexture {
    info: TextureInfo,
    locks: u32,
    lost: bool,
}

struct TraceShader {
    name: String,
    valid: bool,
}

struct TraceTarget {
    info: TargetInfo,
    tex: Option<TextureId>,
}

/// In-memory [`Device`] that records all calls
#[derive(Default)]
pub struct TraceDevice {
    textures: SlotMap<TextureId, TraceTexture>,
    shaders: SlotMap<ShaderId, TraceShader>,
    targets: SlotMap<TargetId, TraceTarget>,
    events: Vec<TraceEvent>,
    /// Pad texture allocations to powers of two, like real backends do
    pub pad_textures: bool,
}

impl TraceDevice {
    pub fn new() -> Self {
        Self {
            pad_textures: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn count(&self, pred: impl Fn(&TraceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Simulate a driver-side shader loss; the context must recreate the
    /// slot on next use
    pub fn invalidate_shader(&mut self, shader: ShaderId) {
        if let Some(s) = self.shaders.get_mut(shader) {
            s.valid = false;
        }
    }

    /// Invalidate every shader whose stock name matches
    pub fn invalidate_shaders_named(&mut self, name: &str) {
        for (_, s) in self.shaders.iter_mut() {
            if s.name == name {
                s.valid = false;
            }
        }
    }

    /// Simulate surface eviction of a texture
    pub fn lose_surface(&mut self, tex: TextureId) {
        if let Some(t) = self.textures.get_mut(tex) {
            t.lost = true;
        }
    }

    pub fn shader_name(&self, shader: ShaderId) -> Option<&str> {
        self.shaders.get(shader).map(|s| s.name.as_str())
    }

    pub fn texture_locks(&self, tex: TextureId) -> u32 {
        self.textures.get(tex).map(|t| t.locks).unwrap_or(0)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    fn physical(&self, extent: u32) -> u32 {
        if self.pad_textures {
            extent.next_power_of_two()
        } else {
            extent
        }
    }
}

impl Device for TraceDevice {
    fn create_texture(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureId, GpuError> {
        if format == PixelFormat::MultiYCbCr420 {
            return Err(GpuError::UnsupportedFormat(format));
        }
        let info = TextureInfo {
            format,
            content_width: width,
            content_height: height,
            physical_width: self.physical(width),
            physical_height: self.physical(height),
        };
        let id = self.textures.insert(TraceTexture {
            info,
            locks: 0,
            lost: false,
        });
        self.events.push(TraceEvent::CreateTexture(id));
        Ok(id)
    }

    fn upload_texture(
        &mut self,
        tex: TextureId,
        region: Rectangle,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let t = self.textures.get(tex).ok_or(GpuError::InvalidHandle)?;
        let expected =
            region.width as usize * region.height as usize * bytes_per_pixel(t.info.format) as usize;
        if data.len() != expected {
            return Err(GpuError::ResourceCreation(format!(
                "upload size mismatch: got {} bytes, region needs {expected}",
                data.len()
            )));
        }
        self.events.push(TraceEvent::UploadTexture(tex));
        Ok(())
    }

    fn dispose_texture(&mut self, tex: TextureId) {
        self.textures.remove(tex);
        self.events.push(TraceEvent::DisposeTexture(tex));
    }

    fn texture_info(&self, tex: TextureId) -> Option<TextureInfo> {
        self.textures.get(tex).map(|t| t.info)
    }

    fn lock_texture(&mut self, tex: TextureId) {
        if let Some(t) = self.textures.get_mut(tex) {
            t.locks += 1;
        }
    }

    fn unlock_texture(&mut self, tex: TextureId) {
        if let Some(t) = self.textures.get_mut(tex) {
            t.locks = t.locks.saturating_sub(1);
        }
    }

    fn texture_surface_lost(&self, tex: TextureId) -> bool {
        self.textures.get(tex).map(|t| t.lost).unwrap_or(true)
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        msaa: bool,
    ) -> Result<TargetId, GpuError> {
        // MSAA targets have no sampleable view
        let tex = if msaa {
            None
        } else {
            Some(self.create_texture(PixelFormat::Rgba8, width, height)?)
        };
        let info = TargetInfo {
            width,
            height,
            msaa,
        };
        Ok(self.targets.insert(TraceTarget { info, tex }))
    }

    fn dispose_render_target(&mut self, target: TargetId) {
        if let Some(t) = self.targets.remove(target) {
            if let Some(tex) = t.tex {
                self.dispose_texture(tex);
            }
        }
    }

    fn target_info(&self, target: TargetId) -> Option<TargetInfo> {
        self.targets.get(target).map(|t| t.info)
    }

    fn target_texture(&self, target: TargetId) -> Option<TextureId> {
        self.targets.get(target).and_then(|t| t.tex)
    }

    fn create_stock_shader(&mut self, name: &str) -> Result<ShaderId, GpuError> {
        if stock_shader_source(name).is_none() {
            return Err(GpuError::ShaderNotFound(name.to_owned()));
        }
        let id = self.shaders.insert(TraceShader {
            name: name.to_owned(),
            valid: true,
        });
        self.events.push(TraceEvent::CreateShader(name.to_owned()));
        Ok(id)
    }

    fn shader_valid(&self, shader: ShaderId) -> bool {
        self.shaders.get(shader).map(|s| s.valid).unwrap_or(false)
    }

    fn dispose_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(shader);
        self.events.push(TraceEvent::DisposeShader(shader));
    }

    fn set_shader_constant(&mut self, shader: ShaderId, _name: &str, _values: &[f32]) {
        self.events.push(TraceEvent::SetConstants(shader));
    }

    fn bind_target(&mut self, target: TargetId, _depth_test: bool) {
        self.events.push(TraceEvent::BindTarget(target));
    }

    fn bind_shader(&mut self, shader: ShaderId) {
        self.events.push(TraceEvent::BindShader(shader));
    }

    fn set_projection(&mut self, _camera: &Camera) {
        self.events.push(TraceEvent::SetProjection);
    }

    fn set_transform(&mut self, xform: &Affine2D) {
        self.events.push(TraceEvent::SetTransform(*xform));
    }

    fn set_clip_rect(&mut self, clip: Option<Rectangle>) {
        self.events.push(TraceEvent::SetClip(clip));
    }

    fn set_composite_mode(&mut self, mode: CompositeMode) {
        self.events.push(TraceEvent::SetComposite(mode));
    }

    fn bind_texture(&mut self, unit: usize, tex: Option<TextureId>) {
        self.events.push(TraceEvent::BindTexture(unit, tex));
    }

    fn set_device_parameters(&mut self, mode: DeviceMode) {
        self.events.push(TraceEvent::SetDeviceParameters(mode));
    }

    fn draw_quads(&mut self, vertices: &[Vertex]) {
        self.events.push(TraceEvent::DrawQuads(vertices.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_padding() {
        let mut d = TraceDevice::new();
        let t = d.create_texture(PixelFormat::Alpha8, 100, 40).unwrap();
        let info = d.texture_info(t).unwrap();
        assert_eq!(info.content_width, 100);
        assert_eq!(info.physical_width, 128);
        assert_eq!(info.physical_height, 64);
    }

    #[test]
    fn test_upload_size_checked() {
        let mut d = TraceDevice::new();
        let t = d.create_texture(PixelFormat::Rgba8, 4, 4).unwrap();
        let ok = d.upload_texture(t, Rectangle::new(0, 0, 2, 2), &[0u8; 16]);
        assert!(ok.is_ok());
        let bad = d.upload_texture(t, Rectangle::new(0, 0, 2, 2), &[0u8; 15]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_msaa_target_has_no_texture() {
        let mut d = TraceDevice::new();
        let plain = d.create_render_target(64, 64, false).unwrap();
        let msaa = d.create_render_target(64, 64, true).unwrap();
        assert!(d.target_texture(plain).is_some());
        assert!(d.target_texture(msaa).is_none());
    }

    #[test]
    fn test_unknown_shader_rejected() {
        let mut d = TraceDevice::new();
        assert!(matches!(
            d.create_stock_shader("Nope_Color"),
            Err(GpuError::ShaderNotFound(_))
        ));
    }

    #[test]
    fn test_shader_invalidation() {
        let mut d = TraceDevice::new();
        let s = d.create_stock_shader("Solid_Color").unwrap();
        assert!(d.shader_valid(s));
        d.invalidate_shader(s);
        assert!(!d.shader_valid(s));
    }
}
