//! Backend device abstraction
//!
//! The rendering core never talks to a GPU API directly; it drives a
//! `Device` through slotmap-keyed resource handles. Each state-setting hook
//! (`bind_shader`, `set_transform`, `set_clip_rect`, ...) must be invoked by
//! the caller only when the value actually changes — the context's `State`
//! mirror guarantees that, and the trace device verifies it in tests.

use glint_core::{Affine2D, CompositeMode, Rectangle};

use crate::vertex::Vertex;

slotmap::new_key_type! {
    /// Handle to a device texture
    pub struct TextureId;
    /// Handle to a compiled shader program
    pub struct ShaderId;
    /// Handle to a render target
    pub struct TargetId;
}

/// Error type for device and context operations
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter found")]
    AdapterNotFound,
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(String),
    #[error("no stock shader named `{0}`")]
    ShaderNotFound(String),
    #[error("shader compilation error: {0}")]
    ShaderCompile(String),
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("failed to create GPU resource: {0}")]
    ResourceCreation(String),
    #[error("stale resource handle")]
    InvalidHandle,
}

/// Texture pixel formats understood by the core
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Single-channel coverage/alpha
    Alpha8,
    /// Premultiplied RGBA, 8 bits per channel
    Rgba8,
    /// Virtual multi-plane video format (luma + 2 chroma planes, optional
    /// alpha plane); only valid for multi-texture draw ops
    MultiYCbCr420,
}

/// Plane indices for [`PixelFormat::MultiYCbCr420`] texture lists
pub const YCBCR_PLANE_LUMA: usize = 0;
pub const YCBCR_PLANE_CHROMA_BLUE: usize = 1;
pub const YCBCR_PLANE_CHROMA_RED: usize = 2;
pub const YCBCR_PLANE_ALPHA: usize = 3;

/// Dimensions and format of a texture
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureInfo {
    pub format: PixelFormat,
    /// Dimensions of the meaningful content
    pub content_width: u32,
    pub content_height: u32,
    /// Allocated dimensions (may be padded by the backend)
    pub physical_width: u32,
    pub physical_height: u32,
}

/// Dimensions and sampling configuration of a render target
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetInfo {
    pub width: u32,
    pub height: u32,
    pub msaa: bool,
}

/// 2D vs 3D device pipeline configuration
///
/// The two modes use incompatible depth/blend device setups; crossing the
/// boundary invalidates all mirrored state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceMode {
    TwoD,
    ThreeD,
}

/// Projection state for a render target
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub projection: [f32; 16],
}

impl Camera {
    /// Orthographic projection covering `width` x `height` device pixels,
    /// y-down, mapping to normalized device coordinates
    pub fn ortho(width: f32, height: f32) -> Self {
        let sx = if width > 0.0 { 2.0 / width } else { 0.0 };
        let sy = if height > 0.0 { -2.0 / height } else { 0.0 };
        Self {
            projection: [
                sx, 0.0, 0.0, 0.0, //
                0.0, sy, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                -1.0, 1.0, 0.0, 1.0,
            ],
        }
    }
}

/// Number of texture units the context mirrors
pub const MAX_TEXTURE_UNITS: usize = 4;

/// GPU backend interface
///
/// Resource methods may be called at any time on the render thread. State
/// hooks are only ever invoked by the shader context after a change was
/// detected, and `draw_quads` only after all state hooks for the batch have
/// been applied.
pub trait Device {
    // ── resources ───────────────────────────────────────────────────────

    fn create_texture(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureId, GpuError>;

    /// Upload `data` (tightly packed for the texture format) into a region
    /// of the texture's content area.
    fn upload_texture(
        &mut self,
        tex: TextureId,
        region: Rectangle,
        data: &[u8],
    ) -> Result<(), GpuError>;

    fn dispose_texture(&mut self, tex: TextureId);

    fn texture_info(&self, tex: TextureId) -> Option<TextureInfo>;

    /// Add a lock layer to a texture. Locked textures must not be evicted
    /// or resized by the backend. Permanent textures (gradient LUTs, prim
    /// ramp textures) are created locked and stay locked for their lifetime.
    fn lock_texture(&mut self, tex: TextureId);

    fn unlock_texture(&mut self, tex: TextureId);

    /// Whether the backing surface of a texture has been lost (device
    /// reset, surface eviction). Cached masks re-check this before reuse.
    fn texture_surface_lost(&self, tex: TextureId) -> bool;

    /// Create a render target that can also be sampled as a texture
    /// (see [`Device::target_texture`]).
    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        msaa: bool,
    ) -> Result<TargetId, GpuError>;

    fn dispose_render_target(&mut self, target: TargetId);

    fn target_info(&self, target: TargetId) -> Option<TargetInfo>;

    /// The texture view of a render target, for readback-style sampling.
    /// MSAA targets have no directly sampleable view and return `None`.
    fn target_texture(&self, target: TargetId) -> Option<TextureId>;

    fn create_stock_shader(&mut self, name: &str) -> Result<ShaderId, GpuError>;

    /// Whether a previously created shader is still usable. Slots holding
    /// invalid shaders are discarded and recreated lazily.
    fn shader_valid(&self, shader: ShaderId) -> bool;

    fn dispose_shader(&mut self, shader: ShaderId);

    /// Set a named shader constant (uniform). Unknown names are ignored by
    /// backends that pack constants differently.
    fn set_shader_constant(&mut self, shader: ShaderId, name: &str, values: &[f32]);

    // ── state hooks (invoked only on change) ────────────────────────────

    fn bind_target(&mut self, target: TargetId, depth_test: bool);

    fn bind_shader(&mut self, shader: ShaderId);

    fn set_projection(&mut self, camera: &Camera);

    fn set_transform(&mut self, xform: &Affine2D);

    fn set_clip_rect(&mut self, clip: Option<Rectangle>);

    fn set_composite_mode(&mut self, mode: CompositeMode);

    fn bind_texture(&mut self, unit: usize, tex: Option<TextureId>);

    fn set_device_parameters(&mut self, mode: DeviceMode);

    // ── submission ──────────────────────────────────────────────────────

    /// Submit a flushed batch of quad vertices (6 per quad) under the
    /// currently bound state.
    fn draw_quads(&mut self, vertices: &[Vertex]);
}

/// Bytes per pixel for a (single-plane) format
pub fn bytes_per_pixel(format: PixelFormat) -> u32 {
    match format {
        PixelFormat::Alpha8 => 1,
        PixelFormat::Rgba8 => 4,
        // planes are uploaded individually as Alpha8
        PixelFormat::MultiYCbCr420 => 1,
    }
}
