//! GPU rendering core
//!
//! The crate is split along the same seam as the backends it drives:
//!
//! - [`device`] defines the [`Device`](device::Device) trait, the handle
//!   types, and pixel/target descriptions. Backends implement it; the rest
//!   of the crate only talks through it.
//! - [`context`] owns the state mirror. Every draw validates against the
//!   committed device state and flushes the quad batch before any state
//!   transition, so redundant device calls never happen.
//! - [`graphics`] turns fills, strokes, textures and text into validated
//!   quads, picking per-primitive strategies (ramp textures, analytic mask
//!   shaders, rasterized masks).
//! - [`mask_cache`] shares rasterized coverage masks between nodes that
//!   draw the same shape repeatedly.
//! - [`trace`] is a recording device for tests; [`wgpu_backend`] (behind
//!   the `wgpu` feature) is the production backend.

pub mod context;
pub mod device;
pub mod glyph;
pub mod graphics;
pub mod mask_cache;
pub mod mask_type;
pub mod paint_helper;
pub mod prim_tex;
pub mod rasterizer;
pub mod settings;
pub mod shaders;
pub mod trace;
pub mod vertex;
#[cfg(feature = "wgpu")]
pub mod wgpu_backend;

pub use context::{DrawOp, ShaderContext};
pub use device::{
    Camera, Device, DeviceMode, GpuError, PixelFormat, ShaderId, TargetId, TargetInfo, TextureId,
    TextureInfo,
};
pub use glyph::{AaMode, FontStrike, GlyphBitmap, GlyphRun, PositionedGlyph};
pub use graphics::ShaderGraphics;
pub use mask_cache::{CachingShapeRep, InvalidationHandle, MaskCache};
pub use mask_type::MaskType;
pub use settings::GraphicsSettings;
pub use trace::{TraceDevice, TraceEvent};
#[cfg(feature = "wgpu")]
pub use wgpu_backend::WgpuDevice;
