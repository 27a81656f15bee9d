//! wgpu backend
//!
//! An offscreen [`Device`] implementation over wgpu. All targets render
//! into `Rgba8Unorm` color attachments (premultiplied alpha); stock shader
//! WGSL is assembled by [`crate::shaders`] and compiled on first use.
//!
//! Pipelines are cached per (shader, composite mode, sample count, depth)
//! since wgpu bakes blend state and multisampling into the pipeline object.

use std::collections::HashMap;

use glint_core::{Affine2D, CompositeMode, Rectangle};
use slotmap::SlotMap;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::device::{
    bytes_per_pixel, Camera, Device, DeviceMode, GpuError, PixelFormat, ShaderId, TargetId,
    TargetInfo, TextureId, TextureInfo,
};
use crate::shaders::stock_shader_source;
use crate::vertex::Vertex;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const MSAA_SAMPLES: u32 = 4;

/// Globals uniform layout: projection + transform + 4 constant vec4s
const GLOBALS_SIZE: u64 = 64 + 64 + 64;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    info: TextureInfo,
    locks: u32,
}

struct GpuTarget {
    view: wgpu::TextureView,
    /// Single-sample resolve/content texture, absent for pure MSAA targets
    sample_tex: Option<TextureId>,
    depth_view: wgpu::TextureView,
    info: TargetInfo,
    // attachments must outlive their views; the color texture lives in
    // the sample map instead when the target is sampleable
    _color: Option<wgpu::Texture>,
    _depth: wgpu::Texture,
}

struct GpuShader {
    module: wgpu::ShaderModule,
    name: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    shader: ShaderId,
    composite: CompositeMode,
    samples: u32,
    depth_test: bool,
}

/// Offscreen wgpu rendering device
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    textures: SlotMap<TextureId, GpuTexture>,
    targets: SlotMap<TargetId, GpuTarget>,
    shaders: SlotMap<ShaderId, GpuShader>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    globals_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    globals_buf: wgpu::Buffer,
    globals_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    /// 1x1 white fallback bound to units with no texture
    _white_tex: wgpu::Texture,
    white_view: wgpu::TextureView,
    // mirrored render state, committed at draw_quads
    cur_target: Option<TargetId>,
    cur_shader: Option<ShaderId>,
    cur_composite: CompositeMode,
    cur_clip: Option<Rectangle>,
    cur_textures: [Option<TextureId>; crate::device::MAX_TEXTURE_UNITS],
    cur_depth_test: bool,
    projection: [f32; 16],
    transform: [f32; 16],
    constants: [f32; 16],
    globals_dirty: bool,
}

fn mat4_from_affine(t: &Affine2D) -> [f32; 16] {
    let [a, b, c, d, tx, ty] = t.elements;
    [
        a, b, 0.0, 0.0, //
        c, d, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        tx, ty, 0.0, 1.0,
    ]
}

fn blend_state(mode: CompositeMode) -> wgpu::BlendState {
    use wgpu::{BlendComponent, BlendFactor, BlendOperation};
    let comp = |src, dst| BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation: BlendOperation::Add,
    };
    // all colors are premultiplied
    match mode {
        CompositeMode::Clear => wgpu::BlendState {
            color: comp(BlendFactor::Zero, BlendFactor::Zero),
            alpha: comp(BlendFactor::Zero, BlendFactor::Zero),
        },
        CompositeMode::Src => wgpu::BlendState {
            color: comp(BlendFactor::One, BlendFactor::Zero),
            alpha: comp(BlendFactor::One, BlendFactor::Zero),
        },
        CompositeMode::SrcOver => wgpu::BlendState {
            color: comp(BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
            alpha: comp(BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
        },
        CompositeMode::DstOut => wgpu::BlendState {
            color: comp(BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha),
            alpha: comp(BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha),
        },
        CompositeMode::Add => wgpu::BlendState {
            color: comp(BlendFactor::One, BlendFactor::One),
            alpha: comp(BlendFactor::One, BlendFactor::One),
        },
    }
}

fn texture_format(format: PixelFormat) -> Result<wgpu::TextureFormat, GpuError> {
    match format {
        PixelFormat::Alpha8 => Ok(wgpu::TextureFormat::R8Unorm),
        PixelFormat::Rgba8 => Ok(wgpu::TextureFormat::Rgba8Unorm),
        PixelFormat::MultiYCbCr420 => Err(GpuError::UnsupportedFormat(format)),
    }
}

const VERTEX_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<Vertex>() as u64,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x4,
        2 => Float32x2,
        3 => Float32x2,
    ],
};

impl WgpuDevice {
    /// Acquire an adapter and device, blocking on the async wgpu setup
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::AdapterNotFound)?;
        info!(adapter = %adapter.get_info().name, "acquired GPU adapter");
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("glint device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
            },
            None,
        ))
        .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(GLOBALS_SIZE),
                },
                count: None,
            }],
        });
        let mut texture_entries = Vec::new();
        for unit in 0..crate::device::MAX_TEXTURE_UNITS as u32 {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: unit * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: unit * 2 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture layout"),
            entries: &texture_entries,
        });

        let globals_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("globals"),
            size: GLOBALS_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals group"),
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buf.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("linear clamp"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white_tex = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("white fallback"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &white_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255u8, 255, 255, 255],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let white_view = white_tex.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            device,
            queue,
            textures: SlotMap::with_key(),
            targets: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: HashMap::new(),
            globals_layout,
            texture_layout,
            globals_buf,
            globals_group,
            sampler,
            _white_tex: white_tex,
            white_view,
            cur_target: None,
            cur_shader: None,
            cur_composite: CompositeMode::SrcOver,
            cur_clip: None,
            cur_textures: [None; crate::device::MAX_TEXTURE_UNITS],
            cur_depth_test: false,
            projection: mat4_from_affine(&Affine2D::IDENTITY),
            transform: mat4_from_affine(&Affine2D::IDENTITY),
            constants: [0.0; 16],
            globals_dirty: true,
        })
    }

    fn pipeline(&mut self, key: PipelineKey) -> Result<&wgpu::RenderPipeline, GpuError> {
        if !self.pipelines.contains_key(&key) {
            let shader = self.shaders.get(key.shader).ok_or(GpuError::InvalidHandle)?;
            debug!(shader = %shader.name, ?key.composite, "building pipeline");
            let layout = self
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("glint pipeline layout"),
                    bind_group_layouts: &[&self.globals_layout, &self.texture_layout],
                    push_constant_ranges: &[],
                });
            let targets = [Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: Some(blend_state(key.composite)),
                write_mask: wgpu::ColorWrites::ALL,
            })];
            let pipeline = self
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(&shader.name),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &shader.module,
                        entry_point: Some("vs_main"),
                        buffers: &[VERTEX_LAYOUT],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader.module,
                        entry_point: Some("fs_main"),
                        targets: &targets,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: wgpu::TextureFormat::Depth32Float,
                        depth_write_enabled: key.depth_test,
                        depth_compare: if key.depth_test {
                            wgpu::CompareFunction::LessEqual
                        } else {
                            wgpu::CompareFunction::Always
                        },
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    multisample: wgpu::MultisampleState {
                        count: key.samples,
                        mask: !0,
                        alpha_to_coverage_enabled: false,
                    },
                    multiview: None,
                    cache: None,
                });
            self.pipelines.insert(key, pipeline);
        }
        Ok(&self.pipelines[&key])
    }

    fn texture_group(&self) -> wgpu::BindGroup {
        let mut entries = Vec::new();
        let views: Vec<&wgpu::TextureView> = self
            .cur_textures
            .iter()
            .map(|t| {
                t.and_then(|id| self.textures.get(id))
                    .map(|t| &t.view)
                    .unwrap_or(&self.white_view)
            })
            .collect();
        for (unit, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (unit * 2) as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: (unit * 2 + 1) as u32,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texture group"),
            layout: &self.texture_layout,
            entries: &entries,
        })
    }

    fn flush_globals(&mut self) {
        if !self.globals_dirty {
            return;
        }
        let mut data = [0.0f32; 48];
        data[..16].copy_from_slice(&self.projection);
        data[16..32].copy_from_slice(&self.transform);
        data[32..].copy_from_slice(&self.constants);
        self.queue
            .write_buffer(&self.globals_buf, 0, bytemuck::cast_slice(&data));
        self.globals_dirty = false;
    }
}

impl Device for WgpuDevice {
    fn create_texture(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureId, GpuError> {
        let wgpu_format = texture_format(format)?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glint texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let info = TextureInfo {
            format,
            content_width: width,
            content_height: height,
            physical_width: width,
            physical_height: height,
        };
        Ok(self.textures.insert(GpuTexture {
            texture,
            view,
            info,
            locks: 0,
        }))
    }

    fn upload_texture(
        &mut self,
        tex: TextureId,
        region: Rectangle,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let t = self.textures.get(tex).ok_or(GpuError::InvalidHandle)?;
        let bpp = bytes_per_pixel(t.info.format);
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &t.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x as u32,
                    y: region.y as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(region.width as u32 * bpp),
                rows_per_image: Some(region.height as u32),
            },
            wgpu::Extent3d {
                width: region.width as u32,
                height: region.height as u32,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn dispose_texture(&mut self, tex: TextureId) {
        self.textures.remove(tex);
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
        // wgpu owns its allocations; textures survive until disposed
        !self.textures.contains_key(tex)
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        msaa: bool,
    ) -> Result<TargetId, GpuError> {
        let samples = if msaa { MSAA_SAMPLES } else { 1 };
        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glint target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: samples,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: if msaa {
                wgpu::TextureUsages::RENDER_ATTACHMENT
            } else {
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
            },
            view_formats: &[],
        });
        let view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glint target depth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: samples,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        let (sample_tex, color_keepalive) = if msaa {
            (None, Some(color))
        } else {
            let info = TextureInfo {
                format: PixelFormat::Rgba8,
                content_width: width,
                content_height: height,
                physical_width: width,
                physical_height: height,
            };
            let tex_view = color.create_view(&wgpu::TextureViewDescriptor::default());
            // registered as a texture so the core can sample the target;
            // the sample map owns the color texture from here on
            let id = self.textures.insert(GpuTexture {
                texture: color,
                view: tex_view,
                info,
                locks: 1,
            });
            (Some(id), None)
        };
        let info = TargetInfo {
            width,
            height,
            msaa,
        };
        Ok(self.targets.insert(GpuTarget {
            view,
            sample_tex,
            depth_view,
            info,
            _color: color_keepalive,
            _depth: depth,
        }))
    }

    fn dispose_render_target(&mut self, target: TargetId) {
        if let Some(t) = self.targets.remove(target) {
            if let Some(tex) = t.sample_tex {
                self.textures.remove(tex);
            }
        }
    }

    fn target_info(&self, target: TargetId) -> Option<TargetInfo> {
        self.targets.get(target).map(|t| t.info)
    }

    fn target_texture(&self, target: TargetId) -> Option<TextureId> {
        self.targets.get(target).and_then(|t| t.sample_tex)
    }

    fn create_stock_shader(&mut self, name: &str) -> Result<ShaderId, GpuError> {
        let source =
            stock_shader_source(name).ok_or_else(|| GpuError::ShaderNotFound(name.to_owned()))?;
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        Ok(self.shaders.insert(GpuShader {
            module,
            name: name.to_owned(),
        }))
    }

    fn shader_valid(&self, shader: ShaderId) -> bool {
        self.shaders.contains_key(shader)
    }

    fn dispose_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(shader);
        self.pipelines.retain(|k, _| k.shader != shader);
    }

    fn set_shader_constant(&mut self, _shader: ShaderId, name: &str, values: &[f32]) {
        if name == "consts" {
            let n = values.len().min(16);
            self.constants[..n].copy_from_slice(&values[..n]);
            self.globals_dirty = true;
        }
    }

    fn bind_target(&mut self, target: TargetId, depth_test: bool) {
        self.cur_target = Some(target);
        self.cur_depth_test = depth_test;
    }

    fn bind_shader(&mut self, shader: ShaderId) {
        self.cur_shader = Some(shader);
    }

    fn set_projection(&mut self, camera: &Camera) {
        self.projection = camera.projection;
        self.globals_dirty = true;
    }

    fn set_transform(&mut self, xform: &Affine2D) {
        self.transform = mat4_from_affine(xform);
        self.globals_dirty = true;
    }

    fn set_clip_rect(&mut self, clip: Option<Rectangle>) {
        self.cur_clip = clip;
    }

    fn set_composite_mode(&mut self, mode: CompositeMode) {
        self.cur_composite = mode;
    }

    fn bind_texture(&mut self, unit: usize, tex: Option<TextureId>) {
        self.cur_textures[unit] = tex;
    }

    fn set_device_parameters(&mut self, _mode: DeviceMode) {
        // 2D and 3D share one pipeline family here; depth state is keyed
        // per draw
    }

    fn draw_quads(&mut self, vertices: &[Vertex]) {
        let (Some(target_id), Some(shader)) = (self.cur_target, self.cur_shader) else {
            return;
        };
        let Some(target) = self.targets.get(target_id) else {
            return;
        };
        let samples = if target.info.msaa { MSAA_SAMPLES } else { 1 };
        let key = PipelineKey {
            shader,
            composite: self.cur_composite,
            samples,
            depth_test: self.cur_depth_test,
        };
        let (width, height) = (target.info.width, target.info.height);
        self.flush_globals();
        if self.pipeline(key).is_err() {
            return;
        }
        let bind_group = self.texture_group();
        let vbuf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad batch"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("glint batch"),
            });
        {
            let target = &self.targets[target_id];
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glint quads"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines[&key]);
            pass.set_bind_group(0, &self.globals_group, &[]);
            pass.set_bind_group(1, &bind_group, &[]);
            if let Some(clip) = self.cur_clip {
                let x = clip.x.clamp(0, width as i32) as u32;
                let y = clip.y.clamp(0, height as i32) as u32;
                let w = (clip.width.max(0) as u32).min(width - x);
                let h = (clip.height.max(0) as u32).min(height - y);
                if w == 0 || h == 0 {
                    return;
                }
                pass.set_scissor_rect(x, y, w, h);
            }
            pass.set_vertex_buffer(0, vbuf.slice(..));
            pass.draw(0..vertices.len() as u32, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }
}
