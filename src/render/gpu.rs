use std::borrow::Cow;
use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::render::context::{
    plan_draws, BufferHandle, DrawOp, GpuContext, ProgramHandle, ShaderHandle, ShaderStage,
    TextureHandle,
};
use crate::render::error::RenderError;
use crate::render::renderer::{
    POSITION_ATTRIBUTE, POSITION_COMPONENTS, TEX_COORD_ATTRIBUTE, TEX_COORD_COMPONENTS,
    TEX_COORD_OFFSET, VERTEX_STRIDE,
};
use crate::render::shader::{self, CompiledShader, LinkedProgram};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct Shader {
    compiled: CompiledShader,
    module: wgpu::ShaderModule,
}

struct Program {
    linked: LinkedProgram,
    pipeline: wgpu::RenderPipeline,
}

struct Texture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

/// Headless wgpu device rendering into an off-screen RGBA surface.
///
/// WGSL is validated with naga before it reaches wgpu, so a bad shader is a
/// [`RenderError`] rather than an uncaptured device error.
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    viewport: (u32, u32),
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    next_id: u32,
    shaders: HashMap<ShaderHandle, Shader>,
    programs: HashMap<ProgramHandle, Program>,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    textures: HashMap<TextureHandle, Texture>,
}

impl WgpuContext {
    /// Open the default adapter and create a `width` x `height` surface.
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        pollster::block_on(Self::new_async(width, height))
    }

    async fn new_async(width: u32, height: u32) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::Context(format!("no suitable GPU adapter: {e}")))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("edgecast device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RenderError::Context(format!("device request failed: {e}")))?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edgecast frame bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("edgecast quad pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("edgecast frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let (target, target_view) = Self::create_target(&device, width.max(1), height.max(1));
        tracing::info!("wgpu context on {adapter_name}");

        Ok(Self {
            device,
            queue,
            adapter_name,
            target,
            target_view,
            viewport: (width, height),
            bind_group_layout,
            pipeline_layout,
            sampler,
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
        })
    }

    fn create_target(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edgecast surface"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        (target, view)
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn surface(&self) -> &wgpu::Texture {
        &self.target
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn build_pipeline(
        &self,
        vertex: &Shader,
        fragment: &Shader,
        linked: &LinkedProgram,
    ) -> Result<wgpu::RenderPipeline, RenderError> {
        let location = |name: &str| {
            linked.attributes.get(name).copied().ok_or_else(|| {
                RenderError::ProgramLink(format!("vertex shader has no `{name}` input"))
            })
        };
        let attributes = [
            wgpu::VertexAttribute {
                format: vertex_format(POSITION_COMPONENTS),
                offset: 0,
                shader_location: location(POSITION_ATTRIBUTE)?,
            },
            wgpu::VertexAttribute {
                format: vertex_format(TEX_COORD_COMPONENTS),
                offset: u64::from(TEX_COORD_OFFSET),
                shader_location: location(TEX_COORD_ATTRIBUTE)?,
            },
        ];
        let layout = wgpu::VertexBufferLayout {
            array_stride: u64::from(VERTEX_STRIDE),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        };

        Ok(self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("edgecast quad pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(ShaderStage::Vertex.entry_point()),
                    compilation_options: Default::default(),
                    buffers: &[layout],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment.module,
                    entry_point: Some(ShaderStage::Fragment.entry_point()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            }))
    }
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

impl GpuContext for WgpuContext {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderHandle, RenderError> {
        let compiled = shader::compile(stage, source)?;
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(stage.entry_point()),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(compiled.source.clone())),
            });
        let handle = ShaderHandle(self.next());
        self.shaders.insert(handle, Shader { compiled, module });
        Ok(handle)
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, RenderError> {
        let vs = self.shaders.get(&vertex).ok_or_else(|| vertex.unknown())?;
        let fs = self.shaders.get(&fragment).ok_or_else(|| fragment.unknown())?;
        let linked = shader::link(&vs.compiled, &fs.compiled)?;
        let pipeline = self.build_pipeline(vs, fs, &linked)?;
        let handle = ProgramHandle(self.next());
        self.programs.insert(handle, Program { linked, pipeline });
        Ok(handle)
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs.get(&program)?.linked.attributes.get(name).copied()
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs.get(&program)?.linked.uniforms.get(name).copied()
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferHandle, RenderError> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("edgecast quad vbo"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureHandle, RenderError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::TextureSize { width, height });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edgecast frame texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("edgecast frame bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        let handle = TextureHandle(self.next());
        self.textures.insert(
            handle,
            Texture {
                texture,
                bind_group,
                width,
                height,
            },
        );
        Ok(handle)
    }

    fn upload_texture(&mut self, texture: TextureHandle, rgba: &[u8]) -> Result<(), RenderError> {
        let target = self.textures.get(&texture).ok_or_else(|| texture.unknown())?;
        let expected = target.width as usize * target.height as usize * 4;
        if rgba.len() != expected {
            return Err(RenderError::UploadSize {
                width: target.width,
                height: target.height,
                expected,
                actual: rgba.len(),
            });
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(target.width * 4),
                rows_per_image: Some(target.height),
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if let Some(texture) = self.textures.remove(&texture) {
            texture.texture.destroy();
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        let (w, h) = (width.max(1), height.max(1));
        if (self.target.width(), self.target.height()) != (w, h) {
            self.target.destroy();
            let (target, view) = Self::create_target(&self.device, w, h);
            self.target = target;
            self.target_view = view;
        }
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn submit(&mut self, ops: &[DrawOp]) -> Result<(), RenderError> {
        let plan = plan_draws(ops)?;
        let mut resolved = Vec::with_capacity(plan.calls.len());
        for call in &plan.calls {
            let program = self
                .programs
                .get(&call.program)
                .ok_or_else(|| call.program.unknown())?;
            let buffer = self
                .buffers
                .get(&call.vertex_buffer)
                .ok_or_else(|| call.vertex_buffer.unknown())?;
            let texture = self
                .textures
                .get(&call.texture)
                .ok_or_else(|| call.texture.unknown())?;
            if call.attributes.iter().any(|a| a.stride != VERTEX_STRIDE) {
                return Err(RenderError::Draw(format!(
                    "pipeline expects a {VERTEX_STRIDE}-byte vertex stride"
                )));
            }
            resolved.push((program, buffer, texture, call.first, call.count));
        }

        let load = match plan.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("edgecast frame encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("edgecast frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            let (w, h) = self.viewport;
            rpass.set_viewport(0.0, 0.0, w.max(1) as f32, h.max(1) as f32, 0.0, 1.0);
            for (program, buffer, texture, first, count) in resolved {
                rpass.set_pipeline(&program.pipeline);
                rpass.set_bind_group(0, &texture.bind_group, &[]);
                rpass.set_vertex_buffer(0, buffer.slice(..));
                rpass.draw(first..first + count, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
