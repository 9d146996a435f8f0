use std::collections::HashMap;

use crate::render::context::{
    plan_draws, AttributeBinding, BufferHandle, DrawCall, DrawOp, GpuContext, ProgramHandle,
    ShaderHandle, ShaderStage, TextureHandle,
};
use crate::render::error::RenderError;
use crate::render::renderer::{POSITION_ATTRIBUTE, TEX_COORD_ATTRIBUTE};
use crate::render::shader::{self, CompiledShader, LinkedProgram};

struct SoftTexture {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

/// CPU rasterizer implementing the [`GpuContext`] contract.
///
/// Used when no GPU adapter is available. Shaders go through the same naga
/// validation as the wgpu backend; the fragment stage is fixed to a
/// nearest-neighbour texture lookup with premultiplied alpha blending.
pub struct SoftwareContext {
    next_id: u32,
    shaders: HashMap<ShaderHandle, CompiledShader>,
    programs: HashMap<ProgramHandle, LinkedProgram>,
    buffers: HashMap<BufferHandle, Vec<f32>>,
    textures: HashMap<TextureHandle, SoftTexture>,
    viewport: (u32, u32),
    framebuffer: Vec<u8>,
    texture_allocations: u64,
    submissions: u64,
}

#[derive(Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    u: f32,
    v: f32,
}

impl SoftwareContext {
    pub fn new(width: u32, height: u32) -> Self {
        let mut ctx = Self {
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            viewport: (0, 0),
            framebuffer: Vec::new(),
            texture_allocations: 0,
            submissions: 0,
        };
        ctx.set_viewport(width, height);
        ctx
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Current surface contents, row-major RGBA from the top-left corner.
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let (w, h) = self.viewport;
        if x >= w || y >= h {
            return None;
        }
        let i = ((y * w + x) * 4) as usize;
        let px = &self.framebuffer[i..i + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Objects created and not yet deleted.
    pub fn live_objects(&self) -> usize {
        self.shaders.len() + self.programs.len() + self.buffers.len() + self.textures.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_allocations(&self) -> u64 {
        self.texture_allocations
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    fn fetch(vertices: &[f32], attr: &AttributeBinding, index: u32) -> Option<[f32; 4]> {
        let base = ((index * attr.stride + attr.offset) / 4) as usize;
        let values = vertices.get(base..base + attr.components as usize)?;
        let mut out = [0.0, 0.0, 0.0, 1.0];
        out[..values.len()].copy_from_slice(values);
        Some(out)
    }

    fn rasterize(&mut self, call: &DrawCall) -> Result<(), RenderError> {
        let program = self
            .programs
            .get(&call.program)
            .ok_or_else(|| call.program.unknown())?;
        let vertices = self
            .buffers
            .get(&call.vertex_buffer)
            .ok_or_else(|| call.vertex_buffer.unknown())?;
        let texture = self
            .textures
            .get(&call.texture)
            .ok_or_else(|| call.texture.unknown())?;

        let enabled = |name: &str| {
            let location = program.attributes.get(name).copied();
            call.attributes
                .iter()
                .find(|a| Some(a.location) == location)
                .copied()
                .ok_or_else(|| RenderError::Draw(format!("attribute `{name}` not enabled")))
        };
        let position = enabled(POSITION_ATTRIBUTE)?;
        let tex_coord = enabled(TEX_COORD_ATTRIBUTE)?;

        let (w, h) = self.viewport;
        let mut strip = Vec::with_capacity(call.count as usize);
        for index in call.first..call.first + call.count {
            let (Some(p), Some(t)) = (
                Self::fetch(vertices, &position, index),
                Self::fetch(vertices, &tex_coord, index),
            ) else {
                return Err(RenderError::Draw(format!(
                    "vertex {index} is outside the bound buffer"
                )));
            };
            strip.push(ScreenVertex {
                x: (p[0] + 1.0) * 0.5 * w as f32,
                y: (1.0 - p[1]) * 0.5 * h as f32,
                u: t[0],
                v: t[1],
            });
        }

        for tri in strip.windows(3) {
            fill_triangle(&mut self.framebuffer, self.viewport, texture, [tri[0], tri[1], tri[2]]);
        }
        Ok(())
    }
}

fn edge(a: ScreenVertex, b: ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

fn fill_triangle(
    framebuffer: &mut [u8],
    (width, height): (u32, u32),
    texture: &SoftTexture,
    [a, b, c]: [ScreenVertex; 3],
) {
    let area = edge(a, b, c.x, c.y);
    if area.abs() < f32::EPSILON {
        return;
    }
    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
    let max_x = (a.x.max(b.x).max(c.x).ceil() as u32).min(width);
    let max_y = (a.y.max(b.y).max(c.y).ceil() as u32).min(height);

    for y in min_y..max_y {
        for x in min_x..max_x {
            let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
            let wa = edge(b, c, px, py) / area;
            let wb = edge(c, a, px, py) / area;
            let wc = edge(a, b, px, py) / area;
            if wa < 0.0 || wb < 0.0 || wc < 0.0 {
                continue;
            }
            let u = wa * a.u + wb * b.u + wc * c.u;
            let v = wa * a.v + wb * b.v + wc * c.v;
            let src = sample_nearest(texture, u, v);
            let i = ((y * width + x) * 4) as usize;
            blend_premultiplied(&mut framebuffer[i..i + 4], src);
        }
    }
}

fn sample_nearest(texture: &SoftTexture, u: f32, v: f32) -> [u8; 4] {
    let tx = ((u * texture.width as f32) as i64).clamp(0, texture.width as i64 - 1) as u32;
    let ty = ((v * texture.height as f32) as i64).clamp(0, texture.height as i64 - 1) as u32;
    let i = ((ty * texture.width + tx) * 4) as usize;
    let px = &texture.rgba[i..i + 4];
    [px[0], px[1], px[2], px[3]]
}

fn blend_premultiplied(dst: &mut [u8], src: [u8; 4]) {
    let keep = 255 - src[3] as u32;
    for (d, s) in dst.iter_mut().zip(src) {
        *d = (s as u32 + (*d as u32 * keep + 127) / 255).min(255) as u8;
    }
}

impl GpuContext for SoftwareContext {
    fn backend_name(&self) -> &'static str {
        "software"
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderHandle, RenderError> {
        let compiled = shader::compile(stage, source)?;
        let handle = ShaderHandle(self.next());
        self.shaders.insert(handle, compiled);
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
        let linked = shader::link(vs, fs)?;
        let handle = ProgramHandle(self.next());
        self.programs.insert(handle, linked);
        Ok(handle)
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs.get(&program)?.attributes.get(name).copied()
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs.get(&program)?.uniforms.get(name).copied()
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferHandle, RenderError> {
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, vertices.to_vec());
        Ok(handle)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureHandle, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::TextureSize { width, height });
        }
        let handle = TextureHandle(self.next());
        self.textures.insert(
            handle,
            SoftTexture {
                width,
                height,
                rgba: vec![0; (width * height * 4) as usize],
            },
        );
        self.texture_allocations += 1;
        Ok(handle)
    }

    fn upload_texture(&mut self, texture: TextureHandle, rgba: &[u8]) -> Result<(), RenderError> {
        let target = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| texture.unknown())?;
        if rgba.len() != target.rgba.len() {
            return Err(RenderError::UploadSize {
                width: target.width,
                height: target.height,
                expected: target.rgba.len(),
                actual: rgba.len(),
            });
        }
        target.rgba.copy_from_slice(rgba);
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.framebuffer = vec![0; width as usize * height as usize * 4];
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn submit(&mut self, ops: &[DrawOp]) -> Result<(), RenderError> {
        let plan = plan_draws(ops)?;
        for call in &plan.calls {
            if !self.programs.contains_key(&call.program) {
                return Err(call.program.unknown());
            }
            if !self.textures.contains_key(&call.texture) {
                return Err(call.texture.unknown());
            }
        }

        if let Some(color) = plan.clear {
            let px = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
            for chunk in self.framebuffer.chunks_exact_mut(4) {
                chunk.copy_from_slice(&px);
            }
        }
        for call in &plan.calls {
            self.rasterize(call)?;
        }
        self.submissions += 1;
        Ok(())
    }
}
