use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::camera::types::ConvertedFrame;
use crate::preview::mailbox::Mailbox;
use crate::render::context::{
    BufferHandle, DrawOp, GpuContext, ProgramHandle, ShaderStage, TextureHandle,
};
use crate::render::error::RenderError;
use crate::render::shader::ShaderSources;

pub const POSITION_ATTRIBUTE: &str = "position";
pub const TEX_COORD_ATTRIBUTE: &str = "tex_coord";
pub const SAMPLER_UNIFORM: &str = "frame_texture";

/// Interleaved X, Y, Z, U, V.
pub const FLOATS_PER_VERTEX: usize = 5;
pub const VERTEX_STRIDE: u32 = (FLOATS_PER_VERTEX * std::mem::size_of::<f32>()) as u32;
pub const POSITION_COMPONENTS: u32 = 3;
pub const TEX_COORD_COMPONENTS: u32 = 2;
pub const TEX_COORD_OFFSET: u32 = POSITION_COMPONENTS * std::mem::size_of::<f32>() as u32;
pub const QUAD_VERTEX_COUNT: u32 = 4;
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Full-screen triangle strip. Texture row 0 lands at the top of the surface.
#[rustfmt::skip]
pub const QUAD_VERTICES: [f32; FLOATS_PER_VERTEX * QUAD_VERTEX_COUNT as usize] = [
    -1.0, -1.0, 0.0,   0.0, 1.0,
     1.0, -1.0, 0.0,   1.0, 1.0,
    -1.0,  1.0, 0.0,   0.0, 0.0,
     1.0,  1.0, 0.0,   1.0, 0.0,
];

/// The fixed per-tick command sequence for drawing the frame quad.
pub fn quad_draw_list(
    program: ProgramHandle,
    quad: BufferHandle,
    texture: TextureHandle,
    position: u32,
    tex_coord: u32,
    sampler: u32,
) -> [DrawOp; 10] {
    [
        DrawOp::Clear { rgba: CLEAR_COLOR },
        DrawOp::UseProgram(program),
        DrawOp::BindVertexBuffer(quad),
        DrawOp::EnableAttribute {
            location: position,
            components: POSITION_COMPONENTS,
            stride: VERTEX_STRIDE,
            offset: 0,
        },
        DrawOp::EnableAttribute {
            location: tex_coord,
            components: TEX_COORD_COMPONENTS,
            stride: VERTEX_STRIDE,
            offset: TEX_COORD_OFFSET,
        },
        DrawOp::BindTexture { unit: 0, texture },
        DrawOp::SetSampler {
            location: sampler,
            unit: 0,
        },
        DrawOp::DrawTriangleStrip {
            first: 0,
            count: QUAD_VERTEX_COUNT,
        },
        DrawOp::DisableAttribute { location: position },
        DrawOp::DisableAttribute {
            location: tex_coord,
        },
    ]
}

/// Renderer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RendererState {
    Uninitialized,
    SurfaceReady,
    Rendering,
    Released,
}

impl RendererState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RendererState::SurfaceReady,
            2 => RendererState::Rendering,
            3 => RendererState::Released,
            _ => RendererState::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RendererState::Uninitialized => 0,
            RendererState::SurfaceReady => 1,
            RendererState::Rendering => 2,
            RendererState::Released => 3,
        }
    }
}

/// Counters published by the renderer for other threads to read.
#[derive(Debug, Default)]
pub struct RenderCounters {
    state: AtomicU8,
    generation: AtomicU64,
    texture_allocations: AtomicU64,
    uploads: AtomicU64,
    draws: AtomicU64,
    stale_rejections: AtomicU64,
    out_of_order: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSnapshot {
    pub state: RendererState,
    pub generation: u64,
    pub texture_allocations: u64,
    pub uploads: u64,
    pub draws: u64,
    pub stale_rejections: u64,
    pub out_of_order: u64,
}

impl RenderCounters {
    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            state: RendererState::from_u8(self.state.load(Ordering::Acquire)),
            generation: self.generation.load(Ordering::Relaxed),
            texture_allocations: self.texture_allocations.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            draws: self.draws.load(Ordering::Relaxed),
            stale_rejections: self.stale_rejections.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct QuadProgram {
    handle: ProgramHandle,
    position: u32,
    tex_coord: u32,
    sampler: u32,
}

/// Texture object holding the most recently uploaded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTexture {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub generation: u64,
}

/// What a draw tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Not initialised or already released; nothing happened.
    Inert,
    /// The texture belongs to an older generation; the draw was skipped.
    Stale,
    Drawn { uploaded: bool },
}

/// Source of frames for the renderer, shared with the capture worker.
pub type FrameProducer = Arc<Mailbox<Arc<ConvertedFrame>>>;

/// Owns the shader program, quad geometry and frame texture of one
/// rendering context. Must only be driven from the thread owning that context.
pub struct Renderer {
    shaders: ShaderSources,
    state: RendererState,
    program: Option<QuadProgram>,
    quad: Option<BufferHandle>,
    texture: Option<FrameTexture>,
    generation: u64,
    producer: Option<FrameProducer>,
    last_timestamp_us: Option<u64>,
    counters: Arc<RenderCounters>,
}

impl Renderer {
    pub fn new(shaders: ShaderSources) -> Self {
        Self::with_counters(shaders, Arc::new(RenderCounters::default()))
    }

    pub fn with_counters(shaders: ShaderSources, counters: Arc<RenderCounters>) -> Self {
        counters
            .state
            .store(RendererState::Uninitialized.as_u8(), Ordering::Release);
        Self {
            shaders,
            state: RendererState::Uninitialized,
            program: None,
            quad: None,
            texture: None,
            generation: 0,
            producer: None,
            last_timestamp_us: None,
            counters,
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn texture(&self) -> Option<FrameTexture> {
        self.texture
    }

    pub fn counters(&self) -> &Arc<RenderCounters> {
        &self.counters
    }

    fn set_state(&mut self, state: RendererState) {
        self.state = state;
        self.counters.state.store(state.as_u8(), Ordering::Release);
    }

    /// Build GPU objects for a freshly created surface and bind the frame
    /// producer.
    ///
    /// On shader failure every object created so far is deleted and the
    /// renderer stays `Uninitialized`; later draw ticks are no-ops.
    pub fn on_surface_created(
        &mut self,
        ctx: &mut dyn GpuContext,
        producer: FrameProducer,
    ) -> Result<(), RenderError> {
        match self.state {
            RendererState::Released => {
                return Err(RenderError::Context("renderer already released".to_string()))
            }
            RendererState::SurfaceReady | RendererState::Rendering => {
                debug!("surface recreated, rebuilding GPU objects");
                self.delete_objects(ctx);
                self.set_state(RendererState::Uninitialized);
            }
            RendererState::Uninitialized => {}
        }
        self.producer = Some(producer);

        let program = self.build_program(ctx).inspect_err(|e| {
            error!("renderer setup failed on {}: {e}", ctx.backend_name());
        })?;
        let quad = match ctx.create_vertex_buffer(&QUAD_VERTICES) {
            Ok(quad) => quad,
            Err(e) => {
                ctx.delete_program(program.handle);
                return Err(e);
            }
        };
        self.program = Some(program);
        self.quad = Some(quad);

        // Placeholder until the first frame arrives with real dimensions.
        if let Err(e) = self.allocate_texture(ctx, 1, 1) {
            self.delete_objects(ctx);
            return Err(e);
        }

        self.set_state(RendererState::SurfaceReady);
        info!(
            "renderer ready on {} backend, viewport {:?}",
            ctx.backend_name(),
            ctx.viewport()
        );
        Ok(())
    }

    fn build_program(&self, ctx: &mut dyn GpuContext) -> Result<QuadProgram, RenderError> {
        let vertex = ctx.compile_shader(ShaderStage::Vertex, &self.shaders.vertex)?;
        let fragment = match ctx.compile_shader(ShaderStage::Fragment, &self.shaders.fragment) {
            Ok(fragment) => fragment,
            Err(e) => {
                ctx.delete_shader(vertex);
                return Err(e);
            }
        };
        let linked = ctx.link_program(vertex, fragment);
        ctx.delete_shader(vertex);
        ctx.delete_shader(fragment);
        let handle = linked?;

        let position = ctx.attribute_location(handle, POSITION_ATTRIBUTE);
        let tex_coord = ctx.attribute_location(handle, TEX_COORD_ATTRIBUTE);
        let sampler = ctx.uniform_location(handle, SAMPLER_UNIFORM);
        match (position, tex_coord, sampler) {
            (Some(position), Some(tex_coord), Some(sampler)) => Ok(QuadProgram {
                handle,
                position,
                tex_coord,
                sampler,
            }),
            _ => {
                ctx.delete_program(handle);
                Err(RenderError::ProgramLink(format!(
                    "program lacks `{POSITION_ATTRIBUTE}`, `{TEX_COORD_ATTRIBUTE}` or `{SAMPLER_UNIFORM}`"
                )))
            }
        }
    }

    fn allocate_texture(
        &mut self,
        ctx: &mut dyn GpuContext,
        width: u32,
        height: u32,
    ) -> Result<FrameTexture, RenderError> {
        if let Some(old) = self.texture.take() {
            ctx.delete_texture(old.handle);
        }
        let handle = ctx.create_texture(width, height)?;
        self.generation += 1;
        let texture = FrameTexture {
            handle,
            width,
            height,
            generation: self.generation,
        };
        self.texture = Some(texture);
        RenderCounters::bump(&self.counters.texture_allocations);
        self.counters
            .generation
            .store(self.generation, Ordering::Relaxed);
        debug!(
            "allocated {width}x{height} frame texture, generation {}",
            self.generation
        );
        Ok(texture)
    }

    /// Update the viewport only. Shaders and the frame texture are kept.
    pub fn on_surface_changed(&mut self, ctx: &mut dyn GpuContext, width: u32, height: u32) {
        if self.state == RendererState::Released {
            return;
        }
        ctx.set_viewport(width, height);
        debug!("viewport set to {width}x{height}");
    }

    /// Mark the current texture as belonging to an older generation, e.g.
    /// after the context reconfigured its surface. Draws are rejected until
    /// the next frame recreates it.
    pub fn invalidate_texture(&mut self) {
        self.generation += 1;
        self.counters
            .generation
            .store(self.generation, Ordering::Relaxed);
    }

    /// One draw tick: upload the newest frame if one was signalled, then
    /// draw the quad with whatever the texture holds.
    pub fn draw_frame(&mut self, ctx: &mut dyn GpuContext) -> Result<DrawOutcome, RenderError> {
        if !matches!(
            self.state,
            RendererState::SurfaceReady | RendererState::Rendering
        ) {
            return Ok(DrawOutcome::Inert);
        }

        let mut uploaded = false;
        let frame = self
            .producer
            .as_ref()
            .filter(|producer| producer.take_signal())
            .and_then(|producer| producer.take());
        if let Some(frame) = frame {
            uploaded = self.upload(ctx, &frame)?;
        }

        let (Some(program), Some(quad), Some(texture)) =
            (self.program.as_ref(), self.quad, self.texture)
        else {
            return Ok(DrawOutcome::Inert);
        };
        if texture.generation != self.generation {
            RenderCounters::bump(&self.counters.stale_rejections);
            trace!(
                "texture generation {} is stale (current {})",
                texture.generation,
                self.generation
            );
            return Ok(DrawOutcome::Stale);
        }

        let ops = quad_draw_list(
            program.handle,
            quad,
            texture.handle,
            program.position,
            program.tex_coord,
            program.sampler,
        );
        ctx.submit(&ops)?;
        RenderCounters::bump(&self.counters.draws);
        if self.state == RendererState::SurfaceReady {
            self.set_state(RendererState::Rendering);
        }
        Ok(DrawOutcome::Drawn { uploaded })
    }

    fn upload(
        &mut self,
        ctx: &mut dyn GpuContext,
        frame: &ConvertedFrame,
    ) -> Result<bool, RenderError> {
        if let Some(last) = self.last_timestamp_us {
            if frame.timestamp_us < last {
                RenderCounters::bump(&self.counters.out_of_order);
                debug!(
                    "dropping frame @{}us older than last upload @{last}us",
                    frame.timestamp_us
                );
                return Ok(false);
            }
        }
        if frame.rgba.len() != frame.expected_len() {
            return Err(RenderError::UploadSize {
                width: frame.width,
                height: frame.height,
                expected: frame.expected_len(),
                actual: frame.rgba.len(),
            });
        }

        let texture = match self.texture {
            Some(t)
                if (t.width, t.height) == (frame.width, frame.height)
                    && t.generation == self.generation =>
            {
                t
            }
            _ => self.allocate_texture(ctx, frame.width, frame.height)?,
        };
        ctx.upload_texture(texture.handle, &frame.rgba)?;
        self.last_timestamp_us = Some(frame.timestamp_us);
        RenderCounters::bump(&self.counters.uploads);
        Ok(true)
    }

    fn delete_objects(&mut self, ctx: &mut dyn GpuContext) {
        if let Some(texture) = self.texture.take() {
            ctx.delete_texture(texture.handle);
        }
        if let Some(quad) = self.quad.take() {
            ctx.delete_buffer(quad);
        }
        if let Some(program) = self.program.take() {
            ctx.delete_program(program.handle);
        }
    }

    /// Detach the producer and free every GPU object. Must run on the
    /// context's thread before the context is dropped. Idempotent.
    pub fn release(&mut self, ctx: &mut dyn GpuContext) {
        if self.state == RendererState::Released {
            return;
        }
        if let Some(producer) = self.producer.take() {
            if producer.close().is_some() {
                trace!("released pending frame during teardown");
            }
        }
        self.delete_objects(ctx);
        self.set_state(RendererState::Released);
        info!("renderer released");
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if self.program.is_some() || self.texture.is_some() || self.quad.is_some() {
            warn!("renderer dropped without release; GPU objects were not freed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::software::SoftwareContext;
    use std::sync::Weak;

    fn solid(width: u32, height: u32, ts: u64, rgba: [u8; 4]) -> Arc<ConvertedFrame> {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Arc::new(ConvertedFrame::new(width, height, ts, data))
    }

    fn ready() -> (Renderer, SoftwareContext, FrameProducer) {
        let mut ctx = SoftwareContext::new(4, 4);
        let producer: FrameProducer = Arc::new(Mailbox::new());
        let mut renderer = Renderer::new(ShaderSources::default());
        renderer
            .on_surface_created(&mut ctx, Arc::clone(&producer))
            .unwrap();
        (renderer, ctx, producer)
    }

    #[test]
    fn lifecycle_walks_through_every_state() {
        let mut ctx = SoftwareContext::new(4, 4);
        let producer: FrameProducer = Arc::new(Mailbox::new());
        let mut renderer = Renderer::new(ShaderSources::default());
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert_eq!(renderer.draw_frame(&mut ctx).unwrap(), DrawOutcome::Inert);

        renderer.on_surface_created(&mut ctx, producer).unwrap();
        assert_eq!(renderer.state(), RendererState::SurfaceReady);
        // Shaders are deleted after linking: program, quad, placeholder texture.
        assert_eq!(ctx.live_objects(), 3);

        assert_eq!(
            renderer.draw_frame(&mut ctx).unwrap(),
            DrawOutcome::Drawn { uploaded: false }
        );
        assert_eq!(renderer.state(), RendererState::Rendering);

        renderer.release(&mut ctx);
        assert_eq!(renderer.state(), RendererState::Released);
        assert_eq!(ctx.live_objects(), 0);
        assert_eq!(renderer.draw_frame(&mut ctx).unwrap(), DrawOutcome::Inert);
        assert_eq!(
            renderer.counters().snapshot().state,
            RendererState::Released
        );
    }

    #[test]
    fn only_the_latest_of_several_pending_frames_is_drawn() {
        let (mut renderer, mut ctx, producer) = ready();
        let mut weaks: Vec<Weak<ConvertedFrame>> = Vec::new();
        for i in 0..5u8 {
            let frame = solid(4, 4, u64::from(i), [i * 40, 0, 0, 255]);
            weaks.push(Arc::downgrade(&frame));
            drop(producer.post(frame));
        }
        // The four superseded frames were released by the writer.
        assert!(weaks[..4].iter().all(|w| w.upgrade().is_none()));

        assert_eq!(
            renderer.draw_frame(&mut ctx).unwrap(),
            DrawOutcome::Drawn { uploaded: true }
        );
        assert_eq!(renderer.counters().snapshot().uploads, 1);
        assert_eq!(ctx.pixel(1, 1), Some([160, 0, 0, 255]));
        // The renderer does not hold on to the frame after uploading it.
        assert!(weaks[4].upgrade().is_none());
        renderer.release(&mut ctx);
    }

    #[test]
    fn texture_is_reallocated_only_on_size_change() {
        let (mut renderer, mut ctx, producer) = ready();
        producer.post(solid(640, 480, 1, [1, 2, 3, 255]));
        renderer.draw_frame(&mut ctx).unwrap();
        let generation = renderer.generation();
        let allocations = ctx.texture_allocations();

        producer.post(solid(1280, 720, 2, [1, 2, 3, 255]));
        renderer.draw_frame(&mut ctx).unwrap();
        assert_eq!(renderer.generation(), generation + 1);
        assert_eq!(ctx.texture_allocations(), allocations + 1);
        assert_eq!(ctx.live_textures(), 1);
        let texture = renderer.texture().unwrap();
        assert_eq!((texture.width, texture.height), (1280, 720));

        producer.post(solid(1280, 720, 3, [1, 2, 3, 255]));
        renderer.draw_frame(&mut ctx).unwrap();
        assert_eq!(renderer.generation(), generation + 1);
        assert_eq!(ctx.texture_allocations(), allocations + 1);
        assert_eq!(
            renderer.counters().snapshot().texture_allocations,
            ctx.texture_allocations()
        );
        renderer.release(&mut ctx);
    }

    #[test]
    fn shader_failure_leaves_renderer_inert() {
        let mut ctx = SoftwareContext::new(4, 4);
        let producer: FrameProducer = Arc::new(Mailbox::new());
        let mut renderer = Renderer::new(ShaderSources {
            vertex: "@vertex fn vs_main( {".to_string(),
            ..ShaderSources::default()
        });
        let err = renderer
            .on_surface_created(&mut ctx, Arc::clone(&producer))
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::ShaderCompile {
                stage: ShaderStage::Vertex,
                ..
            }
        ));
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert_eq!(ctx.live_objects(), 0);

        producer.post(solid(4, 4, 1, [9, 9, 9, 255]));
        assert_eq!(renderer.draw_frame(&mut ctx).unwrap(), DrawOutcome::Inert);
        assert_eq!(ctx.submissions(), 0);
        renderer.release(&mut ctx);
        assert!(producer.is_closed());
    }

    #[test]
    fn fragment_failure_deletes_the_vertex_shader() {
        let mut ctx = SoftwareContext::new(4, 4);
        let mut renderer = Renderer::new(ShaderSources {
            fragment: "not wgsl".to_string(),
            ..ShaderSources::default()
        });
        assert!(renderer
            .on_surface_created(&mut ctx, Arc::new(Mailbox::new()))
            .is_err());
        assert_eq!(ctx.live_objects(), 0);
    }

    #[test]
    fn older_frames_are_not_uploaded() {
        let (mut renderer, mut ctx, producer) = ready();
        producer.post(solid(4, 4, 100, [10, 0, 0, 255]));
        renderer.draw_frame(&mut ctx).unwrap();
        producer.post(solid(4, 4, 50, [20, 0, 0, 255]));
        assert_eq!(
            renderer.draw_frame(&mut ctx).unwrap(),
            DrawOutcome::Drawn { uploaded: false }
        );
        assert_eq!(ctx.pixel(0, 0), Some([10, 0, 0, 255]));
        assert_eq!(renderer.counters().snapshot().out_of_order, 1);
        renderer.release(&mut ctx);
    }

    #[test]
    fn stale_texture_is_not_drawn_until_recreated() {
        let (mut renderer, mut ctx, producer) = ready();
        producer.post(solid(4, 4, 1, [10, 0, 0, 255]));
        renderer.draw_frame(&mut ctx).unwrap();
        let submissions = ctx.submissions();

        renderer.invalidate_texture();
        assert_eq!(renderer.draw_frame(&mut ctx).unwrap(), DrawOutcome::Stale);
        assert_eq!(ctx.submissions(), submissions);

        producer.post(solid(4, 4, 2, [30, 0, 0, 255]));
        assert_eq!(
            renderer.draw_frame(&mut ctx).unwrap(),
            DrawOutcome::Drawn { uploaded: true }
        );
        assert_eq!(ctx.pixel(0, 0), Some([30, 0, 0, 255]));
        assert_eq!(renderer.counters().snapshot().stale_rejections, 1);
        renderer.release(&mut ctx);
    }

    #[test]
    fn viewport_change_keeps_program_and_texture() {
        let (mut renderer, mut ctx, producer) = ready();
        producer.post(solid(4, 4, 1, [10, 0, 0, 255]));
        renderer.draw_frame(&mut ctx).unwrap();
        let allocations = ctx.texture_allocations();
        let texture = renderer.texture();

        renderer.on_surface_changed(&mut ctx, 8, 2);
        assert_eq!(ctx.viewport(), (8, 2));
        renderer.draw_frame(&mut ctx).unwrap();
        assert_eq!(ctx.texture_allocations(), allocations);
        assert_eq!(renderer.texture(), texture);
        assert_eq!(ctx.pixel(7, 1), Some([10, 0, 0, 255]));
        renderer.release(&mut ctx);
    }

    #[test]
    fn redraw_without_new_frame_is_idempotent() {
        let (mut renderer, mut ctx, producer) = ready();
        producer.post(solid(4, 4, 1, [70, 80, 90, 255]));
        renderer.draw_frame(&mut ctx).unwrap();
        let before = ctx.framebuffer().to_vec();
        for _ in 0..3 {
            assert_eq!(
                renderer.draw_frame(&mut ctx).unwrap(),
                DrawOutcome::Drawn { uploaded: false }
            );
        }
        assert_eq!(ctx.framebuffer(), before.as_slice());
        assert_eq!(renderer.counters().snapshot().draws, 4);
        renderer.release(&mut ctx);
    }

    #[test]
    fn release_is_idempotent_and_drains_the_producer() {
        let (mut renderer, mut ctx, producer) = ready();
        let frame = solid(4, 4, 1, [1, 1, 1, 255]);
        let weak = Arc::downgrade(&frame);
        producer.post(frame);

        renderer.release(&mut ctx);
        renderer.release(&mut ctx);
        assert!(weak.upgrade().is_none());
        assert!(producer.is_closed());
        assert_eq!(ctx.live_objects(), 0);
    }

    #[test]
    fn surface_recreation_rebuilds_without_leaking() {
        let (mut renderer, mut ctx, producer) = ready();
        renderer.draw_frame(&mut ctx).unwrap();
        renderer.on_surface_created(&mut ctx, producer).unwrap();
        assert_eq!(renderer.state(), RendererState::SurfaceReady);
        assert_eq!(ctx.live_objects(), 3);
        renderer.release(&mut ctx);
    }

    #[test]
    fn counters_serialise_to_camelcase() {
        let (mut renderer, mut ctx, _producer) = ready();
        let json = serde_json::to_value(renderer.counters().snapshot()).unwrap();
        assert_eq!(json["state"], "surfaceReady");
        assert_eq!(json["textureAllocations"], 1);
        renderer.release(&mut ctx);
    }
}
