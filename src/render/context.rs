use std::collections::BTreeMap;
use std::fmt;

use crate::render::error::RenderError;

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Entry point each stage's module must export.
    pub fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "fs_main",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

macro_rules! handle {
    ($name:ident, $kind:literal) => {
        /// Opaque object name issued by a [`GpuContext`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub const KIND: &'static str = $kind;

            pub fn id(self) -> u32 {
                self.0
            }

            pub(crate) fn unknown(self) -> RenderError {
                RenderError::UnknownHandle {
                    kind: Self::KIND,
                    id: self.0,
                }
            }
        }
    };
}

handle!(ShaderHandle, "shader");
handle!(ProgramHandle, "program");
handle!(BufferHandle, "buffer");
handle!(TextureHandle, "texture");

/// One command in a frame's draw list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawOp {
    Clear { rgba: [f32; 4] },
    UseProgram(ProgramHandle),
    BindVertexBuffer(BufferHandle),
    EnableAttribute {
        location: u32,
        components: u32,
        stride: u32,
        offset: u32,
    },
    DisableAttribute { location: u32 },
    BindTexture { unit: u32, texture: TextureHandle },
    SetSampler { location: u32, unit: u32 },
    DrawTriangleStrip { first: u32, count: u32 },
}

/// Thread-affine rendering context.
///
/// Every object it hands out is valid only on the thread that owns the
/// context and only until it is deleted or the context is dropped.
pub trait GpuContext {
    fn backend_name(&self) -> &'static str;

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderHandle, RenderError>;

    fn delete_shader(&mut self, shader: ShaderHandle);

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, RenderError>;

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    fn delete_program(&mut self, program: ProgramHandle);

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferHandle, RenderError>;

    fn delete_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureHandle, RenderError>;

    /// Replace the full contents of `texture` with tightly packed RGBA.
    fn upload_texture(&mut self, texture: TextureHandle, rgba: &[u8]) -> Result<(), RenderError>;

    fn delete_texture(&mut self, texture: TextureHandle);

    fn set_viewport(&mut self, width: u32, height: u32);

    fn viewport(&self) -> (u32, u32);

    /// Execute a draw list against the current surface.
    fn submit(&mut self, ops: &[DrawOp]) -> Result<(), RenderError>;
}

/// A vertex attribute as enabled at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBinding {
    pub location: u32,
    pub components: u32,
    pub stride: u32,
    pub offset: u32,
}

/// A fully bound draw call extracted from a draw list.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub vertex_buffer: BufferHandle,
    pub texture: TextureHandle,
    pub attributes: Vec<AttributeBinding>,
    pub first: u32,
    pub count: u32,
}

/// Result of walking a draw list through the bind-state machine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrawPlan {
    pub clear: Option<[f32; 4]>,
    pub calls: Vec<DrawCall>,
}

/// Resolve a draw list into concrete draw calls, rejecting any draw whose
/// state is incomplete. Handle liveness is left to the context.
pub fn plan_draws(ops: &[DrawOp]) -> Result<DrawPlan, RenderError> {
    let mut plan = DrawPlan::default();
    let mut program = None;
    let mut vertex_buffer = None;
    let mut attributes: BTreeMap<u32, AttributeBinding> = BTreeMap::new();
    let mut units: BTreeMap<u32, TextureHandle> = BTreeMap::new();
    let mut sampler_unit = None;

    for op in ops {
        match *op {
            DrawOp::Clear { rgba } => {
                plan.clear = Some(rgba);
                plan.calls.clear();
            }
            DrawOp::UseProgram(handle) => program = Some(handle),
            DrawOp::BindVertexBuffer(handle) => vertex_buffer = Some(handle),
            DrawOp::EnableAttribute {
                location,
                components,
                stride,
                offset,
            } => {
                if !(1..=4).contains(&components) {
                    return Err(RenderError::Draw(format!(
                        "attribute {location} has {components} components"
                    )));
                }
                attributes.insert(
                    location,
                    AttributeBinding {
                        location,
                        components,
                        stride,
                        offset,
                    },
                );
            }
            DrawOp::DisableAttribute { location } => {
                attributes.remove(&location);
            }
            DrawOp::BindTexture { unit, texture } => {
                units.insert(unit, texture);
            }
            DrawOp::SetSampler { unit, .. } => sampler_unit = Some(unit),
            DrawOp::DrawTriangleStrip { first, count } => {
                let program = program
                    .ok_or_else(|| RenderError::Draw("no program in use".to_string()))?;
                let vertex_buffer = vertex_buffer
                    .ok_or_else(|| RenderError::Draw("no vertex buffer bound".to_string()))?;
                if attributes.is_empty() {
                    return Err(RenderError::Draw("no vertex attributes enabled".to_string()));
                }
                let unit = sampler_unit
                    .ok_or_else(|| RenderError::Draw("sampler not set".to_string()))?;
                let texture = *units.get(&unit).ok_or_else(|| {
                    RenderError::Draw(format!("no texture bound to unit {unit}"))
                })?;
                if count < 3 {
                    continue;
                }
                plan.calls.push(DrawCall {
                    program,
                    vertex_buffer,
                    texture,
                    attributes: attributes.values().copied().collect(),
                    first,
                    count,
                });
            }
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_list() -> Vec<DrawOp> {
        vec![
            DrawOp::Clear {
                rgba: [0.0, 0.0, 0.0, 1.0],
            },
            DrawOp::UseProgram(ProgramHandle(1)),
            DrawOp::BindVertexBuffer(BufferHandle(2)),
            DrawOp::EnableAttribute {
                location: 0,
                components: 3,
                stride: 20,
                offset: 0,
            },
            DrawOp::EnableAttribute {
                location: 1,
                components: 2,
                stride: 20,
                offset: 12,
            },
            DrawOp::BindTexture {
                unit: 0,
                texture: TextureHandle(3),
            },
            DrawOp::SetSampler {
                location: 0,
                unit: 0,
            },
            DrawOp::DrawTriangleStrip { first: 0, count: 4 },
            DrawOp::DisableAttribute { location: 0 },
            DrawOp::DisableAttribute { location: 1 },
        ]
    }

    #[test]
    fn complete_list_yields_one_call() {
        let plan = plan_draws(&full_list()).unwrap();
        assert_eq!(plan.clear, Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(plan.calls.len(), 1);
        let call = &plan.calls[0];
        assert_eq!(call.texture, TextureHandle(3));
        assert_eq!(call.attributes.len(), 2);
        assert_eq!(call.attributes[1].offset, 12);
    }

    #[test]
    fn draw_without_program_is_rejected() {
        let ops: Vec<DrawOp> = full_list()
            .into_iter()
            .filter(|op| !matches!(op, DrawOp::UseProgram(_)))
            .collect();
        assert!(matches!(plan_draws(&ops), Err(RenderError::Draw(_))));
    }

    #[test]
    fn draw_without_texture_on_sampler_unit_is_rejected() {
        let mut ops = full_list();
        ops[6] = DrawOp::SetSampler {
            location: 0,
            unit: 1,
        };
        assert!(plan_draws(&ops).is_err());
    }

    #[test]
    fn clear_discards_earlier_draws() {
        let mut ops = full_list();
        ops.push(DrawOp::Clear {
            rgba: [1.0, 0.0, 0.0, 1.0],
        });
        let plan = plan_draws(&ops).unwrap();
        assert!(plan.calls.is_empty());
    }

    #[test]
    fn handle_errors_name_their_kind() {
        assert_eq!(
            TextureHandle(9).unknown().to_string(),
            "unknown texture handle 9"
        );
    }
}
