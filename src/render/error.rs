use thiserror::Error;

use crate::render::context::ShaderStage;

/// Renderer and rendering-context errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("rendering context unavailable: {0}")]
    Context(String),

    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("program link failed: {0}")]
    ProgramLink(String),

    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },

    #[error("invalid texture size {width}x{height}")]
    TextureSize { width: u32, height: u32 },

    #[error("upload of {actual} bytes does not match {width}x{height} RGBA ({expected} bytes)")]
    UploadSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("draw rejected: {0}")]
    Draw(String),

    #[error("render worker unavailable: {0}")]
    Worker(String),
}
