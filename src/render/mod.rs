// Rendering domain: GL-style context abstraction, shaders, the frame
// renderer state machine, and the thread that drives it.

pub mod context;
pub mod error;
pub mod gpu;
pub mod renderer;
pub mod shader;
pub mod software;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub use context::GpuContext;
pub use error::RenderError;
pub use renderer::{FrameProducer, RenderSnapshot, Renderer, RendererState};
pub use worker::{ContextFactory, RenderWorker, RenderWorkerConfig};

/// Which context implementation the render thread creates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackend {
    /// wgpu when an adapter is available, software otherwise.
    #[default]
    Auto,
    Wgpu,
    Software,
}

/// Factory for the configured backend. Runs on the render thread.
pub fn context_factory(backend: RenderBackend) -> ContextFactory {
    Arc::new(move |width, height| match backend {
        RenderBackend::Software => Ok(software_context(width, height)),
        RenderBackend::Wgpu => {
            let ctx = gpu::WgpuContext::new(width, height)?;
            info!("rendering on {}", ctx.adapter_name());
            Ok(Box::new(ctx) as Box<dyn GpuContext>)
        }
        RenderBackend::Auto => match gpu::WgpuContext::new(width, height) {
            Ok(ctx) => {
                info!("rendering on {}", ctx.adapter_name());
                Ok(Box::new(ctx) as Box<dyn GpuContext>)
            }
            Err(e) => {
                warn!("GPU unavailable ({e}), falling back to software rendering");
                Ok(software_context(width, height))
            }
        },
    })
}

fn software_context(width: u32, height: u32) -> Box<dyn GpuContext> {
    Box::new(software::SoftwareContext::new(width, height))
}
