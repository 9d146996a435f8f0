use std::collections::HashMap;

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::render::context::ShaderStage;
use crate::render::error::RenderError;

pub const QUAD_VERTEX_SHADER: &str = include_str!("shaders/quad.vert.wgsl");
pub const QUAD_FRAGMENT_SHADER: &str = include_str!("shaders/quad.frag.wgsl");

/// WGSL sources for the textured-quad program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            vertex: QUAD_VERTEX_SHADER.to_string(),
            fragment: QUAD_FRAGMENT_SHADER.to_string(),
        }
    }
}

/// A parsed and validated single-stage WGSL module.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub stage: ShaderStage,
    pub source: String,
    module: naga::Module,
}

/// Locations resolved by linking a vertex and a fragment shader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedProgram {
    /// Vertex input name to `@location`.
    pub attributes: HashMap<String, u32>,
    /// Resource name to `@binding`.
    pub uniforms: HashMap<String, u32>,
}

/// Parse and validate `source`, requiring the stage's entry point.
pub fn compile(stage: ShaderStage, source: &str) -> Result<CompiledShader, RenderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| RenderError::ShaderCompile {
        stage,
        log: e.emit_to_string(source),
    })?;

    Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|e| RenderError::ShaderCompile {
            stage,
            log: e.emit_to_string(source),
        })?;

    let shader = CompiledShader {
        stage,
        source: source.to_string(),
        module,
    };
    if shader.entry_point().is_none() {
        return Err(RenderError::ShaderCompile {
            stage,
            log: format!("missing {stage} entry point `{}`", stage.entry_point()),
        });
    }
    Ok(shader)
}

impl CompiledShader {
    fn entry_point(&self) -> Option<&naga::EntryPoint> {
        let wanted = match self.stage {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        };
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.stage == wanted && ep.name == self.stage.entry_point())
    }

    fn inputs(&self) -> HashMap<String, u32> {
        let mut out = HashMap::new();
        if let Some(ep) = self.entry_point() {
            for arg in &ep.function.arguments {
                collect_locations(
                    &self.module,
                    arg.ty,
                    arg.binding.as_ref(),
                    arg.name.as_deref(),
                    &mut out,
                );
            }
        }
        out
    }

    fn outputs(&self) -> HashMap<String, u32> {
        let mut out = HashMap::new();
        if let Some(result) = self.entry_point().and_then(|ep| ep.function.result.as_ref()) {
            collect_locations(&self.module, result.ty, result.binding.as_ref(), None, &mut out);
        }
        out
    }

    fn resources(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.module
            .global_variables
            .iter()
            .filter_map(|(_, var)| Some((var.name.as_deref()?, var.binding.as_ref()?.binding)))
    }
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    name: Option<&str>,
    out: &mut HashMap<String, u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.insert(name.unwrap_or_default().to_string(), *location);
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(
                        module,
                        member.ty,
                        member.binding.as_ref(),
                        member.name.as_deref(),
                        out,
                    );
                }
            }
        }
    }
}

/// Check that the two stages fit together and resolve their locations.
pub fn link(
    vertex: &CompiledShader,
    fragment: &CompiledShader,
) -> Result<LinkedProgram, RenderError> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(RenderError::ProgramLink(format!(
            "expected vertex + fragment, got {} + {}",
            vertex.stage, fragment.stage
        )));
    }

    let varyings = vertex.outputs();
    for (name, location) in fragment.inputs() {
        if !varyings.values().any(|l| *l == location) {
            return Err(RenderError::ProgramLink(format!(
                "fragment input `{name}` at location {location} has no matching vertex output"
            )));
        }
    }

    let mut uniforms = HashMap::new();
    for (name, binding) in vertex.resources().chain(fragment.resources()) {
        if let Some(existing) = uniforms.insert(name.to_string(), binding) {
            if existing != binding {
                return Err(RenderError::ProgramLink(format!(
                    "`{name}` bound at {existing} and {binding}"
                )));
            }
        }
    }

    Ok(LinkedProgram {
        attributes: vertex.inputs(),
        uniforms,
    })
}
