//! WGSL front-end shared by the backends: compile each stage with naga, then
//! link the stages into one program description.

use std::collections::HashMap;

use crate::render::error::RenderError;
use crate::render::shader::ShaderStage;
use crate::render::uniform::{UniformBlock, UniformMember, UNIFORM_BINDING, UNIFORM_GROUP};

use super::StageSource;

/// A stage that compiled.
#[derive(Debug)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub module: naga::Module,
    /// Name of the entry point for `stage`.
    pub entry_point: String,
    pub source: String,
}

/// Vertex attribute slot fed with positions.
pub const POSITION_LOCATION: u32 = 0;
/// Vertex attribute slot fed with colors.
pub const COLOR_LOCATION: u32 = 1;

/// Outcome of linking a set of stages.
#[derive(Debug, Default)]
pub struct LinkedStages {
    pub stages: Vec<CompiledStage>,
    pub uniforms: UniformBlock,
    /// Attribute locations the vertex entry point reads.
    pub vertex_inputs: Vec<u32>,
    pub errors: Vec<RenderError>,
}

impl LinkedStages {
    pub fn is_usable(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&CompiledStage> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Parses and validates one stage.
pub fn compile_stage(src: &StageSource) -> Result<CompiledStage, RenderError> {
    let compile_err = |message: String| RenderError::Compile {
        stage: src.stage,
        path: src.path.clone(),
        message,
    };

    let Some(wanted) = src.stage.naga_stage() else {
        return Err(compile_err("stage is not supported by WGSL".to_string()));
    };

    let module = naga::front::wgsl::parse_str(&src.text)
        .map_err(|e| compile_err(e.emit_to_string(&src.text)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|e| compile_err(e.to_string()))?;

    let entry_point = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted)
        .map(|ep| ep.name.clone())
        .ok_or_else(|| compile_err(format!("no @{} entry point", src.stage.wgsl_attribute())))?;

    Ok(CompiledStage {
        stage: src.stage,
        module,
        entry_point,
        source: src.text.clone(),
    })
}

/// Compiles every stage and links them.
///
/// Link rules:
/// - each stage may appear at most once
/// - a render program needs both a vertex and a fragment stage; a compute
///   stage may stand alone or ride along
/// - stages declaring the uniform block must agree on every shared member,
///   and differently named members may not overlap
/// - the only resource is the uniform block at group 0, binding 0
/// - vertex inputs are limited to the position and color slots, fragment
///   outputs to one color target, and every fragment input must be written by
///   the vertex stage
pub fn link(stages: &[StageSource]) -> LinkedStages {
    let mut linked = LinkedStages::default();

    for src in stages {
        if linked.stage(src.stage).is_some() {
            linked.errors.push(RenderError::Link {
                message: format!("{} stage given more than once", src.stage),
            });
            continue;
        }
        match compile_stage(src) {
            Ok(stage) => linked.stages.push(stage),
            Err(e) => linked.errors.push(e),
        }
    }

    if !linked.errors.is_empty() {
        return linked;
    }

    let has = |s| stages.iter().any(|src| src.stage == s);
    let render = has(ShaderStage::Vertex) || has(ShaderStage::Fragment);
    if render && !(has(ShaderStage::Vertex) && has(ShaderStage::Fragment)) {
        linked.errors.push(RenderError::Link {
            message: "a render program needs both a vertex and a fragment stage".to_string(),
        });
    }
    if stages.is_empty() {
        linked.errors.push(RenderError::Link {
            message: "no stages given".to_string(),
        });
    }

    match merge_uniforms(&linked.stages) {
        Ok(block) => linked.uniforms = block,
        Err(message) => linked.errors.push(RenderError::Link { message }),
    }

    let checks = check_resources(&linked.stages).and_then(|()| check_interface(&linked));
    match checks {
        Ok(inputs) => linked.vertex_inputs = inputs,
        Err(message) => linked.errors.push(RenderError::Link { message }),
    }

    linked
}

fn check_resources(stages: &[CompiledStage]) -> Result<(), String> {
    for stage in stages {
        for (_, var) in stage.module.global_variables.iter() {
            let Some(binding) = &var.binding else { continue };
            let is_block = var.space == naga::AddressSpace::Uniform
                && binding.group == UNIFORM_GROUP
                && binding.binding == UNIFORM_BINDING;
            if !is_block {
                return Err(format!(
                    "{} stage binds `{}` at @group({}) @binding({}); only the uniform block at @group({UNIFORM_GROUP}) @binding({UNIFORM_BINDING}) is available",
                    stage.stage,
                    var.name.as_deref().unwrap_or("?"),
                    binding.group,
                    binding.binding
                ));
            }
        }
    }
    Ok(())
}

/// Checks the vertex inputs, the vertex to fragment interface and the fragment
/// outputs. Returns the vertex input locations.
fn check_interface(linked: &LinkedStages) -> Result<Vec<u32>, String> {
    let (Some(vertex), Some(fragment)) = (
        linked.stage(ShaderStage::Vertex),
        linked.stage(ShaderStage::Fragment),
    ) else {
        return Ok(Vec::new());
    };

    let vs = entry_point(vertex);
    let mut inputs = Vec::new();
    for arg in vs.map(|ep| ep.function.arguments.as_slice()).unwrap_or_default() {
        locations(&vertex.module, arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    for &(location, ty) in &inputs {
        if location != POSITION_LOCATION && location != COLOR_LOCATION {
            return Err(format!(
                "vertex input @location({location}) has no data; positions are @location({POSITION_LOCATION}), colors @location({COLOR_LOCATION})"
            ));
        }
        if !is_float(&vertex.module, ty) {
            return Err(format!("vertex input @location({location}) must be a float vector"));
        }
    }

    let mut vs_outputs = Vec::new();
    if let Some(result) = vs.and_then(|ep| ep.function.result.as_ref()) {
        locations(&vertex.module, result.ty, result.binding.as_ref(), &mut vs_outputs);
    }

    let fs = entry_point(fragment);
    let mut fs_inputs = Vec::new();
    for arg in fs.map(|ep| ep.function.arguments.as_slice()).unwrap_or_default() {
        locations(&fragment.module, arg.ty, arg.binding.as_ref(), &mut fs_inputs);
    }
    for (location, _) in &fs_inputs {
        if !vs_outputs.iter().any(|(l, _)| l == location) {
            return Err(format!(
                "fragment input @location({location}) is not written by the vertex stage"
            ));
        }
    }

    let mut fs_outputs = Vec::new();
    if let Some(result) = fs.and_then(|ep| ep.function.result.as_ref()) {
        locations(&fragment.module, result.ty, result.binding.as_ref(), &mut fs_outputs);
    }
    if fs_outputs.iter().any(|(l, _)| *l != 0) {
        return Err("fragment stage may only write @location(0)".to_string());
    }

    let mut slots: Vec<u32> = inputs.into_iter().map(|(l, _)| l).collect();
    slots.sort_unstable();
    slots.dedup();
    Ok(slots)
}

fn entry_point(stage: &CompiledStage) -> Option<&naga::EntryPoint> {
    stage
        .module
        .entry_points
        .iter()
        .find(|ep| ep.name == stage.entry_point)
}

/// Collects `@location` slots, descending into IO structs.
fn locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<(u32, naga::Handle<naga::Type>)>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push((*location, ty)),
        Some(_) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn is_float(module: &naga::Module, ty: naga::Handle<naga::Type>) -> bool {
    match &module.types[ty].inner {
        naga::TypeInner::Scalar(s) | naga::TypeInner::Vector { scalar: s, .. } => {
            s.kind == naga::ScalarKind::Float
        }
        _ => false,
    }
}

/// Merges the uniform blocks of every stage that declares one.
///
/// All stages share the buffer at the uniform binding, so members with
/// different names must not overlap and the merged size is the widest span.
fn merge_uniforms(stages: &[CompiledStage]) -> Result<UniformBlock, String> {
    let mut merged: HashMap<String, UniformMember> = HashMap::new();
    let mut blocks = Vec::new();

    for stage in stages {
        let block = UniformBlock::reflect(&stage.module);
        if !block.is_empty() {
            blocks.push((stage.stage, block));
        }
    }

    let Some((_, first)) = blocks.first() else {
        return Ok(UniformBlock::default());
    };
    if blocks.len() == 1 {
        return Ok(first.clone());
    }

    for (stage, block) in &blocks {
        for (name, member) in block.members() {
            match merged.get(name) {
                Some(existing) if existing != member => {
                    return Err(format!(
                        "uniform `{name}` in the {stage} stage disagrees with another stage"
                    ));
                }
                Some(_) => {}
                None => {
                    if let Some((other, _)) = merged.iter().find(|(_, m)| overlaps(m, member)) {
                        return Err(format!(
                            "uniform `{name}` in the {stage} stage overlaps `{other}` from another stage"
                        ));
                    }
                    merged.insert(name.clone(), *member);
                }
            }
        }
    }

    let span = blocks.iter().map(|(_, b)| b.size()).max().unwrap_or(0);
    Ok(UniformBlock::from_members(merged).with_min_size(span))
}

fn overlaps(a: &UniformMember, b: &UniformMember) -> bool {
    a.offset < b.offset + b.kind.size() && b.offset < a.offset + a.kind.size()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{FRAGMENT_SRC as FRAGMENT, VERTEX_SRC as VERTEX};

    fn src(stage: ShaderStage, text: &str) -> StageSource {
        StageSource {
            stage,
            path: format!("{stage}.wgsl").into(),
            text: text.to_string(),
        }
    }

    #[test]
    fn links_vertex_and_fragment() {
        let linked = link(&[src(ShaderStage::Vertex, VERTEX), src(ShaderStage::Fragment, FRAGMENT)]);
        assert!(linked.is_usable(), "{:?}", linked.errors);
        assert_eq!(linked.stage(ShaderStage::Vertex).unwrap().entry_point, "vs_main");
        assert_eq!(linked.stage(ShaderStage::Fragment).unwrap().entry_point, "fs_main");
        assert!(linked.uniforms.member("model").is_some());
    }

    #[test]
    fn syntax_error_is_a_compile_error() {
        let linked = link(&[
            src(ShaderStage::Vertex, "fn broken( {"),
            src(ShaderStage::Fragment, FRAGMENT),
        ]);
        assert!(!linked.is_usable());
        assert!(matches!(
            linked.errors[0],
            RenderError::Compile { stage: ShaderStage::Vertex, .. }
        ));
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        // fragment source handed in as the vertex stage
        let linked = link(&[src(ShaderStage::Vertex, FRAGMENT), src(ShaderStage::Fragment, FRAGMENT)]);
        assert!(matches!(linked.errors[0], RenderError::Compile { .. }));
    }

    #[test]
    fn geometry_stage_is_rejected() {
        let linked = link(&[
            src(ShaderStage::Vertex, VERTEX),
            src(ShaderStage::Fragment, FRAGMENT),
            src(ShaderStage::Geometry, VERTEX),
        ]);
        assert!(!linked.is_usable());
        assert!(matches!(
            linked.errors[0],
            RenderError::Compile { stage: ShaderStage::Geometry, .. }
        ));
    }

    #[test]
    fn vertex_without_fragment_fails_to_link() {
        let linked = link(&[src(ShaderStage::Vertex, VERTEX)]);
        assert!(matches!(linked.errors[0], RenderError::Link { .. }));
    }

    #[test]
    fn compute_only_program_links() {
        let linked = link(&[src(
            ShaderStage::Compute,
            "@compute @workgroup_size(1) fn cs_main() {}",
        )]);
        assert!(linked.is_usable(), "{:?}", linked.errors);
    }

    #[test]
    fn reports_vertex_inputs() {
        let linked = link(&[src(ShaderStage::Vertex, VERTEX), src(ShaderStage::Fragment, FRAGMENT)]);
        assert_eq!(linked.vertex_inputs, vec![POSITION_LOCATION, COLOR_LOCATION]);
    }

    #[test]
    fn extra_resources_fail_to_link() {
        let fragment = r#"
            @group(1) @binding(0) var<uniform> tint: vec4<f32>;
            @fragment fn fs_main() -> @location(0) vec4<f32> { return tint; }
        "#;
        let linked = link(&[src(ShaderStage::Vertex, VERTEX), src(ShaderStage::Fragment, fragment)]);
        assert!(matches!(linked.errors[0], RenderError::Link { .. }));
    }

    #[test]
    fn unknown_vertex_slot_fails_to_link() {
        let vertex = r#"
            @vertex
            fn vs_main(@location(0) p: vec3<f32>, @location(2) uv: vec2<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(p, uv.x);
            }
        "#;
        let fragment = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        let linked = link(&[src(ShaderStage::Vertex, vertex), src(ShaderStage::Fragment, fragment)]);
        assert!(matches!(linked.errors[0], RenderError::Link { .. }));
    }

    #[test]
    fn unmatched_fragment_input_fails_to_link() {
        let vertex = r#"
            @vertex
            fn vs_main(@location(0) p: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(p, 1.0);
            }
        "#;
        let linked = link(&[src(ShaderStage::Vertex, vertex), src(ShaderStage::Fragment, FRAGMENT)]);
        assert!(matches!(linked.errors[0], RenderError::Link { .. }));
    }

    #[test]
    fn conflicting_uniform_blocks_fail_to_link() {
        let fragment = r#"
            struct Uniforms { model: vec4<f32> };
            @group(0) @binding(0) var<uniform> u: Uniforms;
            @fragment fn fs_main() -> @location(0) vec4<f32> { return u.model; }
        "#;
        let linked = link(&[src(ShaderStage::Vertex, VERTEX), src(ShaderStage::Fragment, fragment)]);
        assert!(matches!(linked.errors[0], RenderError::Link { .. }));
    }

    #[test]
    fn differently_named_uniforms_may_not_share_bytes() {
        let fragment = r#"
            struct Tint { tint: vec4<f32> };
            @group(0) @binding(0) var<uniform> u: Tint;
            @fragment fn fs_main() -> @location(0) vec4<f32> { return u.tint; }
        "#;
        let linked = link(&[src(ShaderStage::Vertex, VERTEX), src(ShaderStage::Fragment, fragment)]);
        assert!(!linked.is_usable());
        assert!(matches!(linked.errors[0], RenderError::Link { .. }));
    }

    #[test]
    fn shared_block_with_extra_member_links() {
        let fragment = r#"
            struct Uniforms {
                projection: mat4x4<f32>,
                view: mat4x4<f32>,
                model: mat4x4<f32>,
                tint: vec4<f32>,
                weights: array<vec4<f32>, 2>,
            };
            @group(0) @binding(0) var<uniform> u: Uniforms;
            @fragment fn fs_main(@location(0) c: vec3<f32>) -> @location(0) vec4<f32> {
                return u.tint * vec4<f32>(c, 1.0) + u.weights[0];
            }
        "#;
        let linked = link(&[src(ShaderStage::Vertex, VERTEX), src(ShaderStage::Fragment, fragment)]);
        assert!(linked.is_usable(), "{:?}", linked.errors);
        assert_eq!(
            linked.uniforms.member("tint"),
            Some(UniformMember { offset: 192, kind: crate::render::uniform::UniformKind::Vec4 })
        );
        // the unsupported trailing array still counts towards the bound size
        assert_eq!(linked.uniforms.size(), 240);
    }
}
