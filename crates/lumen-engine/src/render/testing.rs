//! Shared fixtures for the render tests.

use std::path::{Path, PathBuf};

/// Vertex stage with the camera/model uniform block and a color attribute.
pub const VERTEX_SRC: &str = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    model: mat4x4<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;

struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_main(@location(0) p: vec3<f32>, @location(1) c: vec3<f32>) -> VsOut {
    var out: VsOut;
    out.position = u.projection * u.view * u.model * vec4<f32>(p, 1.0);
    out.color = c;
    return out;
}
"#;

pub const FRAGMENT_SRC: &str = r#"
@fragment
fn fs_main(@location(0) color: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(color, 1.0);
}
"#;

/// Writes the vertex and fragment fixtures into `dir`.
pub fn write_shaders(dir: &Path) -> (PathBuf, PathBuf) {
    let vertex = dir.join("basic.vert.wgsl");
    let fragment = dir.join("basic.frag.wgsl");
    std::fs::write(&vertex, VERTEX_SRC).expect("write vertex fixture");
    std::fs::write(&fragment, FRAGMENT_SRC).expect("write fragment fixture");
    (vertex, fragment)
}
