//! Uniform values and the uniform block layout they are written into.
//!
//! Programs expose their uniforms through one WGSL `var<uniform>` bound at
//! `@group(0) @binding(0)`. Its struct members are addressed by name, the same
//! way the application addresses them through [`ShaderProgram::set_uniform`].
//!
//! [`ShaderProgram::set_uniform`]: super::shader::ShaderProgram::set_uniform

use std::collections::HashMap;

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

/// Bind group slot of the uniform block.
pub const UNIFORM_GROUP: u32 = 0;
/// Binding slot of the uniform block inside [`UNIFORM_GROUP`].
pub const UNIFORM_BINDING: u32 = 0;

/// Tagged uniform value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Mat2(_) => "mat2",
            Self::Mat3(_) => "mat3",
            Self::Mat4(_) => "mat4",
        }
    }

    /// Encodes the value with the WGSL uniform layout of `kind`.
    ///
    /// Returns `None` if the value cannot be stored in a member of that kind.
    /// WGSL has no host-shareable `bool`, so booleans go into `u32`/`i32` members.
    pub fn encode(&self, kind: UniformKind) -> Option<Vec<u8>> {
        let bytes = match (*self, kind) {
            (Self::Bool(b), UniformKind::Uint) => bytemuck::bytes_of(&(b as u32)).to_vec(),
            (Self::Bool(b), UniformKind::Sint) => bytemuck::bytes_of(&(b as i32)).to_vec(),
            (Self::Int(v), UniformKind::Sint) => bytemuck::bytes_of(&v).to_vec(),
            (Self::Int(v), UniformKind::Uint) if v >= 0 => bytemuck::bytes_of(&(v as u32)).to_vec(),
            (Self::Float(v), UniformKind::Float) => bytemuck::bytes_of(&v).to_vec(),
            (Self::Vec2(v), UniformKind::Vec2) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            (Self::Vec3(v), UniformKind::Vec3) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            (Self::Vec4(v), UniformKind::Vec4) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            // mat2x2<f32>: two vec2 columns, tightly packed.
            (Self::Mat2(m), UniformKind::Mat2) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
            // mat3x3<f32>: three vec3 columns, each padded to 16 bytes.
            (Self::Mat3(m), UniformKind::Mat3) => {
                let mut padded = [0.0f32; 12];
                for (i, col) in m.to_cols_array_2d().iter().enumerate() {
                    padded[i * 4..i * 4 + 3].copy_from_slice(col);
                }
                bytemuck::cast_slice(&padded).to_vec()
            }
            (Self::Mat4(m), UniformKind::Mat4) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
            _ => return None,
        };
        Some(bytes)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat2> for UniformValue {
    fn from(v: Mat2) -> Self {
        Self::Mat2(v)
    }
}

impl From<Mat3> for UniformValue {
    fn from(v: Mat3) -> Self {
        Self::Mat3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

/// Type of a uniform block member as declared in the shader.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UniformKind {
    Sint,
    Uint,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl UniformKind {
    /// Size in bytes under the WGSL uniform layout rules.
    pub fn size(self) -> u32 {
        match self {
            Self::Sint | Self::Uint | Self::Float => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 | Self::Mat2 => 16,
            Self::Mat3 => 48,
            Self::Mat4 => 64,
        }
    }

    fn from_naga(inner: &naga::TypeInner) -> Option<Self> {
        use naga::{ScalarKind, TypeInner, VectorSize};

        match inner {
            TypeInner::Scalar(s) if s.width == 4 => match s.kind {
                ScalarKind::Sint => Some(Self::Sint),
                ScalarKind::Uint => Some(Self::Uint),
                ScalarKind::Float => Some(Self::Float),
                _ => None,
            },
            TypeInner::Vector { size, scalar }
                if scalar.kind == ScalarKind::Float && scalar.width == 4 =>
            {
                match size {
                    VectorSize::Bi => Some(Self::Vec2),
                    VectorSize::Tri => Some(Self::Vec3),
                    VectorSize::Quad => Some(Self::Vec4),
                }
            }
            TypeInner::Matrix { columns, rows, scalar }
                if scalar.kind == ScalarKind::Float && scalar.width == 4 =>
            {
                match (columns, rows) {
                    (VectorSize::Bi, VectorSize::Bi) => Some(Self::Mat2),
                    (VectorSize::Tri, VectorSize::Tri) => Some(Self::Mat3),
                    (VectorSize::Quad, VectorSize::Quad) => Some(Self::Mat4),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// A named slot in the uniform block.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UniformMember {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Reflected layout of a program's uniform block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformBlock {
    size: u32,
    members: HashMap<String, UniformMember>,
}

impl UniformBlock {
    /// Reflects the block bound at [`UNIFORM_GROUP`]/[`UNIFORM_BINDING`].
    ///
    /// A struct-typed block exposes its members by member name; a bare
    /// `var<uniform> mvp: mat4x4<f32>` is exposed under the variable name.
    /// Returns an empty block when the module declares no uniforms.
    pub fn reflect(module: &naga::Module) -> Self {
        let global = module.global_variables.iter().find(|(_, var)| {
            var.space == naga::AddressSpace::Uniform
                && var.binding.as_ref().is_some_and(|b| {
                    b.group == UNIFORM_GROUP && b.binding == UNIFORM_BINDING
                })
        });

        let Some((_, var)) = global else {
            return Self::default();
        };

        let mut block = Self::default();
        match &module.types[var.ty].inner {
            naga::TypeInner::Struct { members, span } => {
                block.size = *span;
                for member in members {
                    let Some(name) = member.name.as_ref() else { continue };
                    match UniformKind::from_naga(&module.types[member.ty].inner) {
                        Some(kind) => {
                            block.members.insert(
                                name.clone(),
                                UniformMember { offset: member.offset, kind },
                            );
                        }
                        None => log::debug!("uniform member `{name}` has an unsupported type; skipped"),
                    }
                }
            }
            other => {
                if let (Some(name), Some(kind)) = (var.name.as_ref(), UniformKind::from_naga(other)) {
                    block.size = kind.size();
                    block.members.insert(name.clone(), UniformMember { offset: 0, kind });
                }
            }
        }
        block
    }

    /// Builds a block from explicit members. The size covers the furthest member.
    pub fn from_members<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = (S, UniformMember)>,
        S: Into<String>,
    {
        let members: HashMap<String, UniformMember> =
            members.into_iter().map(|(n, m)| (n.into(), m)).collect();
        let size = members
            .values()
            .map(|m| m.offset + m.kind.size())
            .max()
            .unwrap_or(0);
        Self { size, members }
    }

    /// Grows the block to at least `size` bytes.
    pub fn with_min_size(mut self, size: u32) -> Self {
        self.size = self.size.max(size);
        self
    }

    /// Size of the block in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Resolves a uniform name to its slot.
    pub fn member(&self, name: &str) -> Option<UniformMember> {
        self.members.get(name).copied()
    }

    pub fn members(&self) -> impl Iterator<Item = (&String, &UniformMember)> {
        self.members.iter()
    }

    /// Resolves `name` and encodes `value` for its slot.
    ///
    /// Returns the byte offset inside the block along with the encoded bytes.
    pub fn encode_write(
        &self,
        name: &str,
        value: &UniformValue,
    ) -> Result<(u32, Vec<u8>), UniformWriteError> {
        let member = self
            .member(name)
            .ok_or_else(|| UniformWriteError::UnknownName(name.to_string()))?;
        let bytes = value
            .encode(member.kind)
            .ok_or_else(|| UniformWriteError::TypeMismatch {
                name: name.to_string(),
                expected: member.kind,
                got: value.type_name(),
            })?;
        Ok((member.offset, bytes))
    }
}

/// Why a uniform write did not reach the device.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniformWriteError {
    #[error("no active uniform named `{0}`")]
    UnknownName(String),

    #[error("uniform `{name}` is declared as {expected:?}, got a {got} value")]
    TypeMismatch {
        name: String,
        expected: UniformKind,
        got: &'static str,
    },

    #[error("program is not usable")]
    UnusableProgram,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_SRC: &str = r#"
        struct Uniforms {
            projection: mat4x4<f32>,
            view: mat4x4<f32>,
            model: mat4x4<f32>,
            tint: vec3<f32>,
            time: f32,
            flags: u32,
        };
        @group(0) @binding(0) var<uniform> u: Uniforms;

        @vertex
        fn vs_main(@location(0) p: vec3<f32>) -> @builtin(position) vec4<f32> {
            return u.projection * u.view * u.model * vec4<f32>(p, 1.0);
        }
    "#;

    fn parse(src: &str) -> naga::Module {
        naga::front::wgsl::parse_str(src).expect("test shader parses")
    }

    #[test]
    fn reflects_struct_members_by_name() {
        let block = UniformBlock::reflect(&parse(BLOCK_SRC));

        assert_eq!(block.member("projection"), Some(UniformMember { offset: 0, kind: UniformKind::Mat4 }));
        assert_eq!(block.member("view"), Some(UniformMember { offset: 64, kind: UniformKind::Mat4 }));
        assert_eq!(block.member("model"), Some(UniformMember { offset: 128, kind: UniformKind::Mat4 }));
        assert_eq!(block.member("tint"), Some(UniformMember { offset: 192, kind: UniformKind::Vec3 }));
        // f32 packs into the tail of the vec3 slot.
        assert_eq!(block.member("time"), Some(UniformMember { offset: 204, kind: UniformKind::Float }));
        assert_eq!(block.member("flags"), Some(UniformMember { offset: 208, kind: UniformKind::Uint }));
        assert_eq!(block.member("missing"), None);
        assert_eq!(block.size(), 224);
    }

    #[test]
    fn reflects_bare_uniform_variable() {
        let block = UniformBlock::reflect(&parse(
            "@group(0) @binding(0) var<uniform> mvp: mat4x4<f32>;
             @vertex fn vs_main() -> @builtin(position) vec4<f32> { return mvp[0]; }",
        ));
        assert_eq!(block.member("mvp"), Some(UniformMember { offset: 0, kind: UniformKind::Mat4 }));
        assert_eq!(block.size(), 64);
    }

    #[test]
    fn module_without_uniforms_reflects_empty() {
        let block = UniformBlock::reflect(&parse(
            "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }",
        ));
        assert!(block.is_empty());
        assert_eq!(block.size(), 0);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let m = Mat3::from_cols_array(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let bytes = UniformValue::Mat3(m).encode(UniformKind::Mat3).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0, 7.0, 8.0, 9.0, 0.0]);
    }

    #[test]
    fn bool_is_stored_as_integer() {
        assert_eq!(UniformValue::Bool(true).encode(UniformKind::Uint), Some(1u32.to_ne_bytes().to_vec()));
        assert_eq!(UniformValue::Bool(false).encode(UniformKind::Sint), Some(0i32.to_ne_bytes().to_vec()));
        assert_eq!(UniformValue::Bool(true).encode(UniformKind::Float), None);
    }

    #[test]
    fn encode_write_resolves_by_name() {
        let block = UniformBlock::reflect(&parse(BLOCK_SRC));

        let (offset, bytes) = block.encode_write("time", &UniformValue::Float(2.0)).unwrap();
        assert_eq!(offset, 204);
        assert_eq!(bytes, 2.0f32.to_ne_bytes().to_vec());

        assert_eq!(
            block.encode_write("nope", &UniformValue::Float(2.0)),
            Err(UniformWriteError::UnknownName("nope".into()))
        );
        assert!(matches!(
            block.encode_write("model", &UniformValue::Float(2.0)),
            Err(UniformWriteError::TypeMismatch { expected: UniformKind::Mat4, got: "float", .. })
        ));
    }

    #[test]
    fn mismatched_kinds_do_not_encode() {
        assert!(UniformValue::Float(1.0).encode(UniformKind::Vec3).is_none());
        assert!(UniformValue::Mat4(Mat4::IDENTITY).encode(UniformKind::Mat3).is_none());
        assert!(UniformValue::Int(-1).encode(UniformKind::Uint).is_none());
        assert_eq!(UniformValue::Int(7).encode(UniformKind::Uint), Some(7u32.to_ne_bytes().to_vec()));
    }
}
