//! Kernel IR: the binding layout inferred for a kernel.
//!
//! A [`KernelLayout`] is what the analyzer and assembler agree on and what the
//! resource binder reconciles arguments against: parameter slots in binding
//! group 0, uniform slots in binding group 1, and the workgroup size.

use crate::registry::{ImageFormat, ParamType, ScalarKind};

/// Binding group holding parameter slots.
pub const PARAM_GROUP: u32 = 0;
/// Binding group holding uniform slots.
pub const UNIFORM_GROUP: u32 = 1;

/// How a texture parameter is accessed by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Parse a config `rwmode` value.
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "r" | "read" | "readonly" | "read_only" => Some(AccessMode::ReadOnly),
            "w" | "write" | "writeonly" | "write_only" => Some(AccessMode::WriteOnly),
            "rw" | "read_write" | "readwrite" => Some(AccessMode::ReadWrite),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "read",
            AccessMode::WriteOnly => "write",
            AccessMode::ReadWrite => "read_write",
        }
    }
}

/// What kind of resource a parameter slot binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Storage buffer, always bound read-write.
    Buffer(ParamType),
    /// 2-D image with a fixed pixel format and compile-time access mode.
    Texture {
        ty: ParamType,
        format: ImageFormat,
        access: AccessMode,
    },
}

impl SlotKind {
    pub fn param_type(&self) -> ParamType {
        match self {
            SlotKind::Buffer(ty) => *ty,
            SlotKind::Texture { ty, .. } => *ty,
        }
    }

    pub fn is_texture(&self) -> bool {
        matches!(self, SlotKind::Texture { .. })
    }
}

/// A kernel parameter bound at `@group(0) @binding(index)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSlot {
    pub name: String,
    pub index: u32,
    pub kind: SlotKind,
}

/// A uniform discovered in the kernel body, bound at `@group(1) @binding(index)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: String,
    /// Scalar kind of the 4-wide vector the uniform holds.
    pub kind: ScalarKind,
    pub index: u32,
}

impl UniformSlot {
    pub fn wgsl_type(&self) -> String {
        format!("vec4<{}>", self.kind.wgsl())
    }

    pub fn glsl_type(&self) -> &'static str {
        match self.kind {
            ScalarKind::U32 => "uvec4",
            ScalarKind::I32 => "ivec4",
            ScalarKind::F32 => "vec4",
            ScalarKind::F64 => "dvec4",
        }
    }

    /// Size of the uniform block in bytes.
    pub fn byte_size(&self) -> u64 {
        4 * self.kind.byte_size() as u64
    }
}

/// Full binding layout of a compiled kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelLayout {
    pub params: Vec<ParamSlot>,
    pub uniforms: Vec<UniformSlot>,
    pub workgroup_size: [u32; 3],
}

impl KernelLayout {
    pub fn param(&self, name: &str) -> Option<&ParamSlot> {
        self.params.iter().find(|slot| slot.name == name)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformSlot> {
        self.uniforms.iter().find(|slot| slot.name == name)
    }

    /// Threads per workgroup.
    pub fn invocations_per_group(&self) -> u64 {
        self.workgroup_size.iter().map(|&n| n as u64).product()
    }
}
