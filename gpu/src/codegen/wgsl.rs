//! WebGPU Shading Language (WGSL) code generation.
//!
//! Parameters bind at `@group(0) @binding(N)` in declaration order, uniforms
//! at `@group(1) @binding(N)` in discovery order. The entry point copies the
//! invocation builtins into module-scope `var<private>` globals so the kernel
//! body (wrapped in `csmain`) and hoisted helpers can read them.

use super::Coords;
use crate::kernel_ir::{AccessMode, ParamSlot, SlotKind, UniformSlot, PARAM_GROUP, UNIFORM_GROUP};

/// Keywords and reserved words a parameter must not shadow.
pub const RESERVED: &[&str] = &[
    "alias", "array", "atomic", "bitcast", "bool", "break", "case", "const", "const_assert",
    "continue", "continuing", "default", "diagnostic", "discard", "else", "enable", "f16", "f32",
    "f64", "false", "fn", "for", "function", "if", "i32", "let", "loop", "mat2x2", "mat3x3",
    "mat4x4", "override", "private", "ptr", "requires", "return", "sampler", "storage", "struct",
    "switch", "texture_2d", "true", "u32", "uniform", "var", "vec2", "vec3", "vec4", "while",
    "workgroup", "this", "self", "shared", "filter", "target", "type", "set", "common", "layout",
    "module", "static", "enum", "mod", "use", "where", "new", "null", "handle",
];

pub const BUILTIN_VARS: &str = "\
var<private> thread: vec3<u32>;
var<private> g_global_invocation_id: vec3<u32>;
var<private> g_local_invocation_id: vec3<u32>;
var<private> g_local_invocation_index: u32;
var<private> g_workgroup_id: vec3<u32>;
var<private> g_num_workgroups: vec3<u32>;
";

fn coords(coords: &Coords) -> String {
    match coords {
        Coords::RowCol { row, col } => format!("vec2<i32>(i32({}), i32({}))", col, row),
        Coords::Vector(pos) => format!("vec2<i32>({})", pos),
    }
}

pub fn image_store(name: &str, at: &Coords, value: &str) -> String {
    format!("textureStore({}, {}, {})", name, coords(at), value)
}

pub fn image_load(name: &str, at: &Coords, read_write: bool) -> String {
    if read_write {
        format!("textureLoad({}, {})", name, coords(at))
    } else {
        format!("textureLoad({}, {}, 0)", name, coords(at))
    }
}

/// Binding declaration for one parameter slot.
pub fn param_binding(slot: &ParamSlot) -> String {
    let ty = match slot.kind {
        SlotKind::Buffer(ty) => {
            return format!(
                "@group({}) @binding({}) var<storage, read_write> {}: array<{}>;",
                PARAM_GROUP,
                slot.index,
                slot.name,
                ty.scalar().wgsl()
            );
        }
        SlotKind::Texture {
            format,
            access: AccessMode::ReadOnly,
            ..
        } => format!("texture_2d<{}>", format.sample_kind().wgsl()),
        SlotKind::Texture { format, access, .. } => {
            format!("texture_storage_2d<{}, {}>", format.wgsl_token(), access.name())
        }
    };
    format!(
        "@group({}) @binding({}) var {}: {};",
        PARAM_GROUP, slot.index, slot.name, ty
    )
}

pub fn uniform_binding(slot: &UniformSlot) -> String {
    format!(
        "@group({}) @binding({}) var<uniform> {}: {};",
        UNIFORM_GROUP,
        slot.index,
        slot.name,
        slot.wgsl_type()
    )
}

pub fn entry_point(workgroup_size: [u32; 3]) -> String {
    let [x, y, z] = workgroup_size;
    format!(
        r#"@compute @workgroup_size({x}, {y}, {z})
fn main(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(local_invocation_index) local_index: u32,
    @builtin(workgroup_id) group_id: vec3<u32>,
    @builtin(num_workgroups) group_count: vec3<u32>,
) {{
    thread = global_id;
    g_global_invocation_id = global_id;
    g_local_invocation_id = local_id;
    g_local_invocation_index = local_index;
    g_workgroup_id = group_id;
    g_num_workgroups = group_count;
    csmain();
}}
"#
    )
}
