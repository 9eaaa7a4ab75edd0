//! GLSL 450 code generation.
//!
//! Storage buffers are `std430` blocks with a single runtime-sized `data`
//! member, images are storage images with an explicit format qualifier, and
//! each uniform is its own `std140` block in set 1.

use super::Coords;
use crate::kernel_ir::{AccessMode, ParamSlot, SlotKind, UniformSlot, PARAM_GROUP, UNIFORM_GROUP};
use crate::registry::ScalarKind;

pub const RESERVED: &[&str] = &[
    "attribute", "const", "uniform", "buffer", "shared", "coherent", "volatile", "restrict",
    "readonly", "writeonly", "layout", "centroid", "flat", "smooth", "break", "continue", "do",
    "for", "while", "switch", "case", "default", "if", "else", "in", "out", "inout", "float",
    "double", "int", "uint", "void", "bool", "true", "false", "discard", "return", "struct",
    "vec2", "vec3", "vec4", "ivec2", "ivec3", "ivec4", "uvec2", "uvec3", "uvec4", "dvec2",
    "dvec3", "dvec4", "bvec2", "bvec3", "bvec4", "mat2", "mat3", "mat4", "image2D", "iimage2D",
    "uimage2D", "sampler2D", "texture2D", "precision", "highp", "mediump", "lowp", "invariant",
    "precise", "subroutine", "patch", "sample",
];

pub const BUILTIN_VARS: &str = "\
uvec3 thread;
uvec3 g_global_invocation_id;
uvec3 g_local_invocation_id;
uint g_local_invocation_index;
uvec3 g_workgroup_id;
uvec3 g_num_workgroups;
";

fn coords(coords: &Coords) -> String {
    match coords {
        Coords::RowCol { row, col } => format!("ivec2(int({}), int({}))", col, row),
        Coords::Vector(pos) => format!("ivec2({})", pos),
    }
}

pub fn image_store(name: &str, at: &Coords, value: &str) -> String {
    format!("imageStore({}, {}, {})", name, coords(at), value)
}

pub fn image_load(name: &str, at: &Coords) -> String {
    format!("imageLoad({}, {})", name, coords(at))
}

pub fn prelude(workgroup_size: [u32; 3]) -> String {
    let [x, y, z] = workgroup_size;
    format!(
        "#version 450\nlayout(local_size_x = {}, local_size_y = {}, local_size_z = {}) in;\n",
        x, y, z
    )
}

fn image_type(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::U32 => "uimage2D",
        ScalarKind::I32 => "iimage2D",
        ScalarKind::F32 | ScalarKind::F64 => "image2D",
    }
}

pub fn param_binding(slot: &ParamSlot) -> String {
    match slot.kind {
        SlotKind::Buffer(ty) => format!(
            "layout(set = {}, binding = {}, std430) buffer Slot_{} {{ {} data[]; }} {};",
            PARAM_GROUP,
            slot.index,
            slot.name,
            ty.scalar().glsl(),
            slot.name
        ),
        SlotKind::Texture { format, access, .. } => {
            let qualifier = match access {
                AccessMode::ReadOnly => "readonly ",
                AccessMode::WriteOnly => "writeonly ",
                AccessMode::ReadWrite => "",
            };
            format!(
                "layout(set = {}, binding = {}, {}) uniform {}{} {};",
                PARAM_GROUP,
                slot.index,
                format.glsl_token(),
                qualifier,
                image_type(format.sample_kind()),
                slot.name
            )
        }
    }
}

pub fn uniform_binding(slot: &UniformSlot) -> String {
    format!(
        "layout(set = {}, binding = {}, std140) uniform Uniform_{} {{ {} {}; }};",
        UNIFORM_GROUP,
        slot.index,
        slot.name,
        slot.glsl_type(),
        slot.name
    )
}

pub fn entry_point() -> String {
    "void main() {
    thread = gl_GlobalInvocationID;
    g_global_invocation_id = gl_GlobalInvocationID;
    g_local_invocation_id = gl_LocalInvocationID;
    g_local_invocation_index = gl_LocalInvocationIndex;
    g_workgroup_id = gl_WorkGroupID;
    g_num_workgroups = gl_NumWorkGroups;
    csmain();
}
"
    .to_string()
}
