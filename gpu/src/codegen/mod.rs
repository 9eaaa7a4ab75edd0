//! Kernel source code generation.
//!
//! Turns an analyzed kernel body into target shader text. [`rewrite`] holds
//! the dialect-independent lexical pipeline; [`wgsl`] and [`glsl`] provide the
//! per-dialect load/store/access forms, binding declarations and entry points.

pub mod glsl;
pub mod rewrite;
pub mod wgsl;

use serde::{Deserialize, Serialize};

use crate::kernel_ir::{KernelLayout, ParamSlot, UniformSlot};

/// Names the generated entry point forwards into module scope.
pub const BUILTIN_NAMES: &[&str] = &[
    "thread",
    "g_global_invocation_id",
    "g_local_invocation_id",
    "g_local_invocation_index",
    "g_workgroup_id",
    "g_num_workgroups",
];

/// Function the rewritten body is wrapped in.
pub const BODY_FN: &str = "csmain";
/// Name of the generated entry point.
pub const ENTRY_POINT: &str = "main";

/// Shader dialect to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Wgsl,
    Glsl,
}

impl Target {
    pub fn name(self) -> &'static str {
        match self {
            Target::Wgsl => "wgsl",
            Target::Glsl => "glsl",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "wgsl" => Some(Target::Wgsl),
            "glsl" | "glsl450" => Some(Target::Glsl),
            _ => None,
        }
    }

    /// Builtin call that writes one texel.
    pub fn store_function(self) -> &'static str {
        match self {
            Target::Wgsl => "textureStore",
            Target::Glsl => "imageStore",
        }
    }

    /// True when `name` cannot be used as a kernel parameter.
    pub fn is_reserved(self, name: &str) -> bool {
        if BUILTIN_NAMES.contains(&name) || name == BODY_FN || name == ENTRY_POINT {
            return true;
        }
        match self {
            Target::Wgsl => wgsl::RESERVED.contains(&name),
            Target::Glsl => glsl::RESERVED.contains(&name) || name.starts_with("gl_"),
        }
    }

    /// Texel store: `name[row][col] = value` (or `name[pos] = value`).
    pub fn image_store(self, name: &str, coords: &Coords, value: &str) -> String {
        match self {
            Target::Wgsl => wgsl::image_store(name, coords, value),
            Target::Glsl => glsl::image_store(name, coords, value),
        }
    }

    /// Texel load. `read_write` images are storage textures and take no mip level.
    pub fn image_load(self, name: &str, coords: &Coords, read_write: bool) -> String {
        match self {
            Target::Wgsl => wgsl::image_load(name, coords, read_write),
            Target::Glsl => glsl::image_load(name, coords),
        }
    }

    /// Element access on a storage buffer parameter.
    pub fn buffer_access(self, name: &str, index: &str) -> String {
        match self {
            Target::Wgsl => format!("{}[{}]", name, index),
            Target::Glsl => format!("{}.data[{}]", name, index),
        }
    }

    /// Header of a hoisted helper `function NAME(ARGS) [-> RET]`.
    pub fn helper_header(self, name: &str, args: &str, ret: Option<&str>) -> String {
        match self {
            Target::Wgsl => match ret {
                Some(ret) => format!("fn {}({}) -> {}", name, args, ret),
                None => format!("fn {}({})", name, args),
            },
            Target::Glsl => format!("{} {}({})", ret.unwrap_or("void"), name, args),
        }
    }

    pub fn prelude(self, workgroup_size: [u32; 3]) -> String {
        match self {
            Target::Wgsl => String::new(),
            Target::Glsl => glsl::prelude(workgroup_size),
        }
    }

    pub fn param_binding(self, slot: &ParamSlot) -> String {
        match self {
            Target::Wgsl => wgsl::param_binding(slot),
            Target::Glsl => glsl::param_binding(slot),
        }
    }

    pub fn uniform_binding(self, slot: &UniformSlot) -> String {
        match self {
            Target::Wgsl => wgsl::uniform_binding(slot),
            Target::Glsl => glsl::uniform_binding(slot),
        }
    }

    /// Module-scope variables the entry point copies builtins into.
    pub fn builtin_vars(self) -> &'static str {
        match self {
            Target::Wgsl => wgsl::BUILTIN_VARS,
            Target::Glsl => glsl::BUILTIN_VARS,
        }
    }

    /// `csmain` wrapper around the rewritten body.
    pub fn body_fn(self, body: &str) -> String {
        match self {
            Target::Wgsl => format!("fn {}() {{\n{}\n}}\n", BODY_FN, body.trim_end()),
            Target::Glsl => format!("void {}() {{\n{}\n}}\n", BODY_FN, body.trim_end()),
        }
    }

    pub fn entry_point(self, layout: &KernelLayout) -> String {
        match self {
            Target::Wgsl => wgsl::entry_point(layout.workgroup_size),
            Target::Glsl => glsl::entry_point(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Texel coordinates taken from a subscript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coords {
    /// `name[row][col]`: texel x = col, y = row.
    RowCol { row: String, col: String },
    /// `name[pos]`: a 2-component vector already in (x, y) order.
    Vector(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_serde_names() {
        assert_eq!(serde_json::to_string(&Target::Glsl).unwrap(), "\"glsl\"");
        let t: Target = serde_json::from_str("\"wgsl\"").unwrap();
        assert_eq!(t, Target::Wgsl);
        assert_eq!(Target::parse("GLSL"), Some(Target::Glsl));
        assert_eq!(Target::parse("msl"), None);
    }

    #[test]
    fn test_reserved_names() {
        assert!(Target::Wgsl.is_reserved("thread"));
        assert!(Target::Wgsl.is_reserved("main"));
        assert!(Target::Wgsl.is_reserved("loop"));
        assert!(!Target::Wgsl.is_reserved("src"));
        assert!(Target::Glsl.is_reserved("gl_Position"));
        assert!(Target::Glsl.is_reserved("image2D"));
        assert!(!Target::Glsl.is_reserved("histo"));
    }

    #[test]
    fn test_helper_headers() {
        assert_eq!(
            Target::Wgsl.helper_header("YSize", "", Some("u32")),
            "fn YSize() -> u32"
        );
        assert_eq!(
            Target::Glsl.helper_header("scale", "float v", Some("float")),
            "float scale(float v)"
        );
        assert_eq!(Target::Glsl.helper_header("noop", "", None), "void noop()");
    }

    #[test]
    fn test_buffer_access_forms() {
        assert_eq!(Target::Wgsl.buffer_access("A", "i"), "A[i]");
        assert_eq!(Target::Glsl.buffer_access("A", "i"), "A.data[i]");
    }
}
