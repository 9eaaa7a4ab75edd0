//! Kernel configuration.
//!
//! Mirrors the settings object accepted by `create_kernel`:
//!
//! ```json
//! {
//!   "local_size": [8, 8, 1],
//!   "groups": [8, 8, 1],
//!   "params": { "src": "texture", "dst": { "type": "texture", "attr": "rgba8", "rwmode": "write" } },
//!   "target": "wgsl"
//! }
//! ```
//!
//! Uniform metadata is never part of the configuration; it is always derived
//! from the kernel body.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codegen::Target;
use crate::error::{GpuError, Result};
use crate::kernel_ir::AccessMode;
use crate::registry::{self, ImageFormat, ParamType};

fn default_local_size() -> [u32; 3] {
    [32, 1, 1]
}

/// Caller-supplied kernel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default = "default_local_size")]
    pub local_size: [u32; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<[u32; 3]>,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,
    #[serde(default)]
    pub target: Target,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            local_size: default_local_size(),
            groups: None,
            params: BTreeMap::new(),
            target: Target::default(),
        }
    }
}

impl KernelConfig {
    pub fn new(local_size: [u32; 3]) -> Self {
        KernelConfig {
            local_size,
            ..Default::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: KernelConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn groups(mut self, groups: [u32; 3]) -> Self {
        self.groups = Some(groups);
        self
    }

    /// Declare a parameter by type tag (`"float[]"`, `"texture"`, ...).
    pub fn param(mut self, name: &str, tag: &str) -> Self {
        self.params
            .insert(name.to_string(), ParamSpec::Tag(tag.to_string()));
        self
    }

    pub fn param_spec(mut self, name: &str, spec: ParamSpec) -> Self {
        self.params.insert(name.to_string(), spec);
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_size.iter().any(|&n| n == 0) {
            return Err(GpuError::config(format!(
                "local_size components must be > 0, got {:?}",
                self.local_size
            )));
        }
        if let Some(groups) = self.groups {
            if groups.iter().any(|&n| n == 0) {
                return Err(GpuError::config(format!(
                    "groups components must be > 0, got {:?}",
                    groups
                )));
            }
        }
        for (name, spec) in &self.params {
            spec.resolve()
                .map_err(|e| GpuError::config(format!("parameter '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// Resolved declaration for `name`, if the configuration mentions it.
    pub fn declared(&self, name: &str) -> Result<Option<ParamDecl>> {
        self.params.get(name).map(ParamSpec::resolve).transpose()
    }
}

/// One entry of the `params` map: a bare tag or `{type, attr?, rwmode?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamSpec {
    Tag(String),
    Detailed {
        #[serde(rename = "type")]
        ty: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attr: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rwmode: Option<String>,
    },
}

impl ParamSpec {
    pub fn resolve(&self) -> Result<ParamDecl> {
        match self {
            ParamSpec::Tag(tag) => {
                let resolved = registry::resolve_tag(tag)?;
                Ok(ParamDecl {
                    ty: resolved.ty,
                    format: resolved.format,
                    access: None,
                })
            }
            ParamSpec::Detailed { ty, attr, rwmode } => {
                let resolved = registry::resolve_tag(ty)?;
                let mut decl = ParamDecl {
                    ty: resolved.ty,
                    format: resolved.format,
                    access: None,
                };
                if let Some(attr) = attr {
                    let format = ImageFormat::parse(attr).ok_or_else(|| {
                        GpuError::config(format!("unknown image format '{}'", attr))
                    })?;
                    if !decl.ty.is_image() {
                        return Err(GpuError::config(format!(
                            "image format '{}' given for buffer type '{}'",
                            attr, ty
                        )));
                    }
                    decl.ty = format.param_type();
                    decl.format = Some(format);
                }
                if let Some(mode) = rwmode {
                    let access = AccessMode::parse(mode).ok_or_else(|| {
                        GpuError::config(format!("unknown rwmode '{}'", mode))
                    })?;
                    decl.access = Some(access);
                }
                Ok(decl)
            }
        }
    }
}

/// A resolved parameter declaration (from config or from the kernel body).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDecl {
    pub ty: ParamType,
    pub format: Option<ImageFormat>,
    pub access: Option<AccessMode>,
}

impl ParamDecl {
    pub fn of(ty: ParamType) -> Self {
        ParamDecl {
            ty,
            format: None,
            access: None,
        }
    }
}

impl Default for ParamDecl {
    fn default() -> Self {
        ParamDecl::of(ParamType::default())
    }
}
