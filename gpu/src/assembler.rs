//! Program assembler.
//!
//! Drives analysis and rewriting of a kernel body, lays out the final shader
//! text and validates it with naga before any backend sees it.

use log::{debug, info, trace};

use crate::analyzer;
use crate::codegen::rewrite::{self, ParamForm, RewrittenSource};
use crate::codegen::Target;
use crate::config::{KernelConfig, ParamDecl};
use crate::error::{GpuError, Result};
use crate::kernel_ir::{AccessMode, KernelLayout, ParamSlot, SlotKind};
use crate::reflect;

/// How a kernel is defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelSource {
    /// Complete shader text, used verbatim. Slots are recovered by reflection.
    Literal(String),
    /// Pseudo-kernel body plus its ordered parameter names.
    Body { params: Vec<String>, body: String },
}

impl KernelSource {
    /// Body with a comma-separated parameter list (`"A, B, C"`).
    pub fn body(params: &str, body: impl Into<String>) -> Self {
        KernelSource::Body {
            params: analyzer::parse_param_list(params),
            body: body.into(),
        }
    }

    pub fn literal(text: impl Into<String>) -> Self {
        KernelSource::Literal(text.into())
    }
}

/// A complete, validated shader program and its binding layout.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub target: Target,
    pub source: String,
    pub layout: KernelLayout,
    pub module: naga::Module,
}

/// Build a program from either kind of kernel source.
pub fn compile(source: &KernelSource, config: &KernelConfig) -> Result<ShaderProgram> {
    match source {
        KernelSource::Literal(text) => from_literal(text, config.target),
        KernelSource::Body { params, body } => assemble(params, body, config),
    }
}

/// Analyze, rewrite and assemble a kernel body.
pub fn assemble(params: &[String], body: &str, config: &KernelConfig) -> Result<ShaderProgram> {
    config.validate()?;
    let target = config.target;
    analyzer::validate_param_names(params, target)?;

    let stripped = analyzer::strip_comments(body);
    let (stripped, hints) = analyzer::extract_param_declarations(&stripped, params)?;
    let decls = analyzer::resolve_params(params, config, &hints)?;
    let uniforms = analyzer::discover_uniforms(&stripped);

    let forms = decls
        .iter()
        .map(|(name, decl)| (name.clone(), param_form(decl)))
        .collect::<Vec<_>>();
    let rewritten = rewrite::rewrite(&stripped, target, &forms);
    let all_text = rewritten.all_text();

    let slots = decls
        .iter()
        .enumerate()
        .map(|(index, (name, decl))| {
            let kind = if decl.ty.is_image() {
                SlotKind::Texture {
                    ty: decl.ty,
                    format: image_format(name, decl)?,
                    access: analyzer::infer_access(decl, &all_text, name, target),
                }
            } else {
                SlotKind::Buffer(decl.ty)
            };
            Ok(ParamSlot {
                name: name.clone(),
                index: index as u32,
                kind,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let layout = KernelLayout {
        params: slots,
        uniforms,
        workgroup_size: config.local_size,
    };
    for slot in &layout.params {
        debug!("param slot {} '{}': {:?}", slot.index, slot.name, slot.kind);
    }

    let source = assemble_source(target, &layout, &rewritten);
    trace!("assembled {} source:\n{}", target, source);

    let module = parse_and_validate(target, &source)?;
    info!(
        "assembled {} kernel: {} params, {} uniforms, workgroup {:?}",
        target,
        layout.params.len(),
        layout.uniforms.len(),
        layout.workgroup_size
    );
    Ok(ShaderProgram {
        target,
        source,
        layout,
        module,
    })
}

/// Validate literal shader text and reflect its layout.
pub fn from_literal(text: &str, target: Target) -> Result<ShaderProgram> {
    let module = parse_and_validate(target, text)?;
    let layout = reflect::layout_from_module(&module)?;
    debug!(
        "literal {} kernel: {} params, {} uniforms",
        target,
        layout.params.len(),
        layout.uniforms.len()
    );
    Ok(ShaderProgram {
        target,
        source: text.to_string(),
        layout,
        module,
    })
}

fn param_form(decl: &ParamDecl) -> ParamForm {
    if decl.ty.is_image() {
        ParamForm::Image {
            read_write: decl.access == Some(AccessMode::ReadWrite),
        }
    } else {
        ParamForm::Buffer
    }
}

fn image_format(name: &str, decl: &ParamDecl) -> Result<crate::registry::ImageFormat> {
    decl.format
        .or_else(|| decl.ty.default_format())
        .ok_or_else(|| {
            GpuError::config(format!(
                "parameter '{}' of type '{}' has no texture representation",
                name,
                decl.ty.canonical_tag()
            ))
        })
}

/// Lay out the final program text.
pub fn assemble_source(target: Target, layout: &KernelLayout, rewritten: &RewrittenSource) -> String {
    let mut out = target.prelude(layout.workgroup_size);

    for slot in &layout.params {
        out.push_str(&target.param_binding(slot));
        out.push('\n');
    }
    for slot in &layout.uniforms {
        out.push_str(&target.uniform_binding(slot));
        out.push('\n');
    }
    out.push('\n');
    out.push_str(target.builtin_vars());

    for part in rewritten
        .shared
        .iter()
        .chain(&rewritten.consts)
        .chain(&rewritten.helpers)
    {
        out.push('\n');
        out.push_str(part);
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&target.body_fn(&rewritten.body));
    out.push('\n');
    out.push_str(&target.entry_point(layout));
    out
}

/// Parse `source` with the matching naga front end and validate the module.
pub fn parse_and_validate(target: Target, source: &str) -> Result<naga::Module> {
    let module = match target {
        Target::Wgsl => naga::front::wgsl::parse_str(source).map_err(|e| {
            GpuError::compile("WGSL front end rejected the program", e.emit_to_string(source))
        })?,
        Target::Glsl => {
            let options = naga::front::glsl::Options::from(naga::ShaderStage::Compute);
            naga::front::glsl::Frontend::default()
                .parse(&options, source)
                .map_err(|e| {
                    GpuError::compile("GLSL front end rejected the program", format!("{:?}", e))
                })?
        }
    };

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| GpuError::compile("shader validation failed", format!("{}", e)))?;

    Ok(module)
}
