//! Shader module and pipeline creation.
//!
//! Generated programs get bind group layouts built from their slot table.
//! Literal programs get layouts read from every binding their module
//! declares, so bindings `main` never touches still have a layout entry.

use std::borrow::Cow;

use log::debug;

use super::device_init::WgpuContext;
use crate::assembler::ShaderProgram;
use crate::codegen::{Target, ENTRY_POINT};
use crate::error::{GpuError, Result};
use crate::kernel_ir::{AccessMode, KernelLayout, SlotKind, PARAM_GROUP, UNIFORM_GROUP};
use crate::reflect::storage_format;
use crate::registry::ScalarKind;

/// A backend shader module plus how its bind group layouts are obtained.
pub struct CompiledKernel {
    pub module: wgpu::ShaderModule,
    /// Layouts come from the naga module rather than the slot table.
    pub literal: bool,
}

/// Pipeline and the layouts bind groups are created against.
pub struct WgpuPipeline {
    pub pipeline: wgpu::ComputePipeline,
    pub param_layout: wgpu::BindGroupLayout,
    pub uniform_layout: Option<wgpu::BindGroupLayout>,
}

/// Compile a program into a shader module. Rejection is a compile error.
pub fn compile_program(
    ctx: &WgpuContext,
    program: &ShaderProgram,
    literal: bool,
) -> Result<CompiledKernel> {
    let source = match program.target {
        Target::Wgsl => wgpu::ShaderSource::Wgsl(Cow::Borrowed(program.source.as_str())),
        Target::Glsl => wgpu::ShaderSource::Naga(Cow::Owned(program.module.clone())),
    };

    let (module, error) = ctx.validation_scope(|| {
        ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("webcs_compute_shader"),
            source,
        })
    });
    if let Some(error) = error {
        return Err(GpuError::compile(
            "backend rejected the shader module",
            error.to_string(),
        ));
    }

    Ok(CompiledKernel { module, literal })
}

fn sample_type(kind: ScalarKind) -> wgpu::TextureSampleType {
    match kind {
        ScalarKind::U32 => wgpu::TextureSampleType::Uint,
        ScalarKind::I32 => wgpu::TextureSampleType::Sint,
        ScalarKind::F32 | ScalarKind::F64 => wgpu::TextureSampleType::Float { filterable: false },
    }
}

fn storage_access(access: AccessMode) -> wgpu::StorageTextureAccess {
    match access {
        AccessMode::ReadOnly => wgpu::StorageTextureAccess::ReadOnly,
        AccessMode::WriteOnly => wgpu::StorageTextureAccess::WriteOnly,
        AccessMode::ReadWrite => wgpu::StorageTextureAccess::ReadWrite,
    }
}

/// Layout entries for group 0. Read-only images are sampled textures in WGSL
/// and read-only storage images in GLSL.
pub fn param_layout_entries(layout: &KernelLayout, target: Target) -> Vec<wgpu::BindGroupLayoutEntry> {
    layout
        .params
        .iter()
        .map(|slot| {
            let ty = match slot.kind {
                SlotKind::Buffer(_) => wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                SlotKind::Texture {
                    format,
                    access: AccessMode::ReadOnly,
                    ..
                } if target == Target::Wgsl => wgpu::BindingType::Texture {
                    sample_type: sample_type(format.sample_kind()),
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                SlotKind::Texture { format, access, .. } => wgpu::BindingType::StorageTexture {
                    access: storage_access(access),
                    format: format.to_wgpu(),
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
            };
            wgpu::BindGroupLayoutEntry {
                binding: slot.index,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty,
                count: None,
            }
        })
        .collect()
}

pub fn uniform_layout_entries(layout: &KernelLayout) -> Vec<wgpu::BindGroupLayoutEntry> {
    layout
        .uniforms
        .iter()
        .map(|slot| wgpu::BindGroupLayoutEntry {
            binding: slot.index,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect()
}

fn storage_texture_access(access: naga::StorageAccess) -> wgpu::StorageTextureAccess {
    let load = access.contains(naga::StorageAccess::LOAD);
    let store = access.contains(naga::StorageAccess::STORE);
    match (load, store) {
        (true, true) => wgpu::StorageTextureAccess::ReadWrite,
        (false, true) => wgpu::StorageTextureAccess::WriteOnly,
        _ => wgpu::StorageTextureAccess::ReadOnly,
    }
}

/// Layout entries for every binding of `group` declared in a naga module,
/// with the exact buffer and texture access the shader declares.
pub fn module_layout_entries(
    module: &naga::Module,
    group: u32,
) -> Result<Vec<wgpu::BindGroupLayoutEntry>> {
    let mut entries = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let Some(binding) = var.binding.as_ref().filter(|b| b.group == group) else {
            continue;
        };
        let unsupported = || {
            GpuError::config(format!(
                "binding {} in group {} has no bind group layout equivalent",
                binding.binding, group
            ))
        };
        let ty = match (var.space, &module.types[var.ty].inner) {
            (naga::AddressSpace::Storage { access }, _) => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: !access.contains(naga::StorageAccess::STORE),
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            (naga::AddressSpace::Uniform, _) => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            (
                naga::AddressSpace::Handle,
                naga::TypeInner::Image {
                    dim: naga::ImageDimension::D2,
                    arrayed: false,
                    class,
                },
            ) => match *class {
                naga::ImageClass::Sampled { kind, multi } => wgpu::BindingType::Texture {
                    sample_type: match kind {
                        naga::ScalarKind::Uint => wgpu::TextureSampleType::Uint,
                        naga::ScalarKind::Sint => wgpu::TextureSampleType::Sint,
                        _ => wgpu::TextureSampleType::Float { filterable: false },
                    },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: multi,
                },
                naga::ImageClass::Storage { format, access } => wgpu::BindingType::StorageTexture {
                    access: storage_texture_access(access),
                    format: storage_format(format).ok_or_else(unsupported)?.to_wgpu(),
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                _ => return Err(unsupported()),
            },
            _ => return Err(unsupported()),
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: binding.binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        });
    }
    entries.sort_by_key(|entry| entry.binding);
    Ok(entries)
}

/// Build the compute pipeline. Rejection is a link error.
pub fn create_pipeline(
    ctx: &WgpuContext,
    kernel: &CompiledKernel,
    program: &ShaderProgram,
) -> Result<WgpuPipeline> {
    let layout = &program.layout;
    let (param_entries, uniform_entries) = if kernel.literal {
        (
            module_layout_entries(&program.module, PARAM_GROUP)?,
            module_layout_entries(&program.module, UNIFORM_GROUP)?,
        )
    } else {
        (
            param_layout_entries(layout, program.target),
            uniform_layout_entries(layout),
        )
    };

    let (built, error) = ctx.validation_scope(|| {
        let param_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("webcs_params"),
                entries: &param_entries,
            });
        let uniform_layout = (!uniform_entries.is_empty()).then(|| {
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("webcs_uniforms"),
                    entries: &uniform_entries,
                })
        });

        let mut groups = vec![&param_layout];
        groups.extend(uniform_layout.as_ref());
        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("webcs_pipeline_layout"),
                bind_group_layouts: &groups,
                push_constant_ranges: &[],
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("webcs_compute_pipeline"),
                layout: Some(&pipeline_layout),
                module: &kernel.module,
                entry_point: Some(ENTRY_POINT),
                compilation_options: Default::default(),
                cache: None,
            });
        WgpuPipeline {
            pipeline,
            param_layout,
            uniform_layout,
        }
    });

    if let Some(error) = error {
        return Err(GpuError::link(
            "backend could not build the compute pipeline",
            error.to_string(),
        ));
    }
    debug!(
        "built pipeline: {} param bindings, {} uniform bindings",
        layout.params.len(),
        layout.uniforms.len()
    );
    Ok(built)
}
