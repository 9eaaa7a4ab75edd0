//! Slot metadata for literal shader text, read from the parsed naga module.

use naga::{AddressSpace, ImageClass, ImageDimension, StorageAccess, StorageFormat, TypeInner};

use crate::codegen::ENTRY_POINT;
use crate::error::{GpuError, Result};
use crate::kernel_ir::{
    AccessMode, KernelLayout, ParamSlot, SlotKind, UniformSlot, PARAM_GROUP, UNIFORM_GROUP,
};
use crate::registry::{ImageFormat, ParamType, ScalarKind};

/// Recover parameter slots (group 0), uniform slots (group 1) and the
/// workgroup size of the `main` compute entry point.
pub fn layout_from_module(module: &naga::Module) -> Result<KernelLayout> {
    let mut params = Vec::new();
    let mut uniforms = Vec::new();

    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else { continue };
        let name = var.name.clone().unwrap_or_default();

        match binding.group {
            PARAM_GROUP => {
                let kind = param_kind(module, var.space, var.ty).ok_or_else(|| {
                    GpuError::config(format!(
                        "binding {} ('{}') in group {} is not a buffer or 2-D texture",
                        binding.binding, name, PARAM_GROUP
                    ))
                })?;
                params.push(ParamSlot {
                    name,
                    index: binding.binding,
                    kind,
                });
            }
            UNIFORM_GROUP => {
                let (member, kind) = uniform_kind(module, var.space, var.ty).ok_or_else(|| {
                    GpuError::config(format!(
                        "binding {} ('{}') in group {} is not a 4-wide uniform vector",
                        binding.binding, name, UNIFORM_GROUP
                    ))
                })?;
                uniforms.push(UniformSlot {
                    name: member.unwrap_or(name),
                    kind,
                    index: binding.binding,
                });
            }
            group => log::warn!("ignoring binding group {} in literal kernel", group),
        }
    }

    params.sort_by_key(|slot| slot.index);
    uniforms.sort_by_key(|slot| slot.index);
    check_dense(params.iter().map(|s| s.index), PARAM_GROUP)?;
    check_dense(uniforms.iter().map(|s| s.index), UNIFORM_GROUP)?;

    let workgroup_size = module
        .entry_points
        .iter()
        .find(|ep| ep.name == ENTRY_POINT && ep.stage == naga::ShaderStage::Compute)
        .map(|ep| ep.workgroup_size)
        .ok_or_else(|| {
            GpuError::config(format!("no compute entry point named '{}'", ENTRY_POINT))
        })?;

    Ok(KernelLayout {
        params,
        uniforms,
        workgroup_size,
    })
}

fn check_dense(indices: impl Iterator<Item = u32>, group: u32) -> Result<()> {
    for (expected, index) in indices.enumerate() {
        if index != expected as u32 {
            return Err(GpuError::config(format!(
                "bindings in group {} must be dense from 0; found {} where {} was expected",
                group, index, expected
            )));
        }
    }
    Ok(())
}

fn scalar_kind(scalar: naga::Scalar) -> Option<ScalarKind> {
    match (scalar.kind, scalar.width) {
        (naga::ScalarKind::Uint, 4) => Some(ScalarKind::U32),
        (naga::ScalarKind::Sint, 4) => Some(ScalarKind::I32),
        (naga::ScalarKind::Float, 4) => Some(ScalarKind::F32),
        (naga::ScalarKind::Float, 8) => Some(ScalarKind::F64),
        _ => None,
    }
}

pub(crate) fn storage_format(format: StorageFormat) -> Option<ImageFormat> {
    match format {
        StorageFormat::Rgba8Unorm => Some(ImageFormat::Rgba8Unorm),
        StorageFormat::Rgba32Float => Some(ImageFormat::Rgba32Float),
        StorageFormat::Rgba32Uint => Some(ImageFormat::Rgba32Uint),
        StorageFormat::Rgba32Sint => Some(ImageFormat::Rgba32Sint),
        StorageFormat::R32Float => Some(ImageFormat::R32Float),
        StorageFormat::R32Uint => Some(ImageFormat::R32Uint),
        StorageFormat::R32Sint => Some(ImageFormat::R32Sint),
        _ => None,
    }
}

/// Element scalar of a runtime array, looking through a wrapping block struct.
fn array_element(module: &naga::Module, ty: naga::Handle<naga::Type>) -> Option<ScalarKind> {
    match &module.types[ty].inner {
        TypeInner::Array { base, .. } => match module.types[*base].inner {
            TypeInner::Scalar(scalar) => scalar_kind(scalar),
            _ => None,
        },
        TypeInner::Struct { members, .. } => array_element(module, members.last()?.ty),
        _ => None,
    }
}

fn param_kind(
    module: &naga::Module,
    space: AddressSpace,
    ty: naga::Handle<naga::Type>,
) -> Option<SlotKind> {
    match (space, &module.types[ty].inner) {
        (AddressSpace::Storage { .. }, _) => {
            array_element(module, ty).map(|kind| SlotKind::Buffer(ParamType::buffer(kind)))
        }
        (
            AddressSpace::Handle,
            TypeInner::Image {
                dim: ImageDimension::D2,
                arrayed: false,
                class,
            },
        ) => match *class {
            ImageClass::Sampled { kind, multi: false } => {
                let format = match kind {
                    naga::ScalarKind::Float => ImageFormat::Rgba8Unorm,
                    naga::ScalarKind::Uint => ImageFormat::Rgba32Uint,
                    naga::ScalarKind::Sint => ImageFormat::Rgba32Sint,
                    _ => return None,
                };
                Some(SlotKind::Texture {
                    ty: format.param_type(),
                    format,
                    access: AccessMode::ReadOnly,
                })
            }
            ImageClass::Storage { format, access } => {
                let format = storage_format(format)?;
                let access = if access.contains(StorageAccess::LOAD | StorageAccess::STORE) {
                    AccessMode::ReadWrite
                } else if access.contains(StorageAccess::STORE) {
                    AccessMode::WriteOnly
                } else {
                    AccessMode::ReadOnly
                };
                Some(SlotKind::Texture {
                    ty: format.param_type(),
                    format,
                    access,
                })
            }
            _ => None,
        },
        _ => None,
    }
}

/// Scalar kind of a `vec4` uniform, and the member name when it is wrapped in a block.
fn uniform_kind(
    module: &naga::Module,
    space: AddressSpace,
    ty: naga::Handle<naga::Type>,
) -> Option<(Option<String>, ScalarKind)> {
    if space != AddressSpace::Uniform {
        return None;
    }
    match &module.types[ty].inner {
        TypeInner::Vector {
            size: naga::VectorSize::Quad,
            scalar,
        } => Some((None, scalar_kind(*scalar)?)),
        TypeInner::Struct { members, .. } if members.len() == 1 => {
            let member = &members[0];
            match module.types[member.ty].inner {
                TypeInner::Vector {
                    size: naga::VectorSize::Quad,
                    scalar,
                } => Some((member.name.clone(), scalar_kind(scalar)?)),
                _ => None,
            }
        }
        _ => None,
    }
}
