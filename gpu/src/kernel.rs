//! Kernel handle: per-slot resources, argument reconciliation and dispatch.
//!
//! A handle starts out compiled. The first `run` builds the pipeline, every
//! `run` reconciles the caller's arguments with the resources already bound
//! to each slot, and bind groups are only rebuilt when a resource identity
//! changed since the previous dispatch.

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::assembler::ShaderProgram;
use crate::error::{GpuError, Result};
use crate::kernel_ir::{KernelLayout, ParamSlot, SlotKind, UniformSlot};
use crate::registry::{HostScalar, ImageFormat, ScalarKind};
use crate::resource::{
    split_run_args, BoundResource, GpuResource, HostData, HostSlice, ImageData, KernelArg,
    Ownership, UniformMap,
};
use crate::wgpu_backend::compile::{create_pipeline, CompiledKernel, WgpuPipeline};
use crate::wgpu_backend::dispatch::{create_bind_group, dispatch_workgroups, Binding};
use crate::wgpu_backend::{DeviceBuffer, DeviceTexture, WgpuContext};

struct CachedBindGroup {
    identity: Vec<usize>,
    group: wgpu::BindGroup,
}

/// A compiled kernel together with the resources bound to its slots.
pub struct KernelHandle {
    ctx: Arc<WgpuContext>,
    program: ShaderProgram,
    compiled: CompiledKernel,
    pipeline: Option<WgpuPipeline>,
    groups: Option<[u32; 3]>,
    render_size: (u32, u32),
    slots: Vec<Option<BoundResource>>,
    uniform_buffers: Vec<Option<DeviceBuffer>>,
    param_group: Option<CachedBindGroup>,
    uniform_group: Option<CachedBindGroup>,
    bind_group_builds: usize,
}

impl KernelHandle {
    pub(crate) fn new(
        ctx: Arc<WgpuContext>,
        program: ShaderProgram,
        compiled: CompiledKernel,
        groups: Option<[u32; 3]>,
        render_size: (u32, u32),
    ) -> Self {
        let slots = vec![None; program.layout.params.len()];
        let uniform_buffers = vec![None; program.layout.uniforms.len()];
        KernelHandle {
            ctx,
            program,
            compiled,
            pipeline: None,
            groups,
            render_size,
            slots,
            uniform_buffers,
            param_group: None,
            uniform_group: None,
            bind_group_builds: 0,
        }
    }

    pub fn layout(&self) -> &KernelLayout {
        &self.program.layout
    }

    /// The shader text the kernel was compiled from.
    pub fn source(&self) -> &str {
        &self.program.source
    }

    /// Group count used when `run` is not given one.
    pub fn groups(&self) -> [u32; 3] {
        self.groups.unwrap_or_else(|| self.render_groups())
    }

    pub fn set_groups(&mut self, groups: [u32; 3]) -> &mut Self {
        self.groups = Some(groups);
        self
    }

    fn render_groups(&self) -> [u32; 3] {
        let [lx, ly, _] = self.program.layout.workgroup_size;
        [
            self.render_size.0.div_ceil(lx.max(1)),
            self.render_size.1.div_ceil(ly.max(1)),
            1,
        ]
    }

    /// Dispatch the kernel and wait for it to finish.
    ///
    /// `args` holds one entry per parameter, optionally followed by three
    /// [`KernelArg::Group`] counts and/or a [`KernelArg::Uniforms`] map.
    pub fn run(&mut self, args: Vec<KernelArg<'_>>) -> Result<()> {
        let split = split_run_args(self.program.layout.params.len(), args)?;
        self.validate_args(&split.params)?;
        if let Some(uniforms) = &split.uniforms {
            self.validate_uniforms(uniforms)?;
        }

        let groups = split.groups.unwrap_or_else(|| self.groups());
        if groups.contains(&0) {
            return Err(GpuError::usage(format!(
                "group counts must be non-zero, got {:?}",
                groups
            )));
        }

        if self.pipeline.is_none() {
            self.pipeline = Some(create_pipeline(&self.ctx, &self.compiled, &self.program)?);
        }

        for (index, arg) in split.params.into_iter().enumerate() {
            self.bind_param(index, arg, groups)?;
        }
        if let Some(uniforms) = split.uniforms {
            for (name, values) in &uniforms {
                self.set_uniform(name, values)?;
            }
        }
        self.fill_missing_uniforms()?;

        let Some(pipeline) = self.pipeline.as_ref() else {
            return Err(GpuError::backend("pipeline was not built"));
        };

        let param_identity: Vec<usize> = self
            .slots
            .iter()
            .map(|slot| slot.as_ref().map_or(0, |bound| bound.resource.id()))
            .collect();
        if self
            .param_group
            .as_ref()
            .map_or(true, |cached| cached.identity != param_identity)
        {
            let bindings = self
                .slots
                .iter()
                .zip(&self.program.layout.params)
                .map(|(slot, param)| match slot.as_ref().map(|bound| &bound.resource) {
                    Some(GpuResource::Buffer(buf)) => Ok(Binding::Buffer(buf)),
                    Some(GpuResource::Texture(tex)) => Ok(Binding::Texture(tex)),
                    None => Err(GpuError::backend(format!(
                        "slot '{}' has no resource after binding",
                        param.name
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            trace!("rebuilding parameter bind group");
            let group =
                create_bind_group(&self.ctx, &pipeline.param_layout, "webcs_params", &bindings)?;
            self.param_group = Some(CachedBindGroup {
                identity: param_identity,
                group,
            });
            self.bind_group_builds += 1;
        }

        if let Some(uniform_layout) = &pipeline.uniform_layout {
            let identity: Vec<usize> = self
                .uniform_buffers
                .iter()
                .map(|buf| buf.as_ref().map_or(0, DeviceBuffer::id))
                .collect();
            if self
                .uniform_group
                .as_ref()
                .map_or(true, |cached| cached.identity != identity)
            {
                let bindings: Vec<Binding> = self
                    .uniform_buffers
                    .iter()
                    .flatten()
                    .map(Binding::Buffer)
                    .collect();
                trace!("rebuilding uniform bind group");
                let group =
                    create_bind_group(&self.ctx, uniform_layout, "webcs_uniforms", &bindings)?;
                self.uniform_group = Some(CachedBindGroup { identity, group });
                self.bind_group_builds += 1;
            }
        }

        let Some(params) = self.param_group.as_ref() else {
            return Err(GpuError::backend("parameter bind group missing"));
        };
        let uniforms = pipeline
            .uniform_layout
            .as_ref()
            .and(self.uniform_group.as_ref())
            .map(|cached| &cached.group);
        dispatch_workgroups(&self.ctx, pipeline, &params.group, uniforms, groups)
    }

    fn validate_args(&self, args: &[KernelArg<'_>]) -> Result<()> {
        for (slot, arg) in self.program.layout.params.iter().zip(args) {
            let expected = slot.kind.param_type().dims();
            if let Some(dims) = arg.dims() {
                if dims != expected {
                    return Err(GpuError::usage(format!(
                        "parameter '{}' is a {}-D {}, got a {}-D argument",
                        slot.name,
                        expected.rank(),
                        slot.kind.param_type().canonical_tag(),
                        dims.rank()
                    )));
                }
            }
            match (arg, slot.kind) {
                (KernelArg::Texture(tex), SlotKind::Texture { format, .. }) if tex.format() != format => {
                    return Err(GpuError::usage(format!(
                        "parameter '{}' expects a {:?} texture, got {:?}",
                        slot.name,
                        format,
                        tex.format()
                    )));
                }
                (KernelArg::Image(image), SlotKind::Texture { format, .. }) => {
                    image_texels(image, format).map_err(|e| {
                        GpuError::usage(format!("parameter '{}': {}", slot.name, e))
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn validate_uniforms(&self, uniforms: &UniformMap) -> Result<()> {
        for (name, values) in uniforms {
            self.uniform_slot(name)?;
            if values.len() > 4 {
                return Err(GpuError::usage(format!(
                    "uniform '{}' holds 4 values, got {}",
                    name,
                    values.len()
                )));
            }
        }
        Ok(())
    }

    fn param_slot(&self, name: &str) -> Result<(usize, &ParamSlot)> {
        self.program
            .layout
            .params
            .iter()
            .enumerate()
            .find(|(_, slot)| slot.name == name)
            .ok_or_else(|| GpuError::usage(format!("kernel has no parameter named '{}'", name)))
    }

    fn uniform_slot(&self, name: &str) -> Result<(usize, &UniformSlot)> {
        self.program
            .layout
            .uniforms
            .iter()
            .enumerate()
            .find(|(_, slot)| slot.name == name)
            .ok_or_else(|| GpuError::usage(format!("kernel has no uniform named '{}'", name)))
    }

    fn replace_slot(&mut self, index: usize, bound: BoundResource) {
        if let Some(old) = self.slots[index].replace(bound) {
            old.release();
        }
    }

    fn bind_param(&mut self, index: usize, arg: KernelArg<'_>, groups: [u32; 3]) -> Result<()> {
        let slot = self.program.layout.params[index].clone();
        match (arg, slot.kind) {
            (KernelArg::Null, _) if self.slots[index].is_some() => {}
            (KernelArg::Null, SlotKind::Buffer(ty)) => {
                let size = output_byte_size(
                    groups,
                    self.program.layout.invocations_per_group(),
                    ty.element_byte_size() as u64,
                )
                .ok_or_else(|| {
                    GpuError::usage(format!(
                        "groups {:?} are too large to size a buffer for '{}'",
                        groups, slot.name
                    ))
                })?;
                debug!("allocating {} bytes for '{}'", size, slot.name);
                let buffer = DeviceBuffer::allocate(&self.ctx, size)?;
                self.replace_slot(index, BoundResource::owned(GpuResource::Buffer(buffer)));
            }
            (KernelArg::Null, SlotKind::Texture { format, .. }) => {
                let (width, height) = self.render_size;
                let texture = DeviceTexture::allocate(&self.ctx, width, height, format)?;
                self.replace_slot(index, BoundResource::owned(GpuResource::Texture(texture)));
            }
            (KernelArg::Buffer(buffer), _) => {
                self.replace_slot(index, BoundResource::borrowed(GpuResource::Buffer(buffer)));
            }
            (KernelArg::Texture(texture), _) => {
                self.replace_slot(index, BoundResource::borrowed(GpuResource::Texture(texture)));
            }
            (KernelArg::Host(data), _) => self.upload_host(index, &slot, data)?,
            (KernelArg::Image(image), SlotKind::Texture { format, .. }) => {
                self.upload_image(index, &slot, format, image)?
            }
            (other, _) => {
                return Err(GpuError::usage(format!(
                    "argument {:?} cannot be bound to parameter '{}'",
                    other, slot.name
                )))
            }
        }
        Ok(())
    }

    fn upload_host(&mut self, index: usize, slot: &ParamSlot, data: HostSlice<'_>) -> Result<()> {
        let bytes = data.as_bytes();
        let current = self.slots[index]
            .as_ref()
            .and_then(|bound| bound.resource.as_buffer())
            .filter(|buf| buf.byte_size() >= bytes.len() as u64)
            .cloned();
        let buffer = match current {
            Some(buffer) => buffer,
            None => {
                debug!("growing '{}' to {} bytes", slot.name, bytes.len());
                let buffer = DeviceBuffer::allocate(&self.ctx, bytes.len() as u64)?;
                self.replace_slot(index, BoundResource::owned(GpuResource::Buffer(buffer.clone())));
                buffer
            }
        };
        buffer.write(&self.ctx, bytes)
    }

    fn upload_image(
        &mut self,
        index: usize,
        slot: &ParamSlot,
        format: ImageFormat,
        image: ImageData<'_>,
    ) -> Result<()> {
        let texels = image_texels(&image, format)?;
        let current = self.slots[index]
            .as_ref()
            .and_then(|bound| bound.resource.as_texture())
            .filter(|tex| tex.fits(image.width, image.height))
            .cloned();
        let texture = match current {
            Some(texture) => texture,
            None => {
                let previous = self.slots[index]
                    .as_ref()
                    .and_then(|bound| bound.resource.as_texture());
                let (width, height) = match previous {
                    Some(old) => (old.width().max(image.width), old.height().max(image.height)),
                    None => (image.width, image.height),
                };
                debug!("growing '{}' to {}x{}", slot.name, width, height);
                let texture = DeviceTexture::allocate(&self.ctx, width, height, format)?;
                self.replace_slot(index, BoundResource::owned(GpuResource::Texture(texture.clone())));
                texture
            }
        };
        texture.write(&self.ctx, &texels, image.width, image.height)
    }

    /// Number of bind groups created so far.
    pub fn bind_group_builds(&self) -> usize {
        self.bind_group_builds
    }

    /// Write up to four values to a uniform, converted to its scalar kind.
    pub fn set_uniform(&mut self, name: &str, values: &[f64]) -> Result<&mut Self> {
        let (index, slot) = self.uniform_slot(name)?;
        if values.len() > 4 {
            return Err(GpuError::usage(format!(
                "uniform '{}' holds 4 values, got {}",
                name,
                values.len()
            )));
        }
        let mut padded = [0.0f64; 4];
        padded[..values.len()].copy_from_slice(values);
        let bytes = uniform_bytes(slot.kind, padded);

        let buffer = match &self.uniform_buffers[index] {
            Some(buffer) => buffer.clone(),
            None => {
                let buffer = DeviceBuffer::allocate(&self.ctx, slot.byte_size())?;
                self.uniform_buffers[index] = Some(buffer.clone());
                buffer
            }
        };
        buffer.write(&self.ctx, &bytes)?;
        Ok(self)
    }

    fn fill_missing_uniforms(&mut self) -> Result<()> {
        for (slot, buffer) in self.program.layout.uniforms.iter().zip(&mut self.uniform_buffers) {
            if buffer.is_none() {
                warn!("uniform '{}' was never set; binding zeros", slot.name);
                *buffer = Some(DeviceBuffer::allocate(&self.ctx, slot.byte_size())?);
            }
        }
        Ok(())
    }

    /// The resource currently bound to parameter `name`, if any.
    pub fn resource(&self, name: &str) -> Result<Option<GpuResource>> {
        let (index, _) = self.param_slot(name)?;
        Ok(self.slots[index].as_ref().map(|bound| bound.resource.clone()))
    }

    /// Ownership of the resource bound to `name`, if any.
    pub fn ownership(&self, name: &str) -> Result<Option<Ownership>> {
        let (index, _) = self.param_slot(name)?;
        Ok(self.slots[index].as_ref().map(|bound| bound.ownership))
    }

    pub fn buffer(&self, name: &str) -> Result<Option<DeviceBuffer>> {
        Ok(self.resource(name)?.and_then(|r| r.as_buffer().cloned()))
    }

    pub fn texture(&self, name: &str) -> Result<Option<DeviceTexture>> {
        Ok(self.resource(name)?.and_then(|r| r.as_texture().cloned()))
    }

    /// Copy the contents of parameter `name` back to the host.
    ///
    /// `hint` picks the element type (`"float"`, `"uint"`, `"int"`,
    /// `"double"`, `"byte"`); without one the slot's own type is used.
    pub fn get_data(&self, name: &str, hint: Option<&str>) -> Result<HostData> {
        let (index, slot) = self.param_slot(name)?;
        let scalar = match hint {
            Some(hint) => HostScalar::from_hint(hint)
                .ok_or_else(|| GpuError::usage(format!("unknown readback type '{}'", hint)))?,
            None => natural_scalar(slot),
        };
        let Some(bound) = self.slots[index].as_ref() else {
            return Err(GpuError::usage(format!(
                "parameter '{}' has no resource yet; run the kernel first",
                name
            )));
        };
        let bytes = match &bound.resource {
            GpuResource::Buffer(buf) => buf.read(&self.ctx)?,
            GpuResource::Texture(tex) => tex.read(&self.ctx)?,
        };
        Ok(HostData::from_bytes(&bytes, scalar))
    }

    /// Read parameter `name` into `out`, reusing its allocation when the length matches.
    pub fn get_data_into<T: bytemuck::Pod>(&self, name: &str, out: &mut Vec<T>) -> Result<()> {
        let (index, _) = self.param_slot(name)?;
        let Some(bound) = self.slots[index].as_ref() else {
            return Err(GpuError::usage(format!(
                "parameter '{}' has no resource yet; run the kernel first",
                name
            )));
        };
        let bytes = match &bound.resource {
            GpuResource::Buffer(buf) => buf.read(&self.ctx)?,
            GpuResource::Texture(tex) => tex.read(&self.ctx)?,
        };
        let size = std::mem::size_of::<T>().max(1);
        let whole = &bytes[..bytes.len() - bytes.len() % size];
        if out.len() * size == whole.len() {
            bytemuck::cast_slice_mut::<T, u8>(out.as_mut_slice()).copy_from_slice(whole);
        } else {
            *out = bytemuck::pod_collect_to_vec(whole);
        }
        Ok(())
    }
}

fn natural_scalar(slot: &ParamSlot) -> HostScalar {
    match slot.kind {
        SlotKind::Buffer(ty) => ty.scalar().host_scalar(),
        SlotKind::Texture { format, .. } => format.readback_scalar(),
    }
}

/// Bytes needed for one element per invocation, or `None` on overflow.
fn output_byte_size(groups: [u32; 3], per_group: u64, element: u64) -> Option<u64> {
    groups
        .iter()
        .try_fold(per_group, |acc, &n| acc.checked_mul(n as u64))?
        .checked_mul(element)
}

fn uniform_bytes(kind: ScalarKind, values: [f64; 4]) -> Vec<u8> {
    match kind {
        ScalarKind::U32 => bytemuck::cast_slice(&values.map(|v| v as u32)).to_vec(),
        ScalarKind::I32 => bytemuck::cast_slice(&values.map(|v| v as i32)).to_vec(),
        ScalarKind::F32 => bytemuck::cast_slice(&values.map(|v| v as f32)).to_vec(),
        ScalarKind::F64 => bytemuck::cast_slice(&values).to_vec(),
    }
}

/// Convert RGBA8 pixels into texels of `format`.
fn image_texels(image: &ImageData<'_>, format: ImageFormat) -> Result<Vec<u8>> {
    let expected = image.width as usize * image.height as usize * 4;
    if image.pixels.len() != expected {
        return Err(GpuError::usage(format!(
            "{}x{} image needs {} bytes, got {}",
            image.width,
            image.height,
            expected,
            image.pixels.len()
        )));
    }
    match format {
        ImageFormat::Rgba8Unorm => Ok(image.pixels.to_vec()),
        ImageFormat::Rgba32Float => {
            let floats: Vec<f32> = image.pixels.iter().map(|&p| p as f32 / 255.0).collect();
            Ok(bytemuck::cast_slice(&floats).to_vec())
        }
        ImageFormat::Rgba32Uint => {
            let uints: Vec<u32> = image.pixels.iter().map(|&p| p as u32).collect();
            Ok(bytemuck::cast_slice(&uints).to_vec())
        }
        other => Err(GpuError::usage(format!(
            "images cannot be uploaded into a {:?} texture",
            other
        ))),
    }
}

impl std::fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelHandle")
            .field("layout", &self.program.layout)
            .field("groups", &self.groups)
            .field("pipeline_built", &self.pipeline.is_some())
            .field("bind_group_builds", &self.bind_group_builds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_bytes_conversion() {
        let bytes = uniform_bytes(ScalarKind::U32, [64.0, 32.0, 16.0, 0.0]);
        assert_eq!(bytemuck::cast_slice::<u8, u32>(&bytes), &[64, 32, 16, 0]);
        let bytes = uniform_bytes(ScalarKind::F32, [0.5, 1.0, 0.0, 0.0]);
        assert_eq!(bytemuck::cast_slice::<u8, f32>(&bytes), &[0.5, 1.0, 0.0, 0.0]);
        let bytes = uniform_bytes(ScalarKind::I32, [-1.0, 2.0, 0.0, 0.0]);
        assert_eq!(bytes.len(), 16);
    }

    #[test]
    fn test_output_byte_size() {
        assert_eq!(output_byte_size([8, 8, 1], 64, 4), Some(8 * 8 * 64 * 4));
        assert_eq!(output_byte_size([u32::MAX; 3], 64, 4), None);
        assert_eq!(output_byte_size([u32::MAX, u32::MAX, 1], 1, 8), None);
    }

    #[test]
    fn test_image_texel_conversion() {
        let pixels = [255u8, 0, 51, 255];
        let image = ImageData {
            width: 1,
            height: 1,
            pixels: &pixels,
        };
        assert_eq!(image_texels(&image, ImageFormat::Rgba8Unorm).unwrap(), pixels);
        let floats = image_texels(&image, ImageFormat::Rgba32Float).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(&floats);
        assert_eq!(floats[0], 1.0);
        assert!((floats[2] - 0.2).abs() < 1e-6);
        assert!(image_texels(&image, ImageFormat::R32Float).is_err());
    }

    #[test]
    fn test_image_length_checked() {
        let pixels = [0u8; 7];
        let image = ImageData {
            width: 2,
            height: 1,
            pixels: &pixels,
        };
        assert!(matches!(
            image_texels(&image, ImageFormat::Rgba8Unorm),
            Err(GpuError::Usage(_))
        ));
    }
}
