//! Compute context: device lifecycle, kernel creation and presentation.

use std::sync::Arc;

use log::{debug, info};

use crate::assembler::{self, KernelSource};
use crate::config::KernelConfig;
use crate::error::{GpuError, Result};
use crate::kernel::KernelHandle;
use crate::registry::{ImageFormat, ScalarKind};
use crate::resource::HostSlice;
use crate::wgpu_backend::compile::compile_program;
use crate::wgpu_backend::present::Blitter;
use crate::wgpu_backend::{DeviceBuffer, DeviceTexture, WgpuContext};

/// Options for [`ComputeContext::new`].
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Render-target width; default texture extent and group count source.
    pub width: u32,
    pub height: u32,
    pub power_preference: wgpu::PowerPreference,
    /// Request 64-bit float shader support when the adapter has it.
    pub request_f64: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        ContextOptions {
            width: 512,
            height: 512,
            power_preference: wgpu::PowerPreference::HighPerformance,
            request_f64: true,
        }
    }
}

/// The runtime object kernels, buffers and textures are created from.
pub struct ComputeContext {
    ctx: Arc<WgpuContext>,
    render_size: (u32, u32),
    blitter: Blitter,
}

impl ComputeContext {
    pub fn new(options: ContextOptions) -> Result<Self> {
        if options.width == 0 || options.height == 0 {
            return Err(GpuError::config(format!(
                "render target must be non-empty, got {}x{}",
                options.width, options.height
            )));
        }
        let ctx = WgpuContext::new(options.power_preference, options.request_f64)?;
        info!(
            "compute context ready, render target {}x{}",
            options.width, options.height
        );
        Ok(ComputeContext {
            ctx: Arc::new(ctx),
            render_size: (options.width, options.height),
            blitter: Blitter::new(),
        })
    }

    /// Check if any GPU adapter can be found.
    pub fn is_available() -> bool {
        WgpuContext::is_available()
    }

    /// Compile `source` and wrap it in a handle ready for dispatch.
    pub fn create_kernel(&self, source: &KernelSource, config: &KernelConfig) -> Result<KernelHandle> {
        let program = assembler::compile(source, config)?;

        let needs_f64 = program
            .layout
            .params
            .iter()
            .any(|slot| slot.kind.param_type().scalar() == ScalarKind::F64);
        if needs_f64 && !self.ctx.supports_f64() {
            return Err(GpuError::compile(
                "kernel uses 64-bit floats",
                format!(
                    "adapter '{}' does not support SHADER_F64",
                    self.ctx.adapter_info.name
                ),
            ));
        }

        let literal = matches!(source, KernelSource::Literal(_));
        let compiled = compile_program(&self.ctx, &program, literal)?;
        debug!(
            "created kernel with {} parameters and {} uniforms",
            program.layout.params.len(),
            program.layout.uniforms.len()
        );
        let groups = config.groups;
        Ok(KernelHandle::new(
            self.ctx.clone(),
            program,
            compiled,
            groups,
            self.render_size,
        ))
    }

    /// Allocate a zeroed buffer of `byte_size` bytes.
    pub fn create_buffer(&self, byte_size: u64) -> Result<DeviceBuffer> {
        DeviceBuffer::allocate(&self.ctx, byte_size)
    }

    /// Allocate a buffer holding a copy of `data`.
    pub fn create_buffer_init(&self, data: HostSlice<'_>) -> Result<DeviceBuffer> {
        DeviceBuffer::from_bytes(&self.ctx, data.as_bytes())
    }

    pub fn create_texture(&self, width: u32, height: u32, format: ImageFormat) -> Result<DeviceTexture> {
        DeviceTexture::allocate(&self.ctx, width, height, format)
    }

    /// Allocate a texture the size of the render target in the format of
    /// the `"texture"` parameter tag, ready to bind as a kernel output.
    pub fn create_render_texture(&self) -> Result<DeviceTexture> {
        let (width, height) = self.render_size;
        DeviceTexture::allocate(&self.ctx, width, height, ImageFormat::Rgba8Unorm)
    }

    /// Draw `texture` onto the next frame of `surface` and present it.
    pub fn present(&self, texture: &DeviceTexture, surface: &wgpu::Surface<'_>) -> Result<()> {
        let frame = surface
            .get_current_texture()
            .map_err(|e| GpuError::backend(format!("could not acquire surface texture: {}", e)))?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let size = (frame.texture.width(), frame.texture.height());
        self.blitter
            .blit(&self.ctx, texture, &view, frame.texture.format(), size)?;
        frame.present();
        Ok(())
    }

    /// Draw `texture` onto any render-attachment view.
    pub fn present_to_view(
        &self,
        texture: &DeviceTexture,
        view: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> Result<()> {
        self.blitter.blit(&self.ctx, texture, view, format, size)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.ctx.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.ctx.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.ctx.adapter_info
    }

    pub fn render_size(&self) -> (u32, u32) {
        self.render_size
    }

    pub fn supports_f64(&self) -> bool {
        self.ctx.supports_f64()
    }
}
