//! WebGPU buffer operations: allocation, upload and readback.

use std::sync::Arc;

use log::debug;
use wgpu::util::DeviceExt;

use super::device_init::WgpuContext;
use crate::error::{GpuError, Result};

const USAGES: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::UNIFORM)
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

/// Round a byte size up to the buffer copy alignment.
pub(crate) fn aligned_size(byte_size: u64) -> u64 {
    byte_size
        .max(wgpu::COPY_BUFFER_ALIGNMENT)
        .div_ceil(wgpu::COPY_BUFFER_ALIGNMENT)
        .saturating_mul(wgpu::COPY_BUFFER_ALIGNMENT)
}

/// Reference-counted GPU buffer. Clones share the same allocation.
#[derive(Debug, Clone)]
pub struct DeviceBuffer {
    pub(crate) buffer: Arc<wgpu::Buffer>,
    byte_size: u64,
}

impl DeviceBuffer {
    /// Allocate a zero-initialized buffer of at least `byte_size` bytes.
    pub fn allocate(ctx: &WgpuContext, byte_size: u64) -> Result<Self> {
        let size = aligned_size(byte_size);
        check_size(ctx, size)?;
        let buffer = ctx.checked("buffer allocation failed", || {
            ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("webcs_buffer"),
                size,
                usage: USAGES,
                mapped_at_creation: false,
            })
        })?;
        debug!("allocated buffer of {} bytes", size);
        Ok(DeviceBuffer {
            buffer: Arc::new(buffer),
            byte_size: size,
        })
    }

    /// Create a buffer holding a copy of `bytes`.
    pub fn from_bytes(ctx: &WgpuContext, bytes: &[u8]) -> Result<Self> {
        let padded = pad_to_alignment(bytes);
        check_size(ctx, padded.len() as u64)?;
        let buffer = ctx.checked("buffer allocation failed", || {
            ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("webcs_buffer"),
                contents: &padded,
                usage: USAGES,
            })
        })?;
        Ok(DeviceBuffer {
            buffer: Arc::new(buffer),
            byte_size: padded.len() as u64,
        })
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// Identity of the underlying allocation.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.buffer) as usize
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// True when no other clone of this handle is alive.
    pub(crate) fn is_unique(&self) -> bool {
        Arc::strong_count(&self.buffer) == 1
    }

    /// Copy `bytes` to the start of the buffer.
    pub fn write(&self, ctx: &WgpuContext, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u64 > self.byte_size {
            return Err(GpuError::usage(format!(
                "upload of {} bytes exceeds buffer size {}",
                bytes.len(),
                self.byte_size
            )));
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let padded = pad_to_alignment(bytes);
        ctx.checked("buffer upload failed", || {
            ctx.queue.write_buffer(&self.buffer, 0, &padded)
        })
    }

    /// Read the whole buffer back to host memory via a staging buffer.
    pub fn read(&self, ctx: &WgpuContext) -> Result<Vec<u8>> {
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("webcs_staging"),
            size: self.byte_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("webcs_readback"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, self.byte_size);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        map_read(ctx, &staging)
    }

    pub(crate) fn destroy(&self) {
        self.buffer.destroy();
    }
}

/// Map a `MAP_READ` buffer, wait for the mapping and copy its contents out.
pub(crate) fn map_read(ctx: &WgpuContext, staging: &wgpu::Buffer) -> Result<Vec<u8>> {
    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.wait();

    match rx.recv() {
        Ok(Ok(())) => {
            let data = slice.get_mapped_range().to_vec();
            staging.unmap();
            Ok(data)
        }
        Ok(Err(e)) => Err(GpuError::backend(format!("buffer mapping failed: {}", e))),
        Err(_) => Err(GpuError::backend("buffer mapping was never completed")),
    }
}

fn check_size(ctx: &WgpuContext, size: u64) -> Result<()> {
    let limit = ctx.max_buffer_size();
    if size > limit {
        return Err(GpuError::backend(format!(
            "buffer of {} bytes exceeds the device limit of {} bytes",
            size, limit
        )));
    }
    Ok(())
}

fn pad_to_alignment(bytes: &[u8]) -> Vec<u8> {
    let mut padded = bytes.to_vec();
    padded.resize(aligned_size(bytes.len() as u64) as usize, 0);
    padded
}
