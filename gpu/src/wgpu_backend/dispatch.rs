//! WebGPU compute kernel dispatch: bind groups, encoding and submission.

use log::trace;

use super::buffer_ops::DeviceBuffer;
use super::compile::WgpuPipeline;
use super::device_init::WgpuContext;
use super::texture_ops::DeviceTexture;
use crate::error::Result;

/// A resource placed at one binding of a bind group.
pub enum Binding<'a> {
    Buffer(&'a DeviceBuffer),
    Texture(&'a DeviceTexture),
}

/// Create a bind group with `resources[i]` at binding `i`.
pub fn create_bind_group(
    ctx: &WgpuContext,
    layout: &wgpu::BindGroupLayout,
    label: &str,
    resources: &[Binding<'_>],
) -> Result<wgpu::BindGroup> {
    let entries: Vec<wgpu::BindGroupEntry> = resources
        .iter()
        .enumerate()
        .map(|(i, resource)| wgpu::BindGroupEntry {
            binding: i as u32,
            resource: match resource {
                Binding::Buffer(buf) => buf.raw().as_entire_binding(),
                Binding::Texture(tex) => wgpu::BindingResource::TextureView(tex.view()),
            },
        })
        .collect();

    ctx.checked("bind group creation failed", || {
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    })
}

/// Dispatch `groups` workgroups and block until the work has completed.
pub fn dispatch_workgroups(
    ctx: &WgpuContext,
    pipeline: &WgpuPipeline,
    params: &wgpu::BindGroup,
    uniforms: Option<&wgpu::BindGroup>,
    groups: [u32; 3],
) -> Result<()> {
    trace!("dispatching {:?} workgroups", groups);

    ctx.checked("dispatch failed", || {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("webcs_dispatch"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("webcs_compute_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, params, &[]);
            if let Some(uniforms) = uniforms {
                pass.set_bind_group(1, uniforms, &[]);
            }
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
    })?;

    ctx.wait();
    Ok(())
}
