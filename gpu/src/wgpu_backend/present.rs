//! Blit a compute texture onto a render target with a fullscreen triangle.

use std::collections::HashMap;

use log::debug;
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::device_init::WgpuContext;
use super::texture_ops::DeviceTexture;
use crate::error::{GpuError, Result};
use crate::registry::ScalarKind;

const BLIT_WGSL: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var<uniform> scale: vec4<f32>;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOut {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOut;
    out.position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let texel = vec2<i32>(floor(in.position.xy * scale.xy));
    return textureLoad(src, texel, 0);
}
"#;

struct BlitPipeline {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

/// Render pipelines for presenting textures, one per target format.
#[derive(Default)]
pub struct Blitter {
    pipelines: Mutex<HashMap<wgpu::TextureFormat, BlitPipeline>>,
}

impl Blitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `source` stretched over the whole of `target`.
    pub fn blit(
        &self,
        ctx: &WgpuContext,
        source: &DeviceTexture,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
        target_size: (u32, u32),
    ) -> Result<()> {
        if source.format().sample_kind() != ScalarKind::F32 {
            return Err(GpuError::usage(format!(
                "cannot present a {:?} texture; only float formats can be displayed",
                source.format()
            )));
        }

        let mut pipelines = self.pipelines.lock();
        if !pipelines.contains_key(&target_format) {
            debug!("building blit pipeline for {:?}", target_format);
            let built = ctx.checked("blit pipeline creation failed", || {
                build_pipeline(ctx, target_format)
            })?;
            pipelines.insert(target_format, built);
        }
        let Some(blit) = pipelines.get(&target_format) else {
            return Err(GpuError::backend("blit pipeline cache lost an entry"));
        };

        let scale = [
            source.width() as f32 / target_size.0.max(1) as f32,
            source.height() as f32 / target_size.1.max(1) as f32,
            0.0,
            0.0,
        ];

        ctx.checked("present failed", || {
            let scale_buffer = ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("webcs_blit_scale"),
                    contents: bytemuck::cast_slice(&scale),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("webcs_blit"),
                layout: &blit.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(source.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: scale_buffer.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("webcs_present"),
                });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("webcs_present_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(&blit.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
            ctx.queue.submit(std::iter::once(encoder.finish()));
        })?;

        ctx.wait();
        Ok(())
    }
}

fn build_pipeline(ctx: &WgpuContext, format: wgpu::TextureFormat) -> BlitPipeline {
    let module = ctx
        .device
        .create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("webcs_blit_shader"),
            source: wgpu::ShaderSource::Wgsl(BLIT_WGSL.into()),
        });

    let layout = ctx
        .device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("webcs_blit_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

    let pipeline_layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("webcs_blit_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

    let pipeline = ctx
        .device
        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("webcs_blit_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

    BlitPipeline { pipeline, layout }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blit_shader_is_valid_wgsl() {
        let module = naga::front::wgsl::parse_str(BLIT_WGSL).unwrap();
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .unwrap();
    }
}
