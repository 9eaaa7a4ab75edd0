//! WebGPU texture operations: allocation, upload and padded-row readback.

use std::sync::Arc;

use log::debug;

use super::buffer_ops::map_read;
use super::device_init::WgpuContext;
use crate::error::{GpuError, Result};
use crate::registry::ImageFormat;

/// Reference-counted 2-D texture with a default view.
#[derive(Debug, Clone)]
pub struct DeviceTexture {
    pub(crate) texture: Arc<wgpu::Texture>,
    pub(crate) view: Arc<wgpu::TextureView>,
    width: u32,
    height: u32,
    format: ImageFormat,
}

impl DeviceTexture {
    pub fn allocate(ctx: &WgpuContext, width: u32, height: u32, format: ImageFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GpuError::usage(format!(
                "texture extent must be non-zero, got {}x{}",
                width, height
            )));
        }
        let limit = ctx.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(GpuError::backend(format!(
                "{}x{} texture exceeds the device limit of {}",
                width, height, limit
            )));
        }
        let (texture, view) = ctx.checked("texture allocation failed", || {
            let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("webcs_texture"),
                size: extent(width, height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: format.to_wgpu(),
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        })?;
        debug!("allocated {}x{} {:?} texture", width, height, format);
        Ok(DeviceTexture {
            texture: Arc::new(texture),
            view: Arc::new(view),
            width,
            height,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.texture) as usize
    }

    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) fn is_unique(&self) -> bool {
        Arc::strong_count(&self.texture) == 1
    }

    /// True when a `width` x `height` image fits without growing.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        width <= self.width && height <= self.height
    }

    /// Upload tightly packed texels into the top-left `width` x `height` region.
    pub fn write(&self, ctx: &WgpuContext, texels: &[u8], width: u32, height: u32) -> Result<()> {
        if !self.fits(width, height) {
            return Err(GpuError::usage(format!(
                "{}x{} upload does not fit a {}x{} texture",
                width, height, self.width, self.height
            )));
        }
        let row_bytes = width * self.format.texel_size() as u32;
        if texels.len() != (row_bytes * height) as usize {
            return Err(GpuError::usage(format!(
                "expected {} bytes of texel data, got {}",
                row_bytes * height,
                texels.len()
            )));
        }
        ctx.checked("texture upload failed", || {
            ctx.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &self.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                texels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(row_bytes),
                    rows_per_image: Some(height),
                },
                extent(width, height),
            )
        })
    }

    /// Read every texel back, tightly packed row by row.
    pub fn read(&self, ctx: &WgpuContext) -> Result<Vec<u8>> {
        let row_bytes = self.width * self.format.texel_size() as u32;
        let padded_row = padded_bytes_per_row(row_bytes);

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("webcs_texture_staging"),
            size: padded_row as u64 * self.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("webcs_texture_readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            extent(self.width, self.height),
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let padded = map_read(ctx, &staging)?;
        Ok(strip_row_padding(&padded, row_bytes as usize, padded_row as usize))
    }

    pub(crate) fn destroy(&self) {
        self.texture.destroy();
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

/// Row pitch for texture-to-buffer copies.
pub(crate) fn padded_bytes_per_row(row_bytes: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    row_bytes.div_ceil(align) * align
}

pub(crate) fn strip_row_padding(padded: &[u8], row_bytes: usize, padded_row: usize) -> Vec<u8> {
    if row_bytes == padded_row {
        return padded.to_vec();
    }
    padded
        .chunks(padded_row)
        .flat_map(|row| &row[..row_bytes.min(row.len())])
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(256), 256);
        assert_eq!(padded_bytes_per_row(2048), 2048);

        let mut padded = vec![0u8; 512];
        padded[..4].copy_from_slice(&[1, 2, 3, 4]);
        padded[256..260].copy_from_slice(&[5, 6, 7, 8]);
        assert_eq!(strip_row_padding(&padded, 4, 256), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
