//! wgpu implementation of [`GpuTextureProvider`]

use super::{GpuTextureProvider, PageTextureDescriptor};
use crate::atlas::AtlasRect;
use crate::constants::channels::RGBA16F_BYTES;
use crate::error::{AtlasResult, MaterialAtlasError};
use std::sync::Arc;
use wgpu::{Device, Queue, Sampler, Texture, TextureView};

/// A page texture and the view shaders bind
pub struct WgpuPageTexture {
    pub texture: Texture,
    pub view: TextureView,
    pub width: u32,
    pub height: u32,
}

/// Creates and uploads page textures on a wgpu device
pub struct WgpuTextureProvider {
    device: Arc<Device>,
    queue: Arc<Queue>,
    sampler: Sampler,
}

impl WgpuTextureProvider {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>) -> Self {
        // nearest only, matching the CPU rasterization
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Atlas Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            device,
            queue,
            sampler,
        }
    }

    /// Sampler for binding alongside the page views
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    fn write(&self, texture: &Texture, rect: &AtlasRect, data: &[u8]) {
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(rect.width * RGBA16F_BYTES as u32),
                rows_per_image: Some(rect.height),
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

fn check_len(operation: &str, rect: &AtlasRect, data: &[u8]) -> AtlasResult<()> {
    let expected = rect.area() * RGBA16F_BYTES;
    if data.len() != expected {
        return Err(MaterialAtlasError::GpuOperationFailed {
            operation: operation.to_string(),
            error: format!("data length {} != {} for {:?}", data.len(), expected, rect),
        });
    }
    Ok(())
}

impl GpuTextureProvider for WgpuTextureProvider {
    type Texture = WgpuPageTexture;

    fn create_texture(
        &mut self,
        descriptor: &PageTextureDescriptor,
        initial_data: Option<&[u8]>,
    ) -> AtlasResult<WgpuPageTexture> {
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        if descriptor.width > max_dimension || descriptor.height > max_dimension {
            return Err(MaterialAtlasError::GpuOperationFailed {
                operation: "create_texture".to_string(),
                error: format!(
                    "page {} is {}x{}, device maximum is {}",
                    descriptor.page_id, descriptor.width, descriptor.height, max_dimension
                ),
            });
        }

        let full = AtlasRect::new(0, 0, descriptor.width, descriptor.height);
        if let Some(data) = initial_data {
            check_len("create_texture", &full, data)?;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(descriptor.kind.label()),
            size: wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        if let Some(data) = initial_data {
            self.write(&texture, &full, data);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        log::debug!(
            "[WgpuTextureProvider::create_texture] {} for page {} ({}x{})",
            descriptor.kind.label(),
            descriptor.page_id,
            descriptor.width,
            descriptor.height
        );

        Ok(WgpuPageTexture {
            texture,
            view,
            width: descriptor.width,
            height: descriptor.height,
        })
    }

    fn upload_region(&mut self, texture: &WgpuPageTexture, rect: &AtlasRect, data: &[u8]) -> AtlasResult<()> {
        if !rect.fits_within(texture.width, texture.height) {
            return Err(MaterialAtlasError::out_of_range(
                "rect",
                format!("{:?} exceeds texture {}x{}", rect, texture.width, texture.height),
            ));
        }
        check_len("upload_region", rect, data)?;
        self.write(&texture.texture, rect, data);
        Ok(())
    }

    fn dispose_texture(&mut self, texture: WgpuPageTexture) {
        texture.texture.destroy();
    }
}
