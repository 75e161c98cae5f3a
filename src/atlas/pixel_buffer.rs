//! Pixel Buffer
//!
//! Dense CPU copy of one page's material params: three floats per pixel
//! (R = roughness, G = metallic, B = emissive) in row-major order. The channel
//! order is what the consuming shader samples and must not change.

use super::atlas_data::AtlasRect;
use crate::constants::channels::{MATERIAL_PARAMS, RGBA};
use crate::error::{AtlasResult, MaterialAtlasError};
use half::f16;

#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl PixelBuffer {
    /// Buffer of `width x height` pixels all set to `params`
    pub fn filled(width: u32, height: u32, params: [f32; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * MATERIAL_PARAMS);
        for _ in 0..pixels {
            data.extend_from_slice(&params);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap existing data, which must hold exactly `width * height * 3` floats
    pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> AtlasResult<Self> {
        let expected = width as usize * height as usize * MATERIAL_PARAMS;
        if data.len() != expected {
            return Err(MaterialAtlasError::out_of_range(
                "data",
                format!("length {} does not match {}x{}x3 = {}", data.len(), width, height, expected),
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Params at pixel `(x, y)`, `None` outside the buffer
    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * MATERIAL_PARAMS;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Write `params` to every pixel of `rect`. The rect must lie inside the buffer.
    pub fn fill_rect(&mut self, rect: &AtlasRect, params: [f32; 3]) -> AtlasResult<()> {
        self.check_rect(rect)?;
        let stride = self.width as usize * MATERIAL_PARAMS;
        for row in rect.y..rect.bottom() {
            let start = row as usize * stride + rect.x as usize * MATERIAL_PARAMS;
            let end = start + rect.width as usize * MATERIAL_PARAMS;
            for px in self.data[start..end].chunks_exact_mut(MATERIAL_PARAMS) {
                px.copy_from_slice(&params);
            }
        }
        Ok(())
    }

    /// Copy of the pixels inside `rect`, row-major, three floats per pixel
    pub fn extract_rect(&self, rect: &AtlasRect) -> AtlasResult<Vec<f32>> {
        self.check_rect(rect)?;
        let stride = self.width as usize * MATERIAL_PARAMS;
        let mut out = Vec::with_capacity(rect.area() * MATERIAL_PARAMS);
        for row in rect.y..rect.bottom() {
            let start = row as usize * stride + rect.x as usize * MATERIAL_PARAMS;
            out.extend_from_slice(&self.data[start..start + rect.width as usize * MATERIAL_PARAMS]);
        }
        Ok(out)
    }

    /// Pack into RGBA16F texels (alpha 1.0) ready for a texture upload
    pub fn to_rgba16f_bytes(&self) -> Vec<u8> {
        params_to_rgba16f_bytes(&self.data)
    }

    fn check_rect(&self, rect: &AtlasRect) -> AtlasResult<()> {
        if rect.width == 0 || rect.height == 0 {
            return Err(MaterialAtlasError::invalid_argument("rect", "rectangle has no area"));
        }
        if !rect.fits_within(self.width, self.height) {
            return Err(MaterialAtlasError::out_of_range(
                "rect",
                format!("{:?} exceeds buffer {}x{}", rect, self.width, self.height),
            ));
        }
        Ok(())
    }
}

/// Pack RGB float triplets as RGBA16F texel bytes with alpha 1.0
pub fn params_to_rgba16f_bytes(params: &[f32]) -> Vec<u8> {
    let mut texels: Vec<u16> = Vec::with_capacity(params.len() / MATERIAL_PARAMS * RGBA);
    for px in params.chunks_exact(MATERIAL_PARAMS) {
        texels.push(f16::from_f32(px[0]).to_bits());
        texels.push(f16::from_f32(px[1]).to_bits());
        texels.push(f16::from_f32(px[2]).to_bits());
        texels.push(f16::ONE.to_bits());
    }
    bytemuck::cast_slice(&texels).to_vec()
}

/// Pack RGBA float data as RGBA16F texel bytes
pub fn rgba_to_rgba16f_bytes(rgba: &[f32]) -> Vec<u8> {
    let texels: Vec<u16> = rgba.iter().map(|&v| f16::from_f32(v).to_bits()).collect();
    bytemuck::cast_slice(&texels).to_vec()
}
