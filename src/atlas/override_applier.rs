//! Override Applier
//!
//! Writes authored RGBA override data into a sub-rectangle of a material
//! params buffer. RGBA is reduced to RGB by dropping alpha, keeping
//! red -> roughness, green -> metallic, blue -> emissive.
//!
//! Arguments arrive from the host as signed integers and raw slices, so every
//! precondition is checked before a single pixel is written.

use crate::constants::channels::{MATERIAL_PARAMS, RGBA};
use crate::error::{AtlasResult, MaterialAtlasError};
use crate::materials::MaterialScale;

/// Target rectangle in atlas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl OverrideRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl From<crate::atlas::AtlasRect> for OverrideRect {
    fn from(rect: crate::atlas::AtlasRect) -> Self {
        Self::new(rect.x as i32, rect.y as i32, rect.width as i32, rect.height as i32)
    }
}

/// Apply float RGBA override data, then multiply by `scale` and clamp to `[0, 1]`.
///
/// An identity scale skips the multiply pass.
pub fn apply_rgba_f32_scaled(
    atlas: &mut [f32],
    atlas_width: i32,
    atlas_height: i32,
    rect: OverrideRect,
    rgba: &[f32],
    scale: Option<MaterialScale>,
) -> AtlasResult<()> {
    validate(atlas.len(), atlas_width, atlas_height, rect, rgba.len())?;
    write_rect(atlas, atlas_width, rect, |i| {
        [rgba[i * RGBA], rgba[i * RGBA + 1], rgba[i * RGBA + 2]]
    });

    if let Some(scale) = scale.filter(|s| !s.is_identity()) {
        scale_rect(atlas, atlas_width, rect, scale);
    }
    Ok(())
}

/// Apply float RGBA override data as-is
pub fn apply_rgba_f32(
    atlas: &mut [f32],
    atlas_width: i32,
    atlas_height: i32,
    rect: OverrideRect,
    rgba: &[f32],
) -> AtlasResult<()> {
    apply_rgba_f32_scaled(atlas, atlas_width, atlas_height, rect, rgba, None)
}

/// Apply 8-bit RGBA override data, normalized by 1/255
pub fn apply_rgba8(
    atlas: &mut [f32],
    atlas_width: i32,
    atlas_height: i32,
    rect: OverrideRect,
    rgba: &[u8],
) -> AtlasResult<()> {
    validate(atlas.len(), atlas_width, atlas_height, rect, rgba.len())?;
    write_rect(atlas, atlas_width, rect, |i| {
        [
            rgba[i * RGBA] as f32 / 255.0,
            rgba[i * RGBA + 1] as f32 / 255.0,
            rgba[i * RGBA + 2] as f32 / 255.0,
        ]
    });
    Ok(())
}

/// Apply a decoded override image covering exactly `rect`
pub fn apply_override_image(
    atlas: &mut [f32],
    atlas_width: i32,
    atlas_height: i32,
    rect: OverrideRect,
    image: &image::RgbaImage,
) -> AtlasResult<()> {
    if image.width() as i64 != rect.width as i64 || image.height() as i64 != rect.height as i64 {
        return Err(MaterialAtlasError::invalid_argument(
            "image",
            format!(
                "image is {}x{} but target rect is {}x{}",
                image.width(),
                image.height(),
                rect.width,
                rect.height
            ),
        ));
    }
    apply_rgba8(atlas, atlas_width, atlas_height, rect, image.as_raw())
}

fn validate(
    atlas_len: usize,
    atlas_width: i32,
    atlas_height: i32,
    rect: OverrideRect,
    payload_len: usize,
) -> AtlasResult<()> {
    if atlas_width <= 0 || atlas_height <= 0 {
        return Err(MaterialAtlasError::invalid_argument(
            "atlas size",
            format!("{}x{} must be positive", atlas_width, atlas_height),
        ));
    }
    if rect.x < 0 || rect.y < 0 {
        return Err(MaterialAtlasError::out_of_range(
            "rect origin",
            format!("({}, {}) is negative", rect.x, rect.y),
        ));
    }
    if rect.width <= 0 || rect.height <= 0 {
        return Err(MaterialAtlasError::invalid_argument(
            "rect size",
            format!("{}x{} must be positive", rect.width, rect.height),
        ));
    }
    if rect.x as i64 + rect.width as i64 > atlas_width as i64
        || rect.y as i64 + rect.height as i64 > atlas_height as i64
    {
        return Err(MaterialAtlasError::out_of_range(
            "rect",
            format!("{:?} exceeds atlas {}x{}", rect, atlas_width, atlas_height),
        ));
    }

    let expected_atlas = atlas_width as usize * atlas_height as usize * MATERIAL_PARAMS;
    if atlas_len != expected_atlas {
        return Err(MaterialAtlasError::out_of_range(
            "atlas",
            format!("buffer length {} != {}", atlas_len, expected_atlas),
        ));
    }

    let expected_payload = rect.pixel_count() * RGBA;
    if payload_len != expected_payload {
        return Err(MaterialAtlasError::out_of_range(
            "override data",
            format!("length {} != {}x{}x4 = {}", payload_len, rect.width, rect.height, expected_payload),
        ));
    }
    Ok(())
}

/// Write one RGB triplet per rect pixel; `source(i)` yields pixel `i` of the rect in row-major order
fn write_rect<F>(atlas: &mut [f32], atlas_width: i32, rect: OverrideRect, source: F)
where
    F: Fn(usize) -> [f32; 3],
{
    let stride = atlas_width as usize;
    for row in 0..rect.height as usize {
        let dst_row = (rect.y as usize + row) * stride + rect.x as usize;
        for col in 0..rect.width as usize {
            let dst = (dst_row + col) * MATERIAL_PARAMS;
            atlas[dst..dst + MATERIAL_PARAMS].copy_from_slice(&source(row * rect.width as usize + col));
        }
    }
}

fn scale_rect(atlas: &mut [f32], atlas_width: i32, rect: OverrideRect, scale: MaterialScale) {
    let factors = scale.as_array();
    let stride = atlas_width as usize;
    for row in 0..rect.height as usize {
        let start = ((rect.y as usize + row) * stride + rect.x as usize) * MATERIAL_PARAMS;
        let end = start + rect.width as usize * MATERIAL_PARAMS;
        for px in atlas[start..end].chunks_exact_mut(MATERIAL_PARAMS) {
            for (value, factor) in px.iter_mut().zip(factors) {
                *value = (*value * factor).clamp(0.0, 1.0);
            }
        }
    }
}
