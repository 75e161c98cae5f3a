//! Tile Jobs
//!
//! A tile job bakes or repackages the pixel data of one rectangle of one page
//! texture. Jobs own copies of everything they read, so they can cross to a
//! worker thread without borrowing the atlas, and they write only into a local
//! buffer that becomes the result. A cancelled job returns no result.

use crate::atlas::atlas_operations::intersect;
use crate::atlas::override_applier::{apply_rgba_f32_scaled, OverrideRect};
use crate::atlas::{AtlasRect, PageId};
use crate::constants::channels::{MATERIAL_PARAMS, RGBA};
use crate::constants::material::DEFAULT_PARAMS;
use crate::constants::normal_depth::FLAT_TEXEL;
use crate::error::{AtlasResult, MaterialAtlasError};
use crate::gpu::PageTextureKind;
use crate::materials::MaterialScale;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Monotonically increasing build counter; newer generations supersede older ones
pub type Generation = u64;

/// Cooperative cancellation flag shared between a job and whoever submitted it
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Where a tile's data goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileTarget {
    pub generation: Generation,
    pub page_id: PageId,
    /// Page-space rectangle covered by the tile
    pub rect: AtlasRect,
    pub texture: PageTextureKind,
    pub priority: i32,
    /// The tile is baked without its override layer, and consumers must not
    /// layer override uploads over it
    pub suppress_override_upload: bool,
}

/// One texture's material params covering part of the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileFill {
    pub rect: AtlasRect,
    pub values: [f32; 4],
}

impl TileFill {
    pub fn material(rect: AtlasRect, params: [f32; 3]) -> Self {
        Self {
            rect,
            values: [params[0], params[1], params[2], 1.0],
        }
    }
}

/// Override data for one texture, in page space
#[derive(Debug, Clone, PartialEq)]
pub struct TileOverride {
    pub rect: AtlasRect,
    pub rgba: Vec<f32>,
    pub scale: Option<MaterialScale>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TileWork {
    /// Rasterize the tile from the fills that touch it, then layer overrides
    Bake {
        fills: Vec<TileFill>,
        overrides: Vec<TileOverride>,
    },
    /// Previously baked tile data, uploaded as-is
    Cached { data: Vec<f32> },
}

/// The result of a tile job, ready for [`crate::gpu::AtlasTextureStore::apply_tile_upload`]
#[derive(Debug, Clone, PartialEq)]
pub struct TileUpload {
    pub generation: Generation,
    pub page_id: PageId,
    pub rect: AtlasRect,
    /// 3 floats per texel for material params, 4 for normal+depth
    pub data: Vec<f32>,
    pub texture: PageTextureKind,
    pub priority: i32,
    pub skip_upload: bool,
    pub suppress_override_upload: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileJob {
    pub target: TileTarget,
    pub work: TileWork,
}

fn channels_for(kind: PageTextureKind) -> usize {
    match kind {
        PageTextureKind::MaterialParams => MATERIAL_PARAMS,
        PageTextureKind::NormalDepth => RGBA,
    }
}

impl TileJob {
    pub fn bake(target: TileTarget, fills: Vec<TileFill>, overrides: Vec<TileOverride>) -> Self {
        Self {
            target,
            work: TileWork::Bake { fills, overrides },
        }
    }

    pub fn cached(target: TileTarget, data: Vec<f32>) -> Self {
        Self {
            target,
            work: TileWork::Cached { data },
        }
    }

    /// Produce the upload for this tile, or `Ok(None)` if cancelled
    pub fn run(self, cancel: &CancelToken) -> AtlasResult<Option<TileUpload>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let target = self.target;
        if target.rect.width == 0 || target.rect.height == 0 {
            return Err(MaterialAtlasError::invalid_argument(
                "rect",
                format!("tile {:?} has zero area", target.rect),
            ));
        }
        let channels = channels_for(target.texture);
        let expected = target.rect.area() * channels;

        let data = match self.work {
            TileWork::Cached { data } => {
                if data.len() != expected {
                    return Err(MaterialAtlasError::out_of_range(
                        "cached tile data",
                        format!("length {} != {}", data.len(), expected),
                    ));
                }
                data
            }
            TileWork::Bake { fills, overrides } => {
                let Some(data) = bake_tile(&target, &fills, &overrides, cancel)? else {
                    return Ok(None);
                };
                data
            }
        };

        if cancel.is_cancelled() {
            return Ok(None);
        }

        Ok(Some(TileUpload {
            generation: target.generation,
            page_id: target.page_id,
            rect: target.rect,
            data,
            texture: target.texture,
            priority: target.priority,
            skip_upload: false,
            suppress_override_upload: target.suppress_override_upload,
        }))
    }
}

fn bake_tile(
    target: &TileTarget,
    fills: &[TileFill],
    overrides: &[TileOverride],
    cancel: &CancelToken,
) -> AtlasResult<Option<Vec<f32>>> {
    let tile = target.rect;
    let channels = channels_for(target.texture);
    let base: &[f32] = match target.texture {
        PageTextureKind::MaterialParams => &DEFAULT_PARAMS,
        PageTextureKind::NormalDepth => &FLAT_TEXEL,
    };

    let mut data: Vec<f32> = base.iter().copied().cycle().take(tile.area() * channels).collect();

    for fill in fills {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let Some(overlap) = intersect(&fill.rect, &tile) else {
            continue;
        };
        let values: Vec<f32> = if target.texture == PageTextureKind::MaterialParams {
            fill.values[..MATERIAL_PARAMS].iter().map(|v| v.clamp(0.0, 1.0)).collect()
        } else {
            fill.values.to_vec()
        };
        for y in overlap.y..overlap.bottom() {
            let row = ((y - tile.y) * tile.width) as usize;
            for x in overlap.x..overlap.right() {
                let offset = (row + (x - tile.x) as usize) * channels;
                data[offset..offset + channels].copy_from_slice(&values);
            }
        }
    }

    if target.suppress_override_upload {
        return Ok(Some(data));
    }

    for layer in overrides {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let Some(overlap) = intersect(&layer.rect, &tile) else {
            continue;
        };
        let rgba = crop_rgba(&layer.rgba, &layer.rect, &overlap)?;
        let local = OverrideRect {
            x: (overlap.x - tile.x) as i32,
            y: (overlap.y - tile.y) as i32,
            width: overlap.width as i32,
            height: overlap.height as i32,
        };
        match target.texture {
            PageTextureKind::MaterialParams => apply_rgba_f32_scaled(
                &mut data,
                tile.width as i32,
                tile.height as i32,
                local,
                &rgba,
                layer.scale,
            )?,
            // normal/height layers replace texels as-is
            PageTextureKind::NormalDepth => copy_rgba_local(&mut data, tile.width, &local, &rgba),
        }
    }

    Ok(Some(data))
}

fn copy_rgba_local(data: &mut [f32], tile_width: u32, local: &OverrideRect, rgba: &[f32]) {
    let row_len = local.width as usize * RGBA;
    for row in 0..local.height as usize {
        let dst = ((local.y as usize + row) * tile_width as usize + local.x as usize) * RGBA;
        data[dst..dst + row_len].copy_from_slice(&rgba[row * row_len..(row + 1) * row_len]);
    }
}

/// Cut the `inner` part out of an RGBA block covering `outer`
pub(crate) fn crop_rgba(rgba: &[f32], outer: &AtlasRect, inner: &AtlasRect) -> AtlasResult<Vec<f32>> {
    let expected = outer.area() * RGBA;
    if rgba.len() != expected {
        return Err(MaterialAtlasError::out_of_range(
            "override rgba",
            format!("length {} != {}", rgba.len(), expected),
        ));
    }

    let mut out = Vec::with_capacity(inner.area() * RGBA);
    for y in inner.y..inner.bottom() {
        let start = (((y - outer.y) * outer.width + (inner.x - outer.x)) as usize) * RGBA;
        out.extend_from_slice(&rgba[start..start + inner.width as usize * RGBA]);
    }
    Ok(out)
}
