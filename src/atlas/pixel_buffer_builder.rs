//! Pixel Buffer Builder
//!
//! Rasterizes resolved materials into one dense buffer per active page, at the
//! exact size and layout of the host's color atlas. Each texture's UV rect is
//! filled flat with its clamped (roughness, metallic, emissive) triplet.

use super::atlas_data::{AtlasSnapshot, MaterialMap, PageId};
use super::atlas_operations::{page_sizes, uv_to_pixel_rect};
use super::pixel_buffer::PixelBuffer;
use crate::constants::material::DEFAULT_PARAMS;
use crate::error::AtlasResult;
use std::collections::BTreeMap;

/// Output of a page build
#[derive(Debug, Clone, Default)]
pub struct PageBufferBuild {
    pub buffers: BTreeMap<PageId, PixelBuffer>,
    /// Rectangles actually written
    pub filled_rects: usize,
    /// Textures skipped for a missing placement, an inactive page or a zero-area rect
    pub skipped_textures: usize,
}

/// Build one buffer per active page of `snapshot` and fill every placed material.
///
/// Textures are visited in key order, so where rects overlap the later key wins
/// and repeated builds are identical.
pub fn build_page_buffers<S>(snapshot: &S, materials: &MaterialMap) -> AtlasResult<PageBufferBuild>
where
    S: AtlasSnapshot + ?Sized,
{
    let pages = snapshot.active_pages();
    let sizes = page_sizes(&pages);

    let mut build = PageBufferBuild::default();
    for (&id, &(width, height)) in &sizes {
        build
            .buffers
            .insert(id, PixelBuffer::filled(width, height, DEFAULT_PARAMS));
    }

    for (key, definition) in materials {
        let Some(placement) = snapshot.placement(key) else {
            build.skipped_textures += 1;
            continue;
        };
        let Some(buffer) = build.buffers.get_mut(&placement.page_id) else {
            build.skipped_textures += 1;
            continue;
        };
        let Some(rect) = uv_to_pixel_rect(&placement.uv, buffer.width(), buffer.height()) else {
            build.skipped_textures += 1;
            continue;
        };

        buffer.fill_rect(&rect, definition.clamped_params())?;
        build.filled_rects += 1;
    }

    log::debug!(
        "[PixelBufferBuilder::build] {} pages, {} rects filled, {} textures skipped",
        build.buffers.len(),
        build.filled_rects,
        build.skipped_textures
    );

    Ok(build)
}
