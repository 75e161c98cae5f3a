//! Override Pass
//!
//! Patches built page buffers with authored per-texture override images.
//! Loading and resampling the images is the host's job; this pass only asks an
//! [`OverrideSource`] for RGBA data at the texture's pixel size and writes it
//! into the texture's rect.

use super::atlas_data::{AtlasRect, AtlasSnapshot, PageId};
use super::atlas_operations::uv_to_pixel_rect;
use super::override_applier::{apply_rgba_f32_scaled, OverrideRect};
use super::pixel_buffer_builder::PageBufferBuild;
use crate::constants::channels::RGBA;
use crate::constants::normal_depth::FLAT_TEXEL;
use crate::error::{AtlasResult, MaterialAtlasError};
use crate::materials::{AssetKey, OverrideDescriptor};
use std::collections::BTreeMap;

/// Supplies decoded override images
pub trait OverrideSource {
    /// RGBA floats for `texture`, `width * height * 4` long, or `None` if unavailable
    fn rgba(&self, texture: &AssetKey, width: u32, height: u32) -> Option<Vec<f32>>;
}

/// Source that never has data
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverrides;

impl OverrideSource for NoOverrides {
    fn rgba(&self, _texture: &AssetKey, _width: u32, _height: u32) -> Option<Vec<f32>> {
        None
    }
}

/// Per-page RGBA normal+depth data produced from normal/height overrides
pub type NormalDepthPages = BTreeMap<PageId, Vec<f32>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverridePassReport {
    pub material_params_applied: usize,
    pub normal_height_applied: usize,
    /// Overrides skipped for an empty descriptor, missing placement or missing image
    pub skipped: usize,
}

/// Apply every non-empty override descriptor to `build`.
///
/// Normal/height overrides are only written when `normal_depth` is given; each
/// touched page starts from a flat normal with zero depth.
pub fn apply_overrides<S, O>(
    build: &mut PageBufferBuild,
    mut normal_depth: Option<&mut NormalDepthPages>,
    snapshot: &S,
    overrides: &BTreeMap<AssetKey, OverrideDescriptor>,
    source: &O,
) -> AtlasResult<OverridePassReport>
where
    S: AtlasSnapshot + ?Sized,
    O: OverrideSource + ?Sized,
{
    let mut report = OverridePassReport::default();

    for (texture, descriptor) in overrides {
        if descriptor.is_empty() {
            log::warn!(
                "[OverridePass::apply] Empty override for {} from {}",
                texture,
                descriptor.rule_source
            );
            report.skipped += 1;
            continue;
        }

        let Some(placement) = snapshot.placement(texture) else {
            report.skipped += 1;
            continue;
        };
        let Some(buffer) = build.buffers.get_mut(&placement.page_id) else {
            report.skipped += 1;
            continue;
        };
        let (page_width, page_height) = (buffer.width(), buffer.height());
        let Some(rect) = uv_to_pixel_rect(&placement.uv, page_width, page_height) else {
            report.skipped += 1;
            continue;
        };

        if let Some(params_key) = &descriptor.material_params {
            match source.rgba(params_key, rect.width, rect.height) {
                Some(rgba) => {
                    apply_rgba_f32_scaled(
                        buffer.as_mut_slice(),
                        page_width as i32,
                        page_height as i32,
                        OverrideRect::from(rect),
                        &rgba,
                        Some(descriptor.scale),
                    )?;
                    report.material_params_applied += 1;
                }
                None => {
                    log::warn!(
                        "[OverridePass::apply] No material params image {} for {}",
                        params_key,
                        texture
                    );
                    report.skipped += 1;
                }
            }
        }

        if let (Some(height_key), Some(pages)) = (&descriptor.normal_height, normal_depth.as_deref_mut()) {
            match source.rgba(height_key, rect.width, rect.height) {
                Some(rgba) => {
                    let page = pages.entry(placement.page_id).or_insert_with(|| {
                        FLAT_TEXEL.repeat(page_width as usize * page_height as usize)
                    });
                    copy_rgba_rect(page, page_width, &rect, &rgba)?;
                    report.normal_height_applied += 1;
                }
                None => {
                    log::warn!(
                        "[OverridePass::apply] No normal/height image {} for {}",
                        height_key,
                        texture
                    );
                    report.skipped += 1;
                }
            }
        }
    }

    log::debug!("[OverridePass::apply] {:?}", report);
    Ok(report)
}

fn copy_rgba_rect(page: &mut [f32], page_width: u32, rect: &AtlasRect, rgba: &[f32]) -> AtlasResult<()> {
    if rgba.len() != rect.area() * RGBA {
        return Err(MaterialAtlasError::out_of_range(
            "normal/height data",
            format!("length {} != {}x{}x4", rgba.len(), rect.width, rect.height),
        ));
    }
    let row_len = rect.width as usize * RGBA;
    for row in 0..rect.height as usize {
        let dst = ((rect.y as usize + row) * page_width as usize + rect.x as usize) * RGBA;
        page[dst..dst + row_len].copy_from_slice(&rgba[row * row_len..(row + 1) * row_len]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::atlas_data::{AtlasLayout, MaterialMap, PageGeometry, UvRect};
    use crate::atlas::pixel_buffer_builder::build_page_buffers;
    use crate::materials::MaterialScale;
    use std::collections::HashMap;

    struct MapSource(HashMap<AssetKey, [f32; 4]>);

    impl OverrideSource for MapSource {
        fn rgba(&self, texture: &AssetKey, width: u32, height: u32) -> Option<Vec<f32>> {
            self.0
                .get(texture)
                .map(|texel| texel.repeat(width as usize * height as usize))
        }
    }

    fn key(reference: &str) -> AssetKey {
        AssetKey::parse(reference).expect("key")
    }

    fn descriptor(params: Option<&str>, normal: Option<&str>, scale: MaterialScale) -> OverrideDescriptor {
        OverrideDescriptor {
            rule_id: Some("test".to_string()),
            rule_source: key("pbr:rules/test"),
            material_params: params.map(key),
            normal_height: normal.map(key),
            scale,
        }
    }

    fn layout() -> AtlasLayout {
        AtlasLayout::new(vec![PageGeometry::new(5, 4, 4)])
            .with_texture(key("block/gold"), 5, UvRect::new(0.5, 0.5, 1.0, 1.0))
            .with_texture(key("block/iron"), 5, UvRect::new(0.0, 0.0, 0.5, 0.5))
    }

    #[test]
    fn test_material_params_override_with_scale() {
        let layout = layout();
        let mut build = build_page_buffers(&layout, &MaterialMap::new()).expect("build");
        let source = MapSource(HashMap::from([(key("pbr:overrides/gold"), [0.6, 0.5, 0.2, 1.0])]));
        let overrides = BTreeMap::from([(
            key("block/gold"),
            descriptor(Some("pbr:overrides/gold"), None, MaterialScale::new(2.0, 1.0, 1.0)),
        )]);

        let report = apply_overrides(&mut build, None, &layout, &overrides, &source).expect("apply");
        assert_eq!(report.material_params_applied, 1);
        let buffer = &build.buffers[&5];
        assert_eq!(buffer.pixel(3, 3), Some([1.0, 0.5, 0.2]));
        assert_eq!(buffer.pixel(2, 2), Some([1.0, 0.5, 0.2]));
        assert_eq!(buffer.pixel(1, 1), Some([0.85, 0.0, 0.0]));
    }

    #[test]
    fn test_missing_image_and_empty_descriptor_skipped() {
        let layout = layout();
        let mut build = build_page_buffers(&layout, &MaterialMap::new()).expect("build");
        let overrides = BTreeMap::from([
            (key("block/gold"), descriptor(Some("pbr:overrides/none"), None, MaterialScale::IDENTITY)),
            (key("block/iron"), descriptor(None, None, MaterialScale::IDENTITY)),
            (key("block/unplaced"), descriptor(Some("pbr:overrides/x"), None, MaterialScale::IDENTITY)),
        ]);

        let report = apply_overrides(&mut build, None, &layout, &overrides, &NoOverrides).expect("apply");
        assert_eq!(report.skipped, 3);
        assert_eq!(report.material_params_applied, 0);
    }

    #[test]
    fn test_normal_height_written_to_normal_depth_page() {
        let layout = layout();
        let mut build = build_page_buffers(&layout, &MaterialMap::new()).expect("build");
        let source = MapSource(HashMap::from([(key("pbr:overrides/iron_n"), [0.1, 0.2, 0.9, 0.4])]));
        let overrides = BTreeMap::from([(
            key("block/iron"),
            descriptor(None, Some("pbr:overrides/iron_n"), MaterialScale::IDENTITY),
        )]);

        let mut normal_depth = NormalDepthPages::new();
        let report = apply_overrides(&mut build, Some(&mut normal_depth), &layout, &overrides, &source)
            .expect("apply");
        assert_eq!(report.normal_height_applied, 1);

        let page = &normal_depth[&5];
        assert_eq!(page.len(), 4 * 4 * 4);
        assert_eq!(&page[0..4], &[0.1, 0.2, 0.9, 0.4]);
        let far = (3 * 4 + 3) * 4;
        assert_eq!(&page[far..far + 4], &FLAT_TEXEL);

        // normal/height is ignored when the feature is off
        let mut build = build_page_buffers(&layout, &MaterialMap::new()).expect("build");
        let report = apply_overrides(&mut build, None, &layout, &overrides, &source).expect("apply");
        assert_eq!(report.normal_height_applied, 0);
    }
}
