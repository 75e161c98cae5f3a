//! Material Atlas Builder
//!
//! Ties one build pass together: resolve every texture the host placed, derive
//! the cache key, skip the pass when nothing changed, rasterize page buffers,
//! layer overrides, and push the result into an [`AtlasTextureStore`]. The
//! same inputs can also be split into per-tile jobs for incremental rebuilds.

use crate::atlas::atlas_operations::{intersect, page_sizes, uv_to_pixel_rect};
use crate::atlas::override_pass::apply_overrides;
use crate::atlas::{
    build_page_buffers, AtlasRect, AtlasSnapshot, MaterialMap, NormalDepthPages, OverridePassReport,
    OverrideSource, PageBufferBuild, PageGeometry, PageId,
};
use crate::cache_key::{CacheKey, CachePayload};
use crate::config::MaterialAtlasConfig;
use crate::error::{AtlasResult, MaterialAtlasError};
use crate::gpu::{AtlasTextureStore, GpuTextureProvider, PageTextureKind, SyncReport};
use crate::jobs::tile_job::crop_rgba;
use crate::jobs::{Generation, TileFill, TileJob, TileOverride, TileTarget};
use crate::materials::{AssetKey, MaterialRule, MaterialRuleSet, OverrideDescriptor};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Everything one build pass resolved from the host snapshot
#[derive(Debug, Clone, Default)]
pub struct ResolvedTextures {
    pub materials: MaterialMap,
    pub overrides: BTreeMap<AssetKey, OverrideDescriptor>,
    /// Textures that matched a material rule rather than falling back to defaults
    pub matched: usize,
}

/// Output of a successful build pass
#[derive(Debug, Clone)]
pub struct AtlasBuild {
    pub generation: Generation,
    pub cache_key: CacheKey,
    /// Active pages the buffers were built for
    pub pages: Vec<PageGeometry>,
    pub buffers: PageBufferBuild,
    /// Only populated when normal+depth is enabled and an override touched the page
    pub normal_depth: NormalDepthPages,
    pub override_report: OverridePassReport,
}

pub struct MaterialAtlasBuilder {
    config: MaterialAtlasConfig,
    rules: MaterialRuleSet,
    last_cache_key: Option<CacheKey>,
    generation: Generation,
}

impl MaterialAtlasBuilder {
    /// Validate `config` and compile `rules`; the first bad pattern fails construction
    pub fn new(config: MaterialAtlasConfig, rules: Vec<MaterialRule>) -> AtlasResult<Self> {
        config.validate()?;
        let rules = MaterialRuleSet::compile_with_limit(rules, config.max_pattern_length)?;
        log::info!(
            "[MaterialAtlasBuilder::new] {} rules, normal_depth={}",
            rules.len(),
            config.enable_normal_depth
        );

        Ok(Self {
            config,
            rules,
            last_cache_key: None,
            generation: 0,
        })
    }

    pub fn config(&self) -> &MaterialAtlasConfig {
        &self.config
    }

    pub fn rule_set(&self) -> &MaterialRuleSet {
        &self.rules
    }

    pub fn last_cache_key(&self) -> Option<CacheKey> {
        self.last_cache_key
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Force the next `build` to run even if inputs are unchanged
    pub fn invalidate(&mut self) {
        self.last_cache_key = None;
    }

    /// Resolve material and override for every texture in the snapshot
    pub fn resolve<S: AtlasSnapshot + ?Sized>(&self, snapshot: &S) -> ResolvedTextures {
        let mut resolved = ResolvedTextures::default();
        for key in snapshot.texture_keys() {
            let result = self.rules.resolve(&key);
            if result.matched_rule.is_some() {
                resolved.matched += 1;
            }
            if let Some(descriptor) = result.override_descriptor {
                resolved.overrides.insert(key.clone(), descriptor);
            }
            resolved.materials.insert(key, result.definition);
        }
        resolved
    }

    /// Key over the rule set, texture set and placements, active page geometry
    /// and feature flags
    pub fn cache_key<S: AtlasSnapshot + ?Sized>(&self, snapshot: &S) -> CacheKey {
        let textures = snapshot.texture_keys();
        CachePayload::new()
            .rules(self.rules.rules())
            .textures(&textures)
            .placements(textures.iter().map(|key| (key, snapshot.placement(key))))
            .pages(&snapshot.pages())
            .flag("normal_depth", self.config.enable_normal_depth)
            .key(self.config.cache_schema_version)
    }

    /// Run a build pass. Returns `Ok(None)` when the cache key matches the last
    /// successful build.
    pub fn build<S, O>(&mut self, snapshot: &S, overrides: &O) -> AtlasResult<Option<AtlasBuild>>
    where
        S: AtlasSnapshot + ?Sized,
        O: OverrideSource + ?Sized,
    {
        let cache_key = self.cache_key(snapshot);
        if self.last_cache_key == Some(cache_key) {
            log::debug!("[MaterialAtlasBuilder::build] Cache key {} unchanged, skipping", cache_key);
            return Ok(None);
        }

        let pages = snapshot.active_pages();
        let placeholders = snapshot.pages().len() - pages.len();
        if placeholders > 0 {
            log::warn!("[MaterialAtlasBuilder::build] Ignoring {} placeholder pages", placeholders);
        }

        let resolved = self.resolve(snapshot);
        let mut buffers = build_page_buffers(snapshot, &resolved.materials)?;

        let mut normal_depth = NormalDepthPages::new();
        let normal_depth_target = if self.config.enable_normal_depth {
            Some(&mut normal_depth)
        } else {
            None
        };
        let override_report = apply_overrides(
            &mut buffers,
            normal_depth_target,
            snapshot,
            &resolved.overrides,
            overrides,
        )?;

        self.generation += 1;
        self.last_cache_key = Some(cache_key);

        log::info!(
            "[MaterialAtlasBuilder::build] {} pages, {} rects ({} textures matched a rule), {} overrides, key {}",
            buffers.buffers.len(),
            buffers.filled_rects,
            resolved.matched,
            override_report.material_params_applied + override_report.normal_height_applied,
            cache_key
        );

        Ok(Some(AtlasBuild {
            generation: self.generation,
            cache_key,
            pages,
            buffers,
            normal_depth,
            override_report,
        }))
    }

    /// Sync `store` to the build's pages and upload every page buffer
    pub fn apply_to_store<P: GpuTextureProvider>(
        &self,
        build: &AtlasBuild,
        store: &mut AtlasTextureStore<P>,
    ) -> AtlasResult<SyncReport> {
        let enable_normal_depth = self.config.enable_normal_depth;
        let report = if store.needs_resync(&build.pages, enable_normal_depth) {
            store.sync_to_pages(&build.pages, enable_normal_depth)?
        } else {
            SyncReport {
                unchanged: store.len(),
                ..SyncReport::default()
            }
        };

        for (&id, buffer) in &build.buffers.buffers {
            store.upload_page_buffer(id, buffer)?;
        }
        for (&id, rgba) in &build.normal_depth {
            store.replace_normal_depth_with_data(id, rgba)?;
        }

        log::info!(
            "[MaterialAtlasBuilder::apply_to_store] Uploaded {} pages for generation {}",
            build.buffers.buffers.len(),
            build.generation
        );
        Ok(report)
    }

    /// Split the snapshot into bake jobs of at most `tile_size` square pixels.
    /// Starts a new generation so results from earlier jobs become stale.
    ///
    /// With normal+depth enabled, pages touched by a normal/height override also
    /// get `NormalDepth` jobs, matching the pages a full build fills.
    pub fn bake_tile_jobs<S, O>(&mut self, snapshot: &S, overrides: &O, tile_size: u32) -> AtlasResult<Vec<TileJob>>
    where
        S: AtlasSnapshot + ?Sized,
        O: OverrideSource + ?Sized,
    {
        check_tile_size(tile_size)?;
        self.generation += 1;
        let generation = self.generation;
        let resolved = self.resolve(snapshot);

        let mut fills: BTreeMap<PageId, Vec<TileFill>> = BTreeMap::new();
        let mut layers: BTreeMap<PageId, Vec<TileOverride>> = BTreeMap::new();
        let pages = snapshot.active_pages();
        let sizes = page_sizes(&pages);

        for (key, definition) in &resolved.materials {
            let Some((page_id, rect)) = texture_rect(snapshot, key, &sizes) else {
                continue;
            };
            fills
                .entry(page_id)
                .or_default()
                .push(TileFill::material(rect, definition.clamped_params()));
        }

        let mut normal_layers: BTreeMap<PageId, Vec<TileOverride>> = BTreeMap::new();
        for (key, descriptor) in &resolved.overrides {
            let Some((page_id, rect)) = texture_rect(snapshot, key, &sizes) else {
                continue;
            };
            if let Some(params_key) = &descriptor.material_params {
                if let Some(rgba) = overrides.rgba(params_key, rect.width, rect.height) {
                    layers.entry(page_id).or_default().push(TileOverride {
                        rect,
                        rgba,
                        scale: Some(descriptor.scale),
                    });
                }
            }
            if !self.config.enable_normal_depth {
                continue;
            }
            if let Some(height_key) = &descriptor.normal_height {
                if let Some(rgba) = overrides.rgba(height_key, rect.width, rect.height) {
                    normal_layers.entry(page_id).or_default().push(TileOverride {
                        rect,
                        rgba,
                        scale: None,
                    });
                }
            }
        }

        let mut ids: Vec<PageId> = sizes.keys().copied().collect();
        ids.sort_unstable();

        let mut jobs = Vec::new();
        for id in ids {
            let (width, height) = sizes[&id];
            let page_fills = fills.get(&id).map(Vec::as_slice).unwrap_or(&[]);
            let page_layers = layers.get(&id).map(Vec::as_slice).unwrap_or(&[]);

            for tile in tile_rects(width, height, tile_size) {
                jobs.push(TileJob::bake(
                    tile_target(generation, id, tile, PageTextureKind::MaterialParams),
                    touching(page_fills, &tile, |f| &f.rect),
                    touching(page_layers, &tile, |l| &l.rect),
                ));
            }

            let Some(page_normals) = normal_layers.get(&id) else {
                continue;
            };
            for tile in tile_rects(width, height, tile_size) {
                jobs.push(TileJob::bake(
                    tile_target(generation, id, tile, PageTextureKind::NormalDepth),
                    Vec::new(),
                    touching(page_normals, &tile, |l| &l.rect),
                ));
            }
        }

        log::debug!(
            "[MaterialAtlasBuilder::bake_tile_jobs] {} jobs for generation {}",
            jobs.len(),
            generation
        );
        Ok(jobs)
    }

    /// Split a finished build into cached upload jobs, one per tile and texture
    pub fn cached_tile_jobs(&self, build: &AtlasBuild, tile_size: u32) -> AtlasResult<Vec<TileJob>> {
        check_tile_size(tile_size)?;
        let mut jobs = Vec::new();
        for (&id, buffer) in &build.buffers.buffers {
            let page = AtlasRect::new(0, 0, buffer.width(), buffer.height());
            for tile in tile_rects(buffer.width(), buffer.height(), tile_size) {
                let data = buffer.extract_rect(&tile)?;
                jobs.push(TileJob::cached(
                    tile_target(build.generation, id, tile, PageTextureKind::MaterialParams),
                    data,
                ));
                if let Some(rgba) = build.normal_depth.get(&id) {
                    jobs.push(TileJob::cached(
                        tile_target(build.generation, id, tile, PageTextureKind::NormalDepth),
                        crop_rgba(rgba, &page, &tile)?,
                    ));
                }
            }
        }
        Ok(jobs)
    }
}

fn check_tile_size(tile_size: u32) -> AtlasResult<()> {
    if tile_size == 0 {
        return Err(MaterialAtlasError::invalid_argument("tile_size", "must be positive"));
    }
    Ok(())
}

fn tile_target(generation: Generation, page_id: PageId, rect: AtlasRect, texture: PageTextureKind) -> TileTarget {
    TileTarget {
        generation,
        page_id,
        rect,
        texture,
        priority: 0,
        suppress_override_upload: false,
    }
}

/// Items whose page rect overlaps `tile`
fn touching<T: Clone>(items: &[T], tile: &AtlasRect, rect: impl Fn(&T) -> &AtlasRect) -> Vec<T> {
    items
        .iter()
        .filter(|&item| intersect(rect(item), tile).is_some())
        .cloned()
        .collect()
}

fn texture_rect<S: AtlasSnapshot + ?Sized>(
    snapshot: &S,
    key: &AssetKey,
    sizes: &FxHashMap<PageId, (u32, u32)>,
) -> Option<(PageId, AtlasRect)> {
    let placement = snapshot.placement(key)?;
    let &(width, height) = sizes.get(&placement.page_id)?;
    let rect = uv_to_pixel_rect(&placement.uv, width, height)?;
    Some((placement.page_id, rect))
}

/// Row-major grid of tiles covering a `width x height` page; edge tiles are clipped
fn tile_rects(width: u32, height: u32, tile_size: u32) -> Vec<AtlasRect> {
    let mut tiles = Vec::new();
    let mut y = 0;
    while y < height {
        let tile_height = tile_size.min(height - y);
        let mut x = 0;
        while x < width {
            let tile_width = tile_size.min(width - x);
            tiles.push(AtlasRect::new(x, y, tile_width, tile_height));
            x += tile_size;
        }
        y += tile_size;
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{AtlasLayout, NoOverrides, UvRect};
    use crate::gpu::texture_store::tests::FakeProvider;
    use crate::jobs::CancelToken;
    use crate::materials::{MaterialDefinition, OverrideSpec};

    fn key(reference: &str) -> AssetKey {
        AssetKey::parse(reference).expect("key")
    }

    fn rules() -> Vec<MaterialRule> {
        vec![MaterialRule::material(
            key("pbr:rules/metal"),
            "block/iron_*",
            MaterialDefinition::new(0.2, 0.1, 0.0).with_priority(1),
        )]
    }

    fn layout() -> AtlasLayout {
        AtlasLayout::new(vec![PageGeometry::new(7, 16, 16), PageGeometry::new(0, 0, 0)]).with_texture(
            key("minecraft:block/iron_block"),
            7,
            UvRect::new(0.0, 0.0, 0.5, 0.5),
        )
    }

    struct SolidSource([f32; 4]);

    impl OverrideSource for SolidSource {
        fn rgba(&self, _texture: &AssetKey, width: u32, height: u32) -> Option<Vec<f32>> {
            Some(self.0.repeat((width * height) as usize))
        }
    }

    #[test]
    fn test_end_to_end_page_build() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut builder = MaterialAtlasBuilder::new(MaterialAtlasConfig::default(), rules()).expect("builder");
        let build = builder.build(&layout(), &NoOverrides).expect("build").expect("fresh build");

        assert_eq!(build.pages, vec![PageGeometry::new(7, 16, 16)]);
        let page = &build.buffers.buffers[&7];
        for y in 0..16 {
            for x in 0..16 {
                let expected = if x < 8 && y < 8 { [0.2, 0.1, 0.0] } else { [0.85, 0.0, 0.0] };
                assert_eq!(page.pixel(x, y), Some(expected), "pixel {},{}", x, y);
            }
        }
        assert_eq!(build.buffers.filled_rects, 1);
    }

    #[test]
    fn test_unchanged_inputs_skip_rebuild() {
        let mut builder = MaterialAtlasBuilder::new(MaterialAtlasConfig::default(), rules()).expect("builder");
        let first = builder.build(&layout(), &NoOverrides).expect("build").expect("fresh build");
        assert!(builder.build(&layout(), &NoOverrides).expect("build").is_none());

        let moved = layout().with_texture(key("block/stone"), 7, UvRect::new(0.5, 0.5, 1.0, 1.0));
        let second = builder.build(&moved, &NoOverrides).expect("build").expect("rebuild");
        assert_ne!(first.cache_key, second.cache_key);
        assert!(second.generation > first.generation);

        builder.invalidate();
        assert!(builder.build(&moved, &NoOverrides).expect("build").is_some());
    }

    #[test]
    fn test_moved_texture_rebuilds() {
        let mut builder = MaterialAtlasBuilder::new(MaterialAtlasConfig::default(), rules()).expect("builder");
        builder.build(&layout(), &NoOverrides).expect("build").expect("fresh build");

        let mut moved = layout();
        moved.place(key("minecraft:block/iron_block"), 7, UvRect::new(0.5, 0.5, 1.0, 1.0));
        let rebuilt = builder
            .build(&moved, &NoOverrides)
            .expect("build")
            .expect("moved texture must rebuild");
        let page = &rebuilt.buffers.buffers[&7];
        assert_eq!(page.pixel(12, 12), Some([0.2, 0.1, 0.0]));
        assert_eq!(page.pixel(3, 3), Some([0.85, 0.0, 0.0]));

        let mut other_page = moved.clone();
        other_page.pages.push(PageGeometry::new(8, 16, 16));
        other_page.place(key("minecraft:block/iron_block"), 8, UvRect::new(0.5, 0.5, 1.0, 1.0));
        assert_ne!(builder.cache_key(&moved), builder.cache_key(&other_page));
    }

    #[test]
    fn test_cache_key_follows_config() {
        let plain = MaterialAtlasBuilder::new(MaterialAtlasConfig::default(), rules()).expect("builder");
        let with_normals = MaterialAtlasBuilder::new(
            MaterialAtlasConfig {
                enable_normal_depth: true,
                ..MaterialAtlasConfig::default()
            },
            rules(),
        )
        .expect("builder");
        let bumped = MaterialAtlasBuilder::new(
            MaterialAtlasConfig {
                cache_schema_version: 2,
                ..MaterialAtlasConfig::default()
            },
            rules(),
        )
        .expect("builder");

        let key = plain.cache_key(&layout());
        assert_ne!(key, with_normals.cache_key(&layout()));
        assert_ne!(key, bumped.cache_key(&layout()));
        assert_eq!(key.hash64, bumped.cache_key(&layout()).hash64);
    }

    #[test]
    fn test_bad_rule_fails_construction() {
        let mut bad = rules();
        bad.push(MaterialRule::material(key("pbr:rules/bad"), "   ", MaterialDefinition::default()));
        assert!(matches!(
            MaterialAtlasBuilder::new(MaterialAtlasConfig::default(), bad),
            Err(MaterialAtlasError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_override_pass_runs_in_build() {
        let mut rules = rules();
        rules.push(MaterialRule::override_rule(
            key("pbr:rules/override"),
            "block/iron_block",
            5,
            OverrideSpec {
                material_params: Some(key("pbr:overrides/iron_block_mat")),
                ..OverrideSpec::default()
            },
        ));
        let mut builder = MaterialAtlasBuilder::new(MaterialAtlasConfig::default(), rules).expect("builder");
        let build = builder
            .build(&layout(), &SolidSource([0.25, 0.5, 0.75, 1.0]))
            .expect("build")
            .expect("fresh build");

        assert_eq!(build.override_report.material_params_applied, 1);
        assert_eq!(build.buffers.buffers[&7].pixel(3, 3), Some([0.25, 0.5, 0.75]));
        assert_eq!(build.buffers.buffers[&7].pixel(8, 8), Some([0.85, 0.0, 0.0]));
    }

    #[test]
    fn test_apply_to_store_syncs_and_uploads() {
        let config = MaterialAtlasConfig {
            enable_normal_depth: true,
            ..MaterialAtlasConfig::default()
        };
        let mut builder = MaterialAtlasBuilder::new(config, rules()).expect("builder");
        let build = builder.build(&layout(), &NoOverrides).expect("build").expect("fresh build");

        let mut store = AtlasTextureStore::new(FakeProvider::default());
        let report = builder.apply_to_store(&build, &mut store).expect("apply");
        assert_eq!(report.created, 1);
        assert_eq!(store.page_ids(), vec![7]);
        assert!(store.normal_depth(7).is_some());
        assert!(!store.needs_resync(&build.pages, true));

        let again = builder.apply_to_store(&build, &mut store).expect("apply");
        assert_eq!(again.created, 0);
        assert_eq!(again.unchanged, 1);
    }

    #[test]
    fn test_bake_tiles_match_full_build() {
        let mut builder = MaterialAtlasBuilder::new(MaterialAtlasConfig::default(), rules()).expect("builder");
        let build = builder.build(&layout(), &NoOverrides).expect("build").expect("fresh build");
        let page = &build.buffers.buffers[&7];

        let jobs = builder.bake_tile_jobs(&layout(), &NoOverrides, 5).expect("jobs");
        assert_eq!(jobs.len(), 16);
        let token = CancelToken::new();
        for job in jobs {
            assert_eq!(job.target.generation, build.generation + 1);
            let upload = job.run(&token).expect("run").expect("upload");
            assert_eq!(upload.data, page.extract_rect(&upload.rect).expect("rect"));
        }
    }

    #[test]
    fn test_bake_tiles_match_full_build_normal_depth() {
        let config = MaterialAtlasConfig {
            enable_normal_depth: true,
            ..MaterialAtlasConfig::default()
        };
        let mut rules = rules();
        rules.push(MaterialRule::override_rule(
            key("pbr:rules/override"),
            "block/iron_block",
            5,
            OverrideSpec {
                material_params: Some(key("pbr:overrides/iron_block_mat")),
                normal_height: Some(key("pbr:overrides/iron_block_n")),
                ..OverrideSpec::default()
            },
        ));
        let source = SolidSource([0.25, 0.5, 0.75, 0.4]);
        let mut builder = MaterialAtlasBuilder::new(config, rules).expect("builder");
        let build = builder.build(&layout(), &source).expect("build").expect("fresh build");
        let page = &build.buffers.buffers[&7];
        let normals = &build.normal_depth[&7];
        assert_eq!(build.override_report.normal_height_applied, 1);

        let jobs = builder.bake_tile_jobs(&layout(), &source, 5).expect("jobs");
        assert_eq!(jobs.len(), 32);
        let token = CancelToken::new();
        let whole = AtlasRect::new(0, 0, 16, 16);
        let mut normal_tiles = 0;
        for job in jobs {
            let upload = job.run(&token).expect("run").expect("upload");
            match upload.texture {
                PageTextureKind::MaterialParams => {
                    assert_eq!(upload.data, page.extract_rect(&upload.rect).expect("rect"));
                }
                PageTextureKind::NormalDepth => {
                    normal_tiles += 1;
                    assert_eq!(upload.data, crop_rgba(normals, &whole, &upload.rect).expect("rect"));
                }
            }
        }
        assert_eq!(normal_tiles, 16);

        let cached = builder.cached_tile_jobs(&build, 8).expect("cached");
        assert_eq!(cached.len(), 8);

        let mut disabled =
            MaterialAtlasBuilder::new(MaterialAtlasConfig::default(), builder.rule_set().rules().cloned().collect())
                .expect("builder");
        let jobs = disabled.bake_tile_jobs(&layout(), &source, 5).expect("jobs");
        assert!(jobs.iter().all(|j| j.target.texture == PageTextureKind::MaterialParams));
        assert_eq!(jobs.len(), 16);
    }

    #[test]
    fn test_cached_tiles_cover_page() {
        let mut builder = MaterialAtlasBuilder::new(MaterialAtlasConfig::default(), rules()).expect("builder");
        let build = builder.build(&layout(), &NoOverrides).expect("build").expect("fresh build");
        let jobs = builder.cached_tile_jobs(&build, 8).expect("jobs");
        assert_eq!(jobs.len(), 4);
        let covered: usize = jobs.iter().map(|j| j.target.rect.area()).sum();
        assert_eq!(covered, 256);
        assert!(builder.cached_tile_jobs(&build, 0).is_err());
    }

    #[test]
    fn test_tile_rects_clip_edges() {
        let tiles = tile_rects(10, 4, 4);
        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[2], AtlasRect::new(8, 0, 2, 4));
    }
}
