//! Atlas Texture Store
//!
//! Owns the GPU page textures of the material atlas and keeps them in step with
//! the host's page list. Each active atlas page has one material params
//! texture and, when the feature is on, one normal+depth texture. A page's
//! textures are created and released together: a failed create leaves the old
//! textures in place and a dispose always drops both.
//!
//! The store is single-owner. Callers serialize `sync_to_pages` and the
//! replace/upload operations on one thread.

use super::{GpuTextureProvider, PageTextureDescriptor, PageTextureKind};
use crate::atlas::atlas_operations::page_sizes;
use crate::atlas::pixel_buffer::{params_to_rgba16f_bytes, rgba_to_rgba16f_bytes};
use crate::atlas::{AtlasRect, PageGeometry, PageId, PixelBuffer};
use crate::constants::channels::{MATERIAL_PARAMS, RGBA};
use crate::constants::material::DEFAULT_PARAMS;
use crate::error::{AtlasResult, MaterialAtlasError};
use crate::jobs::TileUpload;
use rustc_hash::FxHashMap;

/// The textures backing one atlas page
#[derive(Debug)]
pub struct PageTextures<T> {
    pub width: u32,
    pub height: u32,
    pub material_params: T,
    pub normal_depth: Option<T>,
}

impl<T> PageTextures<T> {
    fn matches(&self, width: u32, height: u32, enable_normal_depth: bool) -> bool {
        self.width == width && self.height == height && self.normal_depth.is_some() == enable_normal_depth
    }
}

/// What a `sync_to_pages` call changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub recreated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

pub struct AtlasTextureStore<P: GpuTextureProvider> {
    provider: P,
    pages: FxHashMap<PageId, PageTextures<P::Texture>>,
}

impl<P: GpuTextureProvider> AtlasTextureStore<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            pages: FxHashMap::default(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Tracked page ids in ascending order
    pub fn page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.pages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn page(&self, id: PageId) -> Option<&PageTextures<P::Texture>> {
        self.pages.get(&id)
    }

    pub fn material_params(&self, id: PageId) -> Option<&P::Texture> {
        self.pages.get(&id).map(|p| &p.material_params)
    }

    pub fn normal_depth(&self, id: PageId) -> Option<&P::Texture> {
        self.pages.get(&id).and_then(|p| p.normal_depth.as_ref())
    }

    /// True when the tracked pages differ from `pages` in membership, size or
    /// normal+depth presence, or when nothing is tracked yet
    pub fn needs_resync(&self, pages: &[PageGeometry], enable_normal_depth: bool) -> bool {
        if self.pages.is_empty() {
            return true;
        }

        let desired = page_sizes(pages);
        if self.pages.keys().any(|id| !desired.contains_key(id)) {
            return true;
        }

        desired.iter().any(|(id, &(width, height))| match self.pages.get(id) {
            Some(tracked) => !tracked.matches(width, height, enable_normal_depth),
            None => true,
        })
    }

    /// Bring the tracked pages in line with `pages` using the fewest create and dispose calls
    pub fn sync_to_pages(&mut self, pages: &[PageGeometry], enable_normal_depth: bool) -> AtlasResult<SyncReport> {
        let desired = page_sizes(pages);
        let mut report = SyncReport::default();

        let stale: Vec<PageId> = self
            .pages
            .keys()
            .filter(|id| !desired.contains_key(id))
            .copied()
            .collect();
        for id in stale {
            if let Some(old) = self.pages.remove(&id) {
                self.dispose_page(old);
                report.removed += 1;
            }
        }

        let mut ids: Vec<PageId> = desired.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let (width, height) = desired[&id];
            let existed = match self.pages.get(&id) {
                Some(tracked) if tracked.matches(width, height, enable_normal_depth) => {
                    report.unchanged += 1;
                    continue;
                }
                Some(_) => true,
                None => false,
            };

            let fresh = self.create_page(id, width, height, enable_normal_depth)?;
            if let Some(old) = self.pages.insert(id, fresh) {
                self.dispose_page(old);
            }
            if existed {
                report.recreated += 1;
            } else {
                report.created += 1;
            }
        }

        log::info!(
            "[AtlasTextureStore::sync_to_pages] {} pages: {} created, {} recreated, {} removed, {} unchanged",
            self.pages.len(),
            report.created,
            report.recreated,
            report.removed,
            report.unchanged
        );
        Ok(report)
    }

    /// Swap in a new material params texture for a tracked page, keeping its
    /// normal+depth texture. Returns `Ok(false)` when the page is not tracked.
    pub fn replace_material_params_with_data(
        &mut self,
        id: PageId,
        width: u32,
        height: u32,
        data: &[f32],
    ) -> AtlasResult<bool> {
        let Some(page) = self.pages.get(&id) else {
            log::debug!("[AtlasTextureStore::replace_material_params] Page {} not tracked", id);
            return Ok(false);
        };

        if page.width != width || page.height != height {
            return Err(MaterialAtlasError::invalid_argument(
                "size",
                format!(
                    "{}x{} does not match tracked page {} ({}x{})",
                    width, height, id, page.width, page.height
                ),
            ));
        }
        let expected = width as usize * height as usize * MATERIAL_PARAMS;
        if data.len() != expected {
            return Err(MaterialAtlasError::out_of_range(
                "data",
                format!("length {} != {}", data.len(), expected),
            ));
        }

        let descriptor = PageTextureDescriptor {
            page_id: id,
            kind: PageTextureKind::MaterialParams,
            width,
            height,
        };
        let fresh = self
            .provider
            .create_texture(&descriptor, Some(&params_to_rgba16f_bytes(data)))?;

        if let Some(page) = self.pages.get_mut(&id) {
            let old = std::mem::replace(&mut page.material_params, fresh);
            self.provider.dispose_texture(old);
        }
        Ok(true)
    }

    /// Upload a whole page buffer; `Ok(false)` when the page is not tracked
    pub fn upload_page_buffer(&mut self, id: PageId, buffer: &PixelBuffer) -> AtlasResult<bool> {
        self.replace_material_params_with_data(id, buffer.width(), buffer.height(), buffer.as_slice())
    }

    /// Overwrite a page's normal+depth texture with RGBA data.
    /// Returns `Ok(false)` when the page is untracked or has no normal+depth texture.
    pub fn replace_normal_depth_with_data(&mut self, id: PageId, rgba: &[f32]) -> AtlasResult<bool> {
        let Some(page) = self.pages.get(&id) else {
            return Ok(false);
        };
        let Some(texture) = page.normal_depth.as_ref() else {
            return Ok(false);
        };

        let expected = page.width as usize * page.height as usize * RGBA;
        if rgba.len() != expected {
            return Err(MaterialAtlasError::out_of_range(
                "data",
                format!("length {} != {}", rgba.len(), expected),
            ));
        }

        let full = AtlasRect::new(0, 0, page.width, page.height);
        self.provider
            .upload_region(texture, &full, &rgba_to_rgba16f_bytes(rgba))?;
        Ok(true)
    }

    /// Upload a finished tile. Skipped tiles, untracked pages and missing
    /// normal+depth textures return `Ok(false)`.
    pub fn apply_tile_upload(&mut self, upload: &TileUpload) -> AtlasResult<bool> {
        if upload.skip_upload {
            return Ok(false);
        }
        let Some(page) = self.pages.get(&upload.page_id) else {
            log::debug!(
                "[AtlasTextureStore::apply_tile_upload] Page {} not tracked, dropping generation {}",
                upload.page_id,
                upload.generation
            );
            return Ok(false);
        };

        if !upload.rect.fits_within(page.width, page.height) {
            return Err(MaterialAtlasError::out_of_range(
                "rect",
                format!("{:?} exceeds page {}x{}", upload.rect, page.width, page.height),
            ));
        }

        let (texture, channels) = match upload.texture {
            PageTextureKind::MaterialParams => (Some(&page.material_params), MATERIAL_PARAMS),
            PageTextureKind::NormalDepth => (page.normal_depth.as_ref(), RGBA),
        };
        let Some(texture) = texture else {
            return Ok(false);
        };

        let expected = upload.rect.area() * channels;
        if upload.data.len() != expected {
            return Err(MaterialAtlasError::out_of_range(
                "tile data",
                format!("length {} != {}", upload.data.len(), expected),
            ));
        }

        let bytes = match upload.texture {
            PageTextureKind::MaterialParams => params_to_rgba16f_bytes(&upload.data),
            PageTextureKind::NormalDepth => rgba_to_rgba16f_bytes(&upload.data),
        };
        self.provider.upload_region(texture, &upload.rect, &bytes)?;
        Ok(true)
    }

    /// Dispose every tracked page
    pub fn clear(&mut self) {
        let pages: Vec<PageTextures<P::Texture>> = self.pages.drain().map(|(_, p)| p).collect();
        for page in pages {
            self.dispose_page(page);
        }
    }

    fn create_page(
        &mut self,
        id: PageId,
        width: u32,
        height: u32,
        enable_normal_depth: bool,
    ) -> AtlasResult<PageTextures<P::Texture>> {
        let defaults = PixelBuffer::filled(width, height, DEFAULT_PARAMS).to_rgba16f_bytes();
        let material_params = self.provider.create_texture(
            &PageTextureDescriptor {
                page_id: id,
                kind: PageTextureKind::MaterialParams,
                width,
                height,
            },
            Some(&defaults),
        )?;

        let normal_depth = if enable_normal_depth {
            let created = self.provider.create_texture(
                &PageTextureDescriptor {
                    page_id: id,
                    kind: PageTextureKind::NormalDepth,
                    width,
                    height,
                },
                None,
            );
            match created {
                Ok(texture) => Some(texture),
                Err(e) => {
                    self.provider.dispose_texture(material_params);
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(PageTextures {
            width,
            height,
            material_params,
            normal_depth,
        })
    }

    fn dispose_page(&mut self, page: PageTextures<P::Texture>) {
        self.provider.dispose_texture(page.material_params);
        if let Some(normal_depth) = page.normal_depth {
            self.provider.dispose_texture(normal_depth);
        }
    }
}

impl<P: GpuTextureProvider> Drop for AtlasTextureStore<P> {
    fn drop(&mut self) {
        self.clear();
    }
}
