//! Atlas Data
//!
//! Geometry of the host atlas as seen by the material build. The host owns the
//! layout; a build pass only reads it through [`AtlasSnapshot`].

use crate::materials::AssetKey;
use cgmath::Vector2;
use std::collections::BTreeMap;

/// Host atlas texture id. Zero marks a placeholder page.
pub type PageId = u32;

/// One atlas page as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageGeometry {
    pub atlas_texture_id: PageId,
    pub width: u32,
    pub height: u32,
}

impl PageGeometry {
    pub fn new(atlas_texture_id: PageId, width: u32, height: u32) -> Self {
        Self {
            atlas_texture_id,
            width,
            height,
        }
    }

    /// Placeholder pages (id 0 or zero size) are skipped everywhere
    pub fn is_active(&self) -> bool {
        self.atlas_texture_id != 0 && self.width > 0 && self.height > 0
    }
}

/// Normalized UV rectangle of a texture inside its page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub min: Vector2<f32>,
    pub max: Vector2<f32>,
}

impl UvRect {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            min: Vector2::new(x1, y1),
            max: Vector2::new(x2, y2),
        }
    }
}

/// Integer pixel rectangle inside a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Exclusive right edge, saturating at `u32::MAX`
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `u32::MAX`
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Whether the rect lies inside a `width x height` surface
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64 && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Where a texture sits in the atlas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturePlacement {
    pub page_id: PageId,
    pub uv: UvRect,
}

/// Read-only view of the host atlas for one build pass
pub trait AtlasSnapshot {
    /// All pages the host reports, placeholders included
    fn pages(&self) -> Vec<PageGeometry>;

    /// Page and UV rectangle of a texture, `None` if the host has no position for it
    fn placement(&self, key: &AssetKey) -> Option<TexturePlacement>;

    /// Every texture key the host has placed
    fn texture_keys(&self) -> Vec<AssetKey>;

    /// Pages with a valid id and size, in host order
    fn active_pages(&self) -> Vec<PageGeometry> {
        self.pages().into_iter().filter(PageGeometry::is_active).collect()
    }
}

/// Plain in-memory atlas layout, used by hosts that copy their state out and by tests
#[derive(Debug, Clone, Default)]
pub struct AtlasLayout {
    pub pages: Vec<PageGeometry>,
    pub placements: BTreeMap<AssetKey, TexturePlacement>,
}

impl AtlasLayout {
    pub fn new(pages: Vec<PageGeometry>) -> Self {
        Self {
            pages,
            placements: BTreeMap::new(),
        }
    }

    pub fn place(&mut self, key: AssetKey, page_id: PageId, uv: UvRect) {
        self.placements.insert(key, TexturePlacement { page_id, uv });
    }

    pub fn with_texture(mut self, key: AssetKey, page_id: PageId, uv: UvRect) -> Self {
        self.place(key, page_id, uv);
        self
    }
}

impl AtlasSnapshot for AtlasLayout {
    fn pages(&self) -> Vec<PageGeometry> {
        self.pages.clone()
    }

    fn placement(&self, key: &AssetKey) -> Option<TexturePlacement> {
        self.placements.get(key).copied()
    }

    fn texture_keys(&self) -> Vec<AssetKey> {
        self.placements.keys().cloned().collect()
    }
}

/// Resolved materials keyed by texture, ordered so builds are deterministic
pub type MaterialMap = BTreeMap<AssetKey, crate::materials::MaterialDefinition>;
