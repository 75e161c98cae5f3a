//! GPU Module
//!
//! Page textures for the material atlas. The store talks to the GPU only
//! through [`GpuTextureProvider`], so it can be driven by wgpu in the engine
//! and by a recording fake in tests.

pub mod texture_store;
pub mod wgpu_provider;

pub use texture_store::{AtlasTextureStore, PageTextures, SyncReport};
pub use wgpu_provider::{WgpuPageTexture, WgpuTextureProvider};

use crate::atlas::AtlasRect;
use crate::error::AtlasResult;

/// Which of a page's textures a resource or upload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PageTextureKind {
    /// RGB16F semantics (roughness, metallic, emissive), stored as RGBA16F
    MaterialParams,
    /// RGBA16F normal + depth
    NormalDepth,
}

impl PageTextureKind {
    pub fn label(&self) -> &'static str {
        match self {
            PageTextureKind::MaterialParams => "Material Params Page",
            PageTextureKind::NormalDepth => "Normal Depth Page",
        }
    }
}

/// Everything a provider needs to create a page texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTextureDescriptor {
    pub page_id: crate::atlas::PageId,
    pub kind: PageTextureKind,
    pub width: u32,
    pub height: u32,
}

/// GPU resource operations the texture store relies on.
///
/// All texel data is RGBA16F, 8 bytes per texel, rows tightly packed.
pub trait GpuTextureProvider {
    type Texture;

    /// Create a nearest-filtered 2D texture, optionally with initial contents
    fn create_texture(
        &mut self,
        descriptor: &PageTextureDescriptor,
        initial_data: Option<&[u8]>,
    ) -> AtlasResult<Self::Texture>;

    /// Upload `data` into `rect` of an existing texture
    fn upload_region(&mut self, texture: &Self::Texture, rect: &AtlasRect, data: &[u8]) -> AtlasResult<()>;

    /// Release a texture
    fn dispose_texture(&mut self, texture: Self::Texture);
}
