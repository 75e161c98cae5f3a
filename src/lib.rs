// Hearth Material Atlas - PBR material params for the block atlas
//
// Builds per-page material textures (roughness, metallic, emissive) that line
// up texel-for-texel with the host's color atlas.
// - materials: glob rules resolved per texture key
// - atlas: CPU page buffers and override patches
// - gpu: page textures mirrored onto the device
// - jobs: cancellable tile (re)builds off the owning thread
//
// A build pass is driven by material_atlas::MaterialAtlasBuilder.

// Constants module
pub mod constants;

pub mod config;
pub mod error;

// Pipeline stages
pub mod atlas;
pub mod cache_key;
pub mod gpu;
pub mod jobs;
pub mod material_atlas;
pub mod materials;

pub use atlas::{
    build_page_buffers, uv_to_pixel_rect, AtlasLayout, AtlasRect, AtlasSnapshot, MaterialMap, NoOverrides,
    OverrideSource, PageBufferBuild, PageGeometry, PageId, PixelBuffer, UvRect,
};
pub use cache_key::{CacheKey, CachePayload};
pub use config::MaterialAtlasConfig;
pub use error::{AtlasResult, MaterialAtlasError};
pub use gpu::{
    AtlasTextureStore, GpuTextureProvider, PageTextureDescriptor, PageTextureKind, SyncReport, WgpuTextureProvider,
};
pub use jobs::{CancelToken, GenerationGate, TileJob, TileScheduler, TileUpload};
pub use material_atlas::{AtlasBuild, MaterialAtlasBuilder, ResolvedTextures};
pub use materials::{
    AssetKey, GlobMatcher, MaterialDefinition, MaterialRule, MaterialRuleSet, MaterialScale, OverrideDescriptor,
    OverrideSpec,
};

// Re-export wgpu so hosts can build a WgpuTextureProvider against the same version
pub use wgpu;
