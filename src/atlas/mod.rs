//! Atlas Module
//!
//! CPU side of the material atlas: host geometry, per-page pixel buffers,
//! rule rasterization and authored overrides.

pub mod atlas_data;
pub mod atlas_operations;
pub mod override_applier;
pub mod override_pass;
pub mod pixel_buffer;
pub mod pixel_buffer_builder;

pub use atlas_data::{
    AtlasLayout, AtlasRect, AtlasSnapshot, MaterialMap, PageGeometry, PageId, TexturePlacement,
    UvRect,
};
pub use atlas_operations::uv_to_pixel_rect;
pub use override_applier::OverrideRect;
pub use override_pass::{NoOverrides, NormalDepthPages, OverridePassReport, OverrideSource};
pub use pixel_buffer::PixelBuffer;
pub use pixel_buffer_builder::{build_page_buffers, PageBufferBuild};
