//! Shared constants for the material atlas pipeline

/// Fallback material values used when no rule matches a texture
pub mod material {
    pub const DEFAULT_ROUGHNESS: f32 = 0.85;
    pub const DEFAULT_METALLIC: f32 = 0.0;
    pub const DEFAULT_EMISSIVE: f32 = 0.0;

    /// (roughness, metallic, emissive) written to every pixel not covered by a rule
    pub const DEFAULT_PARAMS: [f32; 3] = [DEFAULT_ROUGHNESS, DEFAULT_METALLIC, DEFAULT_EMISSIVE];

    /// Resource domain assumed when a texture reference omits one
    pub const DEFAULT_DOMAIN: &str = "minecraft";
}

/// Channel layout of CPU and GPU buffers
pub mod channels {
    /// Floats per pixel in a material params buffer (R=roughness, G=metallic, B=emissive)
    pub const MATERIAL_PARAMS: usize = 3;

    /// Channels per pixel in override payloads and GPU page textures
    pub const RGBA: usize = 4;

    /// Bytes per texel of an RGBA16F texture
    pub const RGBA16F_BYTES: usize = 8;
}

/// Cache key derivation
pub mod cache {
    /// Bump whenever the payload encoding or the baked output changes shape
    pub const SCHEMA_VERSION: u32 = 1;
}

/// Glob compilation limits
pub mod glob {
    /// Patterns longer than this are rejected at compile time
    pub const MAX_PATTERN_LENGTH: usize = 512;

    /// Upper bound on the compiled program size of a single pattern
    pub const REGEX_SIZE_LIMIT: usize = 1 << 20;
}

/// Normal+depth page layout
pub mod normal_depth {
    /// Tangent-space normal pointing straight out (encoded 0..1) with zero depth
    pub const FLAT_TEXEL: [f32; 4] = [0.5, 0.5, 1.0, 0.0];
}
