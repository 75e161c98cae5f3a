//! Asset keys
//!
//! The host atlas addresses textures by `domain:path` with the `textures/`
//! folder and the file extension removed. Rule files and override images refer
//! to the same textures by file path, so everything is normalized through
//! [`AssetKey::normalize`] before it is compared.

use crate::constants::material::DEFAULT_DOMAIN;
use crate::error::{AtlasResult, MaterialAtlasError};
use serde::Deserialize;
use std::fmt;

const TEXTURES_PREFIX: &str = "textures/";

/// Canonical identifier of a texture inside the atlas
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct AssetKey {
    domain: String,
    path: String,
}

impl AssetKey {
    /// Normalize a raw texture reference into its atlas key.
    ///
    /// Strips a leading `textures/` (case-insensitive) and then truncates a file
    /// extension on the last path segment. Nothing else is changed.
    pub fn normalize(domain: &str, path: &str) -> AtlasResult<Self> {
        if path.is_empty() {
            return Err(MaterialAtlasError::invalid_argument(
                "path",
                "texture reference is empty",
            ));
        }

        let stripped = match path.get(..TEXTURES_PREFIX.len()) {
            Some(head) if head.eq_ignore_ascii_case(TEXTURES_PREFIX) => {
                &path[TEXTURES_PREFIX.len()..]
            }
            _ => path,
        };

        let segment_start = stripped.rfind('/').map_or(0, |i| i + 1);
        let normalized = match stripped[segment_start..].rfind('.') {
            Some(dot) => &stripped[..segment_start + dot],
            None => stripped,
        };

        Ok(Self {
            domain: domain.to_string(),
            path: normalized.to_string(),
        })
    }

    /// Parse a `domain:path` reference, defaulting the domain when omitted
    pub fn parse(reference: &str) -> AtlasResult<Self> {
        match reference.split_once(':') {
            Some((domain, path)) if !domain.is_empty() => Self::normalize(domain, path),
            Some((_, path)) => Self::normalize(DEFAULT_DOMAIN, path),
            None => Self::normalize(DEFAULT_DOMAIN, reference),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.path)
    }
}

impl TryFrom<String> for AssetKey {
    type Error = MaterialAtlasError;

    fn try_from(value: String) -> AtlasResult<Self> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(domain: &str, path: &str) -> AssetKey {
        AssetKey::normalize(domain, path).expect("valid reference")
    }

    #[test]
    fn test_strips_textures_prefix_and_extension() {
        let k = key("minecraft", "textures/block/stone.png");
        assert_eq!(k.domain(), "minecraft");
        assert_eq!(k.path(), "block/stone");
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        assert_eq!(key("mod", "Textures/Block/Stone.PNG").path(), "Block/Stone");
        assert_eq!(key("mod", "TEXTURES/item/gem").path(), "item/gem");
    }

    #[test]
    fn test_prefix_only_stripped_at_start() {
        assert_eq!(
            key("mod", "block/textures/stone.png").path(),
            "block/textures/stone"
        );
    }

    #[test]
    fn test_dot_in_directory_is_not_an_extension() {
        assert_eq!(key("mod", "block.v2/stone").path(), "block.v2/stone");
        assert_eq!(key("mod", "block.v2/stone.png").path(), "block.v2/stone");
    }

    #[test]
    fn test_only_last_extension_removed() {
        assert_eq!(key("mod", "block/stone.n.png").path(), "block/stone.n");
    }

    #[test]
    fn test_already_normalized_is_unchanged() {
        let k = key("minecraft", "block/stone");
        assert_eq!(AssetKey::normalize(k.domain(), k.path()).ok(), Some(k));
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(matches!(
            AssetKey::normalize("minecraft", ""),
            Err(MaterialAtlasError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_parse_resource_location() {
        let k = AssetKey::parse("create:textures/block/brass.png").expect("parse");
        assert_eq!(k.to_string(), "create:block/brass");

        let bare = AssetKey::parse("block/dirt").expect("parse");
        assert_eq!(bare.domain(), "minecraft");

        let empty_domain = AssetKey::parse(":block/dirt").expect("parse");
        assert_eq!(empty_domain.domain(), "minecraft");
    }
}
