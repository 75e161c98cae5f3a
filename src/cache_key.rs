//! Cache keys for material atlas builds
//!
//! A key is the schema version plus the first 8 bytes of a SHA-256 digest of a
//! stable text encoding of every input that affects the output. Keys are
//! truncated to 64 bits, so a match means "very likely identical inputs".

use crate::atlas::{PageGeometry, TexturePlacement};
use crate::materials::{AssetKey, MaterialRule, RulePayload};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub schema_version: u32,
    pub hash64: u64,
}

impl CacheKey {
    /// Hash `payload` and pair it with `schema_version`
    pub fn from_payload(schema_version: u32, payload: &str) -> Self {
        let digest = Sha256::digest(payload.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Self {
            schema_version,
            hash64: u64::from_be_bytes(head),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}:{:016x}", self.schema_version, self.hash64)
    }
}

/// Builds the stable string a [`CacheKey`] is derived from.
///
/// Floats are written by bit pattern so formatting changes cannot alter keys.
#[derive(Debug, Default)]
pub struct CachePayload {
    text: String,
}

impl CachePayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules in declaration order, since order decides priority ties
    pub fn rules<'a, I>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = &'a MaterialRule>,
    {
        self.text.push_str("rules[");
        for rule in rules {
            let _ = write!(
                self.text,
                "{}|{}|{}|{}|",
                rule.id.as_deref().unwrap_or(""),
                rule.source,
                rule.pattern,
                rule.priority
            );
            match &rule.payload {
                RulePayload::Material(def) => {
                    self.text.push('m');
                    for v in [
                        def.roughness,
                        def.metallic,
                        def.emissive,
                        def.noise.roughness,
                        def.noise.metallic,
                        def.noise.emissive,
                        def.noise.reflectivity,
                        def.noise.normals,
                    ] {
                        let _ = write!(self.text, ",{:08x}", v.to_bits());
                    }
                }
                RulePayload::Override(spec) => {
                    self.text.push('o');
                    let _ = write!(
                        self.text,
                        ",{},{}",
                        spec.material_params.as_ref().map(|k| k.to_string()).unwrap_or_default(),
                        spec.normal_height.as_ref().map(|k| k.to_string()).unwrap_or_default()
                    );
                    for v in spec.scale.as_array() {
                        let _ = write!(self.text, ",{:08x}", v.to_bits());
                    }
                }
            }
            self.text.push(';');
        }
        self.text.push(']');
        self
    }

    /// Texture set, sorted so host enumeration order does not matter
    pub fn textures<'a, I>(mut self, textures: I) -> Self
    where
        I: IntoIterator<Item = &'a AssetKey>,
    {
        let mut keys: Vec<String> = textures.into_iter().map(|k| k.to_string()).collect();
        keys.sort();
        self.text.push_str("textures[");
        for key in keys {
            self.text.push_str(&key);
            self.text.push(';');
        }
        self.text.push(']');
        self
    }

    /// Page and UV rectangle of every texture, sorted by key. Textures the host
    /// has no position for are written as `-`.
    pub fn placements<'a, I>(mut self, placements: I) -> Self
    where
        I: IntoIterator<Item = (&'a AssetKey, Option<TexturePlacement>)>,
    {
        let mut entries: Vec<(String, Option<TexturePlacement>)> =
            placements.into_iter().map(|(k, p)| (k.to_string(), p)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.text.push_str("placements[");
        for (key, placement) in entries {
            self.text.push_str(&key);
            match placement {
                Some(p) => {
                    let _ = write!(self.text, "@{}", p.page_id);
                    for v in [p.uv.min.x, p.uv.min.y, p.uv.max.x, p.uv.max.y] {
                        let _ = write!(self.text, ",{:08x}", v.to_bits());
                    }
                }
                None => self.text.push_str("@-"),
            }
            self.text.push(';');
        }
        self.text.push(']');
        self
    }

    /// Active page geometry, sorted by id
    pub fn pages(mut self, pages: &[PageGeometry]) -> Self {
        let mut active: Vec<PageGeometry> = pages.iter().copied().filter(PageGeometry::is_active).collect();
        active.sort_by_key(|p| p.atlas_texture_id);
        self.text.push_str("pages[");
        for page in active {
            let _ = write!(self.text, "{}:{}x{};", page.atlas_texture_id, page.width, page.height);
        }
        self.text.push(']');
        self
    }

    /// Extra flag that changes the output, such as the normal+depth feature
    pub fn flag(mut self, name: &str, value: bool) -> Self {
        let _ = write!(self.text, "{}={};", name, value);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn key(&self, schema_version: u32) -> CacheKey {
        CacheKey::from_payload(schema_version, &self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::UvRect;
    use crate::materials::MaterialDefinition;

    fn rule(pattern: &str, roughness: f32) -> MaterialRule {
        MaterialRule::material(
            AssetKey::parse("pbr:rules/test").expect("key"),
            pattern,
            MaterialDefinition::new(roughness, 0.0, 0.0),
        )
    }

    #[test]
    fn test_stable_across_calls() {
        let a = CacheKey::from_payload(1, "x");
        let b = CacheKey::from_payload(1, "x");
        assert_eq!(a, b);
        assert_eq!(a.hash64, b.hash64);
    }

    #[test]
    fn test_schema_version_changes_equality() {
        let v1 = CacheKey::from_payload(1, "x");
        let v2 = CacheKey::from_payload(2, "x");
        assert_eq!(v1.hash64, v2.hash64);
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_known_digest_prefix() {
        // sha256("abc") = ba7816bf8f01cfea...
        let key = CacheKey::from_payload(3, "abc");
        assert_eq!(key.hash64, 0xba7816bf8f01cfea);
        assert_eq!(key.to_string(), "v3:ba7816bf8f01cfea");
    }

    #[test]
    fn test_display_pads_to_16_digits() {
        let key = CacheKey {
            schema_version: 1,
            hash64: 0xab,
        };
        assert_eq!(key.to_string(), "v1:00000000000000ab");
    }

    #[test]
    fn test_payload_ignores_texture_and_page_order() {
        let a = AssetKey::parse("block/a").expect("key");
        let b = AssetKey::parse("block/b").expect("key");
        let p1 = PageGeometry::new(1, 16, 16);
        let p2 = PageGeometry::new(2, 32, 32);

        let first = CachePayload::new().textures([&a, &b]).pages(&[p1, p2]);
        let second = CachePayload::new().textures([&b, &a]).pages(&[p2, p1, PageGeometry::new(0, 8, 8)]);
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn test_payload_sensitive_to_rule_content_and_order() {
        let rules = [rule("block/*", 0.5), rule("block/iron", 0.2)];
        let base = CachePayload::new().rules(&rules).key(1);

        let changed = [rule("block/*", 0.5), rule("block/iron", 0.25)];
        assert_ne!(base, CachePayload::new().rules(&changed).key(1));

        let reordered = [rule("block/iron", 0.2), rule("block/*", 0.5)];
        assert_ne!(base, CachePayload::new().rules(&reordered).key(1));
    }

    #[test]
    fn test_payload_sensitive_to_placement() {
        let iron = AssetKey::parse("block/iron_block").expect("key");
        let gold = AssetKey::parse("block/gold_block").expect("key");
        let at = |page_id: u32, x1: f32, y1: f32, x2: f32, y2: f32| {
            Some(TexturePlacement {
                page_id,
                uv: UvRect::new(x1, y1, x2, y2),
            })
        };
        let placed = |iron_at: Option<TexturePlacement>, gold_at: Option<TexturePlacement>| {
            CachePayload::new()
                .textures([&iron, &gold])
                .placements([(&iron, iron_at), (&gold, gold_at)])
                .key(1)
        };

        let base = placed(at(1, 0.0, 0.0, 0.5, 0.5), at(1, 0.5, 0.0, 1.0, 0.5));
        assert_eq!(base, placed(at(1, 0.0, 0.0, 0.5, 0.5), at(1, 0.5, 0.0, 1.0, 0.5)));
        assert_ne!(base, placed(at(1, 0.5, 0.5, 1.0, 1.0), at(1, 0.5, 0.0, 1.0, 0.5)));
        assert_ne!(base, placed(at(2, 0.0, 0.0, 0.5, 0.5), at(1, 0.5, 0.0, 1.0, 0.5)));
        assert_ne!(base, placed(at(1, 0.0, 0.0, 0.5, 0.5), None));
        // swapped positions are a different layout even though the set is the same
        assert_ne!(base, placed(at(1, 0.5, 0.0, 1.0, 0.5), at(1, 0.0, 0.0, 0.5, 0.5)));

        let reordered = CachePayload::new()
            .textures([&gold, &iron])
            .placements([(&gold, at(1, 0.5, 0.0, 1.0, 0.5)), (&iron, at(1, 0.0, 0.0, 0.5, 0.5))])
            .key(1);
        assert_eq!(base, reordered);
    }

    #[test]
    fn test_payload_sensitive_to_page_size_and_flags() {
        let small = CachePayload::new().pages(&[PageGeometry::new(1, 16, 16)]).key(1);
        let large = CachePayload::new().pages(&[PageGeometry::new(1, 32, 16)]).key(1);
        assert_ne!(small, large);

        let off = CachePayload::new().flag("normal_depth", false).key(1);
        let on = CachePayload::new().flag("normal_depth", true).key(1);
        assert_ne!(off, on);
    }
}
