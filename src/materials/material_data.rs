//! Material Data
//!
//! Authored material records. These carry no page or rect information; the
//! atlas build resolves them per texture and places them afterwards.

use super::asset_key::AssetKey;
use crate::constants::material::{DEFAULT_EMISSIVE, DEFAULT_METALLIC, DEFAULT_ROUGHNESS};
use serde::Deserialize;

/// Procedural noise amplitudes applied on top of the flat material values
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct MaterialNoise {
    pub roughness: f32,
    pub metallic: f32,
    pub emissive: f32,
    pub reflectivity: f32,
    pub normals: f32,
}

/// Resolved material values for a texture.
///
/// Values are conceptually in `[0, 1]` but are not clamped until they are
/// written into a pixel buffer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MaterialDefinition {
    pub roughness: f32,
    pub metallic: f32,
    pub emissive: f32,
    pub noise: MaterialNoise,
    /// Seeds the rule priority in [`MaterialRule::material`]; once resolved it
    /// always reports the priority of the rule that matched
    pub priority: i32,
    pub notes: Option<String>,
}

impl Default for MaterialDefinition {
    fn default() -> Self {
        Self {
            roughness: DEFAULT_ROUGHNESS,
            metallic: DEFAULT_METALLIC,
            emissive: DEFAULT_EMISSIVE,
            noise: MaterialNoise::default(),
            priority: 0,
            notes: None,
        }
    }
}

impl MaterialDefinition {
    pub fn new(roughness: f32, metallic: f32, emissive: f32) -> Self {
        Self {
            roughness,
            metallic,
            emissive,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// (roughness, metallic, emissive), each clamped to `[0, 1]`
    pub fn clamped_params(&self) -> [f32; 3] {
        [
            self.roughness.clamp(0.0, 1.0),
            self.metallic.clamp(0.0, 1.0),
            self.emissive.clamp(0.0, 1.0),
        ]
    }
}

/// Per-channel multipliers applied to override data
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MaterialScale {
    pub roughness: f32,
    pub metallic: f32,
    pub emissive: f32,
}

impl Default for MaterialScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl MaterialScale {
    pub const IDENTITY: Self = Self {
        roughness: 1.0,
        metallic: 1.0,
        emissive: 1.0,
    };

    pub fn new(roughness: f32, metallic: f32, emissive: f32) -> Self {
        Self {
            roughness,
            metallic,
            emissive,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.roughness == 1.0 && self.metallic == 1.0 && self.emissive == 1.0
    }

    pub fn as_array(&self) -> [f32; 3] {
        [self.roughness, self.metallic, self.emissive]
    }
}

/// Override payload as authored in a rule
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct OverrideSpec {
    pub material_params: Option<AssetKey>,
    pub normal_height: Option<AssetKey>,
    /// Missing scale means identity
    pub scale: MaterialScale,
}

/// Effective override for one texture after rule resolution
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideDescriptor {
    pub rule_id: Option<String>,
    pub rule_source: AssetKey,
    pub material_params: Option<AssetKey>,
    pub normal_height: Option<AssetKey>,
    pub scale: MaterialScale,
}

impl OverrideDescriptor {
    /// Empty iff neither override texture is referenced
    pub fn is_empty(&self) -> bool {
        self.material_params.is_none() && self.normal_height.is_none()
    }
}

/// What a rule contributes when it matches
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePayload {
    Material(MaterialDefinition),
    Override(OverrideSpec),
}

/// A glob pattern over normalized texture keys with its payload.
///
/// A pattern containing `:` is matched against `domain:path`; any other
/// pattern is matched against the path alone.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MaterialRule {
    #[serde(default)]
    pub id: Option<String>,
    pub source: AssetKey,
    pub pattern: String,
    #[serde(default)]
    pub priority: i32,
    pub payload: RulePayload,
}

impl MaterialRule {
    /// Material rule whose priority is taken from the definition
    pub fn material(source: AssetKey, pattern: &str, definition: MaterialDefinition) -> Self {
        Self {
            id: None,
            source,
            pattern: pattern.to_string(),
            priority: definition.priority,
            payload: RulePayload::Material(definition),
        }
    }

    pub fn override_rule(source: AssetKey, pattern: &str, priority: i32, spec: OverrideSpec) -> Self {
        Self {
            id: None,
            source,
            pattern: pattern.to_string(),
            priority,
            payload: RulePayload::Override(spec),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}
