//! Materials Module
//!
//! Texture keys, authored material rules and their resolution.

pub mod asset_key;
pub mod glob_matcher;
pub mod material_data;
pub mod rule_resolver;

pub use asset_key::AssetKey;
pub use glob_matcher::GlobMatcher;
pub use material_data::{
    MaterialDefinition, MaterialNoise, MaterialRule, MaterialScale, OverrideDescriptor,
    OverrideSpec, RulePayload,
};
pub use rule_resolver::{MaterialRuleSet, ResolvedMaterial};
