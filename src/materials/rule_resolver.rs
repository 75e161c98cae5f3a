//! Material Rule Resolver
//!
//! Compiles an ordered rule list once and answers, for any normalized texture
//! key, which material definition and which override apply. Materials and
//! overrides are resolved independently: the highest priority matching rule of
//! each kind wins, and ties go to the rule declared first.

use super::asset_key::AssetKey;
use super::glob_matcher::GlobMatcher;
use super::material_data::{MaterialDefinition, MaterialRule, OverrideDescriptor, RulePayload};
use crate::constants::glob::MAX_PATTERN_LENGTH;
use crate::error::AtlasResult;

/// Rule with its pattern compiled
#[derive(Debug, Clone)]
struct CompiledRule {
    rule: MaterialRule,
    matcher: GlobMatcher,
    qualified: bool,
}

impl CompiledRule {
    fn matches(&self, key: &AssetKey) -> bool {
        if self.qualified {
            self.matcher.is_match(&key.to_string())
        } else {
            self.matcher.is_match(key.path())
        }
    }
}

/// Outcome of resolving one texture against the rule set
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMaterial {
    pub definition: MaterialDefinition,
    /// Index of the winning material rule, `None` when defaults were used
    pub matched_rule: Option<usize>,
    pub override_descriptor: Option<OverrideDescriptor>,
}

/// An ordered, pre-compiled set of material rules
#[derive(Debug, Clone, Default)]
pub struct MaterialRuleSet {
    rules: Vec<CompiledRule>,
}

impl MaterialRuleSet {
    /// Compile all rules with the default pattern length limit
    pub fn compile(rules: Vec<MaterialRule>) -> AtlasResult<Self> {
        Self::compile_with_limit(rules, MAX_PATTERN_LENGTH)
    }

    /// Compile all rules. The first invalid pattern fails the whole set.
    pub fn compile_with_limit(rules: Vec<MaterialRule>, max_pattern_length: usize) -> AtlasResult<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let matcher = GlobMatcher::with_max_length(&rule.pattern, max_pattern_length)?;
            let qualified = rule.pattern.contains(':');
            compiled.push(CompiledRule {
                rule,
                matcher,
                qualified,
            });
        }

        log::debug!("[MaterialRuleSet::compile] Compiled {} rules", compiled.len());
        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in declaration order
    pub fn rules(&self) -> impl Iterator<Item = &MaterialRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    /// Effective material for `key`, or the defaults when nothing matches
    pub fn resolve_material(&self, key: &AssetKey) -> MaterialDefinition {
        self.best_material(key).map(|(_, def)| def).unwrap_or_default()
    }

    /// Effective override for `key`, `None` when no override rule matches
    pub fn resolve_override(&self, key: &AssetKey) -> Option<OverrideDescriptor> {
        let (_, compiled) =
            self.best_match(key, |rule| matches!(rule.payload, RulePayload::Override(_)))?;
        let RulePayload::Override(spec) = &compiled.rule.payload else {
            return None;
        };

        Some(OverrideDescriptor {
            rule_id: compiled.rule.id.clone(),
            rule_source: compiled.rule.source.clone(),
            material_params: spec.material_params.clone(),
            normal_height: spec.normal_height.clone(),
            scale: spec.scale,
        })
    }

    /// Resolve both the material and the override for `key`
    pub fn resolve(&self, key: &AssetKey) -> ResolvedMaterial {
        let (matched_rule, definition) = match self.best_material(key) {
            Some((index, def)) => (Some(index), def),
            None => (None, MaterialDefinition::default()),
        };

        ResolvedMaterial {
            definition,
            matched_rule,
            override_descriptor: self.resolve_override(key),
        }
    }

    /// Winning material rule; the resolved definition reports the rule's priority
    fn best_material(&self, key: &AssetKey) -> Option<(usize, MaterialDefinition)> {
        let (index, compiled) =
            self.best_match(key, |rule| matches!(rule.payload, RulePayload::Material(_)))?;
        match &compiled.rule.payload {
            RulePayload::Material(def) => Some((
                index,
                MaterialDefinition {
                    priority: compiled.rule.priority,
                    ..def.clone()
                },
            )),
            RulePayload::Override(_) => None,
        }
    }

    fn best_match<F>(&self, key: &AssetKey, filter: F) -> Option<(usize, &CompiledRule)>
    where
        F: Fn(&MaterialRule) -> bool,
    {
        let mut best: Option<(usize, &CompiledRule)> = None;
        for (index, compiled) in self.rules.iter().enumerate() {
            if !filter(&compiled.rule) || !compiled.matches(key) {
                continue;
            }
            // strictly greater keeps the earliest declaration on ties
            if best.map_or(true, |(_, b)| compiled.rule.priority > b.rule.priority) {
                best = Some((index, compiled));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MaterialAtlasError;
    use crate::materials::material_data::{MaterialScale, OverrideSpec};

    fn source() -> AssetKey {
        AssetKey::parse("pbr:rules/test").expect("key")
    }

    fn key(reference: &str) -> AssetKey {
        AssetKey::parse(reference).expect("key")
    }

    fn material(pattern: &str, roughness: f32, priority: i32) -> MaterialRule {
        MaterialRule::material(
            source(),
            pattern,
            MaterialDefinition::new(roughness, 0.0, 0.0).with_priority(priority),
        )
    }

    #[test]
    fn test_no_match_falls_back_to_defaults() {
        let rules = MaterialRuleSet::compile(vec![material("item/*", 0.1, 1)]).expect("compile");
        let resolved = rules.resolve(&key("minecraft:block/stone"));
        assert_eq!(resolved.definition, MaterialDefinition::default());
        assert_eq!(resolved.matched_rule, None);
        assert!(resolved.override_descriptor.is_none());
    }

    #[test]
    fn test_highest_priority_wins() {
        let rules = MaterialRuleSet::compile(vec![
            material("block/*", 0.5, 5),
            material("block/iron_*", 0.1, 10),
        ])
        .expect("compile");
        let def = rules.resolve_material(&key("block/iron_block"));
        assert_eq!(def.roughness, 0.1);
        assert_eq!(def.priority, 10);

        // declaration order must not matter for differing priorities
        let reversed = MaterialRuleSet::compile(vec![
            material("block/iron_*", 0.1, 10),
            material("block/*", 0.5, 5),
        ])
        .expect("compile");
        assert_eq!(reversed.resolve_material(&key("block/iron_block")).roughness, 0.1);
    }

    #[test]
    fn test_equal_priority_first_declared_wins() {
        let rules = MaterialRuleSet::compile(vec![
            material("block/**", 0.3, 2),
            material("block/iron_*", 0.7, 2),
        ])
        .expect("compile");
        let resolved = rules.resolve(&key("block/iron_block"));
        assert_eq!(resolved.definition.roughness, 0.3);
        assert_eq!(resolved.matched_rule, Some(0));
    }

    #[test]
    fn test_resolution_is_pure() {
        let rules = MaterialRuleSet::compile(vec![
            material("block/**", 0.3, 2),
            MaterialRule::override_rule(
                source(),
                "block/gold_*",
                1,
                OverrideSpec {
                    material_params: Some(key("pbr:overrides/gold")),
                    normal_height: None,
                    scale: MaterialScale::new(0.5, 1.0, 1.0),
                },
            ),
        ])
        .expect("compile");
        let k = key("block/gold_block");
        assert_eq!(rules.resolve(&k), rules.resolve(&k));
    }

    #[test]
    fn test_override_resolved_independently() {
        let rules = MaterialRuleSet::compile(vec![
            material("block/*", 0.4, 100),
            MaterialRule::override_rule(
                source(),
                "block/gold_*",
                0,
                OverrideSpec {
                    material_params: Some(key("pbr:overrides/gold_lo")),
                    ..OverrideSpec::default()
                },
            )
            .with_id("gold-low"),
            MaterialRule::override_rule(
                source(),
                "block/gold_block",
                3,
                OverrideSpec {
                    normal_height: Some(key("pbr:overrides/gold_nh")),
                    ..OverrideSpec::default()
                },
            )
            .with_id("gold-high"),
        ])
        .expect("compile");

        let resolved = rules.resolve(&key("block/gold_block"));
        assert_eq!(resolved.definition.roughness, 0.4);
        let descriptor = resolved.override_descriptor.expect("override should match");
        assert_eq!(descriptor.rule_id.as_deref(), Some("gold-high"));
        assert_eq!(descriptor.rule_source, source());
        assert!(descriptor.material_params.is_none());
        assert!(descriptor.scale.is_identity());

        let other = rules.resolve_override(&key("block/gold_ore")).expect("override");
        assert_eq!(other.rule_id.as_deref(), Some("gold-low"));
    }

    #[test]
    fn test_domain_qualified_pattern() {
        let rules = MaterialRuleSet::compile(vec![material("create:block/*", 0.2, 1)]).expect("compile");
        assert_eq!(rules.resolve_material(&key("create:block/brass")).roughness, 0.2);
        assert_eq!(
            rules.resolve_material(&key("minecraft:block/brass")).roughness,
            0.85
        );
    }

    #[test]
    fn test_resolved_definition_reports_rule_priority() {
        let rule: MaterialRule = toml::from_str(
            r#"
            source = "pbr:rules/metals"
            pattern = "block/iron_*"
            priority = 10

            [payload.material]
            roughness = 0.3
            "#,
        )
        .expect("rule should parse");
        let rules = MaterialRuleSet::compile(vec![material("block/*", 0.5, 4), rule]).expect("compile");

        let resolved = rules.resolve(&key("block/iron_block"));
        assert_eq!(resolved.matched_rule, Some(1));
        assert_eq!(resolved.definition.roughness, 0.3);
        assert_eq!(resolved.definition.priority, 10);
        assert_eq!(rules.resolve_material(&key("block/iron_block")).priority, 10);
        assert_eq!(rules.resolve_material(&key("block/stone")).priority, 4);
    }

    #[test]
    fn test_bad_rule_fails_compile() {
        let result = MaterialRuleSet::compile(vec![material("block/*", 0.2, 1), material("   ", 0.2, 1)]);
        assert!(matches!(result, Err(MaterialAtlasError::InvalidPattern { .. })));
    }
}
