//! Glob Matcher
//!
//! Compiles globstar patterns into anchored matchers over `/`-delimited paths.
//!
//! - `*` matches zero or more non-`/` characters inside one segment
//! - `?` matches exactly one non-`/` character
//! - `**` matches anything, including `/`
//! - `**/` matches zero or more complete leading segments, so `a/**/b`
//!   matches both `a/b` and `a/x/y/b`
//!
//! Patterns come from author-supplied configuration. They are translated for
//! the `regex` crate, which matches in linear time without backtracking, so a
//! single hostile pattern cannot stall a resolution pass.

use crate::constants::glob::{MAX_PATTERN_LENGTH, REGEX_SIZE_LIMIT};
use crate::error::{AtlasResult, MaterialAtlasError};
use regex::{Regex, RegexBuilder};

/// A compiled, reusable glob pattern
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: String,
    regex: Regex,
}

impl GlobMatcher {
    /// Compile a pattern with the default length limit
    pub fn new(pattern: &str) -> AtlasResult<Self> {
        Self::with_max_length(pattern, MAX_PATTERN_LENGTH)
    }

    /// Compile a pattern, rejecting patterns longer than `max_length`
    pub fn with_max_length(pattern: &str, max_length: usize) -> AtlasResult<Self> {
        if pattern.trim().is_empty() {
            return Err(MaterialAtlasError::invalid_pattern(
                pattern,
                "pattern is empty or whitespace",
            ));
        }

        if pattern.len() > max_length {
            return Err(MaterialAtlasError::invalid_pattern(
                pattern,
                format!("pattern length {} exceeds limit {}", pattern.len(), max_length),
            ));
        }

        let source = glob_to_regex(pattern);
        let regex = RegexBuilder::new(&source)
            .size_limit(REGEX_SIZE_LIMIT)
            .dfa_size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| MaterialAtlasError::invalid_pattern(pattern, e.to_string()))?;

        log::debug!("[GlobMatcher::new] '{}' compiled to '{}'", pattern, source);

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// True if the whole of `path` matches the pattern
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// The pattern as authored
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Translate a glob into an anchored regular expression
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(pattern: &str) -> GlobMatcher {
        GlobMatcher::new(pattern).expect("pattern should compile")
    }

    #[test]
    fn test_globstar_slash_matches_zero_or_more_segments() {
        let m = glob("block/**/metal/*.png");
        assert!(m.is_match("block/metal/iron.png"));
        assert!(m.is_match("block/ore/deep/metal/iron.png"));
        assert!(!m.is_match("block/metal/sub/iron.png"));

        let trailing = glob("block/**/metal/**");
        assert!(trailing.is_match("block/metal/sub/iron.png"));
    }

    #[test]
    fn test_globstar_between_segments() {
        let m = glob("a/**/b");
        assert!(m.is_match("a/b"));
        assert!(m.is_match("a/x/y/b"));
        assert!(!m.is_match("a/xb"));
    }

    #[test]
    fn test_question_mark_is_single_non_slash() {
        let m = glob("a?c");
        assert!(m.is_match("abc"));
        assert!(!m.is_match("ac"));
        assert!(!m.is_match("a/c"));
    }

    #[test]
    fn test_star_stays_within_segment() {
        let m = glob("block/*");
        assert!(m.is_match("block/stone"));
        assert!(m.is_match("block/"));
        assert!(!m.is_match("block/ore/iron"));
    }

    #[test]
    fn test_anchored_to_full_string() {
        let m = glob("stone");
        assert!(m.is_match("stone"));
        assert!(!m.is_match("block/stone"));
        assert!(!m.is_match("stone_bricks"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let m = glob("block/iron.ore+(1)");
        assert!(m.is_match("block/iron.ore+(1)"));
        assert!(!m.is_match("block/ironXore+(1)"));
        assert!(!m.is_match("block/iron.oreee(1)"));

        let braces = glob("a{1,2}|b^$");
        assert!(braces.is_match("a{1,2}|b^$"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(matches!(
            GlobMatcher::new(""),
            Err(MaterialAtlasError::InvalidPattern { .. })
        ));
        assert!(matches!(
            GlobMatcher::new(" \t\n"),
            Err(MaterialAtlasError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_overlong_pattern_rejected() {
        let long = "a".repeat(40);
        assert!(GlobMatcher::with_max_length(&long, 40).is_ok());
        assert!(matches!(
            GlobMatcher::with_max_length(&long, 39),
            Err(MaterialAtlasError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_pathological_pattern_finishes() {
        let m = glob("**a**a**a**a**a**a**a**a**b");
        let input = "a".repeat(4096);
        assert!(!m.is_match(&input));
    }

    #[test]
    fn test_translation() {
        assert_eq!(glob_to_regex("a/**/b"), "^a/(?:.*/)?b$");
        assert_eq!(glob_to_regex("**"), "^.*$");
        assert_eq!(glob_to_regex("*.png"), "^[^/]*\\.png$");
    }
}
