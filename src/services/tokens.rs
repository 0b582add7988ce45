//! Named regex fragments for the structural markers of Arabic manuscripts.
//!
//! Simple tokens carry a raw regex source. Composite tokens carry a template
//! over other tokens (`{{raqms}} {{dash}} `) and are expanded by the
//! [`TemplateCompiler`](super::compiler::TemplateCompiler).

use crate::error::{Result, SegmenterError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPattern {
    pub name: String,
    pub regex: String,
    #[serde(default)]
    pub composite: bool,
}

impl TokenPattern {
    pub fn simple(name: &str, regex: &str) -> Self {
        Self {
            name: name.to_string(),
            regex: regex.to_string(),
            composite: false,
        }
    }

    pub fn composite(name: &str, template: &str) -> Self {
        Self {
            name: name.to_string(),
            regex: template.to_string(),
            composite: true,
        }
    }
}

static BUILTIN_TOKENS: Lazy<TokenTable> = Lazy::new(|| {
    let patterns = builtin_patterns();
    let index = index_of(&patterns);
    TokenTable { patterns, index }
});

fn builtin_patterns() -> Vec<TokenPattern> {
    vec![
        // Composites first so detection prefers them over their parts
        TokenPattern::composite("numbered", "{{raqms}} {{dash}} "),
        TokenPattern::simple("bab", "باب"),
        TokenPattern::simple("kitab", "كتاب"),
        TokenPattern::simple("fasl", "مسألة|فصل"),
        TokenPattern::simple("basmalah", "بسم الله|﷽"),
        TokenPattern::simple(
            "naql",
            "حدثني|وأخبرنا|حدثنا|سمعت|أخبرنا|وحدثني|وحدثنا",
        ),
        TokenPattern::simple("raqms", r"[\x{0660}-\x{0669}]+"),
        TokenPattern::simple("raqm", r"[\x{0660}-\x{0669}]"),
        TokenPattern::simple("digits", "[0-9]+"),
        TokenPattern::simple("dash", "[-\u{2013}\u{2014}\u{0640}]"),
        TokenPattern::simple("bullet", "[\u{2022}*\u{00B0}]"),
        TokenPattern::simple("harf", "[\u{0623}-\u{064A}]"),
        TokenPattern::simple("tarqim", "[.!?\u{061F}\u{061B}]"),
    ]
}

fn index_of(patterns: &[TokenPattern]) -> HashMap<String, usize> {
    patterns
        .iter()
        .enumerate()
        .map(|(idx, p)| (p.name.clone(), idx))
        .collect()
}

/// Immutable lookup table of token patterns.
#[derive(Debug, Clone)]
pub struct TokenTable {
    patterns: Vec<TokenPattern>,
    index: HashMap<String, usize>,
}

impl TokenTable {
    /// The process-wide table of built-in manuscript tokens.
    pub fn builtin() -> &'static TokenTable {
        &BUILTIN_TOKENS
    }

    pub fn new(patterns: Vec<TokenPattern>) -> Result<Self> {
        let index = index_of(&patterns);
        if index.len() != patterns.len() {
            return Err(SegmenterError::InvalidInput {
                reason: "token names must be unique".to_string(),
            });
        }
        if let Some(bad) = patterns.iter().find(|p| !is_token_name(&p.name)) {
            return Err(SegmenterError::InvalidInput {
                reason: format!("invalid token name '{}'", bad.name),
            });
        }
        Ok(Self { patterns, index })
    }

    /// Builtin tokens plus `extra`, which may not shadow existing names.
    pub fn extended(extra: Vec<TokenPattern>) -> Result<Self> {
        let mut patterns = builtin_patterns();
        patterns.extend(extra);
        Self::new(patterns)
    }

    pub fn get(&self, name: &str) -> Option<&TokenPattern> {
        self.index.get(name).map(|&idx| &self.patterns[idx])
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(|p| p.regex.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenPattern> {
        self.patterns.iter()
    }

    /// Composite tokens first, then simple ones, each in declaration order.
    pub fn detection_order(&self) -> Vec<&TokenPattern> {
        let (mut composite, simple): (Vec<_>, Vec<_>) =
            self.patterns.iter().partition(|p| p.composite);
        composite.extend(simple);
        composite
    }
}

impl Default for TokenTable {
    fn default() -> Self {
        TokenTable::builtin().clone()
    }
}

pub(crate) fn is_token_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses a number written in ASCII, Arabic-Indic or Eastern Arabic-Indic digits.
pub fn parse_numeral(text: &str) -> Option<u64> {
    let mut value: u64 = 0;
    let mut seen = false;
    for c in text.trim().chars() {
        let digit = match c {
            '0'..='9' => c as u32 - '0' as u32,
            '\u{0660}'..='\u{0669}' => c as u32 - 0x0660,
            '\u{06F0}'..='\u{06F9}' => c as u32 - 0x06F0,
            _ => return None,
        };
        value = value.checked_mul(10)?.checked_add(digit as u64)?;
        seen = true;
    }
    seen.then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_builtin_simple_tokens_compile() {
        for token in TokenTable::builtin().iter().filter(|t| !t.composite) {
            assert!(
                Regex::new(&token.regex).is_ok(),
                "token {} does not compile",
                token.name
            );
        }
    }

    #[test]
    fn test_lookup() {
        let table = TokenTable::builtin();
        assert_eq!(table.lookup("bab"), Some("باب"));
        assert!(table.lookup("nope").is_none());
        assert!(table.get("numbered").unwrap().composite);
    }

    #[test]
    fn test_detection_order_puts_composites_first() {
        let order = TokenTable::builtin().detection_order();
        let first_simple = order.iter().position(|t| !t.composite).unwrap();
        assert!(order[..first_simple].iter().all(|t| t.composite));
        assert!(order[first_simple..].iter().all(|t| !t.composite));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = TokenTable::extended(vec![TokenPattern::simple("bab", "x")]);
        assert!(matches!(result, Err(SegmenterError::InvalidInput { .. })));
    }

    #[test]
    fn test_digit_tokens_match_arabic_indic() {
        let raqms = Regex::new(TokenTable::builtin().lookup("raqms").unwrap()).unwrap();
        assert!(raqms.is_match("١٢٣"));
        assert!(!raqms.is_match("abc"));
    }

    #[test]
    fn test_parse_numeral() {
        assert_eq!(parse_numeral("١٢"), Some(12));
        assert_eq!(parse_numeral("۳"), Some(3));
        assert_eq!(parse_numeral("42"), Some(42));
        assert_eq!(parse_numeral("4a"), None);
        assert_eq!(parse_numeral(""), None);
    }
}
