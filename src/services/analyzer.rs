//! Best-effort rule discovery: turns sample lines back into templates.

use crate::services::compiler::TemplateCompiler;
use crate::services::tokens::TokenTable;
use crate::types::{DetectedToken, LineStartPattern, Page, PatternType, RuleSuggestion};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

const MAX_TOKENS: usize = 6;
const MAX_EXAMPLES: usize = 3;
const EXAMPLE_CHARS: usize = 60;

const NUMBERING_TOKENS: &[&str] = &["numbered", "raqms", "raqm", "digits", "dash", "bullet"];
const HEADING_TOKENS: &[&str] = &["bab", "kitab", "fasl", "basmalah"];
const WORD_TOKENS: &[&str] = &["bab", "kitab", "fasl", "basmalah", "naql"];
const NUMERAL_TOKENS: &[&str] = &["raqms", "digits"];

static BUILTIN_ANALYZER: Lazy<PatternAnalyzer> =
    Lazy::new(|| PatternAnalyzer::new(TokenTable::builtin()));

fn is_numbering(token: &str) -> bool {
    NUMBERING_TOKENS.contains(&token)
}

struct Detection {
    template: String,
    detected: Vec<DetectedToken>,
}

/// Token detectors in detection order (composites before their parts).
pub struct PatternAnalyzer {
    detectors: Vec<(String, Regex)>,
}

impl PatternAnalyzer {
    pub fn new(tokens: &TokenTable) -> Self {
        let compiler = TemplateCompiler::new(tokens);
        let detectors = tokens
            .detection_order()
            .into_iter()
            .filter_map(|token| {
                let template = format!("{{{{{}}}}}", token.name);
                match compiler.compile(&template.as_str().into(), PatternType::LineStartsWith, false) {
                    Ok(pattern) => Some((token.name.clone(), pattern.regex)),
                    Err(e) => {
                        debug!("Token '{}' cannot be used for detection: {}", token.name, e);
                        None
                    }
                }
            })
            .collect();
        Self { detectors }
    }

    pub fn builtin() -> &'static PatternAnalyzer {
        &BUILTIN_ANALYZER
    }

    fn detect(&self, line: &str) -> Option<Detection> {
        let mut detected: Vec<DetectedToken> = Vec::new();
        let mut template = String::new();
        let mut numbered = false;
        let mut pos = 0;
        let mut gap_after_last = false;

        while detected.len() < MAX_TOKENS {
            let rest = &line[pos..];
            let gap = rest.len() - rest.trim_start().len();
            let start = pos + gap;
            let found = self.token_at(&line[start..]);
            // Text after a numbering prefix is content, not marker.
            let found = found.filter(|(name, _)| match detected.first() {
                Some(first) if is_numbering(&first.token) => is_numbering(name),
                _ => true,
            });
            let Some((name, matched)) = found else {
                gap_after_last = gap > 0 && start < line.len();
                break;
            };

            if gap > 0 && !detected.is_empty() {
                template.push(' ');
            }
            let label = if !numbered && NUMERAL_TOKENS.contains(&name) {
                numbered = true;
                ":num"
            } else {
                ""
            };
            template.push_str(&format!("{{{{{}{}}}}}", name, label));

            detected.push(DetectedToken {
                token: name.to_string(),
                matched: matched.to_string(),
                index: start,
            });
            pos = start + matched.len();
        }

        if detected.is_empty() {
            return None;
        }
        if gap_after_last && !template.ends_with(' ') {
            template.push(' ');
        }
        Some(Detection { template, detected })
    }

    /// First detector matching at the start of `text` and ending on a word edge.
    fn token_at<'a>(&'a self, text: &'a str) -> Option<(&'a str, &'a str)> {
        self.detectors.iter().find_map(|(name, regex)| {
            let m = regex.find(text)?;
            if m.is_empty() {
                return None;
            }
            let at_edge = text[m.end()..]
                .chars()
                .next()
                .map_or(true, |next| !next.is_alphanumeric());
            // Composite templates end in whitespace, so they are always on an edge.
            let ends_in_space = m.as_str().ends_with(char::is_whitespace);
            (at_edge || ends_in_space).then(|| (name.as_str(), m.as_str()))
        })
    }

    /// Suggests a rule for the first non-empty line of `text`.
    pub fn suggest(&self, text: &str) -> Option<RuleSuggestion> {
        let line = text.lines().map(str::trim).find(|line| !line.is_empty())?;
        let Detection { template, detected } = self.detect(line)?;

        let has = |names: &[&str]| detected.iter().any(|d| names.contains(&d.token.as_str()));
        let pattern_type = if has(NUMBERING_TOKENS) && !has(HEADING_TOKENS) {
            PatternType::LineStartsAfter
        } else {
            PatternType::LineStartsWith
        };
        let meta_type = if has(&["kitab"]) {
            Some("book".to_string())
        } else if has(&["bab", "fasl"]) {
            Some("chapter".to_string())
        } else {
            None
        };

        Some(RuleSuggestion {
            template,
            pattern_type,
            fuzzy: has(WORD_TOKENS),
            meta_type,
            detected,
        })
    }

    /// Counts the token signatures that open lines across `pages`.
    pub fn line_starts(&self, pages: &[Page], min_count: usize, top: usize) -> Vec<LineStartPattern> {
        let mut stats: BTreeMap<String, LineStartPattern> = BTreeMap::new();
        let mut lines = 0;

        for page in pages {
            for line in page.content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                lines += 1;
                let Some(detection) = self.detect(line) else {
                    continue;
                };
                let entry = stats
                    .entry(detection.template.clone())
                    .or_insert_with(|| LineStartPattern {
                        template: detection.template,
                        count: 0,
                        examples: Vec::new(),
                    });
                entry.count += 1;
                if entry.examples.len() < MAX_EXAMPLES {
                    entry.examples.push(line.chars().take(EXAMPLE_CHARS).collect());
                }
            }
        }

        let mut patterns: Vec<LineStartPattern> = stats
            .into_values()
            .filter(|p| p.count >= min_count.max(1))
            .collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.template.cmp(&b.template)));
        patterns.truncate(top);

        debug!(
            "Scanned {} lines on {} pages, kept {} line-start patterns",
            lines,
            pages.len(),
            patterns.len()
        );
        patterns
    }
}

/// `analyzeTextForRule`: reverse-engineers a candidate rule from highlighted text.
pub fn analyze_text_for_rule(text: &str) -> Option<RuleSuggestion> {
    PatternAnalyzer::builtin().suggest(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_hadith_line() {
        let suggestion = analyze_text_for_rule("١٢ - حدثنا أبو بكر").unwrap();
        assert_eq!(suggestion.template, "{{numbered}}");
        assert_eq!(suggestion.pattern_type, PatternType::LineStartsAfter);
        assert_eq!(suggestion.detected[0].token, "numbered");
        assert_eq!(suggestion.detected[0].matched, "١٢ - ");
    }

    #[test]
    fn test_chapter_heading() {
        let suggestion = analyze_text_for_rule("  باب ما جاء في الطهور\nنص").unwrap();
        assert_eq!(suggestion.template, "{{bab}} ");
        assert_eq!(suggestion.pattern_type, PatternType::LineStartsWith);
        assert_eq!(suggestion.meta_type.as_deref(), Some("chapter"));
        assert!(suggestion.fuzzy);
    }

    #[test]
    fn test_book_heading() {
        let suggestion = analyze_text_for_rule("كتاب الصلاة").unwrap();
        assert_eq!(suggestion.meta_type.as_deref(), Some("book"));
    }

    #[test]
    fn test_numeral_gets_capture_label() {
        let suggestion = analyze_text_for_rule("٣٤) قال").unwrap();
        assert_eq!(suggestion.template, "{{raqms:num}}");
        let rule = suggestion.into_rule();
        assert_eq!(rule.pattern_type, PatternType::LineStartsAfter);
    }

    #[test]
    fn test_words_are_not_split_into_letters() {
        assert!(analyze_text_for_rule("قال رسول الله").is_none());
        assert!(analyze_text_for_rule("   ").is_none());
    }

    #[test]
    fn test_corpus_line_starts() {
        let pages = vec![
            Page::new(1, "١ - حدثنا أ\n٢ - حدثنا ب\nباب الجنائز"),
            Page::new(2, "٣ - حدثنا د\nنص عادي"),
        ];
        let patterns = PatternAnalyzer::builtin().line_starts(&pages, 1, 10);
        assert_eq!(patterns[0].template, "{{numbered}}");
        assert_eq!(patterns[0].count, 3);
        assert_eq!(patterns[0].examples.len(), 3);
        assert_eq!(patterns[1].template, "{{bab}} ");

        let frequent = PatternAnalyzer::builtin().line_starts(&pages, 2, 10);
        assert_eq!(frequent.len(), 1);
    }
}
