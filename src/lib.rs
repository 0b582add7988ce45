//! # Manuscript Segmenter Library
//!
//! Splits paged Arabic manuscript text (OCR output or converted HTML) into
//! labelled excerpts: hadith entries, chapter and book headings, footnotes.
//! Splitting is driven by declarative rules written in a small template
//! language over named tokens (`{{raqms:num}} {{dash}} `), and every run can
//! be checked for lost or misattributed content.
//!
//! ## Example Usage
//!
//! ```rust
//! use manuscript_segmenter::{
//!     segment_pages, validate_segments, Page, PatternType, SegmentationOptions, SegmentationRule,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pages = vec![Page::new(1, "١ - حدثنا الأول\n٢ - حدثنا الثاني")];
//!
//!     let rule = SegmentationRule::new(PatternType::LineStartsAfter, "{{raqms:num}} {{dash}} ");
//!     let options = SegmentationOptions::with_rules(vec![rule], 0);
//!
//!     let segments = segment_pages(&pages, &options)?;
//!     assert_eq!(segments[1].content, "حدثنا الثاني");
//!
//!     let report = validate_segments(&pages, &segments, &options);
//!     assert!(report.ok);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod services;
pub mod types;

// Re-export main types and services for easier usage
pub use error::{Result, SegmenterError};
pub use services::{
    analyze_text_for_rule, map_pages_to_excerpts, segment_pages, validate_rules,
    validate_segments, PageSource, PatternAnalyzer, Segmentation, SegmentTrace, Segmenter,
    TemplateCompiler, TokenPattern, TokenTable, Validator,
};
pub use types::{
    ExcerptMapping, IndexedExcerpt, IssueType, LineStartPattern, Meta, Page, PageId, PatternType,
    Prefer, ReplacementRule, RuleIssue, RuleIssueKind, RuleSuggestion, Segment,
    SegmentationOptions, SegmentationRule, Severity, TemplateSource, ValidationIssue,
    ValidationReport, ValidationSummary,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_workflow() {
        let pages = vec![
            Page::new(1, "كتاب الطهارة\nباب الوضوء\n١ - حدثنا فلان"),
            Page::new(2, "عن فلان\n٢ - حدثنا آخر"),
        ];
        let rules = vec![
            SegmentationRule::new(PatternType::LineStartsWith, "{{kitab}} ")
                .fuzzy()
                .with_meta("type", "book"),
            SegmentationRule::new(PatternType::LineStartsWith, "{{bab}} ")
                .fuzzy()
                .with_meta("type", "chapter"),
            SegmentationRule::new(PatternType::LineStartsAfter, "{{raqms:num}} {{dash}} "),
        ];
        let options = SegmentationOptions::with_rules(rules, 2);

        let segments = segment_pages(&pages, &options).unwrap();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].meta.as_ref().unwrap()["type"], "book");
        assert_eq!(segments[1].meta.as_ref().unwrap()["type"], "chapter");
        assert_eq!(segments[2].content, "حدثنا فلانعن فلان");
        assert_eq!((segments[2].from, segments[2].to), (1, Some(2)));
        assert_eq!(segments[3].from, 2);

        let report = validate_segments(&pages, &segments, &options);
        assert!(report.ok, "{:?}", report.issues);
    }

    #[test]
    fn test_options_round_trip_through_json() {
        let json = r#"{
            "rules": [
                {"template": ["{{kitab}} ", "{{bab}} "], "patternType": "lineStartsWith", "fuzzy": true, "meta": {"type": "heading"}},
                {"template": "{{raqms:num}} {{dash}} ", "patternType": "lineStartsAfter", "min": 1, "pageStartGuard": true}
            ],
            "replace": [{"regex": "ـ+", "replacement": "", "pages": "1-5"}],
            "maxPages": 3,
            "prefer": "longer",
            "minWordsPerSegment": 2
        }"#;
        let options: SegmentationOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.max_pages, 3);
        assert_eq!(options.prefer, Some(Prefer::Longer));
        assert!(options.rules[1].page_start_guard);

        let again: SegmentationOptions =
            serde_json::from_str(&serde_json::to_string(&options).unwrap()).unwrap();
        assert_eq!(again, options);
    }

    #[test]
    fn test_segment_serialization_omits_absent_fields() {
        let segment = Segment {
            from: 1,
            to: None,
            content: "نص".to_string(),
            meta: None,
        };
        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json, serde_json::json!({"from": 1, "content": "نص"}));
    }
}
