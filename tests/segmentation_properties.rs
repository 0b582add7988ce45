//! Property-based tests for the segmentation engine:
//! - identical input gives identical output
//! - maxPages 0 never produces a multi-page excerpt
//! - no text is lost except whitespace and removed markers
//! - a generous page cap validates without issues

use manuscript_segmenter::{
    Page, PatternType, SegmentationOptions, SegmentationRule, Segmenter, Validator,
};
use proptest::prelude::*;

const FRAGMENTS: &[&str] = &["١ - ", "٢ - ", "باب ", "حدثنا ", "نص ", "\n", " "];

fn pages_strategy() -> impl Strategy<Value = Vec<Page>> {
    prop::collection::vec(
        prop::collection::vec(prop::sample::select(FRAGMENTS), 1..8),
        1..6,
    )
    .prop_map(|pages| {
        pages
            .into_iter()
            .enumerate()
            .map(|(i, fragments)| Page::new(i as u32 * 2 + 1, fragments.concat()))
            .collect()
    })
}

fn rules() -> Vec<SegmentationRule> {
    vec![
        SegmentationRule::new(PatternType::LineStartsAfter, "{{raqms:num}} {{dash}} "),
        SegmentationRule::new(PatternType::LineStartsWith, "{{bab}} ")
            .fuzzy()
            .with_meta("type", "chapter"),
    ]
}

#[test]
fn proptest_segmentation_is_deterministic() {
    proptest!(|(pages in pages_strategy())| {
        let options = SegmentationOptions::with_rules(rules(), 2);
        let segmenter = Segmenter::new(&options).unwrap();
        let first = segmenter.segment(&pages).unwrap();
        let second = segmenter.segment(&pages).unwrap();
        prop_assert_eq!(first, second);
    });
}

#[test]
fn proptest_max_pages_zero_keeps_excerpts_on_one_page() {
    proptest!(|(pages in pages_strategy())| {
        let options = SegmentationOptions::with_rules(rules(), 0);
        let segments = Segmenter::new(&options).unwrap().segment(&pages).unwrap();
        prop_assert!(segments.iter().all(|s| s.to.is_none()));
    });
}

#[test]
fn proptest_only_whitespace_and_markers_are_lost() {
    proptest!(|(pages in pages_strategy(), max_pages in 0usize..4)| {
        let options = SegmentationOptions::with_rules(rules(), max_pages);
        let segmentation = Segmenter::new(&options).unwrap().run(&pages).unwrap();
        let stream = &segmentation.stream;

        for (segment, trace) in segmentation.segments.iter().zip(&segmentation.traces) {
            prop_assert_eq!(&stream[trace.content.clone()], segment.content.as_str());
        }

        for (offset, ch) in stream.char_indices() {
            if ch.is_whitespace() {
                continue;
            }
            let covered = segmentation.traces.iter().any(|t| t.content.contains(&offset))
                || segmentation.markers.iter().any(|m| m.contains(&offset));
            prop_assert!(covered, "byte {} ({:?}) of {:?} was lost", offset, ch, stream);
        }
    });
}

#[test]
fn proptest_generous_cap_validates_cleanly() {
    proptest!(|(pages in pages_strategy())| {
        let options = SegmentationOptions::with_rules(rules(), 10);
        let segmentation = Segmenter::new(&options).unwrap().run(&pages).unwrap();
        let report = Validator::new(&segmentation.pages, 10).validate_segmentation(&segmentation);
        prop_assert!(report.ok, "{:?}", report.issues);
        prop_assert!(report.issues.is_empty(), "{:?}", report.issues);
    });
}
