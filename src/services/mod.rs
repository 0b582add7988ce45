pub mod analyzer;
pub mod compiler;
pub mod fetcher;
pub mod replacer;
pub mod segmenter;
pub mod tokens;
pub mod validator;

pub use analyzer::{analyze_text_for_rule, PatternAnalyzer};
pub use compiler::{CompiledPattern, TemplateCompiler};
pub use fetcher::PageSource;
pub use replacer::{PageSelector, Replacer};
pub use segmenter::{segment_pages, Segmentation, SegmentTrace, Segmenter};
pub use tokens::{TokenPattern, TokenTable};
pub use validator::{map_pages_to_excerpts, validate_rules, validate_segments, Validator};
