use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open metadata map attached to excerpts (`type`, capture labels, ...).
pub type Meta = BTreeMap<String, String>;

/// Identifier of a source page. Ids are labels, not indices.
pub type PageId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub content: String,
}

impl Page {
    pub fn new(id: PageId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternType {
    /// Boundary at a line start; the marker stays in the excerpt.
    LineStartsWith,
    /// Boundary at a line start; the marker is removed from the excerpt.
    LineStartsAfter,
    /// Boundary wherever the template matches; the marker stays in the excerpt.
    Template,
}

/// A rule template: one string, or several variants compiled to an alternation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateSource {
    Single(String),
    Variants(Vec<String>),
}

impl TemplateSource {
    pub fn variants(&self) -> Vec<&str> {
        match self {
            TemplateSource::Single(template) => vec![template.as_str()],
            TemplateSource::Variants(templates) => templates.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.variants().iter().all(|t| t.is_empty())
    }

    pub fn display(&self) -> String {
        self.variants().join(" | ")
    }
}

impl From<&str> for TemplateSource {
    fn from(template: &str) -> Self {
        TemplateSource::Single(template.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationRule {
    pub template: TemplateSource,
    pub pattern_type: PatternType,
    #[serde(default)]
    pub fuzzy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub page_start_guard: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,
}

impl SegmentationRule {
    pub fn new(pattern_type: PatternType, template: impl Into<TemplateSource>) -> Self {
        Self {
            template: template.into(),
            pattern_type,
            fuzzy: false,
            meta: None,
            page_start_guard: false,
            min: None,
        }
    }

    pub fn fuzzy(mut self) -> Self {
        self.fuzzy = true;
        self
    }

    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        self.meta
            .get_or_insert_with(Meta::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn page_start_only(mut self) -> Self {
        self.page_start_guard = true;
        self
    }

    pub fn with_min(mut self, min: u64) -> Self {
        self.min = Some(min);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementRule {
    pub regex: String,
    pub replacement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    /// Page selector: `"1,3,5-7,10+"`. Empty disables the rule, absent means all pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prefer {
    Longer,
    Shorter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationOptions {
    #[serde(default)]
    pub rules: Vec<SegmentationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace: Vec<ReplacementRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<[String; 2]>,
    #[serde(default)]
    pub max_pages: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer: Option<Prefer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_words_per_segment: Option<usize>,
}

impl SegmentationOptions {
    pub fn with_rules(rules: Vec<SegmentationRule>, max_pages: usize) -> Self {
        Self {
            rules,
            max_pages,
            ..Default::default()
        }
    }

    /// Largest number of pages a single excerpt may cover.
    pub fn page_cap(&self) -> usize {
        self.max_pages.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub from: PageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<PageId>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Segment {
    pub fn last_page(&self) -> PageId {
        self.to.unwrap_or(self.from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MaxPagesViolation,
    PageAttributionMismatch,
    ContentNotFound,
    PageNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub segment_index: usize,
    pub segment: Segment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub segment_count: usize,
    pub page_count: usize,
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<ValidationIssue>,
    pub summary: ValidationSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleIssueKind {
    UnknownToken,
    MalformedTemplate,
    ZeroWidth,
    EmptyTemplate,
    DuplicateRule,
    MinWithoutCapture,
}

/// Problem found by static rule validation, before any pages are scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleIssue {
    pub rule_index: usize,
    pub kind: RuleIssueKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedExcerpt {
    pub id: String,
    pub index: usize,
    #[serde(flatten)]
    pub segment: Segment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcerptMapping {
    pub excerpts: Vec<IndexedExcerpt>,
    pub report: ValidationReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedToken {
    pub token: String,
    pub matched: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSuggestion {
    pub template: String,
    pub pattern_type: PatternType,
    pub fuzzy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_type: Option<String>,
    pub detected: Vec<DetectedToken>,
}

impl RuleSuggestion {
    pub fn into_rule(self) -> SegmentationRule {
        let mut rule = SegmentationRule::new(self.pattern_type, self.template.as_str());
        rule.fuzzy = self.fuzzy;
        if let Some(meta_type) = &self.meta_type {
            rule = rule.with_meta("type", meta_type);
        }
        rule
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStartPattern {
    pub template: String,
    pub count: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    LocalFile,
    Url,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source: String,
    pub source_type: SourceType,
    pub loaded_at: String,
    pub page_count: usize,
}
