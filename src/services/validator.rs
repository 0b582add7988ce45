use crate::error::{Result, SegmenterError};
use crate::services::compiler::{TemplateCompiler, ZERO_WIDTH_REASON};
use crate::services::segmenter::{CompiledRule, PageIndex, Segmentation, Segmenter};
use crate::types::{
    ExcerptMapping, IndexedExcerpt, IssueType, Page, PageId, PatternType, RuleIssue,
    RuleIssueKind, Segment, SegmentationOptions, SegmentationRule, Severity, ValidationIssue,
    ValidationReport, ValidationSummary,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use tracing::{debug, info};

/// Checks segments against the pages they claim to come from.
pub struct Validator {
    stream: String,
    index: PageIndex,
    positions: HashMap<PageId, Vec<usize>>,
    max_pages: usize,
}

type Finding = (IssueType, Severity, String);

impl Validator {
    pub fn new(pages: &[Page], max_pages: usize) -> Self {
        let (stream, index) = PageIndex::build(pages);
        let mut positions: HashMap<PageId, Vec<usize>> = HashMap::with_capacity(pages.len());
        for (position, page) in pages.iter().enumerate() {
            positions.entry(page.id).or_default().push(position);
        }
        Self {
            stream,
            index,
            positions,
            max_pages,
        }
    }

    /// Per-segment checks plus a page-level coverage check.
    ///
    /// Without traces a page whose only text is a removed marker cannot be
    /// told apart from a lost page, so it is reported too.
    pub fn validate(&self, segments: &[Segment]) -> ValidationReport {
        let mut issues = self.segment_issues(segments);
        issues.extend(self.uncovered_pages(segments));
        self.report(issues, segments.len())
    }

    /// Per-segment checks plus an exact coverage check: every non-whitespace
    /// byte must sit in an excerpt or in a removed marker.
    ///
    /// `self` must have been built from `segmentation.pages`.
    pub fn validate_segmentation(&self, segmentation: &Segmentation) -> ValidationReport {
        let segments = &segmentation.segments;
        let mut issues = self.segment_issues(segments);

        let covered = segmentation
            .traces
            .iter()
            .map(|trace| trace.content.clone())
            .chain(segmentation.markers.iter().cloned())
            .collect();
        for lost in lost_ranges(&self.stream, covered) {
            let text = &self.stream[lost.clone()];
            let page = self.index.id_at(lost.start);
            let nearest = segmentation
                .traces
                .iter()
                .position(|trace| trace.content.start >= lost.start)
                .unwrap_or_else(|| segments.len().saturating_sub(1));
            issues.push(self.issue_near(
                segments,
                nearest,
                page,
                text,
                format!("text on page {} is in no excerpt: \"{}\"", page, preview(text)),
            ));
        }

        self.report(issues, segments.len())
    }

    fn segment_issues(&self, segments: &[Segment]) -> Vec<ValidationIssue> {
        let mut cursor = 0;
        let mut issues = Vec::new();
        for (segment_index, segment) in segments.iter().enumerate() {
            let (findings, from) = self.check(segment, cursor);
            cursor = from.unwrap_or(cursor);
            issues.extend(findings.into_iter().map(|(issue_type, severity, evidence)| {
                ValidationIssue {
                    issue_type,
                    severity,
                    segment_index,
                    segment: segment.clone(),
                    evidence: Some(evidence),
                }
            }));
        }
        issues
    }

    /// Pages with text that no segment's page range reaches.
    fn uncovered_pages(&self, segments: &[Segment]) -> Vec<ValidationIssue> {
        let mut reached = vec![false; self.index.page_count()];
        let mut starts = Vec::with_capacity(segments.len());
        let mut cursor = 0;
        for segment in segments {
            let from = self.locate(segment.from, cursor);
            let to = from.and_then(|from| self.locate(segment.last_page(), from));
            if let (Some(from), Some(to)) = (from, to) {
                if from <= to {
                    reached[from..=to].iter_mut().for_each(|seen| *seen = true);
                }
                cursor = from;
            }
            starts.push(from);
        }

        let mut issues = Vec::new();
        for (position, _) in reached.iter().enumerate().filter(|(_, seen)| !**seen) {
            let text = self.stream[self.index.page_span(position)].trim();
            if text.is_empty() {
                continue;
            }
            let page = self.index.id(position);
            let nearest = starts
                .iter()
                .position(|start| start.map_or(false, |start| start > position))
                .unwrap_or_else(|| segments.len().saturating_sub(1));
            issues.push(self.issue_near(
                segments,
                nearest,
                page,
                text,
                format!("page {} is not covered by any excerpt", page),
            ));
        }
        issues
    }

    /// `content_not_found` for text that reached no excerpt, filed against
    /// the segment at `nearest` (or the lost text itself when there is none).
    fn issue_near(
        &self,
        segments: &[Segment],
        nearest: usize,
        page: PageId,
        text: &str,
        evidence: String,
    ) -> ValidationIssue {
        debug!("Lost text on page {}", page);
        let segment = segments.get(nearest).cloned().unwrap_or_else(|| Segment {
            from: page,
            to: None,
            content: text.to_string(),
            meta: None,
        });
        ValidationIssue {
            issue_type: IssueType::ContentNotFound,
            severity: Severity::Warning,
            segment_index: nearest,
            segment,
            evidence: Some(evidence),
        }
    }

    fn report(&self, mut issues: Vec<ValidationIssue>, segment_count: usize) -> ValidationReport {
        issues.sort_by_key(|issue| issue.segment_index);
        let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
        let summary = ValidationSummary {
            segment_count,
            page_count: self.index.page_count(),
            errors,
            warnings: issues.len() - errors,
        };
        info!(
            "Validated {} segments: {} errors, {} warnings",
            summary.segment_count, summary.errors, summary.warnings
        );

        ValidationReport {
            ok: errors == 0,
            issues,
            summary,
        }
    }

    /// Position of page `id`, preferring the first occurrence at or after `cursor`.
    fn locate(&self, id: PageId, cursor: usize) -> Option<usize> {
        let positions = self.positions.get(&id)?;
        positions
            .iter()
            .copied()
            .find(|&position| position >= cursor)
            .or_else(|| positions.first().copied())
    }

    fn check(&self, segment: &Segment, cursor: usize) -> (Vec<Finding>, Option<usize>) {
        let mut found = Vec::new();

        let from = self.locate(segment.from, cursor);
        let to = from.and_then(|from| self.locate(segment.last_page(), from));
        let (from, to) = match (from, to) {
            (Some(from), Some(to)) => (from, to),
            (from, _) => {
                let missing = if from.is_none() {
                    segment.from
                } else {
                    segment.last_page()
                };
                found.push((
                    IssueType::PageNotFound,
                    Severity::Error,
                    format!("page {} is not in the input", missing),
                ));
                return (found, None);
            }
        };

        if to < from {
            found.push((
                IssueType::PageAttributionMismatch,
                Severity::Warning,
                format!(
                    "segment ends on page {} which comes before page {}",
                    segment.last_page(),
                    segment.from
                ),
            ));
            return (found, Some(from));
        }

        let span = to - from + 1;
        if span > self.max_pages.max(1) {
            found.push((
                IssueType::MaxPagesViolation,
                Severity::Error,
                format!(
                    "segment spans {} pages ({}-{}) but maxPages is {}",
                    span,
                    segment.from,
                    segment.last_page(),
                    self.max_pages
                ),
            ));
        }

        let claimed = self.index.page_span(from).start..self.index.page_span(to).end;
        match self.stream[claimed.clone()].find(segment.content.as_str()) {
            Some(offset) => {
                let start = self.index.position_at(claimed.start + offset);
                if start != from {
                    found.push((
                        IssueType::PageAttributionMismatch,
                        Severity::Warning,
                        format!(
                            "content starts on page {}, not page {}",
                            self.index.id(start),
                            segment.from
                        ),
                    ));
                }
            }
            None if contains_normalized(&self.stream[claimed], &segment.content) => {
                debug!("Segment on page {} matched after whitespace normalisation", segment.from);
            }
            None => match self.stream.find(segment.content.as_str()) {
                Some(offset) => found.push((
                    IssueType::PageAttributionMismatch,
                    Severity::Warning,
                    format!(
                        "content not on pages {}-{}; found on page {}",
                        segment.from,
                        segment.last_page(),
                        self.index.id_at(offset)
                    ),
                )),
                None => found.push((
                    IssueType::ContentNotFound,
                    Severity::Warning,
                    format!("content not found in input: \"{}\"", preview(&segment.content)),
                )),
            },
        }

        (found, Some(from))
    }
}

/// Non-whitespace stretches of `stream` outside every `covered` range.
fn lost_ranges(stream: &str, mut covered: Vec<Range<usize>>) -> Vec<Range<usize>> {
    covered.sort_by_key(|range| range.start);
    let mut lost = Vec::new();
    let mut cursor = 0;
    for range in covered.into_iter().chain(std::iter::once(stream.len()..stream.len())) {
        if range.start > cursor {
            let gap = &stream[cursor..range.start];
            let inner = gap.trim();
            if !inner.is_empty() {
                let lead = gap.len() - gap.trim_start().len();
                lost.push(cursor + lead..cursor + lead + inner.len());
            }
        }
        cursor = cursor.max(range.end);
    }
    lost
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_normalized(haystack: &str, needle: &str) -> bool {
    let needle = normalize_whitespace(needle);
    !needle.is_empty() && normalize_whitespace(haystack).contains(&needle)
}

fn preview(content: &str) -> String {
    const LIMIT: usize = 40;
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(LIMIT).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

/// Validates `segments` against `pages` using `options.maxPages`.
pub fn validate_segments(
    pages: &[Page],
    segments: &[Segment],
    options: &SegmentationOptions,
) -> ValidationReport {
    Validator::new(pages, options.max_pages).validate(segments)
}

/// Segments `pages`, validates the result and carries ids and translations
/// over from `existing` excerpts with the same content and starting page.
pub fn map_pages_to_excerpts(
    pages: &[Page],
    existing: &[IndexedExcerpt],
    options: &SegmentationOptions,
) -> Result<ExcerptMapping> {
    let segmentation = Segmenter::new(options)?.run(pages)?;
    let report =
        Validator::new(&segmentation.pages, options.max_pages).validate_segmentation(&segmentation);

    let mut previous: HashMap<(PageId, String), VecDeque<&IndexedExcerpt>> = HashMap::new();
    for excerpt in existing {
        previous
            .entry((excerpt.segment.from, normalize_whitespace(&excerpt.segment.content)))
            .or_default()
            .push_back(excerpt);
    }
    let mut used: HashSet<String> = existing.iter().map(|e| e.id.clone()).collect();
    let mut next_id = 1;
    let mut carried = 0;

    let excerpts = segmentation
        .segments
        .into_iter()
        .enumerate()
        .map(|(index, segment)| {
            let key = (segment.from, normalize_whitespace(&segment.content));
            let earlier = previous.get_mut(&key).and_then(VecDeque::pop_front);
            let (id, translation) = match earlier {
                Some(earlier) => {
                    carried += 1;
                    (earlier.id.clone(), earlier.translation.clone())
                }
                None => {
                    while used.contains(&format!("P{}", next_id)) {
                        next_id += 1;
                    }
                    let id = format!("P{}", next_id);
                    used.insert(id.clone());
                    (id, None)
                }
            };
            IndexedExcerpt {
                id,
                index,
                segment,
                translation,
            }
        })
        .collect::<Vec<_>>();

    info!(
        "Mapped {} excerpts ({} carried over from {} existing)",
        excerpts.len(),
        carried,
        existing.len()
    );

    Ok(ExcerptMapping { excerpts, report })
}

/// Static checks on a rule list; never fails on bad input.
pub fn validate_rules(rules: &[SegmentationRule]) -> Vec<RuleIssue> {
    let compiler = TemplateCompiler::default();
    let mut issues = Vec::new();
    let mut seen: HashMap<(PatternType, String, bool), usize> = HashMap::new();

    for (rule_index, rule) in rules.iter().enumerate() {
        let mut issue = |kind, severity, message: String| {
            issues.push(RuleIssue {
                rule_index,
                kind,
                severity,
                message,
            })
        };

        if rule.template.is_empty() {
            issue(
                RuleIssueKind::EmptyTemplate,
                Severity::Error,
                "template is empty".to_string(),
            );
            continue;
        }

        let key = (rule.pattern_type, rule.template.display(), rule.fuzzy);
        if let Some(&first) = seen.get(&key) {
            issue(
                RuleIssueKind::DuplicateRule,
                Severity::Warning,
                format!("same template and pattern type as rule {}", first),
            );
        } else {
            seen.insert(key, rule_index);
        }

        match CompiledRule::compile(&compiler, rule_index, rule) {
            Ok(compiled) => {
                if rule.min.is_some() && !compiled.pattern.has_captures() {
                    issue(
                        RuleIssueKind::MinWithoutCapture,
                        Severity::Warning,
                        "min is set but the template captures nothing".to_string(),
                    );
                }
            }
            Err(SegmenterError::UnknownToken { name }) => issue(
                RuleIssueKind::UnknownToken,
                Severity::Error,
                format!("unknown token '{{{{{}}}}}'", name),
            ),
            Err(SegmenterError::Compile { reason, .. }) if reason == ZERO_WIDTH_REASON => issue(
                RuleIssueKind::ZeroWidth,
                Severity::Error,
                format!("'{}': {}", rule.template.display(), reason),
            ),
            Err(err) => issue(RuleIssueKind::MalformedTemplate, Severity::Error, err.to_string()),
        }
    }

    issues
}
