use crate::error::{Result, SegmenterError};
use crate::services::compiler::{CompiledPattern, TemplateCompiler};
use crate::services::replacer::Replacer;
use crate::services::tokens::TokenTable;
use crate::types::{
    Meta, Page, PageId, PatternType, Prefer, Segment, SegmentationOptions, SegmentationRule,
};
use std::cmp::Reverse;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Rule evaluations allowed in one run before it is aborted.
pub const DEFAULT_ITERATION_LIMIT: usize = 5_000_000;

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub index: usize,
    pub pattern_type: PatternType,
    pub pattern: CompiledPattern,
    pub meta: Option<Meta>,
    pub page_start_guard: bool,
    pub min: Option<u64>,
}

impl CompiledRule {
    pub fn compile(compiler: &TemplateCompiler, index: usize, rule: &SegmentationRule) -> Result<Self> {
        let pattern = compiler.compile(&rule.template, rule.pattern_type, rule.fuzzy)?;
        Ok(Self {
            index,
            pattern_type: rule.pattern_type,
            pattern,
            meta: rule.meta.clone(),
            page_start_guard: rule.page_start_guard,
            min: rule.min,
        })
    }

    fn removes_marker(&self) -> bool {
        self.pattern_type == PatternType::LineStartsAfter
    }
}

/// Maps offsets in the concatenated stream back to source pages.
#[derive(Debug, Clone, Default)]
pub struct PageIndex {
    ids: Vec<PageId>,
    starts: Vec<usize>,
    len: usize,
}

impl PageIndex {
    /// Concatenates page contents without separators.
    pub fn build(pages: &[Page]) -> (String, Self) {
        let mut stream = String::with_capacity(pages.iter().map(|p| p.content.len()).sum());
        let mut ids = Vec::with_capacity(pages.len());
        let mut starts = Vec::with_capacity(pages.len());
        for page in pages {
            ids.push(page.id);
            starts.push(stream.len());
            stream.push_str(&page.content);
        }
        let len = stream.len();
        (stream, Self { ids, starts, len })
    }

    /// Position (in input order) of the page holding `offset`.
    pub fn position_at(&self, offset: usize) -> usize {
        self.starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    pub fn id_at(&self, offset: usize) -> PageId {
        self.ids[self.position_at(offset)]
    }

    pub fn id(&self, position: usize) -> PageId {
        self.ids[position]
    }

    /// Stream range holding the page at `position`.
    pub fn page_span(&self, position: usize) -> Range<usize> {
        let start = self.starts[position];
        let end = self.starts.get(position + 1).copied().unwrap_or(self.len);
        start..end
    }

    pub fn is_page_start(&self, offset: usize) -> bool {
        offset < self.len && self.starts.binary_search(&offset).is_ok()
    }

    /// Offsets of page starts strictly inside `range`.
    pub fn starts_within(&self, range: Range<usize>) -> impl Iterator<Item = usize> + '_ {
        self.starts
            .iter()
            .copied()
            .filter(move |&start| start > range.start && start < range.end)
    }

    pub fn page_count(&self) -> usize {
        self.ids.len()
    }
}

/// Where each emitted segment sits in the concatenated stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTrace {
    /// From this segment's boundary up to the next one.
    pub span: Range<usize>,
    /// The slice returned as `content`.
    pub content: Range<usize>,
    /// Marker text removed from the start of the span.
    pub marker: Option<Range<usize>>,
}

/// Result of one segmentation run.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub stream: String,
    /// Pages after the replacement pass, in input order.
    pub pages: Vec<Page>,
    pub segments: Vec<Segment>,
    pub traces: Vec<SegmentTrace>,
    /// Every marker range removed from the output, including markers of
    /// excerpts that were dropped for being empty.
    pub markers: Vec<Range<usize>>,
}

#[derive(Debug, Clone)]
struct Candidate {
    pos: usize,
    len: usize,
    rule: usize,
    captured: Meta,
}

#[derive(Debug, Clone)]
struct Boundary {
    pos: usize,
    marker_end: usize,
    meta: Option<Meta>,
}

#[derive(Debug, Clone)]
struct Piece {
    span: Range<usize>,
    body: Range<usize>,
    marker: Option<Range<usize>>,
    meta: Option<Meta>,
}

#[derive(Debug, Clone)]
struct Assembled {
    segment: Segment,
    trace: SegmentTrace,
    first_page: usize,
    last_page: usize,
}

struct Budget {
    used: usize,
    limit: usize,
}

impl Budget {
    fn tick(&mut self) -> Result<()> {
        self.used += 1;
        if self.used > self.limit {
            return Err(SegmenterError::SegmentationTimeout {
                iterations: self.limit,
            });
        }
        Ok(())
    }
}

/// Pre-compiled segmentation configuration. Reusable across runs.
#[derive(Debug, Clone)]
pub struct Segmenter {
    rules: Vec<CompiledRule>,
    replacer: Replacer,
    breakpoints: Option<(CompiledPattern, CompiledPattern)>,
    max_pages: usize,
    prefer: Option<Prefer>,
    min_words: Option<usize>,
    iteration_limit: usize,
}

impl Segmenter {
    pub fn new(options: &SegmentationOptions) -> Result<Self> {
        Self::with_tokens(options, TokenTable::builtin())
    }

    /// Compiles every rule up front; any malformed template fails here.
    pub fn with_tokens(options: &SegmentationOptions, tokens: &TokenTable) -> Result<Self> {
        let compiler = TemplateCompiler::new(tokens);

        let rules = options
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| CompiledRule::compile(&compiler, index, rule))
            .collect::<Result<Vec<_>>>()?;

        let breakpoints = match &options.breakpoints {
            Some([start, end]) => {
                if !rules.is_empty() {
                    warn!("Breakpoints are configured; {} rules will be ignored", rules.len());
                }
                Some((
                    compiler.compile(&start.as_str().into(), PatternType::Template, false)?,
                    compiler.compile(&end.as_str().into(), PatternType::Template, false)?,
                ))
            }
            None => None,
        };

        Ok(Self {
            rules,
            replacer: Replacer::new(&options.replace)?,
            breakpoints,
            max_pages: options.max_pages,
            prefer: options.prefer,
            min_words: options.min_words_per_segment.filter(|&words| words > 0),
            iteration_limit: DEFAULT_ITERATION_LIMIT,
        })
    }

    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = limit;
        self
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn page_cap(&self) -> usize {
        self.max_pages.max(1)
    }

    /// Pages as the engine sees them, after replacement rules.
    pub fn prepare_pages(&self, pages: &[Page]) -> Vec<Page> {
        if self.replacer.is_empty() {
            pages.to_vec()
        } else {
            self.replacer.apply(pages)
        }
    }

    pub fn segment(&self, pages: &[Page]) -> Result<Vec<Segment>> {
        Ok(self.run(pages)?.segments)
    }

    pub fn run(&self, pages: &[Page]) -> Result<Segmentation> {
        info!(
            "Segmenting {} pages with {} rules (maxPages {})",
            pages.len(),
            self.rules.len(),
            self.max_pages
        );

        let pages = self.prepare_pages(pages);
        let (stream, index) = PageIndex::build(&pages);
        let mut budget = Budget {
            used: 0,
            limit: self.iteration_limit,
        };

        let boundaries = match &self.breakpoints {
            Some((start, end)) => self.breakpoint_boundaries(&stream, start, end, &mut budget)?,
            None => self.rule_boundaries(&stream, &index, &mut budget)?,
        };
        debug!("Found {} boundaries", boundaries.len());

        let mut pieces = pieces_from(&boundaries, stream.len());
        if self.max_pages == 0 {
            pieces = pieces
                .into_iter()
                .flat_map(|piece| split_at_pages(piece, &index))
                .collect();
        }

        let markers = pieces.iter().filter_map(|piece| piece.marker.clone()).collect();
        let assembled: Vec<Assembled> = pieces
            .into_iter()
            .filter_map(|piece| assemble(piece, &stream, &index))
            .collect();
        let assembled = match self.min_words {
            Some(min_words) => self.merge_short(assembled, min_words, &stream, &index),
            None => assembled,
        };

        let (segments, traces) = assembled
            .into_iter()
            .map(|item| (item.segment, item.trace))
            .unzip();

        Ok(Segmentation {
            stream,
            pages,
            segments,
            traces,
            markers,
        })
    }

    fn rule_boundaries(
        &self,
        stream: &str,
        index: &PageIndex,
        budget: &mut Budget,
    ) -> Result<Vec<Boundary>> {
        let line_starts = line_starts(stream, index);
        let mut candidates = Vec::new();

        for rule in &self.rules {
            match rule.pattern_type {
                PatternType::LineStartsWith | PatternType::LineStartsAfter => {
                    for &pos in &line_starts {
                        budget.tick()?;
                        if rule.page_start_guard && !index.is_page_start(pos) {
                            continue;
                        }
                        if let Some(caps) = rule.pattern.regex.captures(&stream[pos..]) {
                            let Some(m) = caps.get(0) else { continue };
                            if let Some(candidate) = self.candidate(rule, pos, m.end(), &caps) {
                                candidates.push(candidate);
                            }
                        }
                    }
                }
                PatternType::Template => {
                    for caps in rule.pattern.regex.captures_iter(stream) {
                        budget.tick()?;
                        let Some(m) = caps.get(0) else { continue };
                        if rule.page_start_guard && !index.is_page_start(m.start()) {
                            continue;
                        }
                        if let Some(candidate) = self.candidate(rule, m.start(), m.len(), &caps) {
                            candidates.push(candidate);
                        }
                    }
                }
            }
        }

        candidates.sort_by_key(|c| (c.pos, c.rule));

        let mut boundaries = Vec::new();
        let mut consumed_until = 0;
        for group in candidates.chunk_by(|a, b| a.pos == b.pos) {
            let winner = self.pick(group);
            if winner.pos < consumed_until {
                debug!("Skipping match at {} inside an earlier marker", winner.pos);
                continue;
            }
            let rule = &self.rules[winner.rule];
            consumed_until = winner.pos + winner.len;

            let mut meta = rule.meta.clone().unwrap_or_default();
            meta.extend(winner.captured.clone());

            boundaries.push(Boundary {
                pos: winner.pos,
                marker_end: if rule.removes_marker() {
                    winner.pos + winner.len
                } else {
                    winner.pos
                },
                meta: (!meta.is_empty()).then_some(meta),
            });
        }

        Ok(boundaries)
    }

    fn candidate(
        &self,
        rule: &CompiledRule,
        pos: usize,
        len: usize,
        caps: &regex::Captures,
    ) -> Option<Candidate> {
        if len == 0 {
            return None;
        }
        if let Some(min) = rule.min {
            if let Some(value) = rule.pattern.numeric_capture(caps) {
                if value < min {
                    debug!(
                        "Rule {} matched {} at {}, below min {}",
                        rule.index, value, pos, min
                    );
                    return None;
                }
            }
        }
        Some(Candidate {
            pos,
            len,
            rule: rule.index,
            captured: rule.pattern.captured_meta(caps),
        })
    }

    /// Earliest rule wins unless `prefer` asks for a match length.
    fn pick<'c>(&self, group: &'c [Candidate]) -> &'c Candidate {
        let winner = match self.prefer {
            None => group.iter().min_by_key(|c| c.rule),
            Some(Prefer::Longer) => group.iter().min_by_key(|c| (Reverse(c.len), c.rule)),
            Some(Prefer::Shorter) => group.iter().min_by_key(|c| (c.len, c.rule)),
        };
        winner.unwrap_or(&group[0])
    }

    fn breakpoint_boundaries(
        &self,
        stream: &str,
        start: &CompiledPattern,
        end: &CompiledPattern,
        budget: &mut Budget,
    ) -> Result<Vec<Boundary>> {
        let mut starts = Vec::new();
        for m in start.regex.find_iter(stream) {
            budget.tick()?;
            if !m.is_empty() {
                starts.push(m.range());
            }
        }

        let mut boundaries: Vec<Boundary> = Vec::new();
        let push = |pos: usize, boundaries: &mut Vec<Boundary>| {
            if pos < stream.len() && boundaries.last().map_or(true, |b| b.pos < pos) {
                boundaries.push(Boundary {
                    pos,
                    marker_end: pos,
                    meta: None,
                });
            }
        };

        let mut cursor = 0;
        for (k, block) in starts.iter().enumerate() {
            budget.tick()?;
            if block.start < cursor {
                continue;
            }
            push(block.start, &mut boundaries);

            let next_start = starts[k + 1..]
                .iter()
                .find(|next| next.start >= block.end)
                .map_or(stream.len(), |next| next.start);

            match end.regex.find_at(stream, block.end) {
                Some(close) if close.start() < next_start && !close.is_empty() => {
                    push(close.end(), &mut boundaries);
                    cursor = close.end();
                }
                _ => cursor = block.end,
            }
        }

        Ok(boundaries)
    }

    /// Folds excerpts under `min_words` into the excerpt that follows them.
    fn merge_short(
        &self,
        items: Vec<Assembled>,
        min_words: usize,
        stream: &str,
        index: &PageIndex,
    ) -> Vec<Assembled> {
        let mut out = Vec::with_capacity(items.len());
        let mut pending: Option<Assembled> = None;

        for item in items {
            let item = match pending.take() {
                Some(short) if item.last_page - short.first_page < self.page_cap() => {
                    debug!("Merging short excerpt at {} into the next one", short.trace.span.start);
                    merge(short, item, stream, index)
                }
                Some(short) => {
                    out.push(short);
                    item
                }
                None => item,
            };

            if item.segment.content.split_whitespace().count() < min_words {
                pending = Some(item);
            } else {
                out.push(item);
            }
        }

        out.extend(pending);
        out
    }
}

/// `segmentPages`: compile `options` and segment `pages` in one call.
pub fn segment_pages(pages: &[Page], options: &SegmentationOptions) -> Result<Vec<Segment>> {
    Segmenter::new(options)?.segment(pages)
}

fn line_starts(stream: &str, index: &PageIndex) -> Vec<usize> {
    let mut offsets: Vec<usize> = std::iter::once(0)
        .chain(stream.match_indices('\n').map(|(i, _)| i + 1))
        .chain(index.starts.iter().copied())
        .filter(|&offset| offset < stream.len())
        .collect();
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

fn pieces_from(boundaries: &[Boundary], len: usize) -> Vec<Piece> {
    let mut pieces = Vec::with_capacity(boundaries.len() + 1);

    let first = boundaries.first().map_or(len, |b| b.pos);
    if first > 0 {
        pieces.push(Piece {
            span: 0..first,
            body: 0..first,
            marker: None,
            meta: None,
        });
    }

    for (k, boundary) in boundaries.iter().enumerate() {
        let end = boundaries.get(k + 1).map_or(len, |next| next.pos);
        let body_start = boundary.marker_end.min(end);
        pieces.push(Piece {
            span: boundary.pos..end,
            body: body_start..end,
            marker: (body_start > boundary.pos).then(|| boundary.pos..body_start),
            meta: boundary.meta.clone(),
        });
    }

    pieces
}

fn split_at_pages(piece: Piece, index: &PageIndex) -> Vec<Piece> {
    let cuts: Vec<usize> = index.starts_within(piece.body.clone()).collect();
    if cuts.is_empty() {
        return vec![piece];
    }

    let mut out = Vec::with_capacity(cuts.len() + 1);
    out.push(Piece {
        span: piece.span.start..cuts[0],
        body: piece.body.start..cuts[0],
        marker: piece.marker,
        meta: piece.meta,
    });
    for (k, &cut) in cuts.iter().enumerate() {
        let end = cuts.get(k + 1).copied().unwrap_or(piece.body.end);
        out.push(Piece {
            span: cut..end,
            body: cut..end,
            marker: None,
            meta: None,
        });
    }
    out
}

fn trimmed(stream: &str, range: Range<usize>) -> Option<Range<usize>> {
    let text = &stream[range.clone()];
    let inner = text.trim();
    if inner.is_empty() {
        return None;
    }
    let lead = text.len() - text.trim_start().len();
    Some(range.start + lead..range.start + lead + inner.len())
}

fn assemble(piece: Piece, stream: &str, index: &PageIndex) -> Option<Assembled> {
    let Some(content) = trimmed(stream, piece.body.clone()) else {
        debug!("Dropping empty excerpt at {}", piece.span.start);
        return None;
    };
    let first_page = index.position_at(content.start);
    let last_page = index.position_at(content.end - 1);

    Some(Assembled {
        segment: Segment {
            from: index.id(first_page),
            to: (last_page != first_page).then(|| index.id(last_page)),
            content: stream[content.clone()].to_string(),
            meta: piece.meta,
        },
        trace: SegmentTrace {
            span: piece.span,
            content,
            marker: piece.marker,
        },
        first_page,
        last_page,
    })
}

fn merge(short: Assembled, next: Assembled, stream: &str, index: &PageIndex) -> Assembled {
    let content = short.trace.content.start..next.trace.content.end;
    let meta = match (short.segment.meta, next.segment.meta) {
        (Some(mut first), Some(second)) => {
            for (key, value) in second {
                first.entry(key).or_insert(value);
            }
            Some(first)
        }
        (first, second) => first.or(second),
    };

    Assembled {
        segment: Segment {
            from: index.id(short.first_page),
            to: (next.last_page != short.first_page).then(|| index.id(next.last_page)),
            content: stream[content.clone()].to_string(),
            meta,
        },
        trace: SegmentTrace {
            span: short.trace.span.start..next.trace.span.end,
            content,
            marker: short.trace.marker,
        },
        first_page: short.first_page,
        last_page: next.last_page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_rule() -> SegmentationRule {
        SegmentationRule::new(PatternType::LineStartsAfter, "{{raqms:num}} {{dash}} ")
    }

    #[test]
    fn test_numbered_lines_on_one_page() {
        let pages = vec![Page::new(1, "١ - حدثنا الأول\n٢ - حدثنا الثاني")];
        let options = SegmentationOptions::with_rules(vec![numbered_rule()], 0);
        let segments = segment_pages(&pages, &options).unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].content, "حدثنا الأول");
        assert_eq!(segments[1].content, "حدثنا الثاني");
        assert!(segments.iter().all(|s| s.from == 1 && s.to.is_none()));
        assert_eq!(segments[1].meta.as_ref().unwrap()["num"], "٢");
    }

    #[test]
    fn test_no_rules_spans_pages() {
        let pages = vec![Page::new(1, "بداية النص"), Page::new(2, "تابع النص")];
        let segments = segment_pages(&pages, &SegmentationOptions::with_rules(vec![], 1)).unwrap();
        assert_eq!(
            segments,
            vec![Segment {
                from: 1,
                to: Some(2),
                content: "بداية النصتابع النص".to_string(),
                meta: None,
            }]
        );
    }

    #[test]
    fn test_max_pages_zero_cuts_at_page_edges() {
        let pages = vec![Page::new(10, "بداية النص"), Page::new(12, "تابع النص")];
        let segments = segment_pages(&pages, &SegmentationOptions::default()).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].from, segments[0].to), (10, None));
        assert_eq!((segments[1].from, segments[1].to), (12, None));
    }

    #[test]
    fn test_line_starts_with_keeps_marker() {
        let pages = vec![Page::new(1, "مقدمة\nباب الطهارة\nنص")];
        let rule = SegmentationRule::new(PatternType::LineStartsWith, "{{bab}} ").with_meta("type", "chapter");
        let segments = segment_pages(&pages, &SegmentationOptions::with_rules(vec![rule], 0)).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].content, "مقدمة");
        assert!(segments[0].meta.is_none());
        assert_eq!(segments[1].content, "باب الطهارة\nنص");
        assert_eq!(segments[1].meta.as_ref().unwrap()["type"], "chapter");
    }

    #[test]
    fn test_earlier_rule_wins_at_same_offset() {
        let pages = vec![Page::new(1, "كتاب الصلاة")];
        let rules = vec![
            SegmentationRule::new(PatternType::LineStartsWith, "{{kitab}}").with_meta("type", "book"),
            SegmentationRule::new(PatternType::LineStartsWith, "{{kitab}} ").with_meta("type", "chapter"),
        ];
        let segments = segment_pages(&pages, &SegmentationOptions::with_rules(rules, 0)).unwrap();
        assert_eq!(segments[0].meta.as_ref().unwrap()["type"], "book");
    }

    #[test]
    fn test_prefer_longer_and_shorter() {
        let pages = vec![Page::new(1, "١ - نص")];
        let rules = vec![
            SegmentationRule::new(PatternType::LineStartsAfter, "{{raqms}}").with_meta("v", "short"),
            SegmentationRule::new(PatternType::LineStartsAfter, "{{numbered}}").with_meta("v", "long"),
        ];

        let mut options = SegmentationOptions::with_rules(rules, 0);
        options.prefer = Some(Prefer::Longer);
        let segments = segment_pages(&pages, &options).unwrap();
        assert_eq!(segments[0].meta.as_ref().unwrap()["v"], "long");
        assert_eq!(segments[0].content, "نص");

        options.prefer = Some(Prefer::Shorter);
        let segments = segment_pages(&pages, &options).unwrap();
        assert_eq!(segments[0].meta.as_ref().unwrap()["v"], "short");
        assert_eq!(segments[0].content, "- نص");
    }

    #[test]
    fn test_page_start_guard() {
        let pages = vec![Page::new(1, "نص\n١ - أ"), Page::new(2, "٢ - ب")];
        let rule = numbered_rule().page_start_only();
        let segmentation = Segmenter::new(&SegmentationOptions::with_rules(vec![rule], 5))
            .unwrap()
            .run(&pages)
            .unwrap();
        let contents: Vec<_> = segmentation.segments.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["نص\n١ - أ", "ب"]);
        assert_eq!(segmentation.segments[1].from, 2);
    }

    #[test]
    fn test_min_discards_out_of_sequence_numbers() {
        let pages = vec![Page::new(1, "٥ - أ\n٢ - ترويسة\n٦ - ب")];
        let rule = numbered_rule().with_min(5);
        let segments = segment_pages(&pages, &SegmentationOptions::with_rules(vec![rule], 0)).unwrap();
        let contents: Vec<_> = segments.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["أ\n٢ - ترويسة", "ب"]);
    }

    #[test]
    fn test_template_rule_matches_mid_line() {
        let pages = vec![Page::new(1, "أول بسم الله ثاني")];
        let rule = SegmentationRule::new(PatternType::Template, "{{basmalah}}");
        let segments = segment_pages(&pages, &SegmentationOptions::with_rules(vec![rule], 0)).unwrap();
        let contents: Vec<_> = segments.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["أول", "بسم الله ثاني"]);
    }

    #[test]
    fn test_breakpoint_pair() {
        let pages = vec![Page::new(1, "قبل [ أ ] بين [ ب ] بعد")];
        let mut options = SegmentationOptions::default();
        options.breakpoints = Some(["[".to_string(), "]".to_string()]);
        let segments = segment_pages(&pages, &options).unwrap();
        let contents: Vec<_> = segments.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["قبل", "[ أ ]", "بين", "[ ب ]", "بعد"]);
    }

    #[test]
    fn test_breakpoint_block_ends_at_next_start() {
        let pages = vec![Page::new(1, "[ أ [ ب ] ج")];
        let mut options = SegmentationOptions::default();
        options.breakpoints = Some(["[".to_string(), "]".to_string()]);
        let segments = segment_pages(&pages, &options).unwrap();
        let contents: Vec<_> = segments.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["[ أ", "[ ب ]", "ج"]);
    }

    #[test]
    fn test_min_words_merges_into_following() {
        let pages = vec![Page::new(1, "١ - قال\n٢ - حدثنا فلان عن فلان\n٣ - أخبرنا فلان عن فلان")];
        let mut options = SegmentationOptions::with_rules(vec![numbered_rule()], 0);
        options.min_words_per_segment = Some(2);
        let segments = segment_pages(&pages, &options).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].content, "قال\n٢ - حدثنا فلان عن فلان");
        assert_eq!(segments[0].meta.as_ref().unwrap()["num"], "١");
    }

    #[test]
    fn test_min_words_does_not_merge_across_pages_when_capped() {
        let pages = vec![Page::new(1, "١ - قال"), Page::new(2, "٢ - حدثنا فلان عن فلان")];
        let mut options = SegmentationOptions::with_rules(vec![numbered_rule()], 0);
        options.min_words_per_segment = Some(2);
        let segments = segment_pages(&pages, &options).unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_traces_point_at_content() {
        let pages = vec![Page::new(1, "١ - أ\n"), Page::new(2, "٢ - ب")];
        let segmentation = Segmenter::new(&SegmentationOptions::with_rules(vec![numbered_rule()], 2))
            .unwrap()
            .run(&pages)
            .unwrap();
        for (segment, trace) in segmentation.segments.iter().zip(&segmentation.traces) {
            assert_eq!(&segmentation.stream[trace.content.clone()], segment.content);
            let marker = trace.marker.clone().unwrap();
            assert!(segmentation.stream[marker].ends_with("- "));
        }
    }

    #[test]
    fn test_iteration_limit() {
        let pages = vec![Page::new(1, "أ\nب\nج\nد")];
        let result = Segmenter::new(&SegmentationOptions::with_rules(vec![numbered_rule()], 0))
            .unwrap()
            .with_iteration_limit(2)
            .run(&pages);
        assert!(matches!(result, Err(SegmenterError::SegmentationTimeout { .. })));
    }

    #[test]
    fn test_compile_errors_fail_before_scanning() {
        let rule = SegmentationRule::new(PatternType::LineStartsWith, "{{nope}}");
        let result = Segmenter::new(&SegmentationOptions::with_rules(vec![rule], 0));
        assert!(matches!(result, Err(SegmenterError::UnknownToken { .. })));
    }

    #[test]
    fn test_replacements_run_first() {
        let pages = vec![Page::new(1, "1 - أ\n2 - ب")];
        let mut options = SegmentationOptions::with_rules(vec![numbered_rule()], 0);
        options.replace = vec![
            crate::types::ReplacementRule {
                regex: "1".to_string(),
                replacement: "١".to_string(),
                flags: None,
                pages: None,
            },
            crate::types::ReplacementRule {
                regex: "2".to_string(),
                replacement: "٢".to_string(),
                flags: None,
                pages: None,
            },
        ];
        let segments = segment_pages(&pages, &options).unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(segment_pages(&[], &SegmentationOptions::default()).unwrap().is_empty());
        let pages = vec![Page::new(1, "  \n ")];
        assert!(segment_pages(&pages, &SegmentationOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_page_index_skips_empty_pages() {
        let pages = vec![Page::new(1, "أ"), Page::new(2, ""), Page::new(3, "ب")];
        let (stream, index) = PageIndex::build(&pages);
        assert_eq!(index.id_at(0), 1);
        assert_eq!(index.id_at(stream.len() - 1), 3);
        assert!(index.is_page_start("أ".len()));
    }
}
