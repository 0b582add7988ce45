use crate::error::{Result, SegmenterError};
use crate::services::tokens::{is_token_name, parse_numeral, TokenTable};
use crate::types::{Meta, PatternType, TemplateSource};
use regex::{Captures, Regex};
use tracing::debug;

/// Whitespace run in a fuzzy template: at least one whitespace character,
/// with harakat allowed on either side.
const FUZZY_GAP: &str = r"[\x{064B}-\x{065F}\x{0670}]*\s[\s\x{064B}-\x{065F}\x{0670}]*";

pub(crate) const ZERO_WIDTH_REASON: &str = "pattern can match an empty string";

/// Horizontal indentation tolerated before a fuzzy line-start marker.
const FUZZY_INDENT: &str = r"[\p{Zs}\t]*";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece<'a> {
    Literal(&'a str),
    Placeholder { name: &'a str, label: Option<&'a str> },
}

/// A template turned into a regex plus the capture groups that feed excerpt metadata.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    /// (regex group name, label declared in the template)
    captures: Vec<(String, String)>,
}

impl CompiledPattern {
    pub fn source(&self) -> &str {
        self.regex.as_str()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.captures.iter().map(|(_, label)| label.as_str())
    }

    pub fn has_captures(&self) -> bool {
        !self.captures.is_empty()
    }

    /// Captured values keyed by their template labels.
    pub fn captured_meta(&self, caps: &Captures) -> Meta {
        let mut meta = Meta::new();
        for (group, label) in &self.captures {
            if let Some(m) = caps.name(group) {
                meta.entry(label.clone())
                    .or_insert_with(|| m.as_str().trim().to_string());
            }
        }
        meta
    }

    /// First captured value that reads as a number.
    pub fn numeric_capture(&self, caps: &Captures) -> Option<u64> {
        self.captures
            .iter()
            .filter_map(|(group, _)| caps.name(group))
            .find_map(|m| parse_numeral(m.as_str()))
    }
}

/// Expands `{{token}}` / `{{token:label}}` templates against a token table.
#[derive(Debug, Clone, Copy)]
pub struct TemplateCompiler<'t> {
    tokens: &'t TokenTable,
}

impl Default for TemplateCompiler<'static> {
    fn default() -> Self {
        Self::new(TokenTable::builtin())
    }
}

impl<'t> TemplateCompiler<'t> {
    pub fn new(tokens: &'t TokenTable) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &'t TokenTable {
        self.tokens
    }

    pub fn compile(
        &self,
        template: &TemplateSource,
        pattern_type: PatternType,
        fuzzy: bool,
    ) -> Result<CompiledPattern> {
        let shown = template.display();
        let variants = template.variants();
        if variants.is_empty() {
            return Err(SegmenterError::compile(&shown, "template has no variants"));
        }

        let mut captures = Vec::new();
        let mut bodies = Vec::with_capacity(variants.len());
        for variant in variants {
            let body = self.expand(variant, fuzzy, &mut captures, &mut Vec::new())?;
            reject_zero_width(variant, &body)?;
            bodies.push(format!("(?:{})", body));
        }
        let alternation = bodies.join("|");

        let source = match pattern_type {
            PatternType::LineStartsWith | PatternType::LineStartsAfter if fuzzy => {
                format!("^{}(?:{})", FUZZY_INDENT, alternation)
            }
            PatternType::LineStartsWith | PatternType::LineStartsAfter => {
                format!("^(?:{})", alternation)
            }
            PatternType::Template => format!("(?:{})", alternation),
        };

        let regex = Regex::new(&source).map_err(|e| SegmenterError::compile(&shown, e.to_string()))?;
        debug!("Compiled template '{}' to /{}/", shown, source);

        Ok(CompiledPattern { regex, captures })
    }

    /// Regex body for one template string, without anchoring.
    fn expand(
        &self,
        template: &str,
        fuzzy: bool,
        captures: &mut Vec<(String, String)>,
        stack: &mut Vec<String>,
    ) -> Result<String> {
        let mut body = String::new();

        for piece in parse_template(template)? {
            match piece {
                Piece::Literal(text) => body.push_str(&literal(text, fuzzy)),
                Piece::Placeholder { name, label } => {
                    let token = self
                        .tokens
                        .get(name)
                        .ok_or_else(|| SegmenterError::UnknownToken {
                            name: name.to_string(),
                        })?;

                    let inner = if token.composite {
                        if stack.iter().any(|seen| seen == name) {
                            return Err(SegmenterError::compile(
                                template,
                                format!("token '{}' refers to itself", name),
                            ));
                        }
                        stack.push(name.to_string());
                        let inner = self.expand(&token.regex, fuzzy, captures, stack)?;
                        stack.pop();
                        inner
                    } else {
                        token.regex.clone()
                    };

                    match label {
                        Some(label) => {
                            let group = format!("c{}", captures.len());
                            body.push_str(&format!("(?P<{}>{})", group, inner));
                            captures.push((group, label.to_string()));
                        }
                        None => body.push_str(&format!("(?:{})", inner)),
                    }
                }
            }
        }

        Ok(body)
    }
}

fn parse_template(template: &str) -> Result<Vec<Piece<'_>>> {
    let mut pieces = Vec::new();
    let mut rest = template;

    loop {
        let open = rest.find("{{");
        let close = rest.find("}}");
        match (open, close) {
            (None, None) => {
                if !rest.is_empty() {
                    pieces.push(Piece::Literal(rest));
                }
                return Ok(pieces);
            }
            (None, Some(_)) => {
                return Err(SegmenterError::compile(template, "'}}' without matching '{{'"));
            }
            (Some(open), close) => {
                if matches!(close, Some(close) if close < open) {
                    return Err(SegmenterError::compile(template, "'}}' without matching '{{'"));
                }
                if open > 0 {
                    pieces.push(Piece::Literal(&rest[..open]));
                }

                let after = &rest[open + 2..];
                let end = after
                    .find("}}")
                    .ok_or_else(|| SegmenterError::compile(template, "unclosed '{{'"))?;
                let inner = &after[..end];

                let (name, label) = match inner.split_once(':') {
                    Some((name, label)) => (name.trim(), Some(label.trim())),
                    None => (inner.trim(), None),
                };
                if !is_token_name(name) {
                    return Err(SegmenterError::compile(
                        template,
                        format!("malformed placeholder '{{{{{}}}}}'", inner),
                    ));
                }
                if matches!(label, Some(label) if label.is_empty()) {
                    return Err(SegmenterError::compile(
                        template,
                        format!("empty capture label in '{{{{{}}}}}'", inner),
                    ));
                }

                pieces.push(Piece::Placeholder { name, label });
                rest = &after[end + 2..];
            }
        }
    }
}

fn literal(text: &str, fuzzy: bool) -> String {
    if !fuzzy {
        return regex::escape(text);
    }

    let mut out = String::new();
    let mut in_gap = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_gap {
                out.push_str(FUZZY_GAP);
                in_gap = true;
            }
        } else {
            in_gap = false;
            out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
        }
    }
    out
}

fn reject_zero_width(template: &str, body: &str) -> Result<()> {
    let whole = Regex::new(&format!("^(?:{})$", body))
        .map_err(|e| SegmenterError::compile(template, e.to_string()))?;
    if whole.is_match("") {
        return Err(SegmenterError::compile(template, ZERO_WIDTH_REASON));
    }
    Ok(())
}
