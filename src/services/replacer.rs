use crate::error::{Result, SegmenterError};
use crate::types::{Page, PageId, ReplacementRule};
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorPart {
    Single(PageId),
    Range(PageId, PageId),
    From(PageId),
}

/// Which pages a replacement rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSelector {
    All,
    Disabled,
    Parts(Vec<SelectorPart>),
}

impl PageSelector {
    /// Parses `"1,3,5-7,10+"`. `None` selects every page, an empty string none.
    pub fn parse(expr: Option<&str>) -> Result<Self> {
        let expr = match expr {
            None => return Ok(PageSelector::All),
            Some(expr) if expr.trim().is_empty() => return Ok(PageSelector::Disabled),
            Some(expr) => expr,
        };

        let invalid = |reason: String| SegmenterError::InvalidPageSelector {
            selector: expr.to_string(),
            reason,
        };
        let number = |text: &str| {
            text.trim()
                .parse::<PageId>()
                .map_err(|_| invalid(format!("'{}' is not a page id", text.trim())))
        };

        let mut parts = Vec::new();
        for item in expr.split(',').map(str::trim) {
            if item.is_empty() {
                return Err(invalid("empty list item".to_string()));
            }
            let part = if let Some(start) = item.strip_suffix('+') {
                SelectorPart::From(number(start)?)
            } else if let Some((start, end)) = item.split_once('-') {
                let (start, end) = (number(start)?, number(end)?);
                if start > end {
                    return Err(invalid(format!("range {}-{} is reversed", start, end)));
                }
                SelectorPart::Range(start, end)
            } else {
                SelectorPart::Single(number(item)?)
            };
            parts.push(part);
        }

        Ok(PageSelector::Parts(parts))
    }

    pub fn contains(&self, id: PageId) -> bool {
        match self {
            PageSelector::All => true,
            PageSelector::Disabled => false,
            PageSelector::Parts(parts) => parts.iter().any(|part| match *part {
                SelectorPart::Single(page) => page == id,
                SelectorPart::Range(start, end) => (start..=end).contains(&id),
                SelectorPart::From(start) => id >= start,
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledReplacement {
    regex: Regex,
    replacement: String,
    selector: PageSelector,
}

/// Ordered regex replacements applied to page content before segmentation.
#[derive(Debug, Clone, Default)]
pub struct Replacer {
    rules: Vec<CompiledReplacement>,
}

impl Replacer {
    pub fn new(rules: &[ReplacementRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let invalid = |reason: String| SegmenterError::InvalidReplacement {
                    regex: rule.regex.clone(),
                    reason,
                };

                let mut builder = RegexBuilder::new(&rule.regex);
                for flag in rule.flags.as_deref().unwrap_or("").chars() {
                    match flag {
                        'g' | 'u' => {}
                        'i' => {
                            builder.case_insensitive(true);
                        }
                        'm' => {
                            builder.multi_line(true);
                        }
                        's' => {
                            builder.dot_matches_new_line(true);
                        }
                        'x' => {
                            builder.ignore_whitespace(true);
                        }
                        other => return Err(invalid(format!("unsupported flag '{}'", other))),
                    }
                }
                let regex = builder.build().map_err(|e| invalid(e.to_string()))?;

                Ok(CompiledReplacement {
                    regex,
                    replacement: translate_replacement(&rule.replacement),
                    selector: PageSelector::parse(rule.pages.as_deref())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply_to<'a>(&self, id: PageId, content: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(content);
        for rule in self.rules.iter().filter(|rule| rule.selector.contains(id)) {
            let replaced = match rule.regex.replace_all(&current, rule.replacement.as_str()) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            if let Some(replaced) = replaced {
                current = Cow::Owned(replaced);
            }
        }
        current
    }

    pub fn apply(&self, pages: &[Page]) -> Vec<Page> {
        let mut changed = 0;
        let pages = pages
            .iter()
            .map(|page| {
                let content = self.apply_to(page.id, &page.content);
                if matches!(content, Cow::Owned(_)) {
                    changed += 1;
                }
                Page::new(page.id, content.into_owned())
            })
            .collect();
        debug!("Replacement rules changed {} pages", changed);
        pages
    }
}

/// Rewrites `$1`, `$<name>` and `$&` references into the `${..}` form used by `regex`.
fn translate_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some('<') => {
                let rest: String = chars.clone().skip(1).take_while(|&c| c != '>').collect();
                let closed = chars.clone().nth(1 + rest.chars().count()) == Some('>');
                if closed && !rest.is_empty() {
                    for _ in 0..rest.chars().count() + 2 {
                        chars.next();
                    }
                    out.push_str(&format!("${{{}}}", rest));
                } else {
                    out.push_str("$$");
                }
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() || digits.len() == 2 {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                out.push_str(&format!("${{{}}}", digits));
            }
            _ => out.push_str("$$"),
        }
    }

    out
}
