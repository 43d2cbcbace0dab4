//! Small CSS selector matcher for the fake DOM.
//!
//! Supported: type selectors, `*`, `#id`, `.class`, `[attr]`,
//! `[attr=value]` (bare or quoted), the descendant combinator and `,`
//! groups. Anything else is rejected with
//! [`WebprobeError::InvalidSelector`].

use super::dom::{DomTree, NodeId};
use crate::result::{WebprobeError, WebprobeResult};

/// Parsed selector group list (`a, b .c`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    groups: Vec<Complex>,
}

/// Compounds joined by descendant combinators; the last one is the subject
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCond>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCond {
    name: String,
    value: Option<String>,
}

impl SelectorList {
    /// Parse a selector expression
    ///
    /// # Errors
    ///
    /// Returns [`WebprobeError::InvalidSelector`] on unsupported syntax.
    pub fn parse(input: &str) -> WebprobeResult<Self> {
        let invalid = |message: &str| WebprobeError::InvalidSelector {
            selector: input.to_string(),
            message: message.to_string(),
        };

        let mut groups = Vec::new();
        for group in split_top_level(input, |c| c == ',') {
            let parts: Vec<&str> = split_top_level(group, char::is_whitespace)
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect();
            if parts.is_empty() {
                return Err(invalid("empty selector"));
            }
            let compounds = parts
                .into_iter()
                .map(|p| parse_compound(p).map_err(|m| invalid(&m)))
                .collect::<WebprobeResult<Vec<_>>>()?;
            groups.push(Complex { compounds });
        }
        Ok(Self { groups })
    }

    /// Whether `node` matches any group
    #[must_use]
    pub fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        self.groups.iter().any(|g| g.matches(tree, node))
    }
}

impl Complex {
    fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        let Some((subject, ancestors)) = self.compounds.split_last() else {
            return false;
        };
        if !subject.matches(tree, node) {
            return false;
        }
        // Descendant-only chains match greedily: the nearest qualifying
        // ancestor is always a valid choice.
        let mut cursor = tree.parent(node);
        for compound in ancestors.iter().rev() {
            loop {
                match cursor {
                    Some(candidate) => {
                        cursor = tree.parent(candidate);
                        if compound.matches(tree, candidate) {
                            break;
                        }
                    }
                    None => return false,
                }
            }
        }
        true
    }
}

impl Compound {
    fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        if let Some(ref tag) = self.tag {
            if !tree.tag(node).is_some_and(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(ref id) = self.id {
            if tree.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = tree.attr(node, "class").unwrap_or_default();
            let has = |c: &String| classes.split_whitespace().any(|have| have == c.as_str());
            if !self.classes.iter().all(has) {
                return false;
            }
        }
        self.attrs.iter().all(|cond| match (tree.attr(node, &cond.name), &cond.value) {
            (Some(actual), Some(expected)) => actual == expected.as_str(),
            (Some(_), None) => true,
            (None, _) => false,
        })
    }
}

/// Split on separator characters that sit outside brackets and quotes
fn split_top_level(input: &str, is_sep: impl Fn(char) -> bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                c if depth == 0 && is_sep(c) => {
                    parts.push(&input[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&input[start..]);
    parts
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Take a leading identifier from `s`
fn ident(s: &str) -> Result<(&str, &str), String> {
    let end = s.find(|c| !is_ident_char(c)).unwrap_or(s.len());
    if end == 0 {
        return Err(format!("expected identifier at {s:?}"));
    }
    Ok(s.split_at(end))
}

fn parse_compound(input: &str) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let mut rest = input;

    if let Some(after) = rest.strip_prefix('*') {
        rest = after;
    } else if rest.starts_with(is_ident_char) {
        let (tag, after) = ident(rest)?;
        compound.tag = Some(tag.to_ascii_lowercase());
        rest = after;
    }

    while let Some(c) = rest.chars().next() {
        match c {
            '#' => {
                let (id, after) = ident(&rest[1..])?;
                compound.id = Some(id.to_string());
                rest = after;
            }
            '.' => {
                let (class, after) = ident(&rest[1..])?;
                compound.classes.push(class.to_string());
                rest = after;
            }
            '[' => {
                let close = closing_bracket(rest).ok_or("unterminated attribute selector")?;
                compound.attrs.push(parse_attr(&rest[1..close])?);
                rest = &rest[close + 1..];
            }
            '>' | '+' | '~' => return Err(format!("unsupported combinator {c:?}")),
            ':' => return Err("pseudo-classes are not supported".to_string()),
            other => return Err(format!("unexpected character {other:?}")),
        }
    }

    Ok(compound)
}

/// Byte index of the `]` closing the bracket that opens `s`
fn closing_bracket(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices().skip(1) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == ']' => return Some(i),
            None => {}
        }
    }
    None
}

fn parse_attr(body: &str) -> Result<AttrCond, String> {
    let body = body.trim();
    let (name, rest) = ident(body)?;
    let rest = rest.trim_start();
    if rest.is_empty() {
        return Ok(AttrCond {
            name: name.to_string(),
            value: None,
        });
    }
    let raw = rest
        .strip_prefix('=')
        .ok_or_else(|| format!("unsupported attribute operator in [{body}]"))?
        .trim();
    let value = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => raw
            .strip_prefix(q)
            .and_then(|v| v.strip_suffix(q))
            .ok_or_else(|| format!("unbalanced quotes in [{body}]"))?,
        _ => {
            let (bare, tail) = ident(raw)?;
            if !tail.is_empty() {
                return Err(format!("unexpected {tail:?} in [{body}]"));
            }
            bare
        }
    };
    Ok(AttrCond {
        name: name.to_string(),
        value: Some(value.to_string()),
    })
}
