//! CSS selector subset used for target-element recognition
//!
//! Site configs carry arbitrary selector strings, so parsing must be able to
//! fail per selector: a selector the grammar does not cover is a
//! `SelectorError` the caller skips, never a crash. The grammar covers what
//! chat-site configs actually use: compound selectors (tag, `*`, `#id`,
//! `.class`, `[attr]`, `[attr=v]`, `[attr~=v]`), descendant and child
//! combinators, and comma-separated selector lists.

use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

use crate::dom::{Document, Element, NodeId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unsupported selector syntax near '{0}'")]
    Unsupported(String),
    #[error("unterminated attribute selector")]
    UnterminatedAttribute,
}

/// A parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<ComplexSelector>,
}

/// One comma-separated alternative: compounds joined by combinators,
/// stored left to right (`compounds[i]` precedes `combinators[i]`)
#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    /// None matches any tag (`*` or no tag written)
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCheck>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrCheck {
    Present(String),
    /// [attr=value]
    Equals(String, String),
    /// [attr~=value]: value is one of the attribute's whitespace-separated words
    Includes(String, String),
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
    }
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut alternatives = Vec::new();
        for part in split_alternatives(input) {
            let part = part.trim();
            if part.is_empty() {
                return Err(SelectorError::Empty);
            }
            alternatives.push(parse_complex(part)?);
        }
        if alternatives.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Selector { alternatives })
    }

    /// Element.matches(): does `node` itself match any alternative?
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|complex| complex_matches(complex, doc, node))
    }

    /// Element.closest(): nearest ancestor-or-self that matches
    pub fn closest(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        if self.matches(doc, node) {
            return Some(node);
        }
        self.ancestors_matching(doc, node)
    }

    fn ancestors_matching(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        doc.ancestors(node).find(|&a| self.matches(doc, a))
    }
}

/// Split on commas outside brackets and quotes
fn split_alternatives(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn parse_complex(input: &str) -> Result<ComplexSelector, SelectorError> {
    let mut chars = input.chars().peekable();
    let mut compounds = Vec::new();
    let mut combinators = Vec::new();

    skip_whitespace(&mut chars);
    compounds.push(parse_compound(&mut chars)?);

    loop {
        let saw_whitespace = skip_whitespace(&mut chars);
        match chars.peek() {
            None => break,
            Some('>') => {
                chars.next();
                skip_whitespace(&mut chars);
                combinators.push(Combinator::Child);
            }
            Some(_) if saw_whitespace => combinators.push(Combinator::Descendant),
            Some(&c) => return Err(SelectorError::Unsupported(c.to_string())),
        }
        compounds.push(parse_compound(&mut chars)?);
    }

    Ok(ComplexSelector {
        compounds,
        combinators,
    })
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) -> bool {
    let mut skipped = false;
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
        skipped = true;
    }
    skipped
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_ident(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut ident = String::new();
    while chars.peek().copied().is_some_and(is_ident_char) {
        ident.push(chars.next().unwrap());
    }
    ident
}

fn parse_compound(chars: &mut Peekable<Chars<'_>>) -> Result<Compound, SelectorError> {
    let mut compound = Compound::default();
    let mut universal = false;

    if chars.peek() == Some(&'*') {
        chars.next();
        universal = true;
    } else if chars.peek().copied().is_some_and(is_ident_char) {
        compound.tag = Some(parse_ident(chars));
    }

    loop {
        match chars.peek() {
            Some('#') => {
                chars.next();
                let id = parse_ident(chars);
                if id.is_empty() {
                    return Err(SelectorError::Unsupported("#".to_string()));
                }
                compound.id = Some(id);
            }
            Some('.') => {
                chars.next();
                let class = parse_ident(chars);
                if class.is_empty() {
                    return Err(SelectorError::Unsupported(".".to_string()));
                }
                compound.classes.push(class);
            }
            Some('[') => {
                chars.next();
                compound.attrs.push(parse_attr(chars)?);
            }
            // Whitespace, '>' and end-of-input terminate the compound;
            // anything else (pseudo-classes, sibling combinators, ...) is
            // outside the grammar
            Some(&c) if !c.is_whitespace() && c != '>' => {
                return Err(SelectorError::Unsupported(c.to_string()));
            }
            _ => break,
        }
    }

    if compound.is_empty() && !universal {
        return match chars.peek() {
            Some(&c) => Err(SelectorError::Unsupported(c.to_string())),
            None => Err(SelectorError::Empty),
        };
    }
    Ok(compound)
}

fn parse_attr(chars: &mut Peekable<Chars<'_>>) -> Result<AttrCheck, SelectorError> {
    skip_whitespace(chars);
    let name = parse_ident(chars);
    if name.is_empty() {
        return Err(SelectorError::Unsupported("[".to_string()));
    }
    skip_whitespace(chars);

    match chars.next() {
        Some(']') => Ok(AttrCheck::Present(name)),
        Some('=') => {
            let value = parse_attr_value(chars)?;
            Ok(AttrCheck::Equals(name, value))
        }
        Some('~') => {
            if chars.next() != Some('=') {
                return Err(SelectorError::Unsupported("~".to_string()));
            }
            let value = parse_attr_value(chars)?;
            Ok(AttrCheck::Includes(name, value))
        }
        Some(c) => Err(SelectorError::Unsupported(c.to_string())),
        None => Err(SelectorError::UnterminatedAttribute),
    }
}

fn parse_attr_value(chars: &mut Peekable<Chars<'_>>) -> Result<String, SelectorError> {
    skip_whitespace(chars);
    let mut value = String::new();
    match chars.peek() {
        Some(&q @ ('"' | '\'')) => {
            chars.next();
            loop {
                match chars.next() {
                    Some(c) if c == q => break,
                    Some(c) => value.push(c),
                    None => return Err(SelectorError::UnterminatedAttribute),
                }
            }
        }
        _ => {
            while chars.peek().is_some_and(|&c| c != ']' && !c.is_whitespace()) {
                value.push(chars.next().unwrap());
            }
        }
    }
    skip_whitespace(chars);
    match chars.next() {
        Some(']') => Ok(value),
        Some(c) => Err(SelectorError::Unsupported(c.to_string())),
        None => Err(SelectorError::UnterminatedAttribute),
    }
}

fn compound_matches(compound: &Compound, el: &Element) -> bool {
    if let Some(tag) = &compound.tag {
        // Tag names compare case-insensitively, as in HTML documents
        if !tag.eq_ignore_ascii_case(&el.tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if el.id() != Some(id.as_str()) {
            return false;
        }
    }
    compound.classes.iter().all(|c| el.classes().any(|e| e == c.as_str()))
        && compound.attrs.iter().all(|a| attr_matches(a, el))
}

fn attr_matches(check: &AttrCheck, el: &Element) -> bool {
    match check {
        AttrCheck::Present(name) => el.has_attribute(name),
        AttrCheck::Equals(name, value) => {
            el.attributes.get(name).map(String::as_str) == Some(value.as_str())
        }
        AttrCheck::Includes(name, value) => el
            .attributes
            .get(name)
            .is_some_and(|v| v.split_whitespace().any(|w| w == value)),
    }
}

fn complex_matches(complex: &ComplexSelector, doc: &Document, node: NodeId) -> bool {
    let last = complex.compounds.len() - 1;
    let Some(el) = doc.get(node) else {
        return false;
    };
    if !compound_matches(&complex.compounds[last], el) {
        return false;
    }
    match_leftward(complex, last, doc, node)
}

/// Match compounds to the left of `index` against ancestors of `node`,
/// backtracking through the ancestor chain for descendant combinators
fn match_leftward(complex: &ComplexSelector, index: usize, doc: &Document, node: NodeId) -> bool {
    if index == 0 {
        return true;
    }
    let compound = &complex.compounds[index - 1];
    match complex.combinators[index - 1] {
        Combinator::Child => {
            let Some(parent) = doc.parent(node) else {
                return false;
            };
            doc.get(parent)
                .is_some_and(|el| compound_matches(compound, el))
                && match_leftward(complex, index - 1, doc, parent)
        }
        Combinator::Descendant => doc.ancestors(node).any(|ancestor| {
            doc.get(ancestor)
                .is_some_and(|el| compound_matches(compound, el))
                && match_leftward(complex, index - 1, doc, ancestor)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn element(tag: &str, parent: Option<NodeId>, attrs: &[(&str, &str)]) -> Element {
        Element {
            tag: tag.to_string(),
            parent,
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            ..Element::default()
        }
    }

    /// html > body > div.chat[data-slate-editor] > textarea#msg.chat-input
    fn chat_document() -> Document {
        Document::new(vec![
            element("html", None, &[]),
            element("body", Some(0), &[]),
            element(
                "div",
                Some(1),
                &[("class", "chat panel"), ("data-slate-editor", "true")],
            ),
            element(
                "textarea",
                Some(2),
                &[("id", "msg"), ("class", "chat-input")],
            ),
        ])
    }

    #[test]
    fn test_compound_tag_id_class() {
        let doc = chat_document();
        assert!(Selector::parse("textarea").unwrap().matches(&doc, 3));
        assert!(Selector::parse("#msg").unwrap().matches(&doc, 3));
        assert!(Selector::parse(".chat-input").unwrap().matches(&doc, 3));
        assert!(Selector::parse("textarea#msg.chat-input").unwrap().matches(&doc, 3));
        assert!(!Selector::parse("input#msg").unwrap().matches(&doc, 3));
    }

    #[test]
    fn test_tag_matches_case_insensitively() {
        let doc = chat_document();
        assert!(Selector::parse("TEXTAREA").unwrap().matches(&doc, 3));
    }

    #[test]
    fn test_attribute_selectors() {
        let doc = chat_document();
        assert!(Selector::parse("[data-slate-editor]").unwrap().matches(&doc, 2));
        assert!(Selector::parse("[data-slate-editor=true]").unwrap().matches(&doc, 2));
        assert!(Selector::parse("[data-slate-editor=\"true\"]").unwrap().matches(&doc, 2));
        assert!(Selector::parse("[class~=panel]").unwrap().matches(&doc, 2));
        assert!(!Selector::parse("[class~=pan]").unwrap().matches(&doc, 2));
        assert!(!Selector::parse("[data-slate-editor=false]").unwrap().matches(&doc, 2));
    }

    #[test]
    fn test_descendant_and_child_combinators() {
        let doc = chat_document();
        assert!(Selector::parse("body textarea").unwrap().matches(&doc, 3));
        assert!(Selector::parse("html textarea").unwrap().matches(&doc, 3));
        assert!(Selector::parse("div.chat > textarea").unwrap().matches(&doc, 3));
        // body is the grandparent, not the parent
        assert!(!Selector::parse("body > textarea").unwrap().matches(&doc, 3));
    }

    #[test]
    fn test_selector_list_any_alternative() {
        let doc = chat_document();
        let sel = Selector::parse("input.chat-input, textarea.chat-input").unwrap();
        assert!(sel.matches(&doc, 3));
    }

    #[test]
    fn test_closest_finds_ancestor_or_self() {
        let doc = chat_document();
        let sel = Selector::parse("div.chat").unwrap();
        assert_eq!(sel.closest(&doc, 3), Some(2));
        assert_eq!(sel.closest(&doc, 2), Some(2));
        assert_eq!(sel.closest(&doc, 1), None);
    }

    #[test]
    fn test_unsupported_syntax_is_an_error() {
        assert!(matches!(
            Selector::parse("textarea:focus"),
            Err(SelectorError::Unsupported(_))
        ));
        assert!(matches!(
            Selector::parse("div + textarea"),
            Err(SelectorError::Unsupported(_))
        ));
        assert!(matches!(
            Selector::parse("[contenteditable^=tr]"),
            Err(SelectorError::Unsupported(_))
        ));
        assert_eq!(Selector::parse(""), Err(SelectorError::Empty));
        assert_eq!(Selector::parse("  ,textarea"), Err(SelectorError::Empty));
        assert!(matches!(
            Selector::parse("[data-foo"),
            Err(SelectorError::UnterminatedAttribute)
        ));
    }
}
