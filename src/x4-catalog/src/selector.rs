//! Path selectors for diff patch operations
//!
//! Expansion patches address their targets with a small XPath subset in the
//! `sel` attribute, e.g. `/wares/ware[@id='energycells']/price/@average` or
//! `//macros/macro/properties/workforce`. Supported:
//!
//! - `/name` child steps and `//name` descendant steps, `*` wildcard
//! - predicates `[@a='v']`, `[@a]`, `[not(@a)]`, `[n]`, `[last()]`, joined
//!   with `and`
//! - a trailing `/@attr` step addressing an attribute of the matched element
//!
//! Matches are returned as child-index paths from the root so callers can
//! mutate the tree afterwards.

use std::collections::{BTreeMap, BTreeSet};

use crate::document::{Element, Node};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    AttrEquals(String, String),
    HasAttr(String),
    MissingAttr(String),
    Position(usize),
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    name: String,
    predicates: Vec<Vec<Predicate>>,
}

/// Node index path from the document root; empty means the root itself
pub type NodePath = Vec<usize>;

/// A parsed `sel` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    steps: Vec<Step>,
    attribute: Option<String>,
}

impl Selector {
    pub fn parse(raw: &str) -> Result<Self> {
        let fail = |reason: &str| Error::Selector {
            selector: raw.to_string(),
            reason: reason.to_string(),
        };

        let text = raw.trim();
        let bytes = text.as_bytes();
        let mut pos = 0;
        let mut steps = Vec::new();
        let mut attribute = None;

        while pos < bytes.len() {
            if attribute.is_some() {
                return Err(fail("attribute step must be last"));
            }

            let axis = if text[pos..].starts_with("//") {
                pos += 2;
                Axis::Descendant
            } else if bytes[pos] == b'/' {
                pos += 1;
                Axis::Child
            } else if steps.is_empty() {
                Axis::Child
            } else {
                return Err(fail("expected '/'"));
            };

            let name_start = pos;
            while pos < bytes.len() && bytes[pos] != b'/' && bytes[pos] != b'[' {
                pos += 1;
            }
            let name = text[name_start..pos].trim();
            if name.is_empty() {
                return Err(fail("empty step"));
            }

            if let Some(attr) = name.strip_prefix('@') {
                if axis == Axis::Descendant {
                    return Err(fail("descendant attribute steps are not supported"));
                }
                attribute = Some(attr.to_string());
                continue;
            }

            let mut predicates = Vec::new();
            while pos < bytes.len() && bytes[pos] == b'[' {
                let end = closing_bracket(text, pos).ok_or_else(|| fail("unclosed '['"))?;
                let body = &text[pos + 1..end];
                predicates.push(parse_predicate(body).ok_or_else(|| fail("unsupported predicate"))?);
                pos = end + 1;
            }

            steps.push(Step {
                axis,
                name: name.to_string(),
                predicates,
            });
        }

        if steps.is_empty() {
            return Err(fail("no element steps"));
        }

        Ok(Self { steps, attribute })
    }

    /// Attribute addressed by a trailing `/@attr` step
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Element paths matched by this selector, in document order
    pub fn select(&self, root: &Element) -> Vec<NodePath> {
        // The first step is evaluated against a virtual document node whose
        // only child is the root element.
        let mut current: Vec<NodePath> = Vec::new();

        for (i, step) in self.steps.iter().enumerate() {
            let mut next: Vec<NodePath> = Vec::new();

            if i == 0 {
                let mut candidates = Vec::new();
                match step.axis {
                    Axis::Child => candidates.push(Vec::new()),
                    Axis::Descendant => {
                        candidates.push(Vec::new());
                        descendant_paths(root, &mut Vec::new(), &mut candidates);
                    }
                }
                extend_unique(&mut next, filter_step(root, step, candidates));
            } else {
                for context in &current {
                    let Some(element) = element_at(root, context) else {
                        continue;
                    };
                    let mut candidates = Vec::new();
                    match step.axis {
                        Axis::Child => {
                            for (idx, node) in element.children.iter().enumerate() {
                                if matches!(node, Node::Element(_)) {
                                    let mut path = context.clone();
                                    path.push(idx);
                                    candidates.push(path);
                                }
                            }
                        }
                        Axis::Descendant => {
                            let mut prefix = context.clone();
                            descendant_paths(element, &mut prefix, &mut candidates);
                        }
                    }
                    extend_unique(&mut next, filter_step(root, step, candidates));
                }
            }

            current = next;
            if current.is_empty() {
                break;
            }
        }

        current
    }
}

/// Resolve a node path to its element
pub fn element_at<'a>(root: &'a Element, path: &[usize]) -> Option<&'a Element> {
    path.iter().try_fold(root, |element, &idx| match element.children.get(idx) {
        Some(Node::Element(child)) => Some(child),
        _ => None,
    })
}

/// Resolve a node path to its element, mutably
pub fn element_at_mut<'a>(root: &'a mut Element, path: &[usize]) -> Option<&'a mut Element> {
    path.iter().try_fold(root, |element, &idx| match element.children.get_mut(idx) {
        Some(Node::Element(child)) => Some(child),
        _ => None,
    })
}

fn filter_step(root: &Element, step: &Step, candidates: Vec<NodePath>) -> Vec<NodePath> {
    let matched: Vec<NodePath> = candidates
        .into_iter()
        .filter(|path| {
            element_at(root, path)
                .map(|e| step.name == "*" || e.name == step.name)
                .unwrap_or(false)
        })
        .collect();

    // Positions count among siblings, so survivors are grouped by parent.
    // Each bracket group filters the survivors of the previous one, so
    // `[@a='x'][2]` picks the second element with a='x'.
    let mut by_parent: BTreeMap<Option<&[usize]>, Vec<usize>> = BTreeMap::new();
    for (i, path) in matched.iter().enumerate() {
        let parent = path.split_last().map(|(_, parent)| parent);
        by_parent.entry(parent).or_default().push(i);
    }

    let mut kept = BTreeSet::new();
    for siblings in by_parent.into_values() {
        let mut survivors = siblings;
        for group in &step.predicates {
            let total = survivors.len();
            survivors = survivors
                .into_iter()
                .enumerate()
                .filter(|(position, i)| {
                    element_at(root, &matched[*i])
                        .map(|e| group.iter().all(|p| predicate_holds(p, e, position + 1, total)))
                        .unwrap_or(false)
                })
                .map(|(_, i)| i)
                .collect();
        }
        kept.extend(survivors);
    }

    matched
        .into_iter()
        .enumerate()
        .filter(|(i, _)| kept.contains(i))
        .map(|(_, path)| path)
        .collect()
}

fn predicate_holds(predicate: &Predicate, element: &Element, position: usize, total: usize) -> bool {
    match predicate {
        Predicate::AttrEquals(name, value) => element.attr(name) == Some(value.as_str()),
        Predicate::HasAttr(name) => element.attr(name).is_some(),
        Predicate::MissingAttr(name) => element.attr(name).is_none(),
        Predicate::Position(n) => position == *n,
        Predicate::Last => position == total,
    }
}

fn parse_predicate(body: &str) -> Option<Vec<Predicate>> {
    body.split(" and ").map(|clause| parse_clause(clause.trim())).collect()
}

fn parse_clause(clause: &str) -> Option<Predicate> {
    if clause == "last()" {
        return Some(Predicate::Last);
    }
    if let Ok(n) = clause.parse::<usize>() {
        return (n > 0).then_some(Predicate::Position(n));
    }
    if let Some(inner) = clause.strip_prefix("not(").and_then(|c| c.strip_suffix(')')) {
        let name = inner.trim().strip_prefix('@')?;
        return Some(Predicate::MissingAttr(name.trim().to_string()));
    }

    let attr = clause.strip_prefix('@')?;
    match attr.split_once('=') {
        Some((name, value)) => {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))?;
            Some(Predicate::AttrEquals(
                name.trim().to_string(),
                unquoted.to_string(),
            ))
        }
        None => Some(Predicate::HasAttr(attr.trim().to_string())),
    }
}

/// Index of the `]` closing the `[` at `open`, skipping quoted text
fn closing_bracket(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (i, c) in text[open..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove bracketed predicate text so only step names remain
pub(crate) fn strip_predicates(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in selector.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') if depth > 0 => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn descendant_paths(element: &Element, prefix: &mut Vec<usize>, out: &mut Vec<NodePath>) {
    for (idx, node) in element.children.iter().enumerate() {
        if let Node::Element(child) = node {
            prefix.push(idx);
            out.push(prefix.clone());
            descendant_paths(child, prefix, out);
            prefix.pop();
        }
    }
}

fn extend_unique(into: &mut Vec<NodePath>, paths: Vec<NodePath>) {
    for path in paths {
        if !into.contains(&path) {
            into.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Element {
        Element::parse(
            r#"<wares>
                <ware id="a" transport="container"><price average="10"/></ware>
                <ware id="b" transport="liquid"><price average="20"/></ware>
                <ware id="c"><production method="default"/><production method="terran"/></ware>
            </wares>"#,
        )
        .unwrap()
    }

    fn ids(root: &Element, sel: &str) -> Vec<String> {
        Selector::parse(sel)
            .unwrap()
            .select(root)
            .iter()
            .map(|p| {
                element_at(root, p)
                    .and_then(|e| e.attr("id").or(e.attr("method")))
                    .unwrap_or("")
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_absolute_path_with_attr_predicate() {
        let root = doc();
        assert_eq!(ids(&root, "/wares/ware[@id='b']"), ["b"]);
        assert_eq!(ids(&root, "/wares/ware[@id=\"a\"]"), ["a"]);
    }

    #[test]
    fn test_root_name_must_match() {
        let root = doc();
        assert!(Selector::parse("/macros/ware").unwrap().select(&root).is_empty());
    }

    #[test]
    fn test_descendant_and_positional() {
        let root = doc();
        assert_eq!(ids(&root, "//production"), ["default", "terran"]);
        assert_eq!(ids(&root, "//ware[@id='c']/production[2]"), ["terran"]);
        assert_eq!(ids(&root, "/wares/ware[last()]"), ["c"]);
    }

    #[test]
    fn test_descendant_position_counts_per_parent() {
        let root = Element::parse(
            r#"<macros>
                <macro name="a"><item id="a1"/><item id="a2"/></macro>
                <macro name="b"><item id="b1"/><item id="b2"/><item id="b3"/></macro>
            </macros>"#,
        )
        .unwrap();
        assert_eq!(ids(&root, "//item[1]"), ["a1", "b1"]);
        assert_eq!(ids(&root, "//item[last()]"), ["a2", "b3"]);
        assert_eq!(ids(&root, "//item[3]"), ["b3"]);
    }

    #[test]
    fn test_presence_predicates() {
        let root = doc();
        assert_eq!(ids(&root, "/wares/ware[@transport]"), ["a", "b"]);
        assert_eq!(ids(&root, "/wares/ware[not(@transport)]"), ["c"]);
        assert_eq!(
            ids(&root, "/wares/ware[@transport and @id='b']"),
            ["b"]
        );
    }

    #[test]
    fn test_attribute_step() {
        let sel = Selector::parse("/wares/ware[@id='a']/price/@average").unwrap();
        assert_eq!(sel.attribute(), Some("average"));
        assert_eq!(sel.select(&doc()).len(), 1);
    }

    #[test]
    fn test_rejects_bad_selectors() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("/wares/ware[@id='a'").is_err());
        assert!(Selector::parse("/wares/@id/ware").is_err());
        assert!(Selector::parse("/wares/ware[text()='x']").is_err());
    }

    #[test]
    fn test_strip_predicates() {
        assert_eq!(
            strip_predicates("/macros/macro[@name='x/wares']/properties"),
            "/macros/macro/properties"
        );
    }
}
