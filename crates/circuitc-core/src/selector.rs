//! CSS-like selectors over the design tree.
//!
//! Grammar: `*`, `tag`, `#id`, `.name`, `[attr=value]`, compound parts such
//! as `resistor.R1`, the descendant combinator (whitespace) and the direct
//! child combinator (`>`).
//!
//! Evaluation keeps a candidate set and a search set. Each part expands the
//! search set by one level of selectable descendants (or direct children
//! after `>`) and filters the result. Selectable descendants stop at
//! subcircuit boundaries, so a selector evaluated at a parent scope can
//! match a nested subcircuit but nothing strictly inside it.

use indexmap::IndexSet;
use serde_json::Value;

use crate::error::{CoreError, SelectorError};
use crate::id::NodeId;
use crate::props::NodeProps;
use crate::tree::{DesignNode, DesignTree};

/// One compound part, e.g. `chip.U1[pinCount=8]`.
#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    names: Vec<String>,
    attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    direct: bool,
    compound: Compound,
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    raw: String,
    steps: Vec<Step>,
}

impl Selector {
    pub fn parse(raw: &str) -> Result<Self, SelectorError> {
        let err = |reason: &str| SelectorError::Parse {
            selector: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut steps = Vec::new();
        let mut direct = false;
        for token in tokenize(raw) {
            if token == ">" {
                if direct {
                    return Err(err("two '>' combinators in a row"));
                }
                direct = true;
                continue;
            }
            steps.push(Step {
                direct,
                compound: parse_compound(&token).map_err(|reason| err(&reason))?,
            });
            direct = false;
        }
        if direct {
            return Err(err("dangling '>' combinator"));
        }
        if steps.is_empty() {
            return Err(err("empty selector"));
        }
        Ok(Selector {
            raw: raw.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Every node matching this selector, evaluated from `origin`, in
    /// tree order.
    pub fn select_all(&self, tree: &DesignTree, origin: NodeId) -> Vec<NodeId> {
        let mut search: IndexSet<NodeId> = IndexSet::from([origin]);
        let mut candidates: IndexSet<NodeId> = IndexSet::new();
        for step in &self.steps {
            candidates = IndexSet::new();
            for &scope in &search {
                let expanded = if step.direct {
                    tree.children(scope).to_vec()
                } else {
                    tree.selectable_descendants(scope)
                };
                for id in expanded {
                    if tree.get(id).is_some_and(|n| step.compound.matches(n)) {
                        candidates.insert(id);
                    }
                }
            }
            if candidates.is_empty() {
                break;
            }
            search = candidates.clone();
        }
        candidates.into_iter().collect()
    }

    pub fn select_one(&self, tree: &DesignTree, origin: NodeId) -> Option<NodeId> {
        self.select_all(tree, origin).into_iter().next()
    }
}

/// Parses and evaluates `selector` from `origin`.
pub fn select_all(
    tree: &DesignTree,
    origin: NodeId,
    selector: &str,
) -> Result<Vec<NodeId>, SelectorError> {
    Ok(Selector::parse(selector)?.select_all(tree, origin))
}

/// Like [`select_all`] but a missing match is an error naming `origin`.
pub fn select_required(
    tree: &DesignTree,
    origin: NodeId,
    selector: &str,
) -> Result<NodeId, SelectorError> {
    Selector::parse(selector)?
        .select_one(tree, origin)
        .ok_or_else(|| SelectorError::NotFound {
            origin: tree
                .get(origin)
                .map(DesignNode::describe)
                .unwrap_or_else(|| origin.to_string()),
            selector: selector.to_string(),
        })
}

/// Evaluates `selector` from the resolved design root.
pub fn select_from_root(tree: &DesignTree, selector: &str) -> Result<Vec<NodeId>, CoreError> {
    let root = tree.resolve_root()?;
    Ok(Selector::parse(selector)?.select_all(tree, root))
}

impl Compound {
    fn matches(&self, node: &DesignNode) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && *tag != node.kind {
                return false;
            }
        }
        let name = node.name();
        let id_prop = node.declared.get("id").and_then(Value::as_str);
        if !self
            .ids
            .iter()
            .all(|id| id_prop == Some(id.as_str()) || name == Some(id.as_str()))
        {
            return false;
        }
        if !self.names.iter().all(|n| answers_to_name(node, n)) {
            return false;
        }
        self.attrs
            .iter()
            .all(|(key, expected)| match node.declared.get(key) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Number(n)) => {
                    n.to_string() == *expected || n.as_f64() == expected.parse::<f64>().ok()
                }
                Some(Value::Bool(b)) => b.to_string() == *expected,
                _ => false,
            })
    }
}

fn answers_to_name(node: &DesignNode, token: &str) -> bool {
    match &node.props {
        NodeProps::Port(p) => p.answers_to(token),
        other => other.name() == Some(token),
    }
}

/// Splits on whitespace and isolates `>` as its own token, leaving
/// bracketed attribute values intact.
fn tokenize(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    for ch in raw.chars() {
        match ch {
            '[' => {
                in_brackets = true;
                current.push(ch);
            }
            ']' => {
                in_brackets = false;
                current.push(ch);
            }
            c if in_brackets => current.push(c),
            '>' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(">".to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_compound(token: &str) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let chars: Vec<char> = token.chars().collect();
    let mut i = 0;

    let read_ident = |start: usize| -> (String, usize) {
        let mut end = start;
        while end < chars.len() && !matches!(chars[end], '.' | '#' | '[') {
            end += 1;
        }
        (chars[start..end].iter().collect(), end)
    };

    if chars.first() == Some(&'*') {
        compound.tag = Some("*".to_string());
        i = 1;
    } else if chars.first().is_some_and(|c| !matches!(c, '.' | '#' | '[')) {
        let (tag, end) = read_ident(0);
        compound.tag = Some(tag);
        i = end;
    }

    while i < chars.len() {
        match chars[i] {
            '.' | '#' => {
                let (ident, end) = read_ident(i + 1);
                if ident.is_empty() {
                    return Err(format!("empty name after '{}'", chars[i]));
                }
                if chars[i] == '.' {
                    compound.names.push(ident);
                } else {
                    compound.ids.push(ident);
                }
                i = end;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|p| p + i)
                    .ok_or_else(|| "unterminated attribute predicate".to_string())?;
                let inner: String = chars[i + 1..close].iter().collect();
                let (key, value) = inner
                    .split_once('=')
                    .ok_or_else(|| format!("attribute predicate '[{inner}]' needs '='"))?;
                let key = key.trim();
                if key.is_empty() {
                    return Err("attribute predicate has an empty name".to_string());
                }
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                compound.attrs.push((key.to_string(), value.to_string()));
                i = close + 1;
            }
            c => return Err(format!("unexpected character '{c}'")),
        }
    }
    Ok(compound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::props::{ComponentProps, GroupProps, PortProps};
    use serde_json::json;

    fn group(kind: &str, v: &Value) -> Result<NodeProps, ValidationError> {
        GroupProps::parse(kind, v, kind == "board").map(NodeProps::Group)
    }

    fn resistor(kind: &str, v: &Value) -> Result<NodeProps, ValidationError> {
        ComponentProps::parse(kind, v, Some(2)).map(NodeProps::Component)
    }

    fn port(kind: &str, v: &Value) -> Result<NodeProps, ValidationError> {
        PortProps::parse(kind, v).map(NodeProps::Port)
    }

    struct Fixture {
        tree: DesignTree,
        board: NodeId,
        sub: NodeId,
        r1: NodeId,
        r1_pin1: NodeId,
        inner: NodeId,
    }

    fn fixture() -> Fixture {
        let mut tree = DesignTree::new();
        let root = tree.root_id();
        let board = tree.insert(root, "board", json!({}), group).unwrap();
        let r1 = tree
            .insert(board, "resistor", json!({ "name": "R1", "resistance": "1k" }), resistor)
            .unwrap();
        let r1_pin1 = tree
            .insert(r1, "port", json!({ "name": "pin1", "aliases": ["1", "anode"] }), port)
            .unwrap();
        tree.insert(r1, "port", json!({ "name": "pin2" }), port).unwrap();
        let sub = tree
            .insert(board, "group", json!({ "name": "S", "subcircuit": true }), group)
            .unwrap();
        let inner = tree
            .insert(sub, "resistor", json!({ "name": "R9" }), resistor)
            .unwrap();
        Fixture {
            tree,
            board,
            sub,
            r1,
            r1_pin1,
            inner,
        }
    }

    #[test]
    fn name_and_child_combinator() {
        let f = fixture();
        let hits = select_all(&f.tree, f.board, ".R1 > .pin1").unwrap();
        assert_eq!(hits, vec![f.r1_pin1]);
        let by_alias = select_all(&f.tree, f.board, ".R1>.anode").unwrap();
        assert_eq!(by_alias, vec![f.r1_pin1]);
    }

    #[test]
    fn tag_id_and_attribute_predicates() {
        let f = fixture();
        assert_eq!(select_all(&f.tree, f.board, "resistor").unwrap(), vec![f.r1]);
        assert_eq!(select_all(&f.tree, f.board, "#R1").unwrap(), vec![f.r1]);
        assert_eq!(
            select_all(&f.tree, f.board, "resistor[resistance=1k]").unwrap(),
            vec![f.r1]
        );
        assert!(select_all(&f.tree, f.board, "[resistance=2k]").unwrap().is_empty());
    }

    #[test]
    fn subcircuit_boundary_is_matched_but_not_entered() {
        let f = fixture();
        assert_eq!(select_all(&f.tree, f.board, ".S").unwrap(), vec![f.sub]);
        assert!(select_all(&f.tree, f.board, ".R9").unwrap().is_empty());
        assert_eq!(select_all(&f.tree, f.board, ".S .R9").unwrap(), vec![f.inner]);
        assert_eq!(select_all(&f.tree, f.sub, ".R9").unwrap(), vec![f.inner]);
    }

    #[test]
    fn universal_selector_respects_boundary() {
        let f = fixture();
        let all = select_all(&f.tree, f.board, "*").unwrap();
        assert!(all.contains(&f.sub));
        assert!(!all.contains(&f.inner));
    }

    #[test]
    fn leading_child_combinator_limits_to_children() {
        let f = fixture();
        assert!(select_all(&f.tree, f.board, "> .pin1").unwrap().is_empty());
        assert_eq!(select_all(&f.tree, f.board, "> .R1").unwrap(), vec![f.r1]);
    }

    #[test]
    fn parse_errors() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse(".R1 >").is_err());
        assert!(Selector::parse(".R1 > > .pin1").is_err());
        assert!(Selector::parse("[name").is_err());
        assert!(Selector::parse(".").is_err());
    }

    #[test]
    fn required_selection_reports_origin() {
        let f = fixture();
        let err = select_required(&f.tree, f.r1, ".missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "<resistor name=\"R1\" /> could not find \".missing\""
        );
    }

    #[test]
    fn root_selection_uses_resolved_root() {
        let f = fixture();
        assert_eq!(select_from_root(&f.tree, ".R1").unwrap(), vec![f.r1]);
    }
}
