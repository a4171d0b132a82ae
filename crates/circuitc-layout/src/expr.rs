//! Calculated positions such as `pcbX="R1.maxx + 2"`.
//!
//! An expression is a sum of terms: numbers (an optional `mm` suffix is
//! accepted) and references `NAME.PROP`, where `PROP` is one of `x`, `y`,
//! `minx`, `maxx`, `miny`, `maxy`, `width`, `height`. Items are evaluated in
//! dependency order; a dependency cycle is reported with every item that
//! could not be resolved.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use circuitc_core::geometry::{Bounds, Point, Size};
use circuitc_core::props::Coordinate;

use crate::error::LayoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefProp {
    X,
    Y,
    MinX,
    MaxX,
    MinY,
    MaxY,
    Width,
    Height,
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Number(f64),
    Ref { name: String, prop: RefProp },
}

/// A parsed position expression.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionExpr {
    raw: String,
    terms: Vec<(f64, Term)>,
}

impl PositionExpr {
    pub fn parse(raw: &str) -> Result<Self, LayoutError> {
        let err = |reason: String| LayoutError::ExpressionParse {
            expr: raw.to_string(),
            reason,
        };

        let mut terms = Vec::new();
        let mut sign = 1.0;
        let mut expect_term = true;
        let mut chars = raw.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }
            if c == '+' || c == '-' {
                chars.next();
                if c == '-' {
                    sign = -sign;
                }
                expect_term = true;
                continue;
            }
            if !expect_term {
                return Err(err(format!("expected '+' or '-' before '{c}'")));
            }
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '+' || c == '-' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            terms.push((sign, parse_term(&word).map_err(err)?));
            sign = 1.0;
            expect_term = false;
        }
        if expect_term {
            return Err(err("expression ends without a term".to_string()));
        }
        Ok(PositionExpr {
            raw: raw.to_string(),
            terms,
        })
    }

    /// Names this expression references.
    pub fn references(&self) -> Vec<&str> {
        self.terms
            .iter()
            .filter_map(|(_, t)| match t {
                Term::Ref { name, .. } => Some(name.as_str()),
                Term::Number(_) => None,
            })
            .collect()
    }

    fn eval(&self, bounds: &HashMap<String, Bounds>) -> Result<f64, LayoutError> {
        self.terms.iter().try_fold(0.0, |acc, (sign, term)| {
            let value = match term {
                Term::Number(v) => *v,
                Term::Ref { name, prop } => {
                    let b = bounds.get(name).ok_or_else(|| LayoutError::UnresolvedReference {
                        expr: self.raw.clone(),
                        reference: name.clone(),
                    })?;
                    match prop {
                        RefProp::X => b.center().x,
                        RefProp::Y => b.center().y,
                        RefProp::MinX => b.min_x,
                        RefProp::MaxX => b.max_x,
                        RefProp::MinY => b.min_y,
                        RefProp::MaxY => b.max_y,
                        RefProp::Width => b.width(),
                        RefProp::Height => b.height(),
                    }
                }
            };
            Ok(acc + sign * value)
        })
    }
}

fn parse_term(word: &str) -> Result<Term, String> {
    let numeric = word.strip_suffix("mm").unwrap_or(word);
    if let Ok(v) = numeric.parse::<f64>() {
        return Ok(Term::Number(v));
    }
    let (name, prop) = word
        .rsplit_once('.')
        .ok_or_else(|| format!("'{word}' is neither a number nor NAME.PROP"))?;
    if name.is_empty() {
        return Err(format!("'{word}' has no component name"));
    }
    let prop = match prop.to_ascii_lowercase().as_str() {
        "x" => RefProp::X,
        "y" => RefProp::Y,
        "minx" => RefProp::MinX,
        "maxx" => RefProp::MaxX,
        "miny" => RefProp::MinY,
        "maxy" => RefProp::MaxY,
        "width" => RefProp::Width,
        "height" => RefProp::Height,
        other => return Err(format!("unknown property '{other}'")),
    };
    Ok(Term::Ref {
        name: name.to_string(),
        prop,
    })
}

/// A named item whose center may be calculated.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprItem {
    pub name: String,
    pub size: Size,
    pub current: Point,
    pub x: Option<Coordinate>,
    pub y: Option<Coordinate>,
}

/// Resolves every item's center, evaluating expressions in dependency order.
pub fn resolve_positions(items: &[ExprItem]) -> Result<IndexMap<String, Point>, LayoutError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<_> = (0..items.len()).map(|i| graph.add_node(i)).collect();
    let index: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .map(|(i, it)| (it.name.as_str(), i))
        .collect();

    let mut parsed: Vec<(Option<PositionExpr>, Option<PositionExpr>)> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let parse = |c: &Option<Coordinate>| match c {
            Some(Coordinate::Expr(e)) => PositionExpr::parse(e).map(Some),
            _ => Ok(None),
        };
        let (px, py) = (parse(&item.x)?, parse(&item.y)?);
        for expr in px.iter().chain(py.iter()) {
            for reference in expr.references() {
                let dep = index.get(reference).copied().ok_or_else(|| {
                    LayoutError::UnresolvedReference {
                        expr: expr.raw.clone(),
                        reference: reference.to_string(),
                    }
                })?;
                graph.update_edge(nodes[dep], nodes[i], ());
            }
        }
        parsed.push((px, py));
    }

    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(_) => return Err(unresolved_cycle(items, &graph)),
    };

    let mut bounds: HashMap<String, Bounds> = HashMap::new();
    let mut out = IndexMap::new();
    for node in order {
        let i = graph[node];
        let item = &items[i];
        let axis = |coord: &Option<Coordinate>, expr: &Option<PositionExpr>, current: f64| {
            match (coord, expr) {
                (_, Some(e)) => e.eval(&bounds),
                (Some(Coordinate::Value(v)), None) => Ok(*v),
                _ => Ok(current),
            }
        };
        let center = Point::new(
            axis(&item.x, &parsed[i].0, item.current.x)?,
            axis(&item.y, &parsed[i].1, item.current.y)?,
        );
        bounds.insert(item.name.clone(), Bounds::from_center(center, item.size));
        out.insert(item.name.clone(), center);
    }

    // Restore input order.
    Ok(items
        .iter()
        .filter_map(|it| out.get(&it.name).map(|p| (it.name.clone(), *p)))
        .collect())
}

/// Peels resolvable items off the graph; what remains is stuck in or
/// behind a cycle.
fn unresolved_cycle(items: &[ExprItem], graph: &DiGraph<usize, ()>) -> LayoutError {
    let mut resolved: HashSet<usize> = HashSet::new();
    loop {
        let before = resolved.len();
        for node in graph.node_indices() {
            let i = graph[node];
            if resolved.contains(&i) {
                continue;
            }
            let ready = graph
                .neighbors_directed(node, petgraph::Direction::Incoming)
                .all(|dep| resolved.contains(&graph[dep]));
            if ready {
                resolved.insert(i);
            }
        }
        if resolved.len() == before {
            break;
        }
    }
    let names = items
        .iter()
        .enumerate()
        .filter(|(i, _)| !resolved.contains(i))
        .map(|(_, it)| it.name.clone())
        .collect();
    LayoutError::CyclicExpressions { names }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, x: Option<Coordinate>) -> ExprItem {
        ExprItem {
            name: name.to_string(),
            size: Size::new(2.0, 1.0),
            current: Point::ORIGIN,
            x,
            y: None,
        }
    }

    fn expr(s: &str) -> Option<Coordinate> {
        Some(Coordinate::Expr(s.to_string()))
    }

    #[test]
    fn parses_sums_and_units() {
        let e = PositionExpr::parse("R1.maxx + 2mm - R2.width").unwrap();
        assert_eq!(e.references(), vec!["R1", "R2"]);
        assert!(PositionExpr::parse("R1.maxx +").is_err());
        assert!(PositionExpr::parse("R1.depth").is_err());
        assert!(PositionExpr::parse("2 3").is_err());
    }

    #[test]
    fn chain_resolves_in_dependency_order() {
        let items = vec![
            item("C", expr("B.maxx + 1")),
            item("B", expr("A.maxx + 1")),
            item("A", Some(Coordinate::Value(0.0))),
        ];
        let out = resolve_positions(&items).unwrap();
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["C", "B", "A"]);
        assert_eq!(out["A"].x, 0.0);
        // A spans [-1, 1]; B is centered at A.maxx + 1 and spans [1, 3].
        assert_eq!(out["B"].x, 2.0);
        assert_eq!(out["C"].x, 4.0);
    }

    #[test]
    fn cycle_lists_every_unresolved_item() {
        let items = vec![
            item("A", expr("B.x + 1")),
            item("B", expr("A.x + 1")),
            item("C", expr("A.x")),
            item("D", None),
        ];
        let err = resolve_positions(&items).unwrap_err();
        assert_eq!(
            err,
            LayoutError::CyclicExpressions {
                names: vec!["A".to_string(), "B".to_string(), "C".to_string()]
            }
        );
    }

    #[test]
    fn unknown_reference_is_named() {
        let err = resolve_positions(&[item("A", expr("Q.x"))]).unwrap_err();
        assert!(matches!(err, LayoutError::UnresolvedReference { ref reference, .. } if reference == "Q"));
    }
}
