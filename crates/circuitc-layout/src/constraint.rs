//! Linear-equality constraint solving for relative placement.
//!
//! [`LinearProblem`] is a small weighted least-squares solver with hard
//! equalities: it minimizes `Σ wᵢ (vᵢ - tᵢ)²` over the preferences subject
//! to every required equality. Redundant equalities are dropped by
//! rank-revealing elimination; contradictory ones are reported. The
//! remaining system is solved through its KKT matrix.
//!
//! [`solve_relative`] compiles authored `xDist`/`yDist`/`sameX`/`sameY`
//! constraints over [`LayoutBox`]es into one problem per axis;
//! [`solve_pinned`] does the same with some boxes held in place.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use circuitc_core::geometry::{Point, Size};

use crate::error::LayoutError;

const PIVOT_EPS: f64 = 1e-10;

/// Priority of a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strength {
    Required,
    Strong,
    Medium,
    Weak,
}

impl Strength {
    /// Least-squares weight for non-required strengths.
    pub fn weight(self) -> f64 {
        match self {
            Strength::Required => f64::INFINITY,
            Strength::Strong => 1_000_000.0,
            Strength::Medium => 1_000.0,
            Strength::Weak => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Equality {
    terms: Vec<(usize, f64)>,
    rhs: f64,
    label: String,
}

/// A single-axis weighted problem over named variables.
#[derive(Debug, Clone, Default)]
pub struct LinearProblem {
    names: Vec<String>,
    equalities: Vec<Equality>,
    /// Per-variable accumulated `(Σw, Σw·t)`.
    preferences: Vec<(f64, f64)>,
}

impl LinearProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, name: &str) -> usize {
        self.names.push(name.to_string());
        self.preferences.push((0.0, 0.0));
        self.names.len() - 1
    }

    pub fn variable_count(&self) -> usize {
        self.names.len()
    }

    /// Adds the hard equality `Σ coef·var = rhs`.
    pub fn require(&mut self, terms: Vec<(usize, f64)>, rhs: f64, label: &str) {
        self.equalities.push(Equality {
            terms,
            rhs,
            label: label.to_string(),
        });
    }

    /// Pulls `var` toward `target` with `strength`.
    pub fn prefer(&mut self, var: usize, target: f64, strength: Strength) {
        if strength == Strength::Required {
            let label = format!("{} = {target}", self.names[var]);
            self.require(vec![(var, 1.0)], target, &label);
            return;
        }
        let w = strength.weight();
        let (sw, swt) = &mut self.preferences[var];
        *sw += w;
        *swt += w * target;
    }

    pub fn solve(&self) -> Result<Vec<f64>, LayoutError> {
        let n = self.names.len();
        let rows = self.reduced_equalities()?;
        let m = rows.len();

        // Variables with no preference get a tiny anchor at zero so the
        // objective stays strictly convex.
        let weights: Vec<(f64, f64)> = self
            .preferences
            .iter()
            .map(|&(w, wt)| if w > 0.0 { (w, wt) } else { (1e-6, 0.0) })
            .collect();

        // [ 2W  Aᵀ ] [v]   [2Wt]
        // [ A   0  ] [λ] = [ b ]
        let size = n + m;
        let mut matrix = vec![vec![0.0; size + 1]; size];
        for (i, &(w, wt)) in weights.iter().enumerate() {
            matrix[i][i] = 2.0 * w;
            matrix[i][size] = 2.0 * wt;
        }
        for (r, (coefs, rhs)) in rows.iter().enumerate() {
            for (c, &coef) in coefs.iter().enumerate() {
                matrix[n + r][c] = coef;
                matrix[c][n + r] = coef;
            }
            matrix[n + r][size] = *rhs;
        }

        let solution = gaussian_solve(matrix)?;
        Ok(solution[..n].to_vec())
    }

    /// Dense, row-reduced equalities with redundant rows removed.
    fn reduced_equalities(&self) -> Result<Vec<(Vec<f64>, f64)>, LayoutError> {
        let n = self.names.len();
        let mut rows: Vec<(Vec<f64>, f64, String)> = self
            .equalities
            .iter()
            .map(|eq| {
                let mut dense = vec![0.0; n];
                for &(var, coef) in &eq.terms {
                    dense[var] += coef;
                }
                (dense, eq.rhs, eq.label.clone())
            })
            .collect();

        let mut rank = 0;
        for col in 0..n {
            let Some(pivot) = (rank..rows.len())
                .filter(|&r| rows[r].0[col].abs() > PIVOT_EPS)
                .max_by(|&a, &b| rows[a].0[col].abs().total_cmp(&rows[b].0[col].abs()))
            else {
                continue;
            };
            rows.swap(rank, pivot);
            let pivot_val = rows[rank].0[col];
            for r in 0..rows.len() {
                if r == rank {
                    continue;
                }
                let factor = rows[r].0[col] / pivot_val;
                if factor == 0.0 {
                    continue;
                }
                let (pivot_row, pivot_rhs) = (rows[rank].0.clone(), rows[rank].1);
                for (c, v) in rows[r].0.iter_mut().enumerate() {
                    *v -= factor * pivot_row[c];
                }
                rows[r].1 -= factor * pivot_rhs;
            }
            rank += 1;
        }

        let inconsistent: Vec<String> = rows[rank..]
            .iter()
            .filter(|(_, rhs, _)| rhs.abs() > 1e-7)
            .map(|(_, _, label)| label.clone())
            .collect();
        if !inconsistent.is_empty() {
            return Err(LayoutError::InconsistentConstraints {
                names: inconsistent,
            });
        }

        rows.truncate(rank);
        Ok(rows.into_iter().map(|(row, rhs, _)| (row, rhs)).collect())
    }
}

/// Solves a square augmented system by elimination with partial pivoting.
fn gaussian_solve(mut m: Vec<Vec<f64>>) -> Result<Vec<f64>, LayoutError> {
    let size = m.len();
    for col in 0..size {
        let pivot = (col..size)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .ok_or(LayoutError::Singular)?;
        if m[pivot][col].abs() < PIVOT_EPS * 1e-3 {
            return Err(LayoutError::Singular);
        }
        m.swap(col, pivot);
        for r in (col + 1)..size {
            let factor = m[r][col] / m[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..=size {
                m[r][c] -= factor * m[col][c];
            }
        }
    }
    let mut x = vec![0.0; size];
    for row in (0..size).rev() {
        let tail: f64 = ((row + 1)..size).map(|c| m[row][c] * x[c]).sum();
        x[row] = (m[row][size] - tail) / m[row][row];
    }
    Ok(x)
}

// ---------------------------------------------------------------------------
// Authored relative constraints
// ---------------------------------------------------------------------------

/// A component box taking part in relative placement.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub id: String,
    pub center: Point,
    pub size: Size,
}

/// Authored constraints with selectors already resolved to box ids.
#[derive(Debug, Clone, PartialEq)]
pub enum RelativeConstraint {
    XDist {
        left: String,
        right: String,
        dist: f64,
        edge_to_edge: bool,
    },
    YDist {
        top: String,
        bottom: String,
        dist: f64,
        edge_to_edge: bool,
    },
    SameX(Vec<String>),
    SameY(Vec<String>),
}

impl RelativeConstraint {
    pub fn members(&self) -> Vec<&str> {
        match self {
            RelativeConstraint::XDist { left, right, .. } => vec![left, right],
            RelativeConstraint::YDist { top, bottom, .. } => vec![top, bottom],
            RelativeConstraint::SameX(ids) | RelativeConstraint::SameY(ids) => {
                ids.iter().map(String::as_str).collect()
            }
        }
    }

    pub fn is_alignment(&self) -> bool {
        matches!(
            self,
            RelativeConstraint::SameX(_) | RelativeConstraint::SameY(_)
        )
    }

    fn label(&self) -> String {
        match self {
            RelativeConstraint::XDist { left, right, dist, .. } => {
                format!("xDist({left}, {right}) = {dist}")
            }
            RelativeConstraint::YDist { top, bottom, dist, .. } => {
                format!("yDist({top}, {bottom}) = {dist}")
            }
            RelativeConstraint::SameX(ids) => format!("sameX({})", ids.join(", ")),
            RelativeConstraint::SameY(ids) => format!("sameY({})", ids.join(", ")),
        }
    }
}

/// Solves `constraints` over `boxes`.
///
/// Every box is weakly pulled toward its current center; `anchor`, when
/// given, is pulled strongly. Returns the solved center of every box.
pub fn solve_relative(
    boxes: &[LayoutBox],
    constraints: &[RelativeConstraint],
    anchor: Option<&str>,
) -> Result<IndexMap<String, Point>, LayoutError> {
    solve_weighted(boxes, constraints, |id| {
        if anchor == Some(id) {
            Strength::Strong
        } else {
            Strength::Weak
        }
    })
}

/// Solves `constraints` with every box in `pinned` held exactly at its
/// current center. Constraints the pinned boxes cannot all satisfy are
/// reported as [`LayoutError::InconsistentConstraints`].
pub fn solve_pinned(
    boxes: &[LayoutBox],
    constraints: &[RelativeConstraint],
    pinned: &[&str],
) -> Result<IndexMap<String, Point>, LayoutError> {
    solve_weighted(boxes, constraints, |id| {
        if pinned.contains(&id) {
            Strength::Required
        } else {
            Strength::Weak
        }
    })
}

fn solve_weighted(
    boxes: &[LayoutBox],
    constraints: &[RelativeConstraint],
    strength_of: impl Fn(&str) -> Strength,
) -> Result<IndexMap<String, Point>, LayoutError> {
    let index: HashMap<&str, usize> = boxes
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.as_str(), i))
        .collect();
    let lookup = |id: &str| {
        index
            .get(id)
            .copied()
            .ok_or_else(|| LayoutError::UnknownBox {
                name: id.to_string(),
            })
    };

    let mut px = LinearProblem::new();
    let mut py = LinearProblem::new();
    for b in boxes {
        px.add_variable(&b.id);
        py.add_variable(&b.id);
        let strength = strength_of(&b.id);
        px.prefer(px.variable_count() - 1, b.center.x, strength);
        py.prefer(py.variable_count() - 1, b.center.y, strength);
    }

    for constraint in constraints {
        let label = constraint.label();
        match constraint {
            RelativeConstraint::XDist {
                left,
                right,
                dist,
                edge_to_edge,
            } => {
                let (l, r) = (lookup(left)?, lookup(right)?);
                let extra = if *edge_to_edge {
                    (boxes[l].size.width + boxes[r].size.width) / 2.0
                } else {
                    0.0
                };
                px.require(vec![(r, 1.0), (l, -1.0)], dist + extra, &label);
            }
            RelativeConstraint::YDist {
                top,
                bottom,
                dist,
                edge_to_edge,
            } => {
                let (t, b) = (lookup(top)?, lookup(bottom)?);
                let extra = if *edge_to_edge {
                    (boxes[t].size.height + boxes[b].size.height) / 2.0
                } else {
                    0.0
                };
                py.require(vec![(t, 1.0), (b, -1.0)], dist + extra, &label);
            }
            RelativeConstraint::SameX(ids) | RelativeConstraint::SameY(ids) => {
                let problem = if matches!(constraint, RelativeConstraint::SameX(_)) {
                    &mut px
                } else {
                    &mut py
                };
                let vars = ids.iter().map(|id| lookup(id)).collect::<Result<Vec<_>, _>>()?;
                if let Some((&first, rest)) = vars.split_first() {
                    for &other in rest {
                        problem.require(vec![(other, 1.0), (first, -1.0)], 0.0, &label);
                    }
                }
            }
        }
    }

    let xs = px.solve()?;
    let ys = py.solve()?;
    Ok(boxes
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.clone(), Point::new(xs[i], ys[i])))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(id: &str, x: f64, y: f64, w: f64) -> LayoutBox {
        LayoutBox {
            id: id.to_string(),
            center: Point::new(x, y),
            size: Size::new(w, 1.0),
        }
    }

    #[test]
    fn x_dist_center_to_center() {
        let boxes = vec![bx("A", 0.0, 0.0, 2.0), bx("B", 3.0, 1.0, 4.0)];
        let solved = solve_relative(
            &boxes,
            &[RelativeConstraint::XDist {
                left: "A".to_string(),
                right: "B".to_string(),
                dist: 10.0,
                edge_to_edge: false,
            }],
            Some("A"),
        )
        .unwrap();
        assert!((solved["B"].x - solved["A"].x - 10.0).abs() < 1e-6);
        assert!(solved["A"].x.abs() < 1e-3);
        assert!((solved["B"].y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn x_dist_edge_to_edge() {
        let boxes = vec![bx("A", 0.0, 0.0, 2.0), bx("B", 0.0, 0.0, 4.0)];
        let solved = solve_relative(
            &boxes,
            &[RelativeConstraint::XDist {
                left: "A".to_string(),
                right: "B".to_string(),
                dist: 10.0,
                edge_to_edge: true,
            }],
            None,
        )
        .unwrap();
        let gap = (solved["B"].x - 2.0) - (solved["A"].x + 1.0);
        assert!((gap - 10.0).abs() < 1e-6);
    }

    #[test]
    fn redundant_constraints_are_tolerated() {
        let boxes = vec![bx("A", 0.0, 0.0, 1.0), bx("B", 0.0, 2.0, 1.0)];
        let same = RelativeConstraint::SameY(vec!["A".to_string(), "B".to_string()]);
        let solved = solve_relative(&boxes, &[same.clone(), same], None).unwrap();
        assert!((solved["A"].y - solved["B"].y).abs() < 1e-9);
        assert!((solved["A"].y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn contradictory_constraints_are_reported() {
        let boxes = vec![bx("A", 0.0, 0.0, 1.0), bx("B", 0.0, 0.0, 1.0)];
        let err = solve_relative(
            &boxes,
            &[
                RelativeConstraint::XDist {
                    left: "A".to_string(),
                    right: "B".to_string(),
                    dist: 1.0,
                    edge_to_edge: false,
                },
                RelativeConstraint::XDist {
                    left: "A".to_string(),
                    right: "B".to_string(),
                    dist: 2.0,
                    edge_to_edge: false,
                },
            ],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InconsistentConstraints { .. }));
    }

    #[test]
    fn unknown_box_is_named() {
        let err = solve_relative(
            &[bx("A", 0.0, 0.0, 1.0)],
            &[RelativeConstraint::SameX(vec!["A".to_string(), "Z".to_string()])],
            None,
        )
        .unwrap_err();
        assert_eq!(err, LayoutError::UnknownBox { name: "Z".to_string() });
    }

    #[test]
    fn pinned_boxes_do_not_move() {
        let boxes = vec![bx("A", 5.0, 0.0, 1.0), bx("B", 0.0, 3.0, 1.0), bx("C", 0.0, 0.0, 1.0)];
        let solved = solve_pinned(
            &boxes,
            &[
                RelativeConstraint::XDist {
                    left: "A".to_string(),
                    right: "B".to_string(),
                    dist: 10.0,
                    edge_to_edge: false,
                },
                RelativeConstraint::SameY(vec!["A".to_string(), "B".to_string(), "C".to_string()]),
            ],
            &["A"],
        )
        .unwrap();
        assert!((solved["A"].x - 5.0).abs() < 1e-9);
        assert!(solved["A"].y.abs() < 1e-9);
        assert!((solved["B"].x - 15.0).abs() < 1e-9);
        assert!(solved["B"].y.abs() < 1e-9);
        assert!(solved["C"].y.abs() < 1e-9);
    }

    #[test]
    fn two_pins_too_far_apart_are_reported() {
        let boxes = vec![bx("A", 0.0, 0.0, 1.0), bx("B", 4.0, 0.0, 1.0)];
        let err = solve_pinned(
            &boxes,
            &[RelativeConstraint::XDist {
                left: "A".to_string(),
                right: "B".to_string(),
                dist: 10.0,
                edge_to_edge: false,
            }],
            &["A", "B"],
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InconsistentConstraints { .. }));
    }

    #[test]
    fn required_preference_becomes_equality() {
        let mut p = LinearProblem::new();
        let a = p.add_variable("a");
        let b = p.add_variable("b");
        p.prefer(a, 5.0, Strength::Required);
        p.prefer(b, 0.0, Strength::Weak);
        p.require(vec![(b, 1.0), (a, -1.0)], 2.0, "b - a = 2");
        let v = p.solve().unwrap();
        assert!((v[0] - 5.0).abs() < 1e-9);
        assert!((v[1] - 7.0).abs() < 1e-9);
    }
}
