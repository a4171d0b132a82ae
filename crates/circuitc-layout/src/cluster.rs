//! Constraint clustering.
//!
//! Components joined transitively by authored constraints form a
//! [`Cluster`]. Each cluster of more than one member is solved on its own
//! and collapsed into a [`MacroComponent`]: one rigid pad set the outer
//! packer places as a single item. After placement every member's offset,
//! rotated by the macro's assigned rotation, is reapplied.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;

use circuitc_core::geometry::{Bounds, Point, Size};

use crate::constraint::{solve_relative, LayoutBox, RelativeConstraint};
use crate::error::LayoutError;
use crate::pack::{PackItem, Placement};

/// Members joined by constraints; the first member anchors the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub members: Vec<String>,
}

/// Groups `ids` by the constraints that mention them.
///
/// Clusters come back in order of their first member's position in `ids`;
/// members keep that order too. Unconstrained ids form singleton clusters.
pub fn find_clusters(ids: &[String], constraints: &[RelativeConstraint]) -> Vec<Cluster> {
    let index: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut sets = UnionFind::<usize>::new(ids.len());
    for constraint in constraints {
        let members: Vec<usize> = constraint
            .members()
            .into_iter()
            .filter_map(|m| index.get(m).copied())
            .collect();
        if let Some((&first, rest)) = members.split_first() {
            for &other in rest {
                sets.union(first, other);
            }
        }
    }

    let mut order: Vec<usize> = Vec::new();
    let mut groups: HashMap<usize, Vec<String>> = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let root = sets.find(i);
        if !groups.contains_key(&root) {
            order.push(root);
        }
        groups.entry(root).or_default().push(id.clone());
    }
    order
        .into_iter()
        .filter_map(|root| groups.remove(&root))
        .map(|members| Cluster { members })
        .collect()
}

/// A member component as seen by the clusterer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMember {
    pub id: String,
    pub center: Point,
    pub size: Size,
    /// Pads relative to the member's center.
    pub pads: Vec<Bounds>,
}

/// A solved cluster packed as one item.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroComponent {
    pub id: String,
    /// Member id and its offset from the macro center.
    pub members: Vec<(String, Point)>,
    pub pads: Vec<Bounds>,
    pub rotations: Vec<f64>,
}

impl MacroComponent {
    pub fn pack_item(&self) -> PackItem {
        PackItem {
            id: self.id.clone(),
            pads: self.pads.clone(),
            rotations: self.rotations.clone(),
        }
    }

    /// Member centers and rotation after the macro was placed.
    pub fn expand(&self, placement: &Placement) -> Vec<(String, Point, f64)> {
        self.members
            .iter()
            .map(|(id, offset)| {
                (
                    id.clone(),
                    placement.center.add(offset.rotate(placement.rotation)),
                    placement.rotation,
                )
            })
            .collect()
    }
}

/// Solves a cluster internally and collapses it into a macro component.
///
/// Members that all sit on the same point (nothing placed them yet) are
/// first seeded side by side: in a row along x, or in a column along y
/// when the only constraints are `sameX`.
pub fn build_macro(
    cluster: &Cluster,
    members: &[ClusterMember],
    constraints: &[RelativeConstraint],
    gap: f64,
) -> Result<MacroComponent, LayoutError> {
    let by_id: HashMap<&str, &ClusterMember> = members.iter().map(|m| (m.id.as_str(), m)).collect();
    let ordered: Vec<&ClusterMember> = cluster
        .members
        .iter()
        .map(|id| {
            by_id.get(id.as_str()).copied().ok_or_else(|| LayoutError::UnknownBox {
                name: id.clone(),
            })
        })
        .collect::<Result<_, _>>()?;

    let internal: Vec<RelativeConstraint> = constraints
        .iter()
        .filter(|c| {
            c.members()
                .iter()
                .all(|m| cluster.members.iter().any(|id| id == m))
        })
        .cloned()
        .collect();

    let column = !internal.is_empty()
        && internal
            .iter()
            .all(|c| matches!(c, RelativeConstraint::SameX(_)));
    let boxes = seed_boxes(&ordered, column, gap);
    let anchor = cluster.members.first().map(String::as_str);
    let solved = solve_relative(&boxes, &internal, anchor)?;

    let world: Vec<(String, Bounds)> = ordered
        .iter()
        .map(|m| {
            let c = solved.get(&m.id).copied().unwrap_or(m.center);
            (m.id.clone(), Bounds::from_center(c, m.size))
        })
        .collect();
    let center = Bounds::union_all(world.iter().map(|(_, b)| *b))
        .map(|b| b.center())
        .unwrap_or(Point::ORIGIN);

    let mut offsets = Vec::with_capacity(ordered.len());
    let mut pads = Vec::new();
    for (member, (id, bounds)) in ordered.iter().zip(&world) {
        let offset = bounds.center().sub(center);
        offsets.push((id.clone(), offset));
        if member.pads.is_empty() {
            pads.push(Bounds::from_center(offset, member.size));
        } else {
            pads.extend(member.pads.iter().map(|p| p.translate(offset.x, offset.y)));
        }
    }

    let rotations = if internal.iter().all(RelativeConstraint::is_alignment) {
        vec![0.0, 180.0]
    } else {
        vec![0.0]
    };

    Ok(MacroComponent {
        id: format!("cluster[{}]", cluster.members.join(",")),
        members: offsets,
        pads,
        rotations,
    })
}

fn seed_boxes(members: &[&ClusterMember], column: bool, gap: f64) -> Vec<LayoutBox> {
    let stacked = members
        .windows(2)
        .all(|w| w[0].center.distance(w[1].center) < 1e-9);
    if !stacked || members.len() < 2 {
        return members
            .iter()
            .map(|m| LayoutBox {
                id: m.id.clone(),
                center: m.center,
                size: m.size,
            })
            .collect();
    }

    let origin = members[0].center;
    let mut cursor = 0.0;
    let mut out = Vec::with_capacity(members.len());
    for (i, m) in members.iter().enumerate() {
        let extent = if column { m.size.height } else { m.size.width };
        if i > 0 {
            cursor += extent / 2.0;
        }
        let center = if column {
            origin.offset(0.0, -cursor)
        } else {
            origin.offset(cursor, 0.0)
        };
        out.push(LayoutBox {
            id: m.id.clone(),
            center,
            size: m.size,
        });
        cursor += extent / 2.0 + gap;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn member(id: &str, x: f64, y: f64) -> ClusterMember {
        ClusterMember {
            id: id.to_string(),
            center: Point::new(x, y),
            size: Size::new(2.0, 1.0),
            pads: vec![],
        }
    }

    #[test]
    fn chain_of_constraints_forms_one_cluster() {
        let constraints = vec![
            RelativeConstraint::SameY(ids(&["A", "B"])),
            RelativeConstraint::XDist {
                left: "B".to_string(),
                right: "C".to_string(),
                dist: 3.0,
                edge_to_edge: false,
            },
        ];
        let clusters = find_clusters(&ids(&["A", "B", "C", "D"]), &constraints);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, ids(&["A", "B", "C"]));
        assert_eq!(clusters[1].members, ids(&["D"]));
    }

    #[test]
    fn unknown_constraint_members_are_ignored() {
        let constraints = vec![RelativeConstraint::SameX(ids(&["A", "Z"]))];
        let clusters = find_clusters(&ids(&["A", "B"]), &constraints);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn stacked_members_are_seeded_in_a_row_then_aligned() {
        let cluster = Cluster {
            members: ids(&["R1", "R2", "R3"]),
        };
        let members = vec![member("R1", 0.0, 0.0), member("R2", 0.0, 0.0), member("R3", 0.0, 0.0)];
        let constraints = vec![RelativeConstraint::SameY(ids(&["R1", "R2", "R3"]))];
        let m = build_macro(&cluster, &members, &constraints, 0.5).unwrap();
        assert_eq!(m.rotations, vec![0.0, 180.0]);
        let ys: Vec<f64> = m.members.iter().map(|(_, o)| o.y).collect();
        assert!(ys.iter().all(|y| (y - ys[0]).abs() < 1e-9));
        let xs: Vec<f64> = m.members.iter().map(|(_, o)| o.x).collect();
        assert!(xs[0] < xs[1] && xs[1] < xs[2]);
    }

    #[test]
    fn expand_reapplies_rotated_offsets() {
        let cluster = Cluster {
            members: ids(&["A", "B"]),
        };
        let members = vec![member("A", 0.0, 0.0), member("B", 0.0, 0.0)];
        let constraints = vec![RelativeConstraint::XDist {
            left: "A".to_string(),
            right: "B".to_string(),
            dist: 4.0,
            edge_to_edge: false,
        }];
        let m = build_macro(&cluster, &members, &constraints, 0.0).unwrap();
        assert_eq!(m.rotations, vec![0.0]);
        let placed = m.expand(&Placement {
            id: m.id.clone(),
            center: Point::new(10.0, 0.0),
            rotation: 180.0,
        });
        let a = placed.iter().find(|(id, ..)| id == "A").unwrap().1;
        let b = placed.iter().find(|(id, ..)| id == "B").unwrap().1;
        // Rotated half a turn, B now sits left of A.
        assert!((a.x - b.x - 4.0).abs() < 1e-6);
        assert!(((a.x + b.x) / 2.0 - 10.0).abs() < 1e-6);
    }
}
