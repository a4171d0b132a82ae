//! Bin packing of component footprints.
//!
//! The packer is pluggable through [`PackSolver`]. [`CandidatePacker`] is
//! the built-in implementation: a deterministic greedy packer that places
//! items largest-first at candidate points touching already placed items.
//! Fixed obstacles in [`PackInput::fixed`] count as placed from the start.
//!
//! # Tie-breaking
//!
//! Candidates are ranked by the half-perimeter of the resulting overall
//! bounding box, then by distance from the origin, then by the lowest
//! rotation value, then by `(y, x)` ascending.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use circuitc_core::geometry::{Bounds, Point};

use crate::error::LayoutError;

const EPS: f64 = 1e-9;

/// One thing to place: pad boxes relative to the item's own center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackItem {
    pub id: String,
    pub pads: Vec<Bounds>,
    /// Allowed rotations in degrees; must not be empty.
    pub rotations: Vec<f64>,
}

impl PackItem {
    /// Extent of the item's pads at `rotation`, relative to its center.
    pub fn local_bounds(&self, rotation: f64) -> Bounds {
        Bounds::union_all(self.pads.iter().map(|p| rotate_bounds(p, rotation)))
            .unwrap_or_else(|| Bounds::from_point(Point::ORIGIN))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackInput {
    pub items: Vec<PackItem>,
    /// Minimum clearance between placed items.
    pub gap: f64,
    /// Boxes already occupied in world coordinates; items keep clear of them.
    #[serde(default)]
    pub fixed: Vec<Bounds>,
}

/// Where the packer put one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub id: String,
    pub center: Point,
    pub rotation: f64,
}

/// A packing algorithm.
pub trait PackSolver: Send + Sync {
    /// Places every item. Without fixed obstacles the result's overall
    /// bounds are centered on the origin; with them, coordinates are the
    /// obstacles' own.
    fn pack(&self, input: &PackInput) -> Result<Vec<Placement>, LayoutError>;
}

/// Greedy candidate-point packer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidatePacker;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    center: Point,
    rotation: f64,
    cost: f64,
    distance: f64,
}

impl Candidate {
    fn better_than(&self, other: &Candidate) -> bool {
        cmp_f64(self.cost, other.cost)
            .then(cmp_f64(self.distance, other.distance))
            .then(cmp_f64(self.rotation, other.rotation))
            .then(cmp_f64(self.center.y, other.center.y))
            .then(cmp_f64(self.center.x, other.center.x))
            == Ordering::Less
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    if (a - b).abs() < EPS {
        Ordering::Equal
    } else if a < b {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

impl PackSolver for CandidatePacker {
    fn pack(&self, input: &PackInput) -> Result<Vec<Placement>, LayoutError> {
        if let Some(item) = input.items.iter().find(|i| i.rotations.is_empty()) {
            return Err(LayoutError::InvalidPackInput {
                reason: format!("item '{}' allows no rotation", item.id),
            });
        }

        // Largest first; stable so equal areas keep input order.
        let mut order: Vec<usize> = (0..input.items.len()).collect();
        order.sort_by(|&a, &b| {
            let area = |i: usize| input.items[i].local_bounds(0.0).size().area();
            cmp_f64(area(b), area(a))
        });

        let mut placed: Vec<(usize, Bounds, Placement)> = Vec::new();
        let mut occupied: Vec<Bounds> = input.fixed.clone();
        for idx in order {
            let item = &input.items[idx];
            let best = if occupied.is_empty() {
                let rotation = lowest(&item.rotations);
                let local = item.local_bounds(rotation);
                let center = Point::ORIGIN.sub(local.center());
                Candidate {
                    center,
                    rotation,
                    cost: 0.0,
                    distance: 0.0,
                }
            } else {
                best_candidate(item, &occupied, input.gap)
            };
            let world = item.local_bounds(best.rotation).translate(best.center.x, best.center.y);
            occupied.push(world);
            placed.push((
                idx,
                world,
                Placement {
                    id: item.id.clone(),
                    center: best.center,
                    rotation: best.rotation,
                },
            ));
        }

        // Recenter a free arrangement on the origin and restore input order.
        let shift = if input.fixed.is_empty() {
            Bounds::union_all(placed.iter().map(|(_, b, _)| *b))
                .map(|b| b.center())
                .unwrap_or(Point::ORIGIN)
        } else {
            Point::ORIGIN
        };
        placed.sort_by_key(|(idx, _, _)| *idx);
        Ok(placed
            .into_iter()
            .map(|(_, _, mut p)| {
                p.center = p.center.sub(shift);
                p
            })
            .collect())
    }
}

fn lowest(rotations: &[f64]) -> f64 {
    rotations.iter().copied().fold(f64::INFINITY, f64::min)
}

fn best_candidate(item: &PackItem, occupied: &[Bounds], gap: f64) -> Candidate {
    let overall = Bounds::union_all(occupied.iter().copied())
        .unwrap_or_else(|| Bounds::from_point(Point::ORIGIN));
    let mut best: Option<Candidate> = None;

    for &rotation in &item.rotations {
        let local = item.local_bounds(rotation);
        let (w, h) = (local.width(), local.height());
        for other in occupied {
            // Target boxes (min corner) touching `other` on each side, aligned
            // at its start, center and end.
            let xs = [other.min_x, other.center().x - w / 2.0, other.max_x - w];
            let ys = [other.min_y, other.center().y - h / 2.0, other.max_y - h];
            let mut mins: Vec<(f64, f64)> = Vec::with_capacity(12);
            for y in ys {
                mins.push((other.max_x + gap, y));
                mins.push((other.min_x - gap - w, y));
            }
            for x in xs {
                mins.push((x, other.max_y + gap));
                mins.push((x, other.min_y - gap - h));
            }

            for (min_x, min_y) in mins {
                let target = Bounds::new(min_x, min_y, min_x + w, min_y + h);
                let clear = occupied
                    .iter()
                    .all(|b| !target.overlaps(&b.expand(gap - EPS)));
                if !clear {
                    continue;
                }
                let merged = overall.union(&target);
                let center = target.center().sub(local.center());
                let candidate = Candidate {
                    center,
                    rotation,
                    cost: merged.width() + merged.height(),
                    distance: target.center().distance(overall.center()),
                };
                if best.as_ref().map_or(true, |b| candidate.better_than(b)) {
                    best = Some(candidate);
                }
            }
        }
    }

    // A candidate touching the far right edge of everything is always clear.
    best.unwrap_or_else(|| {
        let rotation = lowest(&item.rotations);
        let local = item.local_bounds(rotation);
        let min_x = overall.max_x + gap;
        let target = Bounds::new(
            min_x,
            overall.min_y,
            min_x + local.width(),
            overall.min_y + local.height(),
        );
        Candidate {
            center: target.center().sub(local.center()),
            rotation,
            cost: 0.0,
            distance: 0.0,
        }
    })
}

/// Bounding box of `b` rotated counter-clockwise about the origin.
pub fn rotate_bounds(b: &Bounds, degrees: f64) -> Bounds {
    let corners = [
        Point::new(b.min_x, b.min_y),
        Point::new(b.max_x, b.min_y),
        Point::new(b.max_x, b.max_y),
        Point::new(b.min_x, b.max_y),
    ];
    Bounds::union_all(
        corners
            .into_iter()
            .map(|c| Bounds::from_point(c.rotate(degrees))),
    )
    .unwrap_or(*b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuitc_core::geometry::Size;

    fn item(id: &str, w: f64, h: f64, rotations: Vec<f64>) -> PackItem {
        PackItem {
            id: id.to_string(),
            pads: vec![Bounds::from_center(Point::ORIGIN, Size::new(w, h))],
            rotations,
        }
    }

    fn placed_bounds(input: &PackInput, out: &[Placement]) -> Vec<Bounds> {
        input
            .items
            .iter()
            .zip(out)
            .map(|(i, p)| i.local_bounds(p.rotation).translate(p.center.x, p.center.y))
            .collect()
    }

    #[test]
    fn single_item_lands_on_origin() {
        let input = PackInput {
            items: vec![item("A", 2.0, 1.0, vec![0.0])],
            gap: 0.5,
            fixed: Vec::new(),
        };
        let out = CandidatePacker.pack(&input).unwrap();
        assert_eq!(out[0].center, Point::ORIGIN);
        assert_eq!(out[0].rotation, 0.0);
    }

    #[test]
    fn items_do_not_overlap_and_respect_gap() {
        let input = PackInput {
            items: vec![
                item("A", 2.0, 1.0, vec![0.0, 90.0]),
                item("B", 1.0, 1.0, vec![0.0]),
                item("C", 3.0, 0.5, vec![0.0, 90.0]),
            ],
            gap: 0.5,
            fixed: Vec::new(),
        };
        let out = CandidatePacker.pack(&input).unwrap();
        assert_eq!(
            out.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
        let boxes = placed_bounds(&input, &out);
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                assert!(!boxes[i].expand(0.25 - 1e-6).overlaps(&boxes[j].expand(0.25 - 1e-6)));
            }
        }
        let overall = Bounds::union_all(boxes).unwrap();
        assert!(overall.center().distance(Point::ORIGIN) < 1e-9);
    }

    #[test]
    fn equal_cost_rotations_pick_the_lowest() {
        let input = PackInput {
            items: vec![
                item("A", 1.0, 1.0, vec![0.0]),
                item("B", 1.0, 1.0, vec![270.0, 180.0, 90.0, 0.0]),
            ],
            gap: 0.0,
            fixed: Vec::new(),
        };
        let out = CandidatePacker.pack(&input).unwrap();
        assert_eq!(out[1].rotation, 0.0);
    }

    #[test]
    fn packing_is_deterministic() {
        let input = PackInput {
            items: (0..6)
                .map(|i| item(&format!("R{i}"), 1.0 + i as f64 * 0.3, 0.6, vec![0.0, 90.0]))
                .collect(),
            gap: 0.2,
            fixed: Vec::new(),
        };
        assert_eq!(
            CandidatePacker.pack(&input).unwrap(),
            CandidatePacker.pack(&input).unwrap()
        );
    }

    #[test]
    fn empty_rotation_list_is_rejected() {
        let input = PackInput {
            items: vec![item("A", 1.0, 1.0, vec![])],
            gap: 0.0,
            fixed: Vec::new(),
        };
        assert!(CandidatePacker.pack(&input).is_err());
    }

    #[test]
    fn items_keep_clear_of_fixed_obstacles() {
        let wall = Bounds::from_center(Point::ORIGIN, Size::new(2.0, 2.0));
        let input = PackInput {
            items: vec![item("A", 1.0, 1.0, vec![0.0]), item("B", 3.0, 1.0, vec![0.0])],
            gap: 0.5,
            fixed: vec![wall],
        };
        let out = CandidatePacker.pack(&input).unwrap();
        let boxes = placed_bounds(&input, &out);
        for b in &boxes {
            assert!(!b.overlaps(&wall.expand(0.5 - 1e-6)), "{b:?} hits the wall");
        }
        assert!(!boxes[0].overlaps(&boxes[1]));
    }

    #[test]
    fn quarter_turn_bounds_swap_extent() {
        let b = Bounds::from_center(Point::new(1.0, 0.0), Size::new(2.0, 1.0));
        let r = rotate_bounds(&b, 90.0);
        assert!((r.width() - 1.0).abs() < 1e-12);
        assert!((r.height() - 2.0).abs() < 1e-12);
        assert!((r.center().y - 1.0).abs() < 1e-12);
    }
}
