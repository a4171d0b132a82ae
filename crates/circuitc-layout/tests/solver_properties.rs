//! Property tests for the layout solvers.

use proptest::prelude::*;

use circuitc_core::geometry::{Bounds, Point, Size};
use circuitc_layout::{
    find_clusters, solve_relative, CandidatePacker, LayoutBox, PackInput, PackItem, PackSolver,
    RelativeConstraint,
};

fn pack_item(i: usize, w: f64, h: f64) -> PackItem {
    PackItem {
        id: format!("U{i}"),
        pads: vec![Bounds::from_center(Point::ORIGIN, Size::new(w, h))],
        rotations: vec![0.0, 90.0, 180.0, 270.0],
    }
}

proptest! {
    #[test]
    fn packed_items_never_overlap(
        sizes in prop::collection::vec((0.2f64..5.0, 0.2f64..5.0), 1..12),
        gap in 0.0f64..1.0,
    ) {
        let input = PackInput {
            items: sizes.iter().enumerate().map(|(i, (w, h))| pack_item(i, *w, *h)).collect(),
            gap,
            fixed: Vec::new(),
        };
        let out = CandidatePacker.pack(&input).unwrap();
        prop_assert_eq!(out.len(), input.items.len());
        let boxes: Vec<Bounds> = input
            .items
            .iter()
            .zip(&out)
            .map(|(item, p)| item.local_bounds(p.rotation).translate(p.center.x, p.center.y))
            .collect();
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                prop_assert!(!boxes[i].overlaps(&boxes[j]));
            }
        }
    }

    #[test]
    fn x_dist_holds_for_any_start(
        ax in -50.0f64..50.0, bx in -50.0f64..50.0,
        wa in 0.1f64..10.0, wb in 0.1f64..10.0,
        dist in 0.0f64..30.0, edge in any::<bool>(),
    ) {
        let boxes = vec![
            LayoutBox { id: "A".into(), center: Point::new(ax, 0.0), size: Size::new(wa, 1.0) },
            LayoutBox { id: "B".into(), center: Point::new(bx, 0.0), size: Size::new(wb, 1.0) },
        ];
        let solved = solve_relative(
            &boxes,
            &[RelativeConstraint::XDist { left: "A".into(), right: "B".into(), dist, edge_to_edge: edge }],
            Some("A"),
        ).unwrap();
        let measured = if edge {
            (solved["B"].x - wb / 2.0) - (solved["A"].x + wa / 2.0)
        } else {
            solved["B"].x - solved["A"].x
        };
        prop_assert!((measured - dist).abs() < 1e-6);
    }

    #[test]
    fn clusters_partition_the_ids(
        n in 2usize..12,
        pairs in prop::collection::vec((0usize..12, 0usize..12), 0..8),
    ) {
        let ids: Vec<String> = (0..n).map(|i| format!("C{i}")).collect();
        let constraints: Vec<RelativeConstraint> = pairs
            .iter()
            .filter(|(a, b)| *a < n && *b < n)
            .map(|(a, b)| RelativeConstraint::SameX(vec![ids[*a].clone(), ids[*b].clone()]))
            .collect();
        let clusters = find_clusters(&ids, &constraints);
        let mut seen: Vec<String> = clusters.iter().flat_map(|c| c.members.clone()).collect();
        seen.sort();
        let mut expected = ids.clone();
        expected.sort();
        prop_assert_eq!(seen, expected);
        for c in &constraints {
            let members = c.members();
            let owner = clusters.iter().position(|cl| cl.members.iter().any(|m| m == members[0]));
            for m in members {
                prop_assert_eq!(owner, clusters.iter().position(|cl| cl.members.iter().any(|x| x == m)));
            }
        }
    }
}
