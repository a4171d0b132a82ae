//! Applying layout solvers to groups.
//!
//! A group arranges its direct children on one side (pcb or schematic):
//!
//! 1. every layout unit in the subtree goes back to where it was rendered,
//! 2. nested groups are arranged bottom-up, then the group itself,
//! 3. the group is moved to its own declared offset (or anchor), and
//! 4. its `pcb_board` / `pcb_group` / `schematic_group` record is rebuilt.
//!
//! Starting from rendered positions every time makes re-layout after an
//! async result idempotent. Children are moved with rigid transforms over
//! every record of their subtree.
//!
//! Children joined by constraints are clustered before any strategy runs
//! and move as one unit. A cluster holding an explicitly placed child is
//! solved around it and stays put; packing treats it as an obstacle.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use circuitc_core::geometry::{compose, Bounds, Point, Size, Transform};
use circuitc_core::props::{ConstraintKind, Coordinate, EdgeMode, GroupProps, LayoutStrategy, SideLayout};
use circuitc_core::{NodeId, NodeProps, RenderPhase};
use circuitc_layout::{
    anchor_shift, build_macro, find_clusters, grid_layout, resolve_positions, solve_pinned, Cluster,
    ClusterMember, ExprItem, FlexInput, FlexItem, GridItem, LayoutBox, LayoutError, PackInput,
    PackItem, RelativeConstraint,
};
use circuitc_store::record::{PcbBoard, PcbGroup, SchematicGroup};
use circuitc_store::{CircuitRecord, Side};

use crate::context::RenderContext;
use crate::error::RenderError;

/// Margin added around the content of a board without declared size.
const BOARD_MARGIN: f64 = 1.0;

/// Lays out `group` and every group nested in it on `side`.
pub fn layout_group(ctx: &mut RenderContext<'_>, group: NodeId, side: Side) -> Result<(), RenderError> {
    ctx.reset_subtree(group, side)?;

    let nested: Vec<NodeId> = ctx
        .tree
        .post_order(group)
        .into_iter()
        .filter(|&id| id != group)
        .filter(|&id| {
            ctx.tree
                .get(id)
                .is_some_and(|n| n.props.as_group().is_some() && !n.pending_removal)
        })
        .filter(|&id| !crate::isolation::inside_isolated(&*ctx.tree, ctx.config(), id))
        .collect();
    for id in nested {
        arrange(ctx, id, side)?;
    }
    arrange(ctx, group, side)?;

    invalidate_dependents(ctx, group, side);
    Ok(())
}

/// Placement of one group's direct children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Pack,
    Grid,
    Flex,
    /// Children keep the positions they declared.
    Explicit,
}

fn side_layout(props: &GroupProps, side: Side) -> &SideLayout {
    match side {
        Side::Schematic => &props.sch_layout,
        _ => &props.pcb_layout,
    }
}

fn has_explicit(props: &NodeProps, side: Side) -> bool {
    props.position().is_some_and(|p| match side {
        Side::Schematic => p.has_explicit_sch(),
        _ => p.has_explicit_pcb(),
    })
}

fn arrange(ctx: &mut RenderContext<'_>, group: NodeId, side: Side) -> Result<(), RenderError> {
    let Some(props) = ctx.node(group)?.props.as_group().cloned() else {
        return Ok(());
    };
    let isolated = ctx.isolates(group);

    if !isolated {
        delete_group_record(ctx, group, side)?;
        let children: Vec<NodeId> = ctx
            .tree
            .children(group)
            .iter()
            .copied()
            .filter(|&c| {
                ctx.tree
                    .get(c)
                    .is_some_and(|n| n.caps.produces_pcb && !n.pending_removal)
            })
            .filter(|&c| ctx.side_bounds(c, side).is_some())
            .collect();
        place_children(ctx, group, &props, side, &children)?;
    }

    place_self(ctx, group, &props, side)?;

    if !isolated {
        write_group_record(ctx, group, &props, side)?;
    }
    Ok(())
}

fn place_children(
    ctx: &mut RenderContext<'_>,
    group: NodeId,
    props: &GroupProps,
    side: Side,
    children: &[NodeId],
) -> Result<(), RenderError> {
    if children.is_empty() {
        return Ok(());
    }
    let layout = side_layout(props, side).clone();
    let constraints = collect_constraints(ctx, group, side, children)?;
    let explicit: HashSet<NodeId> = children
        .iter()
        .copied()
        .filter(|&c| ctx.tree.get(c).is_some_and(|n| has_explicit(&n.props, side)))
        .collect();

    let strategy = match &layout.strategy {
        LayoutStrategy::Auto if explicit.is_empty() => Strategy::Pack,
        LayoutStrategy::Auto => Strategy::Explicit,
        LayoutStrategy::Pack => Strategy::Pack,
        LayoutStrategy::Grid(_) => Strategy::Grid,
        LayoutStrategy::Flex(_) => Strategy::Flex,
    };
    debug!(group = %group, side = ?side, strategy = ?strategy, children = children.len(), "arranging group");

    let gap = layout.pack_gap.unwrap_or(match side {
        Side::Schematic => ctx.config().schematic_pack_gap,
        _ => ctx.config().pack_gap,
    });
    // Grid and flex cells override declared positions, so nothing is pinned.
    let pinned = match strategy {
        Strategy::Pack | Strategy::Explicit => explicit,
        Strategy::Grid | Strategy::Flex => HashSet::new(),
    };
    let units = build_units(ctx, children, &constraints, &pinned, gap, side)?;

    match (&layout.strategy, strategy) {
        (_, Strategy::Pack) => pack(ctx, &units, gap, side)?,
        (LayoutStrategy::Grid(options), _) => {
            let items: Vec<GridItem> = units
                .iter()
                .map(|u| GridItem {
                    id: u.id.clone(),
                    size: u.size,
                })
                .collect();
            let grid = grid_layout(&items, options.cols, options.rows, options.gap);
            place_at_centers(ctx, &units, &grid.centers, side)?;
        }
        (LayoutStrategy::Flex(options), _) => {
            let items: Vec<FlexItem> = units
                .iter()
                .map(|u| FlexItem {
                    id: u.id.clone(),
                    size: u.size,
                })
                .collect();
            let container = match (props.width, props.height) {
                (Some(w), Some(h)) => Some(Size::new(w, h)),
                _ => None,
            };
            let output = ctx.services.flex.layout(&FlexInput {
                items,
                direction: options.direction,
                justify: options.justify,
                align: options.align,
                gap: options.gap,
                container,
            })?;
            place_at_centers(ctx, &units, &output.centers, side)?;
        }
        _ => {
            for unit in &units {
                place_unit(ctx, unit, unit.center, 0.0, side)?;
            }
        }
    }

    apply_expressions(ctx, children, side)
}

// ---------------------------------------------------------------------------
// Layout units
// ---------------------------------------------------------------------------

/// A child, or a cluster of children joined by constraints, moved as one
/// rigid piece.
#[derive(Debug, Clone)]
struct Unit {
    id: String,
    /// Member node, its offset from the unit center, and its current center.
    members: Vec<(NodeId, Point, Point)>,
    /// Where the unit's members would sit without further layout.
    center: Point,
    size: Size,
    /// Footprint relative to `center`.
    pads: Vec<Bounds>,
    rotations: Vec<f64>,
    /// Holds a pinned child; the unit stays where it is.
    fixed: bool,
}

impl Unit {
    fn world_pads(&self) -> Vec<Bounds> {
        if self.pads.is_empty() {
            return vec![Bounds::from_center(self.center, self.size)];
        }
        self.pads
            .iter()
            .map(|p| p.translate(self.center.x, self.center.y))
            .collect()
    }
}

/// One member as measured before layout.
struct Measured {
    node: NodeId,
    id: String,
    bounds: Bounds,
    pads: Vec<Bounds>,
}

/// Splits `children` into constraint clusters.
///
/// A cluster holding a child from `pinned` keeps that child where it is
/// and solves the other members around it. Any other cluster of more than
/// one member is solved on its own and collapsed into a macro component.
fn build_units(
    ctx: &RenderContext<'_>,
    children: &[NodeId],
    constraints: &[RelativeConstraint],
    pinned: &HashSet<NodeId>,
    gap: f64,
    side: Side,
) -> Result<Vec<Unit>, RenderError> {
    let ids: Vec<String> = children.iter().map(NodeId::to_string).collect();
    let by_id: HashMap<String, NodeId> = children.iter().map(|&n| (n.to_string(), n)).collect();

    let mut units = Vec::new();
    for cluster in find_clusters(&ids, constraints) {
        let mut members = Vec::with_capacity(cluster.members.len());
        for id in &cluster.members {
            let Some(&node) = by_id.get(id) else {
                continue;
            };
            let Some((bounds, pads)) = relative_pads(ctx, node, side) else {
                continue;
            };
            members.push(Measured {
                node,
                id: id.clone(),
                bounds,
                pads,
            });
        }
        let internal: Vec<RelativeConstraint> = constraints
            .iter()
            .filter(|c| c.members().iter().all(|m| cluster.members.iter().any(|id| id == m)))
            .cloned()
            .collect();

        let unit = match members.as_slice() {
            [] => continue,
            [single] => Unit {
                id: single.id.clone(),
                members: vec![(single.node, Point::ORIGIN, single.bounds.center())],
                center: single.bounds.center(),
                size: single.bounds.size(),
                pads: single.pads.clone(),
                rotations: pack_rotations(ctx, single.node, side),
                fixed: pinned.contains(&single.node),
            },
            _ if members.iter().any(|m| pinned.contains(&m.node)) => {
                pinned_unit(ctx, &cluster, &members, &internal, pinned, gap)?
            }
            _ => macro_unit(ctx, &cluster, &members, &internal, gap, side)?,
        };
        units.push(unit);
    }
    Ok(units)
}

/// Solves a cluster with its pinned members held in place.
///
/// Unpinned members start in a row right of the pinned ones.
fn pinned_unit(
    ctx: &RenderContext<'_>,
    cluster: &Cluster,
    members: &[Measured],
    constraints: &[RelativeConstraint],
    pinned: &HashSet<NodeId>,
    gap: f64,
) -> Result<Unit, RenderError> {
    let held = Bounds::union_all(
        members
            .iter()
            .filter(|m| pinned.contains(&m.node))
            .map(|m| m.bounds),
    )
    .unwrap_or_else(|| Bounds::from_point(Point::ORIGIN));

    let mut cursor = held.max_x + gap;
    let mut boxes = Vec::with_capacity(members.len());
    for m in members {
        let size = m.bounds.size();
        let center = if pinned.contains(&m.node) {
            m.bounds.center()
        } else {
            let seed = Point::new(cursor + size.width / 2.0, held.center().y);
            cursor += size.width + gap;
            seed
        };
        boxes.push(LayoutBox {
            id: m.id.clone(),
            center,
            size,
        });
    }

    let pins: Vec<&str> = members
        .iter()
        .filter(|m| pinned.contains(&m.node))
        .map(|m| m.id.as_str())
        .collect();
    let solved = solve_pinned(&boxes, constraints, &pins).map_err(|e| cluster_error(ctx, members, e))?;

    let placed: Vec<Bounds> = members
        .iter()
        .map(|m| Bounds::from_center(solved.get(&m.id).copied().unwrap_or(m.bounds.center()), m.bounds.size()))
        .collect();
    let frame = Bounds::union_all(placed.iter().copied()).unwrap_or(held);
    let center = frame.center();

    let mut offsets = Vec::with_capacity(members.len());
    let mut pads = Vec::new();
    for (m, b) in members.iter().zip(&placed) {
        let offset = b.center().sub(center);
        offsets.push((m.node, offset, m.bounds.center()));
        pads.extend(member_pads(m, offset));
    }
    debug!(cluster = ?cluster.members, pinned = pins.len(), "solved cluster around pinned children");

    Ok(Unit {
        id: format!("cluster[{}]", cluster.members.join(",")),
        members: offsets,
        center,
        size: frame.size(),
        pads,
        rotations: vec![0.0],
        fixed: true,
    })
}

fn macro_unit(
    ctx: &RenderContext<'_>,
    cluster: &Cluster,
    members: &[Measured],
    constraints: &[RelativeConstraint],
    gap: f64,
    side: Side,
) -> Result<Unit, RenderError> {
    let input: Vec<ClusterMember> = members
        .iter()
        .map(|m| ClusterMember {
            id: m.id.clone(),
            center: m.bounds.center(),
            size: m.bounds.size(),
            pads: m.pads.clone(),
        })
        .collect();
    let solved = build_macro(cluster, &input, constraints, gap).map_err(|e| cluster_error(ctx, members, e))?;

    let mut offsets = Vec::with_capacity(members.len());
    let mut frame: Option<Bounds> = None;
    for (id, offset) in &solved.members {
        let Some(m) = members.iter().find(|m| &m.id == id) else {
            continue;
        };
        let b = Bounds::from_center(*offset, m.bounds.size());
        frame = Some(frame.map_or(b, |f| f.union(&b)));
        offsets.push((m.node, *offset, m.bounds.center()));
    }
    // The first member anchors the macro at its current position.
    let center = offsets
        .first()
        .map(|(_, offset, current)| current.sub(*offset))
        .unwrap_or(Point::ORIGIN);
    let rotations = match side {
        Side::Schematic => vec![0.0],
        _ => solved.rotations.clone(),
    };
    debug!(cluster = %solved.id, members = offsets.len(), "collapsed constraint cluster");

    Ok(Unit {
        id: solved.id,
        members: offsets,
        center,
        size: frame.map(|f| f.size()).unwrap_or(Size::new(0.0, 0.0)),
        pads: solved.pads,
        rotations,
        fixed: false,
    })
}

fn member_pads(m: &Measured, offset: Point) -> Vec<Bounds> {
    if m.pads.is_empty() {
        return vec![Bounds::from_center(offset, m.bounds.size())];
    }
    m.pads.iter().map(|p| p.translate(offset.x, offset.y)).collect()
}

/// Reports an unsatisfiable cluster by the names of its members.
fn cluster_error(ctx: &RenderContext<'_>, members: &[Measured], err: LayoutError) -> RenderError {
    match err {
        LayoutError::InconsistentConstraints { .. } => RenderError::Structural {
            reason: "constraints cannot all be satisfied".to_string(),
            names: members
                .iter()
                .map(|m| {
                    ctx.tree
                        .get(m.node)
                        .map(|n| n.name().map(str::to_string).unwrap_or_else(|| n.describe()))
                        .unwrap_or_else(|| m.id.clone())
                })
                .collect(),
        },
        other => other.into(),
    }
}

/// Moves every member of `unit` so the unit center lands on `target`,
/// turned by `rotation` degrees.
fn place_unit(
    ctx: &mut RenderContext<'_>,
    unit: &Unit,
    target: Point,
    rotation: f64,
    side: Side,
) -> Result<(), RenderError> {
    for &(node, offset, current) in &unit.members {
        let dest = target.add(offset.rotate(rotation));
        if rotation == 0.0 && dest.distance(current) < 1e-12 {
            continue;
        }
        let t = compose(&[
            Transform::translation(dest.x, dest.y),
            Transform::rotation(rotation),
            Transform::translation(-current.x, -current.y),
        ]);
        ctx.move_subtree(node, side, &t)?;
    }
    Ok(())
}

fn place_at_centers(
    ctx: &mut RenderContext<'_>,
    units: &[Unit],
    centers: &[(String, Point)],
    side: Side,
) -> Result<(), RenderError> {
    let targets: HashMap<&str, Point> = centers.iter().map(|(id, p)| (id.as_str(), *p)).collect();
    for unit in units {
        if let Some(&target) = targets.get(unit.id.as_str()) {
            place_unit(ctx, unit, target, 0.0, side)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

fn pack_rotations(ctx: &RenderContext<'_>, child: NodeId, side: Side) -> Vec<f64> {
    match (side, ctx.tree.get(child).and_then(|n| n.props.as_component())) {
        (Side::Pcb, Some(component)) => component.pack_rotations.clone(),
        _ => vec![0.0],
    }
}

/// Footprint boxes of `child` relative to its center.
fn relative_pads(ctx: &RenderContext<'_>, child: NodeId, side: Side) -> Option<(Bounds, Vec<Bounds>)> {
    let bounds = ctx.side_bounds(child, side)?;
    let center = bounds.center();
    let pads = ctx
        .footprint(child, side)
        .into_iter()
        .map(|b| b.translate(-center.x, -center.y))
        .collect();
    Some((bounds, pads))
}

/// Packs the movable units around the fixed ones.
fn pack(ctx: &mut RenderContext<'_>, units: &[Unit], gap: f64, side: Side) -> Result<(), RenderError> {
    let mut fixed = Vec::new();
    let mut items = Vec::new();
    for unit in units {
        if unit.fixed {
            place_unit(ctx, unit, unit.center, 0.0, side)?;
            fixed.extend(unit.world_pads());
        } else {
            let pads = if unit.pads.is_empty() {
                vec![Bounds::from_center(Point::ORIGIN, unit.size)]
            } else {
                unit.pads.clone()
            };
            items.push(PackItem {
                id: unit.id.clone(),
                pads,
                rotations: unit.rotations.clone(),
            });
        }
    }
    if items.is_empty() {
        return Ok(());
    }

    let placements = ctx.services.packer.pack(&PackInput { items, gap, fixed })?;
    for placement in placements {
        if let Some(unit) = units.iter().find(|u| u.id == placement.id) {
            place_unit(ctx, unit, placement.center, placement.rotation, side)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Constraints and expressions
// ---------------------------------------------------------------------------

/// The direct child of `group` that contains `node`.
fn direct_child_of(ctx: &RenderContext<'_>, group: NodeId, node: NodeId) -> Option<NodeId> {
    let mut current = node;
    loop {
        let parent = ctx.tree.parent(current)?;
        if parent == group {
            return Some(current);
        }
        current = parent;
    }
}

/// Constraints declared directly in `group` for `side`, with selectors
/// resolved to the children they land in.
fn collect_constraints(
    ctx: &RenderContext<'_>,
    group: NodeId,
    side: Side,
    children: &[NodeId],
) -> Result<Vec<RelativeConstraint>, RenderError> {
    let mut out = Vec::new();
    for &id in ctx.tree.children(group) {
        let Some(node) = ctx.tree.get(id) else {
            continue;
        };
        let Some(constraint) = node.props.as_constraint() else {
            continue;
        };
        let applies = match side {
            Side::Schematic => constraint.schematic,
            _ => constraint.pcb,
        };
        if node.pending_removal || !applies {
            continue;
        }

        let target = |selector: &str| -> Result<String, RenderError> {
            let found = ctx.resolve_for(id, group, selector)?;
            direct_child_of(ctx, group, found)
                .filter(|c| children.contains(c))
                .map(|c| c.to_string())
                .ok_or_else(|| RenderError::Resolution {
                    node: node.describe(),
                    selector: selector.to_string(),
                })
        };

        let resolved = match &constraint.kind {
            ConstraintKind::XDist { dist, left, right, mode } => RelativeConstraint::XDist {
                left: target(left)?,
                right: target(right)?,
                dist: *dist,
                edge_to_edge: *mode == EdgeMode::EdgeToEdge,
            },
            ConstraintKind::YDist { dist, top, bottom, mode } => RelativeConstraint::YDist {
                top: target(top)?,
                bottom: target(bottom)?,
                dist: *dist,
                edge_to_edge: *mode == EdgeMode::EdgeToEdge,
            },
            ConstraintKind::SameX { members } => RelativeConstraint::SameX(
                members.iter().map(|m| target(m)).collect::<Result<_, _>>()?,
            ),
            ConstraintKind::SameY { members } => RelativeConstraint::SameY(
                members.iter().map(|m| target(m)).collect::<Result<_, _>>()?,
            ),
        };
        out.push(resolved);
    }
    Ok(out)
}

fn side_coords(props: &NodeProps, side: Side) -> (Option<Coordinate>, Option<Coordinate>) {
    match props.position() {
        Some(p) if side == Side::Schematic => (p.sch_x.clone(), p.sch_y.clone()),
        Some(p) => (p.pcb_x.clone(), p.pcb_y.clone()),
        None => (None, None),
    }
}

fn is_expr(c: &Option<Coordinate>) -> bool {
    matches!(c, Some(Coordinate::Expr(_)))
}

/// Places children whose position is a calculated expression.
fn apply_expressions(ctx: &mut RenderContext<'_>, children: &[NodeId], side: Side) -> Result<(), RenderError> {
    let mut items = Vec::new();
    let mut calculated: HashMap<String, NodeId> = HashMap::new();
    for &child in children {
        let Some(node) = ctx.tree.get(child) else {
            continue;
        };
        let Some(name) = node.name().map(str::to_string) else {
            continue;
        };
        let Some(bounds) = ctx.side_bounds(child, side) else {
            continue;
        };
        let (x, y) = side_coords(&node.props, side);
        if is_expr(&x) || is_expr(&y) {
            calculated.insert(name.clone(), child);
        }
        items.push(ExprItem {
            name,
            size: bounds.size(),
            current: bounds.center(),
            x,
            y,
        });
    }
    if calculated.is_empty() {
        return Ok(());
    }

    let resolved = resolve_positions(&items)?;
    for (name, target) in resolved {
        let Some(&child) = calculated.get(&name) else {
            continue;
        };
        let Some(current) = ctx.side_bounds(child, side).map(|b| b.center()) else {
            continue;
        };
        let t = Transform::translation(target.x - current.x, target.y - current.y);
        ctx.move_subtree(child, side, &t)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// The group itself
// ---------------------------------------------------------------------------

fn place_self(ctx: &mut RenderContext<'_>, group: NodeId, props: &GroupProps, side: Side) -> Result<(), RenderError> {
    let position = &props.position;
    let (offset, rotation, explicit) = match side {
        Side::Schematic => (position.sch_offset(), position.sch_rotation, position.has_explicit_sch()),
        _ => (position.pcb_offset(), position.pcb_rotation, position.has_explicit_pcb()),
    };

    let anchored = side_layout(props, side).anchor.filter(|_| explicit);
    let t = match (anchored, ctx.side_bounds(group, side)) {
        (Some(anchor), Some(bounds)) => {
            let (dx, dy) = anchor_shift(&bounds, anchor, Point::new(offset.0, offset.1));
            Transform::translation(dx, dy)
        }
        _ => compose(&[
            Transform::translation(offset.0, offset.1),
            Transform::rotation(rotation),
        ]),
    };
    ctx.move_subtree(group, side, &t)
}

fn delete_group_record(ctx: &mut RenderContext<'_>, group: NodeId, side: Side) -> Result<(), RenderError> {
    let refs = ctx.refs_mut(group)?;
    let stale: Vec<String> = match side {
        Side::Schematic => refs.schematic_group_id.take().into_iter().collect(),
        _ => refs
            .pcb_group_id
            .take()
            .into_iter()
            .chain(refs.pcb_board_id.take())
            .collect(),
    };
    for id in stale {
        ctx.delete_quiet(&id)?;
    }
    Ok(())
}

fn write_group_record(
    ctx: &mut RenderContext<'_>,
    group: NodeId,
    props: &GroupProps,
    side: Side,
) -> Result<(), RenderError> {
    let content = ctx.side_bounds(group, side);
    let subcircuit_id = ctx.subcircuit_id(group);
    let is_subcircuit = ctx.node(group)?.caps.subcircuit;
    let source_group_id = ctx.refs(group)?.source_group_id.clone().unwrap_or_default();
    let fallback_center = match side {
        Side::Schematic => props.position.sch_offset(),
        _ => props.position.pcb_offset(),
    };
    let fallback_center = Point::new(fallback_center.0, fallback_center.1);

    match side {
        Side::Pcb if props.is_board => {
            let margin_box = content.map(|b| b.expand(BOARD_MARGIN));
            let (center, width, height) = match (props.width, props.height) {
                (Some(w), Some(h)) => (fallback_center, w, h),
                (w, h) => {
                    let b = margin_box.unwrap_or_else(|| Bounds::from_point(fallback_center));
                    (b.center(), w.unwrap_or(b.width()), h.unwrap_or(b.height()))
                }
            };
            let id = ctx.insert(CircuitRecord::PcbBoard(PcbBoard {
                center,
                width,
                height,
                subcircuit_id,
                ..Default::default()
            }))?;
            ctx.refs_mut(group)?.pcb_board_id = Some(id);
        }
        Side::Pcb => {
            let b = content.unwrap_or_else(|| Bounds::from_point(fallback_center));
            let id = ctx.insert(CircuitRecord::PcbGroup(PcbGroup {
                source_group_id,
                center: b.center(),
                width: b.width(),
                height: b.height(),
                is_subcircuit,
                subcircuit_id,
                ..Default::default()
            }))?;
            ctx.refs_mut(group)?.pcb_group_id = Some(id);
        }
        Side::Schematic => {
            let b = content.unwrap_or_else(|| Bounds::from_point(fallback_center));
            let id = ctx.insert(CircuitRecord::SchematicGroup(SchematicGroup {
                source_group_id,
                center: b.center(),
                width: b.width(),
                height: b.height(),
                subcircuit_id,
                ..Default::default()
            }))?;
            ctx.refs_mut(group)?.schematic_group_id = Some(id);
        }
        Side::Source => {}
    }
    Ok(())
}

/// Marks the phases that read positions on `side` for another pass.
fn invalidate_dependents(ctx: &mut RenderContext<'_>, group: NodeId, side: Side) {
    let root = ctx.tree.root_id();
    match side {
        Side::Schematic => {
            let traces: Vec<NodeId> = ctx
                .tree
                .node_ids()
                .into_iter()
                .filter(|&id| ctx.tree.get(id).is_some_and(|n| n.props.as_trace().is_some()))
                .collect();
            for id in traces {
                ctx.tree.mark_dirty(id, RenderPhase::SchematicTraceRender);
            }
        }
        _ => {
            let routers: Vec<NodeId> = ctx
                .tree
                .node_ids()
                .into_iter()
                .filter(|&id| {
                    ctx.tree
                        .get(id)
                        .is_some_and(|n| n.props.as_group().is_some() && n.caps.subcircuit)
                })
                .collect();
            for id in routers {
                ctx.tree.mark_dirty(id, RenderPhase::PcbTraceRender);
            }
            ctx.tree.mark_dirty(root, RenderPhase::PcbTraceRender);
            let components: Vec<NodeId> = ctx
                .tree
                .full_descendants(group)
                .into_iter()
                .filter(|&id| ctx.tree.get(id).is_some_and(|n| n.props.as_component().is_some()))
                .collect();
            for id in components {
                ctx.tree.mark_dirty(id, RenderPhase::CadModelRender);
            }
            ctx.tree.mark_dirty(root, RenderPhase::PcbAnalysis);
        }
    }
}
