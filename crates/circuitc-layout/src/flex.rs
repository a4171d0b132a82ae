//! Flexbox placement.
//!
//! The flex algorithm is pluggable through [`FlexSolver`]; [`FlexboxSolver`]
//! implements the single-line subset the layout needs: main-axis
//! justification with gaps and cross-axis alignment. Rows run along +x,
//! columns run downward along -y.

use circuitc_core::geometry::{Point, Size};
use circuitc_core::props::{AlignItems, FlexDirection, JustifyContent};

use crate::error::LayoutError;

#[derive(Debug, Clone, PartialEq)]
pub struct FlexItem {
    pub id: String,
    /// Minimum content size of the child.
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlexInput {
    pub items: Vec<FlexItem>,
    pub direction: FlexDirection,
    pub justify: JustifyContent,
    pub align: AlignItems,
    pub gap: f64,
    /// Fixed container size; content size when absent.
    pub container: Option<Size>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlexOutput {
    pub container: Size,
    /// Item centers relative to the container center, in input order.
    pub centers: Vec<(String, Point)>,
}

/// A flex-box algorithm.
pub trait FlexSolver: Send + Sync {
    fn layout(&self, input: &FlexInput) -> Result<FlexOutput, LayoutError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlexboxSolver;

impl FlexSolver for FlexboxSolver {
    fn layout(&self, input: &FlexInput) -> Result<FlexOutput, LayoutError> {
        let row = input.direction == FlexDirection::Row;
        let main_of = |s: Size| if row { s.width } else { s.height };
        let cross_of = |s: Size| if row { s.height } else { s.width };

        let n = input.items.len();
        let content_main: f64 = input.items.iter().map(|i| main_of(i.size)).sum::<f64>()
            + n.saturating_sub(1) as f64 * input.gap;
        let content_cross = input
            .items
            .iter()
            .map(|i| cross_of(i.size))
            .fold(0.0, f64::max);

        let container = input.container.unwrap_or(if row {
            Size::new(content_main, content_cross)
        } else {
            Size::new(content_cross, content_main)
        });
        let main_len = main_of(container);
        let cross_len = cross_of(container);
        let free = main_len - content_main;

        let (lead, between) = match input.justify {
            _ if n == 0 => (0.0, 0.0),
            JustifyContent::Start => (0.0, 0.0),
            JustifyContent::Center => (free / 2.0, 0.0),
            JustifyContent::End => (free, 0.0),
            _ if free <= 0.0 => (0.0, 0.0),
            JustifyContent::SpaceBetween if n == 1 => (0.0, 0.0),
            JustifyContent::SpaceBetween => (0.0, free / (n - 1) as f64),
            JustifyContent::SpaceAround => {
                let slot = free / n as f64;
                (slot / 2.0, slot)
            }
            JustifyContent::SpaceEvenly => {
                let slot = free / (n + 1) as f64;
                (slot, slot)
            }
        };

        let mut cursor = lead;
        let mut centers = Vec::with_capacity(n);
        for item in &input.items {
            let main = main_of(item.size);
            let cross = cross_of(item.size);
            let main_center = cursor + main / 2.0;
            let cross_center = match input.align {
                AlignItems::Start => cross / 2.0,
                AlignItems::End => cross_len - cross / 2.0,
                AlignItems::Center | AlignItems::Stretch => cross_len / 2.0,
            };
            cursor += main + input.gap + between;

            // Container-local offsets measured from the top-left corner.
            let (dx, dy) = if row {
                (main_center, cross_center)
            } else {
                (cross_center, main_center)
            };
            centers.push((
                item.id.clone(),
                Point::new(-container.width / 2.0 + dx, container.height / 2.0 - dy),
            ));
        }

        Ok(FlexOutput { container, centers })
    }
}
