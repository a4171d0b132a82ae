//! Grid placement: uniform cells sized to the largest child.

use circuitc_core::geometry::{Point, Size};

/// One child to place in a grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridItem {
    pub id: String,
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub cols: usize,
    pub rows: usize,
    pub cell: Size,
    /// Gap-aware extent of the whole grid.
    pub total: Size,
    /// Cell centers relative to the grid center, in input order.
    pub centers: Vec<(String, Point)>,
}

/// Resolves the column/row counts for `n` items.
///
/// Explicit counts win; a missing count is inferred from the other, and
/// with neither the grid is as square as possible (columns first).
pub fn resolve_dimensions(n: usize, cols: Option<usize>, rows: Option<usize>) -> (usize, usize) {
    let n = n.max(1);
    match (cols.filter(|c| *c > 0), rows.filter(|r| *r > 0)) {
        (Some(c), Some(r)) => (c, r.max(n.div_ceil(c))),
        (Some(c), None) => (c, n.div_ceil(c)),
        (None, Some(r)) => (n.div_ceil(r), r),
        (None, None) => {
            let c = (n as f64).sqrt().ceil() as usize;
            (c, n.div_ceil(c))
        }
    }
}

/// Lays `items` out row-major, top row first.
pub fn grid_layout(
    items: &[GridItem],
    cols: Option<usize>,
    rows: Option<usize>,
    gap: f64,
) -> GridLayout {
    let (cols, rows) = resolve_dimensions(items.len(), cols, rows);
    let cell = Size::new(
        items.iter().map(|i| i.size.width).fold(0.0, f64::max),
        items.iter().map(|i| i.size.height).fold(0.0, f64::max),
    );
    let total = Size::new(
        cols as f64 * cell.width + cols.saturating_sub(1) as f64 * gap,
        rows as f64 * cell.height + rows.saturating_sub(1) as f64 * gap,
    );

    let centers = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let (row, col) = (i / cols, i % cols);
            let x = -total.width / 2.0 + col as f64 * (cell.width + gap) + cell.width / 2.0;
            let y = total.height / 2.0 - row as f64 * (cell.height + gap) - cell.height / 2.0;
            (item.id.clone(), Point::new(x, y))
        })
        .collect();

    GridLayout {
        cols,
        rows,
        cell,
        total,
        centers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<GridItem> {
        (0..n)
            .map(|i| GridItem {
                id: format!("C{i}"),
                size: Size::new(1.0 + (i % 2) as f64, 1.0),
            })
            .collect()
    }

    #[test]
    fn square_ish_defaults() {
        assert_eq!(resolve_dimensions(5, None, None), (3, 2));
        assert_eq!(resolve_dimensions(4, None, None), (2, 2));
        assert_eq!(resolve_dimensions(7, Some(2), None), (2, 4));
        assert_eq!(resolve_dimensions(7, None, Some(2)), (4, 2));
        assert_eq!(resolve_dimensions(7, Some(2), Some(2)), (2, 4));
        assert_eq!(resolve_dimensions(0, None, None), (1, 1));
    }

    #[test]
    fn cells_use_max_extent_and_gap() {
        let layout = grid_layout(&items(4), None, None, 0.5);
        assert_eq!(layout.cell, Size::new(2.0, 1.0));
        assert_eq!(layout.total, Size::new(4.5, 2.5));
        assert_eq!(layout.centers[0].1, Point::new(-1.25, 0.75));
        assert_eq!(layout.centers[1].1, Point::new(1.25, 0.75));
        assert_eq!(layout.centers[2].1, Point::new(-1.25, -0.75));
    }
}
