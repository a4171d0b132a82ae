//! Anchor alignment post-pass.

use circuitc_core::geometry::{Anchor, Bounds, Point};

/// Translation that lands `anchor` of `bounds` on `target`.
pub fn anchor_shift(bounds: &Bounds, anchor: Anchor, target: Point) -> (f64, f64) {
    let current = bounds.anchor_point(anchor);
    (target.x - current.x, target.y - current.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_left_lands_on_target() {
        let b = Bounds::new(-2.0, -1.0, 2.0, 1.0);
        assert_eq!(anchor_shift(&b, Anchor::TopLeft, Point::new(0.0, 0.0)), (2.0, -1.0));
        assert_eq!(anchor_shift(&b, Anchor::Center, Point::new(3.0, 3.0)), (3.0, 3.0));
        assert_eq!(
            anchor_shift(&b, Anchor::BottomRight, Point::new(0.0, 0.0)),
            (-2.0, 1.0)
        );
    }
}
